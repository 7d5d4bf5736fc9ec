//! Session driver.
//!
//! A single task owns the [`SessionMachine`], the live [`StreamLink`] and
//! the reconnect timer. Front ends talk to it through a cloneable
//! [`SessionHandle`] and observe it through a [`SessionEvent`] receiver.
//! HTTP calls, link setup and downloads run as spawned tasks that report
//! back to the driver.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use shadowclone_api::{ApiError, Client, Credential, ReportEntry, SessionToken};
use shadowclone_protocol::constants::ARCHIVE_FILENAME;
use shadowclone_protocol::{PayloadError, encode_payload, mismatched_scan_fields, report_filename};

use crate::download::DownloadDir;
use crate::machine::{
    AuthFailure, LinkEvent, ReportOutcome, SessionAction, SessionInput, SessionMachine,
};
use crate::reconnection::ReconnectTimer;
use crate::types::{LogEntry, SessionConfig, SessionEvent, SessionState};
use crate::ws_client::{StreamLink, stream_url};

/// Boxed future returned by [`StreamApi`] methods.
pub type ApiFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ApiError>> + Send + 'a>>;

/// HTTP calls the session depends on.
///
/// Implemented by [`shadowclone_api::Client`].
pub trait StreamApi: Send + Sync + 'static {
    /// Base server URL, used to derive the stream endpoint.
    fn server_url(&self) -> &str;

    fn authorize<'a>(&'a self, credential: &'a Credential) -> ApiFuture<'a, SessionToken>;

    fn fetch_report<'a>(
        &'a self,
        credential: &'a Credential,
        identifier: &'a str,
    ) -> ApiFuture<'a, Vec<u8>>;

    fn search_reports<'a>(&'a self, credential: &'a Credential)
    -> ApiFuture<'a, Vec<ReportEntry>>;

    fn retrieve_all<'a>(&'a self, credential: &'a Credential) -> ApiFuture<'a, Option<Vec<u8>>>;

    fn awaken(&self) -> ApiFuture<'_, ()>;
}

impl StreamApi for Client {
    fn server_url(&self) -> &str {
        self.base_url()
    }

    fn authorize<'a>(&'a self, credential: &'a Credential) -> ApiFuture<'a, SessionToken> {
        Box::pin(Client::authorize(self, credential))
    }

    fn fetch_report<'a>(
        &'a self,
        credential: &'a Credential,
        identifier: &'a str,
    ) -> ApiFuture<'a, Vec<u8>> {
        Box::pin(Client::fetch_report(self, credential, identifier))
    }

    fn search_reports<'a>(
        &'a self,
        credential: &'a Credential,
    ) -> ApiFuture<'a, Vec<ReportEntry>> {
        Box::pin(Client::search_reports(self, credential))
    }

    fn retrieve_all<'a>(&'a self, credential: &'a Credential) -> ApiFuture<'a, Option<Vec<u8>>> {
        Box::pin(Client::retrieve_all(self, credential))
    }

    fn awaken(&self) -> ApiFuture<'_, ()> {
        Box::pin(Client::awaken(self))
    }
}

/// Errors from submitting a payload.
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error(transparent)]
    Payload(#[from] PayloadError),

    #[error("no open connection")]
    NotConnected,

    #[error("session has shut down")]
    SessionGone,
}

enum Command {
    Login(String),
    Logout,
    Submit {
        input: String,
        reply: oneshot::Sender<Result<(), SubmitError>>,
    },
    SearchReports,
    Download(String),
    RetrieveAll,
    Awaken(oneshot::Sender<()>),
    State(oneshot::Sender<SessionState>),
    Shutdown,
}

/// Results posted back by spawned tasks.
enum DriverInput {
    Machine(SessionInput),
    Connected { generation: u64, link: StreamLink },
}

/// Cloneable handle to a running session.
#[derive(Clone)]
pub struct SessionHandle {
    commands_tx: mpsc::Sender<Command>,
}

impl SessionHandle {
    async fn send(&self, command: Command) -> Result<(), SubmitError> {
        self.commands_tx
            .send(command)
            .await
            .map_err(|_| SubmitError::SessionGone)
    }

    /// Starts a session with a raw credential. Blank input is rejected
    /// by the session with an error log and no network call.
    pub async fn login(&self, credential: &str) -> Result<(), SubmitError> {
        self.send(Command::Login(credential.to_string())).await
    }

    /// Closes the link, cancels any reconnect and forgets the credential.
    pub async fn logout(&self) -> Result<(), SubmitError> {
        self.send(Command::Logout).await
    }

    /// Sends `input` as a JSON payload.
    ///
    /// `input` is cleared only when the payload was queued; on any error
    /// it is left untouched.
    pub async fn submit(&self, input: &mut String) -> Result<(), SubmitError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Submit {
            input: input.clone(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| SubmitError::SessionGone)??;
        input.clear();
        Ok(())
    }

    /// Requests the report listing; the result arrives as
    /// [`SessionEvent::ReportList`].
    pub async fn search_reports(&self) -> Result<(), SubmitError> {
        self.send(Command::SearchReports).await
    }

    /// Downloads one report by its server-side path.
    pub async fn download(&self, identifier: &str) -> Result<(), SubmitError> {
        self.send(Command::Download(identifier.to_string())).await
    }

    /// Downloads every report as one archive.
    pub async fn retrieve_all(&self) -> Result<(), SubmitError> {
        self.send(Command::RetrieveAll).await
    }

    /// Calls the server's wake-up endpoint and waits for the call to
    /// finish. Its outcome is logged either way.
    pub async fn awaken(&self) -> Result<(), SubmitError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Awaken(reply)).await?;
        rx.await.map_err(|_| SubmitError::SessionGone)
    }

    pub async fn state(&self) -> Result<SessionState, SubmitError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::State(reply)).await?;
        rx.await.map_err(|_| SubmitError::SessionGone)
    }

    /// Stops the driver after tearing down the link.
    pub async fn shutdown(&self) {
        let _ = self.commands_tx.send(Command::Shutdown).await;
    }
}

/// Spawns a session driver.
///
/// Returns the control handle and the event stream for the front end.
pub fn spawn<A: StreamApi>(
    api: Arc<A>,
    config: SessionConfig,
    downloads: DownloadDir,
) -> (SessionHandle, mpsc::Receiver<SessionEvent>) {
    let (commands_tx, commands_rx) = mpsc::channel(64);
    let (events_tx, events_rx) = mpsc::channel(256);
    let (internal_tx, internal_rx) = mpsc::channel(64);
    let (link_tx, link_rx) = mpsc::channel(256);
    let (due_tx, due_rx) = mpsc::channel(8);

    let driver = Driver {
        api,
        machine: SessionMachine::new(&config),
        config,
        link: None,
        timer: ReconnectTimer::new(),
        downloads,
        events_tx,
        internal_tx,
        link_tx,
        due_tx,
    };
    tokio::spawn(driver.run(commands_rx, internal_rx, link_rx, due_rx));

    (SessionHandle { commands_tx }, events_rx)
}

struct Driver<A> {
    api: Arc<A>,
    config: SessionConfig,
    machine: SessionMachine,
    link: Option<StreamLink>,
    timer: ReconnectTimer,
    downloads: DownloadDir,
    events_tx: mpsc::Sender<SessionEvent>,
    internal_tx: mpsc::Sender<DriverInput>,
    link_tx: mpsc::Sender<LinkEvent>,
    due_tx: mpsc::Sender<u64>,
}

impl<A: StreamApi> Driver<A> {
    async fn run(
        mut self,
        mut commands_rx: mpsc::Receiver<Command>,
        mut internal_rx: mpsc::Receiver<DriverInput>,
        mut link_rx: mpsc::Receiver<LinkEvent>,
        mut due_rx: mpsc::Receiver<u64>,
    ) {
        loop {
            tokio::select! {
                command = commands_rx.recv() => match command {
                    None | Some(Command::Shutdown) => break,
                    Some(command) => self.on_command(command).await,
                },
                Some(input) = internal_rx.recv() => match input {
                    DriverInput::Machine(input) => self.feed(input).await,
                    DriverInput::Connected { generation, link } => {
                        self.on_connected(generation, link).await;
                    }
                },
                Some(event) = link_rx.recv() => self.feed(SessionInput::Link(event)).await,
                Some(generation) = due_rx.recv() => {
                    self.feed(SessionInput::ReconnectDue { generation }).await;
                }
            }
        }

        self.timer.cancel();
        if let Some(link) = self.link.take() {
            link.close();
        }
        debug!("session driver stopped");
    }

    async fn emit(&self, event: SessionEvent) {
        let _ = self.events_tx.send(event).await;
    }

    async fn log(&self, entry: LogEntry) {
        self.emit(SessionEvent::Log(entry)).await;
    }

    async fn feed(&mut self, input: SessionInput) {
        for action in self.machine.handle(input) {
            self.execute(action).await;
        }
    }

    async fn on_command(&mut self, command: Command) {
        match command {
            Command::Login(raw) => match Credential::new(&raw) {
                Some(credential) => self.feed(SessionInput::Login(credential)).await,
                None => self.log(LogEntry::error("Credential is empty")).await,
            },
            Command::Logout => self.feed(SessionInput::Logout).await,
            Command::Submit { input, reply } => {
                let result = self.submit(&input).await;
                let _ = reply.send(result);
            }
            Command::SearchReports => self.search_reports().await,
            Command::Download(identifier) => {
                let Some(credential) = self.require_credential().await else {
                    return;
                };
                self.log(LogEntry::request(format!(
                    "< Requesting Report! > {identifier}"
                )))
                .await;
                self.execute(SessionAction::FetchReport {
                    identifier,
                    credential,
                })
                .await;
            }
            Command::RetrieveAll => self.retrieve_all().await,
            Command::Awaken(reply) => self.awaken(reply),
            Command::State(reply) => {
                let _ = reply.send(self.machine.state().clone());
            }
            // Handled by the run loop.
            Command::Shutdown => {}
        }
    }

    async fn submit(&mut self, input: &str) -> Result<(), SubmitError> {
        let payload = match encode_payload(input) {
            Ok(payload) => payload,
            Err(e) => {
                self.log(LogEntry::error(format!("Invalid payload: {e}"))).await;
                return Err(e.into());
            }
        };

        let link = match &self.link {
            Some(link) if self.machine.is_open() => link,
            _ => {
                self.log(LogEntry::error("No open connection; payload not sent"))
                    .await;
                return Err(SubmitError::NotConnected);
            }
        };

        if let Ok(value) = serde_json::from_slice::<serde_json::Value>(&payload) {
            let mismatched = mismatched_scan_fields(&value);
            if !mismatched.is_empty() {
                let text = format!(
                    "Payload does not match the scan request schema: {}",
                    mismatched.join(", ")
                );
                self.log(LogEntry::warning(text)).await;
            }
        }

        if let Err(e) = link.send_payload(payload).await {
            warn!(error = %e, "payload send failed");
            self.log(LogEntry::error(format!("Payload not sent: {e}"))).await;
            return Err(SubmitError::NotConnected);
        }
        self.log(LogEntry::request("< Request Data Sent! >")).await;
        Ok(())
    }

    async fn require_credential(&self) -> Option<Credential> {
        let credential = self.machine.credential().cloned();
        if credential.is_none() {
            self.log(LogEntry::error("Not logged in")).await;
        }
        credential
    }

    async fn on_connected(&mut self, generation: u64, link: StreamLink) {
        let current = generation == self.machine.generation()
            && self.machine.state() == &SessionState::Connecting;
        if !current {
            debug!(generation, "discarding stale link");
            link.close();
            return;
        }
        if let Some(old) = self.link.replace(link) {
            old.close();
        }
        self.feed(SessionInput::LinkOpened { generation }).await;
        // Frames read from here on are handled after the link is open.
        if let Some(link) = self.link.as_mut() {
            link.start();
        }
    }

    async fn execute(&mut self, action: SessionAction) {
        match action {
            SessionAction::Emit(event) => self.emit(event).await,
            SessionAction::Authorize {
                generation,
                credential,
            } => {
                let api = self.api.clone();
                let internal_tx = self.internal_tx.clone();
                tokio::spawn(async move {
                    let result = api.authorize(&credential).await.map_err(auth_failure);
                    let input = SessionInput::Authorized { generation, result };
                    let _ = internal_tx.send(DriverInput::Machine(input)).await;
                });
            }
            SessionAction::OpenLink { generation, token } => {
                let url = stream_url(
                    self.api.server_url(),
                    self.config.stream_url.as_deref(),
                    &token,
                );
                let heartbeat = self.config.heartbeat.clone();
                let link_tx = self.link_tx.clone();
                let internal_tx = self.internal_tx.clone();
                tokio::spawn(async move {
                    let connected = match url {
                        Ok(url) => StreamLink::connect(&url, generation, &heartbeat, link_tx).await,
                        Err(e) => Err(e),
                    };
                    let input = match connected {
                        Ok(link) => DriverInput::Connected { generation, link },
                        Err(e) => DriverInput::Machine(SessionInput::LinkFailed {
                            generation,
                            error: e.to_string(),
                        }),
                    };
                    let _ = internal_tx.send(input).await;
                });
            }
            SessionAction::CloseLink => {
                if let Some(link) = self.link.take() {
                    link.close();
                }
            }
            SessionAction::ScheduleReconnect { generation, delay } => {
                self.timer.arm(generation, delay, self.due_tx.clone());
            }
            SessionAction::CancelReconnect => self.timer.cancel(),
            SessionAction::FetchReport {
                identifier,
                credential,
            } => {
                let api = self.api.clone();
                let downloads = self.downloads.clone();
                let internal_tx = self.internal_tx.clone();
                tokio::spawn(async move {
                    let outcome = fetch_and_save(&*api, &downloads, &credential, &identifier).await;
                    let input = SessionInput::ReportFinished {
                        identifier,
                        outcome,
                    };
                    let _ = internal_tx.send(DriverInput::Machine(input)).await;
                });
            }
        }
    }

    async fn search_reports(&self) {
        let Some(credential) = self.require_credential().await else {
            return;
        };
        let api = self.api.clone();
        let events_tx = self.events_tx.clone();
        tokio::spawn(async move {
            let event = match api.search_reports(&credential).await {
                Ok(entries) => SessionEvent::ReportList(entries),
                Err(e) => SessionEvent::Log(LogEntry::error(format!("Report search failed: {e}"))),
            };
            let _ = events_tx.send(event).await;
        });
    }

    async fn retrieve_all(&self) {
        let Some(credential) = self.require_credential().await else {
            return;
        };
        self.log(LogEntry::request("< Requesting All Reports! >")).await;
        let api = self.api.clone();
        let downloads = self.downloads.clone();
        let events_tx = self.events_tx.clone();
        tokio::spawn(async move {
            let events = match api.retrieve_all(&credential).await {
                Ok(Some(archive)) => match downloads.save(ARCHIVE_FILENAME, &archive).await {
                    Ok(path) => vec![
                        SessionEvent::Log(LogEntry::status(format!(
                            "< File Request Complete! > {}",
                            path.display()
                        ))),
                        SessionEvent::ReportSaved { path },
                    ],
                    Err(e) => vec![SessionEvent::Log(LogEntry::error(format!(
                        "Saving archive failed: {e}"
                    )))],
                },
                Ok(None) => vec![SessionEvent::Log(LogEntry::warning(
                    "No reports available to retrieve",
                ))],
                Err(e) => vec![SessionEvent::Log(LogEntry::error(format!(
                    "Bulk download failed: {e}"
                )))],
            };
            for event in events {
                let _ = events_tx.send(event).await;
            }
        });
    }

    fn awaken(&self, reply: oneshot::Sender<()>) {
        let api = self.api.clone();
        let events_tx = self.events_tx.clone();
        tokio::spawn(async move {
            let entry = match api.awaken().await {
                Ok(()) => {
                    info!("server awake");
                    LogEntry::status("< Server is awake >")
                }
                Err(e) => LogEntry::warning(format!("Wake-up call failed: {e}")),
            };
            let _ = events_tx.send(SessionEvent::Log(entry)).await;
            let _ = reply.send(());
        });
    }
}

fn auth_failure(error: ApiError) -> AuthFailure {
    match error.status() {
        Some(status) => AuthFailure::Refused(status),
        None => AuthFailure::Transport(error.to_string()),
    }
}

async fn fetch_and_save<A: StreamApi + ?Sized>(
    api: &A,
    downloads: &DownloadDir,
    credential: &Credential,
    identifier: &str,
) -> ReportOutcome {
    match api.fetch_report(credential, identifier).await {
        Ok(bytes) => match downloads.save(&report_filename(identifier), &bytes).await {
            Ok(path) => ReportOutcome::Saved(path),
            Err(e) => ReportOutcome::Failed(e.to_string()),
        },
        Err(e) => match e.status() {
            Some(status) => ReportOutcome::Refused(status),
            None => ReportOutcome::Failed(e.to_string()),
        },
    }
}
