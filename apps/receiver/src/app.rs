//! Terminal front end: credential prompt, input loop and event printing.

use std::io::Write;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use shadowclone_api::Client;
use shadowclone_stream::{DownloadDir, SessionEvent, SessionHandle, SubmitError};

use crate::config::Config;
use crate::input::{Command, HELP, Input};
use crate::render;

/// Environment variable supplying the credential without a prompt.
pub const CREDENTIAL_ENV: &str = "SHADOWCLONE_CREDENTIAL";

/// Runs the receiver until `/quit`, end of input, or Ctrl-C.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let api = Arc::new(Client::new(&config.server_url)?);
    let downloads = DownloadDir::new(config.download_path());
    tracing::info!(
        server = %config.server_url,
        downloads = %downloads.path().display(),
        "starting receiver"
    );

    let (handle, events) = shadowclone_stream::spawn(api, config.session_config(), downloads);
    let printer = tokio::spawn(print_events(events));

    if config.wake_on_start {
        handle.awaken().await?;
    }

    match initial_credential().await {
        Some(credential) => handle.login(&credential).await?,
        None => println!("No credential given; use /login <credential>. /help lists commands."),
    }

    tokio::select! {
        result = input_loop(&handle) => result?,
        _ = tokio::signal::ctrl_c() => tracing::info!("interrupted"),
    }

    handle.shutdown().await;
    drop(handle);
    let _ = printer.await;
    Ok(())
}

async fn print_events(mut events: mpsc::Receiver<SessionEvent>) {
    while let Some(event) = events.recv().await {
        if let SessionEvent::StateChanged(state) = &event {
            tracing::debug!(state = %render::describe_state(state), "session state");
        }
        render::print(&event);
    }
}

/// Credential from the environment, else from a hidden prompt.
async fn initial_credential() -> Option<String> {
    if let Ok(credential) = std::env::var(CREDENTIAL_ENV)
        && !credential.trim().is_empty()
    {
        return Some(credential);
    }

    let prompted = tokio::task::spawn_blocking(|| {
        print!("Credential: ");
        std::io::stdout().flush()?;
        rpassword::read_password()
    })
    .await;

    match prompted {
        Ok(Ok(credential)) if !credential.trim().is_empty() => Some(credential),
        Ok(Ok(_)) => None,
        Ok(Err(e)) => {
            tracing::warn!("cannot read credential: {e}");
            None
        }
        Err(e) => {
            tracing::warn!("credential prompt failed: {e}");
            None
        }
    }
}

async fn input_loop(handle: &SessionHandle) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if !handle_line(handle, &line).await? {
            break;
        }
    }
    Ok(())
}

/// Handles one input line. Returns `false` when the user asked to quit.
///
/// Blank lines go to the session too, which logs them as invalid.
async fn handle_line(handle: &SessionHandle, line: &str) -> anyhow::Result<bool> {
    match Input::parse(line) {
        Input::Payload(mut payload) => match handle.submit(&mut payload).await {
            Ok(()) => {}
            // Logged by the session; the line stays available to edit.
            Err(SubmitError::Payload(_) | SubmitError::NotConnected) => {
                tracing::debug!(len = payload.len(), "payload kept");
            }
            Err(e @ SubmitError::SessionGone) => return Err(e.into()),
        },
        Input::Command(command) => return dispatch(handle, command).await,
    }
    Ok(true)
}

/// Runs one slash command. Returns `false` when the user asked to quit.
async fn dispatch(handle: &SessionHandle, command: Command) -> anyhow::Result<bool> {
    match command {
        Command::Login(credential) => handle.login(&credential).await?,
        Command::Search => handle.search_reports().await?,
        Command::Download(path) => handle.download(&path).await?,
        Command::All => handle.retrieve_all().await?,
        Command::Status => {
            let state = handle.state().await?;
            println!("Session: {}", render::describe_state(&state));
        }
        Command::Logout => handle.logout().await?,
        Command::Help => println!("{HELP}"),
        Command::Quit => return Ok(false),
        Command::Invalid(message) => println!("{message}. /help lists commands."),
    }
    Ok(true)
}
