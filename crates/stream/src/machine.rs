//! Session state machine.
//!
//! Synchronous and free of I/O: every input is turned into a list of
//! [`SessionAction`]s that the session driver carries out. Connection
//! attempts are numbered by a generation counter; inputs that carry an
//! older generation belong to a link that has already been replaced and
//! are dropped.

use std::path::PathBuf;
use std::time::Duration;

use tracing::{debug, info, warn};

use shadowclone_api::{Credential, SessionToken};
use shadowclone_protocol::InboundFrame;

use crate::types::{
    CloseInfo, LogEntry, ReconnectPolicy, SessionConfig, SessionEvent, SessionState, StallAction,
};

/// Why a credential exchange did not yield a token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthFailure {
    /// The server answered with a non-200 status.
    Refused(u16),
    /// The request never got an answer.
    Transport(String),
}

/// Result of a report download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportOutcome {
    Saved(PathBuf),
    Refused(u16),
    Failed(String),
}

/// Events raised by a live stream link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// A text frame other than the heartbeat echo.
    Frame { generation: u64, frame: InboundFrame },
    /// A binary frame of the given size.
    Binary { generation: u64, len: usize },
    /// A ping went unanswered past the heartbeat timeout.
    Stalled { generation: u64 },
    /// The far end closed the stream or the transport failed.
    Closed { generation: u64, info: CloseInfo },
}

/// Inputs driving the state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionInput {
    Login(Credential),
    Logout,
    Authorized {
        generation: u64,
        result: Result<SessionToken, AuthFailure>,
    },
    LinkOpened { generation: u64 },
    LinkFailed { generation: u64, error: String },
    Link(LinkEvent),
    ReconnectDue { generation: u64 },
    ReportFinished { identifier: String, outcome: ReportOutcome },
}

/// Side effects requested by the state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionAction {
    Emit(SessionEvent),
    Authorize { generation: u64, credential: Credential },
    OpenLink { generation: u64, token: SessionToken },
    CloseLink,
    ScheduleReconnect { generation: u64, delay: Duration },
    CancelReconnect,
    FetchReport { identifier: String, credential: Credential },
}

/// The session state machine.
pub struct SessionMachine {
    state: SessionState,
    policy: ReconnectPolicy,
    stall_action: StallAction,
    refresh_token_on_reconnect: bool,
    credential: Option<Credential>,
    token: Option<SessionToken>,
    generation: u64,
    /// Consecutive reconnect attempts since the last successful open.
    attempt: u32,
}

impl SessionMachine {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            state: SessionState::Idle,
            policy: config.reconnect.clone(),
            stall_action: config.heartbeat.on_stall,
            refresh_token_on_reconnect: config.refresh_token_on_reconnect,
            credential: None,
            token: None,
            generation: 0,
            attempt: 0,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == SessionState::Open
    }

    /// Current link generation.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn credential(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }

    /// Feeds one input and returns the actions it triggers.
    pub fn handle(&mut self, input: SessionInput) -> Vec<SessionAction> {
        let mut actions = Vec::new();
        match input {
            SessionInput::Login(credential) => self.on_login(credential, &mut actions),
            SessionInput::Logout => self.on_logout(&mut actions),
            SessionInput::Authorized { generation, result } => {
                if self.is_current(generation, &[SessionState::Authorizing]) {
                    self.on_authorized(result, &mut actions);
                }
            }
            SessionInput::LinkOpened { generation } => {
                if self.is_current(generation, &[SessionState::Connecting]) {
                    self.on_link_opened(&mut actions);
                }
            }
            SessionInput::LinkFailed { generation, error } => {
                if self.is_current(generation, &[SessionState::Connecting]) {
                    warn!(generation, error = %error, "stream connection failed");
                    log(&mut actions, LogEntry::warning(format!("Connection failed: {error}")));
                    self.schedule_reconnect(None, &mut actions);
                }
            }
            SessionInput::Link(event) => self.on_link_event(event, &mut actions),
            SessionInput::ReconnectDue { generation } => {
                let reconnecting = matches!(self.state, SessionState::Reconnecting { .. });
                if reconnecting && generation == self.generation {
                    self.on_reconnect_due(&mut actions);
                }
            }
            SessionInput::ReportFinished {
                identifier,
                outcome,
            } => on_report_finished(&identifier, outcome, &mut actions),
        }
        actions
    }

    fn is_current(&self, generation: u64, states: &[SessionState]) -> bool {
        if generation != self.generation || !states.contains(&self.state) {
            debug!(
                generation,
                current = self.generation,
                state = ?self.state,
                "dropping stale input"
            );
            return false;
        }
        true
    }

    fn set_state(&mut self, state: SessionState, actions: &mut Vec<SessionAction>) {
        if self.state != state {
            self.state = state.clone();
            actions.push(SessionAction::Emit(SessionEvent::StateChanged(state)));
        }
    }

    /// Drops any link or pending reconnect and starts a new generation.
    fn teardown(&mut self, actions: &mut Vec<SessionAction>) {
        if self.state != SessionState::Idle {
            actions.push(SessionAction::CancelReconnect);
            actions.push(SessionAction::CloseLink);
        }
        self.generation += 1;
    }

    fn on_login(&mut self, credential: Credential, actions: &mut Vec<SessionAction>) {
        self.teardown(actions);
        self.credential = Some(credential.clone());
        self.token = None;
        self.attempt = 0;

        info!(generation = self.generation, "login requested");
        log(actions, LogEntry::request("< Connection request sent! >"));
        self.set_state(SessionState::Authorizing, actions);
        actions.push(SessionAction::Authorize {
            generation: self.generation,
            credential,
        });
    }

    fn on_logout(&mut self, actions: &mut Vec<SessionAction>) {
        let was_idle = self.state == SessionState::Idle;
        self.teardown(actions);
        self.credential = None;
        self.token = None;
        self.attempt = 0;
        self.set_state(SessionState::Idle, actions);
        if !was_idle {
            log(actions, LogEntry::status("< Session closed >"));
        }
    }

    fn on_authorized(
        &mut self,
        result: Result<SessionToken, AuthFailure>,
        actions: &mut Vec<SessionAction>,
    ) {
        match result {
            Ok(token) => {
                self.token = Some(token.clone());
                self.set_state(SessionState::Connecting, actions);
                actions.push(SessionAction::OpenLink {
                    generation: self.generation,
                    token,
                });
            }
            Err(AuthFailure::Refused(status)) => {
                warn!(status, "credential refused");
                self.credential = None;
                self.token = None;
                self.attempt = 0;
                log(actions, LogEntry::error(format!("Connection refused: {status}")));
                self.set_state(SessionState::Idle, actions);
            }
            Err(AuthFailure::Transport(error)) if self.attempt > 0 => {
                warn!(error = %error, attempt = self.attempt, "token refresh failed");
                log(actions, LogEntry::warning(format!("Authorization failed: {error}")));
                self.schedule_reconnect(None, actions);
            }
            Err(AuthFailure::Transport(error)) => {
                warn!(error = %error, "authorization request failed");
                log(actions, LogEntry::error(format!("Authorization failed: {error}")));
                self.set_state(SessionState::Idle, actions);
            }
        }
    }

    fn on_link_opened(&mut self, actions: &mut Vec<SessionAction>) {
        info!(generation = self.generation, "stream open");
        self.attempt = 0;
        self.set_state(SessionState::Open, actions);
        log(
            actions,
            LogEntry::status("< Connection established with streaming server! >"),
        );
        log(actions, LogEntry::status("< Shadow Clone Server Up! >"));
    }

    fn on_link_event(&mut self, event: LinkEvent, actions: &mut Vec<SessionAction>) {
        match event {
            LinkEvent::Frame { generation, frame } => {
                if self.is_current(generation, &[SessionState::Open]) {
                    self.on_frame(frame, actions);
                }
            }
            LinkEvent::Binary { generation, len } => {
                if self.is_current(generation, &[SessionState::Open]) {
                    log(actions, LogEntry::stream(format!("<binary frame: {len} bytes>")));
                }
            }
            LinkEvent::Stalled { generation } => {
                if self.is_current(generation, &[SessionState::Open]) {
                    warn!(generation, "heartbeat timed out");
                    log(
                        actions,
                        LogEntry::warning("< Heartbeat timed out, connection stalled >"),
                    );
                    if self.stall_action == StallAction::Reconnect {
                        actions.push(SessionAction::CloseLink);
                        self.schedule_reconnect(Some("heartbeat timeout"), actions);
                    }
                }
            }
            LinkEvent::Closed { generation, info } => {
                let states = [SessionState::Connecting, SessionState::Open];
                if self.is_current(generation, &states) {
                    info!(
                        generation,
                        kind = ?info.kind,
                        code = ?info.code,
                        reason = %info.reason,
                        "stream closed"
                    );
                    self.schedule_reconnect(Some(&info.reason), actions);
                }
            }
        }
    }

    fn on_frame(&mut self, frame: InboundFrame, actions: &mut Vec<SessionAction>) {
        match frame {
            // Echoes are consumed by the heartbeat pump.
            InboundFrame::Heartbeat => {}
            InboundFrame::ReportReady(identifier) => {
                log(actions, LogEntry::request("< Requesting Generated Report! >"));
                log(
                    actions,
                    LogEntry::warning("< CONNECTION WITH SERVER WILL RESET >"),
                );
                match &self.credential {
                    Some(credential) => actions.push(SessionAction::FetchReport {
                        identifier,
                        credential: credential.clone(),
                    }),
                    None => log(
                        actions,
                        LogEntry::error("Report request skipped: no credential"),
                    ),
                }
            }
            InboundFrame::Log(text) => log(actions, LogEntry::stream(text)),
        }
    }

    /// Schedules exactly one reconnect for the current generation.
    ///
    /// `close_reason` is set when the stream itself went away and selects
    /// the closure wording of the log line.
    fn schedule_reconnect(&mut self, close_reason: Option<&str>, actions: &mut Vec<SessionAction>) {
        self.attempt = self.attempt.saturating_add(1);
        let Some(delay) = self.policy.delay_for_attempt(self.attempt) else {
            warn!(attempt = self.attempt, "reconnect attempts exhausted");
            log(
                actions,
                LogEntry::error("< Reconnect attempts exhausted; log in again to resume >"),
            );
            self.token = None;
            self.attempt = 0;
            self.set_state(SessionState::Idle, actions);
            return;
        };

        let when = describe_delay(delay);
        let text = match close_reason {
            Some(reason) => {
                format!("< Socket is closed. Reconnect will be attempted in {when}. > {reason}")
            }
            None => format!("< Reconnect will be attempted in {when}. >"),
        };
        log(actions, LogEntry::warning(text.trim_end()));

        debug!(
            attempt = self.attempt,
            delay_secs = delay.as_secs_f64(),
            "reconnect scheduled"
        );
        self.set_state(
            SessionState::Reconnecting {
                attempt: self.attempt,
            },
            actions,
        );
        actions.push(SessionAction::ScheduleReconnect {
            generation: self.generation,
            delay,
        });
    }

    fn on_reconnect_due(&mut self, actions: &mut Vec<SessionAction>) {
        actions.push(SessionAction::CloseLink);
        self.generation += 1;
        info!(generation = self.generation, attempt = self.attempt, "reconnecting");

        if self.refresh_token_on_reconnect
            && let Some(credential) = self.credential.clone()
        {
            self.set_state(SessionState::Authorizing, actions);
            actions.push(SessionAction::Authorize {
                generation: self.generation,
                credential,
            });
            return;
        }

        match self.token.clone() {
            Some(token) => {
                self.set_state(SessionState::Connecting, actions);
                actions.push(SessionAction::OpenLink {
                    generation: self.generation,
                    token,
                });
            }
            None => {
                log(actions, LogEntry::error("Cannot reconnect: no session token"));
                self.set_state(SessionState::Idle, actions);
            }
        }
    }
}

fn on_report_finished(identifier: &str, outcome: ReportOutcome, actions: &mut Vec<SessionAction>) {
    match outcome {
        ReportOutcome::Saved(path) => {
            info!(identifier, path = %path.display(), "report saved");
            log(
                actions,
                LogEntry::status(format!("< File Request Complete! > {}", path.display())),
            );
            actions.push(SessionAction::Emit(SessionEvent::ReportSaved { path }));
        }
        ReportOutcome::Refused(status) => {
            log(actions, LogEntry::error(format!("Report request refused: {status}")));
        }
        ReportOutcome::Failed(error) => {
            log(actions, LogEntry::error(format!("Report request failed: {error}")));
        }
    }
}

fn log(actions: &mut Vec<SessionAction>, entry: LogEntry) {
    actions.push(SessionAction::Emit(SessionEvent::Log(entry)));
}

/// Formats a delay as "1 second", "3 seconds" or "1.5 seconds".
fn describe_delay(delay: Duration) -> String {
    let secs = delay.as_secs_f64();
    if delay.subsec_nanos() == 0 {
        let whole = delay.as_secs();
        if whole == 1 {
            "1 second".to_string()
        } else {
            format!("{whole} seconds")
        }
    } else {
        format!("{secs:.1} seconds")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CloseKind;

    fn machine() -> SessionMachine {
        SessionMachine::new(&SessionConfig::default())
    }

    fn cred() -> Credential {
        Credential::new("user-jwt").unwrap()
    }

    fn token() -> SessionToken {
        SessionToken::new("ws-token")
    }

    fn count<F: Fn(&SessionAction) -> bool>(actions: &[SessionAction], f: F) -> usize {
        actions.iter().filter(|a| f(a)).count()
    }

    fn logs(actions: &[SessionAction]) -> Vec<&LogEntry> {
        actions
            .iter()
            .filter_map(|a| match a {
                SessionAction::Emit(SessionEvent::Log(entry)) => Some(entry),
                _ => None,
            })
            .collect()
    }

    fn is_open_link(a: &SessionAction) -> bool {
        matches!(a, SessionAction::OpenLink { .. })
    }

    fn is_schedule(a: &SessionAction) -> bool {
        matches!(a, SessionAction::ScheduleReconnect { .. })
    }

    /// Drives a machine to `Open` and returns it.
    fn open_machine() -> SessionMachine {
        let mut m = machine();
        m.handle(SessionInput::Login(cred()));
        let generation = m.generation();
        m.handle(SessionInput::Authorized {
            generation,
            result: Ok(token()),
        });
        m.handle(SessionInput::LinkOpened { generation });
        assert!(m.is_open());
        m
    }

    fn closed(generation: u64, kind: CloseKind) -> SessionInput {
        SessionInput::Link(LinkEvent::Closed {
            generation,
            info: CloseInfo {
                kind,
                code: Some(1000),
                reason: "Process complete".into(),
            },
        })
    }

    #[test]
    fn login_requests_authorization() {
        let mut m = machine();
        let actions = m.handle(SessionInput::Login(cred()));

        assert_eq!(m.state(), &SessionState::Authorizing);
        assert_eq!(
            count(&actions, |a| matches!(a, SessionAction::Authorize { .. })),
            1
        );
        assert_eq!(logs(&actions)[0].text, "< Connection request sent! >");
        assert_eq!(count(&actions, |a| matches!(a, SessionAction::CloseLink)), 0);
    }

    #[test]
    fn authorized_200_opens_exactly_one_link_with_token() {
        let mut m = machine();
        m.handle(SessionInput::Login(cred()));
        let actions = m.handle(SessionInput::Authorized {
            generation: m.generation(),
            result: Ok(token()),
        });

        let opens: Vec<_> = actions.iter().filter(|a| is_open_link(a)).collect();
        assert_eq!(opens.len(), 1);
        match opens[0] {
            SessionAction::OpenLink { token: t, .. } => assert_eq!(t.expose(), "ws-token"),
            _ => unreachable!(),
        }
        assert_eq!(m.state(), &SessionState::Connecting);
    }

    #[test]
    fn authorized_non_200_opens_nothing() {
        for status in [401, 403, 422, 500] {
            let mut m = machine();
            m.handle(SessionInput::Login(cred()));
            let actions = m.handle(SessionInput::Authorized {
                generation: m.generation(),
                result: Err(AuthFailure::Refused(status)),
            });

            assert_eq!(count(&actions, is_open_link), 0);
            assert_eq!(count(&actions, is_schedule), 0);
            assert_eq!(m.state(), &SessionState::Idle);
            assert!(m.credential().is_none());
            let entries = logs(&actions);
            assert_eq!(entries.len(), 1);
            assert_eq!(entries[0].text, format!("Connection refused: {status}"));
        }
    }

    #[test]
    fn manual_login_transport_error_goes_idle() {
        let mut m = machine();
        m.handle(SessionInput::Login(cred()));
        let actions = m.handle(SessionInput::Authorized {
            generation: m.generation(),
            result: Err(AuthFailure::Transport("dns".into())),
        });
        assert_eq!(m.state(), &SessionState::Idle);
        assert_eq!(count(&actions, is_schedule), 0);
    }

    #[test]
    fn open_logs_two_status_lines() {
        let mut m = machine();
        m.handle(SessionInput::Login(cred()));
        let generation = m.generation();
        m.handle(SessionInput::Authorized {
            generation,
            result: Ok(token()),
        });
        let actions = m.handle(SessionInput::LinkOpened { generation });

        let texts: Vec<_> = logs(&actions).iter().map(|e| e.text.clone()).collect();
        assert_eq!(
            texts,
            vec![
                "< Connection established with streaming server! >",
                "< Shadow Clone Server Up! >"
            ]
        );
    }

    #[test]
    fn heartbeat_frame_is_silent() {
        let mut m = open_machine();
        let actions = m.handle(SessionInput::Link(LinkEvent::Frame {
            generation: m.generation(),
            frame: InboundFrame::Heartbeat,
        }));
        assert!(actions.is_empty());
    }

    #[test]
    fn log_frame_produces_one_entry() {
        let mut m = open_machine();
        let actions = m.handle(SessionInput::Link(LinkEvent::Frame {
            generation: m.generation(),
            frame: InboundFrame::Log("SERVER PENDING...".into()),
        }));
        let entries = logs(&actions);
        assert_eq!(actions.len(), 1);
        assert_eq!(entries[0].text, "SERVER PENDING...");
        assert_eq!(entries[0].level, crate::types::LogLevel::Stream);
    }

    #[test]
    fn report_frame_logs_twice_and_fetches_once() {
        let mut m = open_machine();
        let actions = m.handle(SessionInput::Link(LinkEvent::Frame {
            generation: m.generation(),
            frame: InboundFrame::parse("REPORT_PATH=3-quarterly.csv"),
        }));

        assert_eq!(logs(&actions).len(), 2);
        let fetches: Vec<_> = actions
            .iter()
            .filter_map(|a| match a {
                SessionAction::FetchReport { identifier, .. } => Some(identifier.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(fetches, vec!["3-quarterly.csv"]);
        assert!(m.is_open());
    }

    #[test]
    fn every_closure_kind_schedules_one_fixed_reconnect() {
        for kind in [CloseKind::Clean, CloseKind::Error, CloseKind::ServerInitiated] {
            let mut m = open_machine();
            let generation = m.generation();
            let actions = m.handle(closed(generation, kind));

            let schedules: Vec<_> = actions
                .iter()
                .filter_map(|a| match a {
                    SessionAction::ScheduleReconnect { delay, .. } => Some(*delay),
                    _ => None,
                })
                .collect();
            assert_eq!(schedules, vec![Duration::from_secs(1)], "{kind:?}");
            assert_eq!(m.state(), &SessionState::Reconnecting { attempt: 1 });
            assert_eq!(
                logs(&actions)[0].text,
                "< Socket is closed. Reconnect will be attempted in 1 second. > Process complete"
            );

            // A duplicate close for the same link schedules nothing more.
            let again = m.handle(closed(generation, kind));
            assert_eq!(count(&again, is_schedule), 0);
        }
    }

    #[test]
    fn reconnect_due_refreshes_token() {
        let mut m = open_machine();
        let old = m.generation();
        m.handle(closed(old, CloseKind::Clean));
        let actions = m.handle(SessionInput::ReconnectDue { generation: old });

        assert!(m.generation() > old);
        assert_eq!(m.state(), &SessionState::Authorizing);
        assert_eq!(actions[0], SessionAction::CloseLink);
        assert_eq!(
            count(&actions, |a| matches!(a, SessionAction::Authorize { .. })),
            1
        );
    }

    #[test]
    fn reconnect_due_reuses_token_when_refresh_disabled() {
        let config = SessionConfig {
            refresh_token_on_reconnect: false,
            ..SessionConfig::default()
        };
        let mut m = SessionMachine::new(&config);
        m.handle(SessionInput::Login(cred()));
        let generation = m.generation();
        m.handle(SessionInput::Authorized {
            generation,
            result: Ok(token()),
        });
        m.handle(SessionInput::LinkOpened { generation });
        m.handle(closed(generation, CloseKind::Error));

        let actions = m.handle(SessionInput::ReconnectDue { generation });
        assert_eq!(count(&actions, is_open_link), 1);
        assert_eq!(m.state(), &SessionState::Connecting);
    }

    #[test]
    fn stale_reconnect_due_is_ignored() {
        let mut m = open_machine();
        let generation = m.generation();
        m.handle(closed(generation, CloseKind::Clean));
        m.handle(SessionInput::Login(cred()));

        let actions = m.handle(SessionInput::ReconnectDue { generation });
        assert!(actions.is_empty());
        assert_eq!(m.state(), &SessionState::Authorizing);
    }

    #[test]
    fn connect_failure_schedules_reconnect() {
        let mut m = machine();
        m.handle(SessionInput::Login(cred()));
        let generation = m.generation();
        m.handle(SessionInput::Authorized {
            generation,
            result: Ok(token()),
        });
        let actions = m.handle(SessionInput::LinkFailed {
            generation,
            error: "refused".into(),
        });
        assert_eq!(count(&actions, is_schedule), 1);
        assert_eq!(m.state(), &SessionState::Reconnecting { attempt: 1 });
    }

    #[test]
    fn transport_error_during_reconnect_retries() {
        let mut m = open_machine();
        let generation = m.generation();
        m.handle(closed(generation, CloseKind::Error));
        m.handle(SessionInput::ReconnectDue { generation });

        let actions = m.handle(SessionInput::Authorized {
            generation: m.generation(),
            result: Err(AuthFailure::Transport("timeout".into())),
        });
        assert_eq!(count(&actions, is_schedule), 1);
        assert_eq!(m.state(), &SessionState::Reconnecting { attempt: 2 });
    }

    #[test]
    fn refused_during_reconnect_stops() {
        let mut m = open_machine();
        let generation = m.generation();
        m.handle(closed(generation, CloseKind::Error));
        m.handle(SessionInput::ReconnectDue { generation });

        let actions = m.handle(SessionInput::Authorized {
            generation: m.generation(),
            result: Err(AuthFailure::Refused(401)),
        });
        assert_eq!(count(&actions, is_schedule), 0);
        assert_eq!(m.state(), &SessionState::Idle);
    }

    #[test]
    fn stall_with_reconnect_closes_and_schedules() {
        let mut m = open_machine();
        let generation = m.generation();
        let actions = m.handle(SessionInput::Link(LinkEvent::Stalled { generation }));

        assert_eq!(count(&actions, |a| matches!(a, SessionAction::CloseLink)), 1);
        assert_eq!(count(&actions, is_schedule), 1);

        // The close raised by the torn-down link must not schedule again.
        let again = m.handle(closed(generation, CloseKind::Error));
        assert_eq!(count(&again, is_schedule), 0);
    }

    #[test]
    fn stall_log_only_keeps_link() {
        let config = SessionConfig {
            heartbeat: crate::types::HeartbeatConfig {
                on_stall: StallAction::LogOnly,
                ..Default::default()
            },
            ..SessionConfig::default()
        };
        let mut m = SessionMachine::new(&config);
        m.handle(SessionInput::Login(cred()));
        let generation = m.generation();
        m.handle(SessionInput::Authorized {
            generation,
            result: Ok(token()),
        });
        m.handle(SessionInput::LinkOpened { generation });

        let actions = m.handle(SessionInput::Link(LinkEvent::Stalled { generation }));
        assert_eq!(logs(&actions).len(), 1);
        assert_eq!(count(&actions, |a| matches!(a, SessionAction::CloseLink)), 0);
        assert!(m.is_open());
    }

    #[test]
    fn attempt_cap_returns_to_idle() {
        let config = SessionConfig {
            reconnect: ReconnectPolicy {
                max_attempts: Some(1),
                ..ReconnectPolicy::default()
            },
            ..SessionConfig::default()
        };
        let mut m = SessionMachine::new(&config);
        m.handle(SessionInput::Login(cred()));
        let generation = m.generation();
        m.handle(SessionInput::Authorized {
            generation,
            result: Ok(token()),
        });
        let first = m.handle(SessionInput::LinkFailed {
            generation,
            error: "refused".into(),
        });
        assert_eq!(count(&first, is_schedule), 1);

        m.handle(SessionInput::ReconnectDue { generation });
        let generation = m.generation();
        m.handle(SessionInput::Authorized {
            generation,
            result: Ok(token()),
        });
        let second = m.handle(SessionInput::LinkFailed {
            generation,
            error: "refused".into(),
        });
        assert_eq!(count(&second, is_schedule), 0);
        assert_eq!(m.state(), &SessionState::Idle);
    }

    #[test]
    fn relogin_tears_down_open_link() {
        let mut m = open_machine();
        let old = m.generation();
        let actions = m.handle(SessionInput::Login(cred()));

        assert!(actions.contains(&SessionAction::CancelReconnect));
        assert!(actions.contains(&SessionAction::CloseLink));
        assert_ne!(m.generation(), old);

        // Frames from the replaced link are dropped.
        let stale = m.handle(SessionInput::Link(LinkEvent::Frame {
            generation: old,
            frame: InboundFrame::Log("late".into()),
        }));
        assert!(stale.is_empty());
    }

    #[test]
    fn logout_forgets_credential() {
        let mut m = open_machine();
        let actions = m.handle(SessionInput::Logout);
        assert_eq!(m.state(), &SessionState::Idle);
        assert!(m.credential().is_none());
        assert!(actions.contains(&SessionAction::CloseLink));
    }

    #[test]
    fn report_outcomes_log_their_own_status() {
        let mut m = machine();
        let refused = m.handle(SessionInput::ReportFinished {
            identifier: "x.csv".into(),
            outcome: ReportOutcome::Refused(404),
        });
        assert_eq!(logs(&refused)[0].text, "Report request refused: 404");

        let saved = m.handle(SessionInput::ReportFinished {
            identifier: "x.csv".into(),
            outcome: ReportOutcome::Saved(PathBuf::from("/tmp/x.csv")),
        });
        assert!(logs(&saved)[0].text.starts_with("< File Request Complete! >"));
        assert!(saved.contains(&SessionAction::Emit(SessionEvent::ReportSaved {
            path: PathBuf::from("/tmp/x.csv")
        })));
    }

    #[test]
    fn describe_delay_wording() {
        assert_eq!(describe_delay(Duration::from_secs(1)), "1 second");
        assert_eq!(describe_delay(Duration::from_secs(4)), "4 seconds");
        assert_eq!(describe_delay(Duration::from_millis(1500)), "1.5 seconds");
    }
}
