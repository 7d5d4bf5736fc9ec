//! Public types for the stream session.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use shadowclone_api::ReportEntry;
use shadowclone_protocol::constants::{
    HEARTBEAT_INTERVAL, HEARTBEAT_TIMEOUT, RECONNECT_DELAY,
};

/// Session lifecycle state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// No credential, or the last one was refused.
    Idle,
    /// Exchanging the credential for a session token.
    Authorizing,
    /// Stream upgrade in progress.
    Connecting,
    /// Stream open; heartbeats running.
    Open,
    /// Stream lost; a reconnect timer is pending.
    Reconnecting { attempt: u32 },
}

/// Severity and styling of a log view line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Connection milestones (green).
    Status,
    /// Requests issued by the client (blue).
    Request,
    /// Recoverable trouble (orange).
    Warning,
    /// Failures (red).
    Error,
    /// Text relayed from the server (grey).
    Stream,
}

/// One line of the user-facing log view.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub level: LogLevel,
    pub text: String,
    pub at: DateTime<Utc>,
}

impl LogEntry {
    pub fn new(level: LogLevel, text: impl Into<String>) -> Self {
        Self {
            level,
            text: text.into(),
            at: Utc::now(),
        }
    }

    pub fn status(text: impl Into<String>) -> Self {
        Self::new(LogLevel::Status, text)
    }

    pub fn request(text: impl Into<String>) -> Self {
        Self::new(LogLevel::Request, text)
    }

    pub fn warning(text: impl Into<String>) -> Self {
        Self::new(LogLevel::Warning, text)
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self::new(LogLevel::Error, text)
    }

    pub fn stream(text: impl Into<String>) -> Self {
        Self::new(LogLevel::Stream, text)
    }
}

/// Events emitted by the session to its front end.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// A line for the log view.
    Log(LogEntry),
    /// The session moved to a new state.
    StateChanged(SessionState),
    /// A report or archive was written to disk.
    ReportSaved { path: PathBuf },
    /// Result of a report listing.
    ReportList(Vec<ReportEntry>),
}

/// How a stream connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseKind {
    /// Server sent a normal (1000) close frame.
    Clean,
    /// Server sent any other close frame.
    ServerInitiated,
    /// Transport error or the stream ended without a close frame.
    Error,
}

/// Details of a stream closure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseInfo {
    pub kind: CloseKind,
    pub code: Option<u16>,
    pub reason: String,
}

/// What to do when a heartbeat echo does not arrive in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StallAction {
    /// Log the stall and keep the connection.
    LogOnly,
    /// Log the stall, drop the connection and reconnect.
    #[default]
    Reconnect,
}

/// Application-level heartbeat settings.
#[derive(Debug, Clone)]
pub struct HeartbeatConfig {
    /// Period between pings.
    pub interval: Duration,
    /// How long a ping may go unanswered.
    pub timeout: Duration,
    pub on_stall: StallAction,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: HEARTBEAT_INTERVAL,
            timeout: HEARTBEAT_TIMEOUT,
            on_stall: StallAction::default(),
        }
    }
}

/// Reconnection delay policy.
///
/// The default is a fixed one-second delay with no attempt cap.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// Delay before the first attempt after a closure.
    pub delay: Duration,
    /// Multiplier applied per consecutive failed attempt.
    pub backoff_factor: f64,
    /// Upper bound on the delay.
    pub max_delay: Duration,
    /// Give up after this many consecutive attempts.
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            delay: RECONNECT_DELAY,
            backoff_factor: 1.0,
            max_delay: Duration::from_secs(30),
            max_attempts: None,
        }
    }
}

impl ReconnectPolicy {
    /// Returns the delay for a 1-based attempt, or `None` once the attempt
    /// cap is exceeded.
    pub fn delay_for_attempt(&self, attempt: u32) -> Option<Duration> {
        if self.max_attempts.is_some_and(|max| attempt > max) {
            return None;
        }
        let exp = attempt.saturating_sub(1).min(63) as i32;
        let secs = self.delay.as_secs_f64() * self.backoff_factor.max(1.0).powi(exp);
        let capped = secs.min(self.max_delay.as_secs_f64().max(self.delay.as_secs_f64()));
        Some(Duration::try_from_secs_f64(capped).unwrap_or(self.max_delay))
    }
}

/// Settings for one stream session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Explicit stream endpoint; derived from the server URL when unset.
    pub stream_url: Option<String>,
    pub heartbeat: HeartbeatConfig,
    pub reconnect: ReconnectPolicy,
    /// Fetch a fresh session token before every reconnect.
    pub refresh_token_on_reconnect: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            stream_url: None,
            heartbeat: HeartbeatConfig::default(),
            reconnect: ReconnectPolicy::default(),
            refresh_token_on_reconnect: true,
        }
    }
}
