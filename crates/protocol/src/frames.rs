//! Inbound text frame classification.

use crate::constants::{PONG, REPORT_PATH_PREFIX};

/// A text frame received from the stream server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    /// Heartbeat echo. Never shown to the user.
    Heartbeat,
    /// A report is ready; carries the report identifier.
    ReportReady(String),
    /// Anything else: a line of server output.
    Log(String),
}

impl InboundFrame {
    /// Classifies a text frame.
    ///
    /// The heartbeat echo is matched after trimming surrounding whitespace
    /// since the server pads it. The report prefix is matched literally at
    /// the start of the frame.
    pub fn parse(text: &str) -> Self {
        if text.trim() == PONG {
            return Self::Heartbeat;
        }
        if let Some(identifier) = text.strip_prefix(REPORT_PATH_PREFIX) {
            return Self::ReportReady(identifier.to_string());
        }
        Self::Log(text.to_string())
    }

    /// Returns `true` for the heartbeat echo.
    pub fn is_heartbeat(&self) -> bool {
        matches!(self, Self::Heartbeat)
    }
}
