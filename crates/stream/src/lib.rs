//! Stream session for the Shadow Clone server.
//!
//! Exchanges a credential for a session token, keeps a WebSocket link to
//! the streaming endpoint alive with application heartbeats, reconnects
//! after every closure, and saves the reports the server announces.

pub mod download;
pub mod machine;
mod pumps;
pub(crate) mod reconnection;
pub mod session;
pub mod types;
pub mod ws_client;

pub use download::{DownloadDir, SaveError};
pub use machine::{SessionAction, SessionInput, SessionMachine};
pub use session::{SessionHandle, StreamApi, SubmitError, spawn};
pub use types::{
    CloseInfo, CloseKind, HeartbeatConfig, LogEntry, LogLevel, ReconnectPolicy, SessionConfig,
    SessionEvent, SessionState, StallAction,
};
pub use ws_client::{StreamLink, WsError, stream_url};
