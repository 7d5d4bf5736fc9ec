//! WebSocket link to the streaming endpoint.
//!
//! A [`StreamLink`] owns three pumps (read, write, heartbeat) and reports
//! everything it sees as [`LinkEvent`]s tagged with its generation.
//! Reading begins only once the owner calls [`StreamLink::start`].

use futures_util::StreamExt;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use url::Url;

use shadowclone_api::SessionToken;
use shadowclone_protocol::constants::{STREAM_PATH, TOKEN_QUERY_PARAM, WS_MAX_MESSAGE_SIZE};

use crate::machine::LinkEvent;
use crate::types::HeartbeatConfig;

/// Errors from the stream link.
#[derive(Debug, thiserror::Error)]
pub enum WsError {
    #[error("WebSocket error: {0}")]
    Ws(#[from] tungstenite::Error),

    #[error("invalid stream URL: {0}")]
    Url(String),

    #[error("connection closed")]
    Closed,
}

/// Builds the stream URL for a session token.
///
/// Uses `stream_url` when given, otherwise the server URL with its scheme
/// mapped to `ws`/`wss` and the path set to `/stream`. The token is
/// appended as a query parameter.
pub fn stream_url(
    server_url: &str,
    stream_url: Option<&str>,
    token: &SessionToken,
) -> Result<Url, WsError> {
    let mut url = match stream_url {
        Some(explicit) => Url::parse(explicit).map_err(|e| WsError::Url(e.to_string()))?,
        None => {
            let mut url = Url::parse(server_url).map_err(|e| WsError::Url(e.to_string()))?;
            let scheme = match url.scheme() {
                "http" => "ws",
                "https" => "wss",
                other => return Err(WsError::Url(format!("unsupported scheme: {other}"))),
            };
            url.set_scheme(scheme)
                .map_err(|()| WsError::Url(format!("cannot use scheme {scheme}")))?;
            url.set_path(STREAM_PATH);
            url.set_query(None);
            url
        }
    };
    if !matches!(url.scheme(), "ws" | "wss") {
        return Err(WsError::Url(format!(
            "stream URL must use ws or wss: {url}"
        )));
    }
    url.query_pairs_mut()
        .append_pair(TOKEN_QUERY_PARAM, token.expose());
    Ok(url)
}

/// One live connection to the streaming endpoint.
pub struct StreamLink {
    generation: u64,
    write_tx: mpsc::Sender<tungstenite::Message>,
    cancel: CancellationToken,
    start_tx: Option<oneshot::Sender<()>>,
    _read_handle: tokio::task::JoinHandle<()>,
    _write_handle: tokio::task::JoinHandle<()>,
    _heartbeat_handle: tokio::task::JoinHandle<()>,
}

impl StreamLink {
    /// Performs the upgrade and starts the write and heartbeat pumps.
    ///
    /// Inbound frames stay buffered until [`StreamLink::start`].
    pub async fn connect(
        url: &Url,
        generation: u64,
        heartbeat: &HeartbeatConfig,
        events_tx: mpsc::Sender<LinkEvent>,
    ) -> Result<Self, WsError> {
        let mut ws_config = tungstenite::protocol::WebSocketConfig::default();
        ws_config.max_message_size = Some(WS_MAX_MESSAGE_SIZE);
        ws_config.max_frame_size = Some(WS_MAX_MESSAGE_SIZE);
        let (ws_stream, _) =
            tokio_tungstenite::connect_async_with_config(url.as_str(), Some(ws_config), false)
                .await?;
        let (write, read) = ws_stream.split();

        info!(generation, host = url.host_str().unwrap_or_default(), "stream connected");

        let (write_tx, write_rx) = mpsc::channel::<tungstenite::Message>(256);
        let (pong_tx, pong_rx) = mpsc::channel::<()>(8);
        let (start_tx, start_rx) = oneshot::channel::<()>();
        let cancel = CancellationToken::new();

        let write_handle = {
            let cancel = cancel.clone();
            tokio::spawn(crate::pumps::write::write_pump(
                write, write_rx, generation, cancel,
            ))
        };

        let read_handle = {
            let events_tx = events_tx.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                // Dropped sender: the link was discarded before it started.
                if start_rx.await.is_err() {
                    return;
                }
                crate::pumps::read::read_pump(read, generation, events_tx, pong_tx, cancel).await;
            })
        };

        let heartbeat_handle = {
            let write_tx = write_tx.clone();
            let cancel = cancel.clone();
            tokio::spawn(crate::pumps::heartbeat::heartbeat_pump(
                write_tx,
                pong_rx,
                events_tx,
                generation,
                heartbeat.clone(),
                cancel,
            ))
        };

        Ok(Self {
            generation,
            write_tx,
            cancel,
            start_tx: Some(start_tx),
            _read_handle: read_handle,
            _write_handle: write_handle,
            _heartbeat_handle: heartbeat_handle,
        })
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Releases the read pump. Frames are delivered in arrival order from
    /// here on; later calls do nothing.
    pub fn start(&mut self) {
        if let Some(start_tx) = self.start_tx.take() {
            let _ = start_tx.send(());
        }
    }

    /// Queues an encoded payload as a single binary frame.
    pub async fn send_payload(&self, payload: Vec<u8>) -> Result<(), WsError> {
        if self.cancel.is_cancelled() {
            return Err(WsError::Closed);
        }
        self.write_tx
            .send(tungstenite::Message::Binary(payload.into()))
            .await
            .map_err(|_| WsError::Closed)
    }

    /// Stops the pumps; the write pump sends a normal close frame.
    ///
    /// No [`LinkEvent::Closed`] is raised for a link closed this way.
    pub fn close(&self) {
        debug!(generation = self.generation, "closing link");
        self.cancel.cancel();
    }
}

impl Drop for StreamLink {
    fn drop(&mut self) {
        self.cancel.cancel();
        self._read_handle.abort();
        self._heartbeat_handle.abort();
        // The write pump exits on its own after sending the close frame.
    }
}
