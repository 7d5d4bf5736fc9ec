//! Write pump: the only task that touches the socket sink.

use futures_util::SinkExt;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// Forwards queued messages to the socket until cancelled.
///
/// On cancellation a normal close frame is sent so the server sees a
/// clean shutdown.
pub(crate) async fn write_pump<S>(
    mut write: S,
    mut write_rx: mpsc::Receiver<tungstenite::Message>,
    generation: u64,
    cancel: CancellationToken,
) where
    S: SinkExt<tungstenite::Message, Error = tungstenite::Error> + Unpin,
{
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            msg = write_rx.recv() => {
                let Some(msg) = msg else { break };
                if let Err(e) = write.send(msg).await {
                    error!(generation, "stream write error: {e}");
                    return;
                }
            }
        }
    }

    debug!(generation, "closing stream");
    let close = CloseFrame {
        code: CloseCode::Normal,
        reason: "client closing".into(),
    };
    let _ = write.send(tungstenite::Message::Close(Some(close))).await;
}
