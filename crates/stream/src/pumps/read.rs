//! Read pump: classifies inbound frames and reports closure.

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use shadowclone_protocol::InboundFrame;

use crate::machine::LinkEvent;
use crate::types::{CloseInfo, CloseKind};

/// Reads the socket until it closes or the link is cancelled.
///
/// Heartbeat echoes go to `pong_tx`; every other frame becomes a
/// [`LinkEvent`]. Exactly one [`LinkEvent::Closed`] is sent when the
/// stream ends on its own. Cancellation ends the pump silently.
/// Transport pings are answered by tungstenite itself.
pub(crate) async fn read_pump<S>(
    mut read: S,
    generation: u64,
    events_tx: mpsc::Sender<LinkEvent>,
    pong_tx: mpsc::Sender<()>,
    cancel: CancellationToken,
) where
    S: StreamExt<Item = Result<tungstenite::Message, tungstenite::Error>> + Unpin,
{
    let info = loop {
        let msg = tokio::select! {
            _ = cancel.cancelled() => return,
            msg = read.next() => msg,
        };

        match msg {
            Some(Ok(tungstenite::Message::Text(text))) => {
                match InboundFrame::parse(text.as_str()) {
                    InboundFrame::Heartbeat => {
                        trace!(generation, "heartbeat echo");
                        let _ = pong_tx.try_send(());
                    }
                    frame => {
                        let event = LinkEvent::Frame { generation, frame };
                        if events_tx.send(event).await.is_err() {
                            return;
                        }
                    }
                }
            }
            Some(Ok(tungstenite::Message::Binary(data))) => {
                let event = LinkEvent::Binary {
                    generation,
                    len: data.len(),
                };
                if events_tx.send(event).await.is_err() {
                    return;
                }
            }
            Some(Ok(tungstenite::Message::Close(frame))) => {
                debug!(generation, "received close frame");
                break close_info(frame.as_ref());
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                warn!(generation, "stream read error: {e}");
                break CloseInfo {
                    kind: CloseKind::Error,
                    code: None,
                    reason: e.to_string(),
                };
            }
            None => {
                debug!(generation, "stream ended");
                break CloseInfo {
                    kind: CloseKind::Error,
                    code: None,
                    reason: "connection lost".into(),
                };
            }
        }
    };

    if cancel.is_cancelled() {
        return;
    }
    let _ = events_tx.send(LinkEvent::Closed { generation, info }).await;
}

fn close_info(frame: Option<&CloseFrame>) -> CloseInfo {
    match frame {
        Some(f) => {
            let code = u16::from(f.code);
            CloseInfo {
                kind: if code == 1000 {
                    CloseKind::Clean
                } else {
                    CloseKind::ServerInitiated
                },
                code: Some(code),
                reason: f.reason.as_str().to_string(),
            }
        }
        None => CloseInfo {
            kind: CloseKind::ServerInitiated,
            code: None,
            reason: String::new(),
        },
    }
}
