//! Heartbeat pump: application-level ping with a stall deadline.

use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{trace, warn};

use shadowclone_protocol::constants::PING;

use crate::machine::LinkEvent;
use crate::types::HeartbeatConfig;

/// Sends `__ping__` every interval and raises [`LinkEvent::Stalled`] when
/// no echo arrives within the timeout.
///
/// The deadline is armed by the first unanswered ping and cleared by any
/// echo. A stall is reported once per armed deadline.
pub(crate) async fn heartbeat_pump(
    write_tx: mpsc::Sender<tungstenite::Message>,
    mut pong_rx: mpsc::Receiver<()>,
    events_tx: mpsc::Sender<LinkEvent>,
    generation: u64,
    config: HeartbeatConfig,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(config.interval);
    interval.tick().await; // First tick completes immediately.

    let deadline = tokio::time::sleep(config.timeout);
    tokio::pin!(deadline);
    let mut armed = false;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                trace!(generation, "sending heartbeat");
                let ping = tungstenite::Message::Text(PING.into());
                if write_tx.send(ping).await.is_err() {
                    break;
                }
                if !armed {
                    deadline.as_mut().reset(Instant::now() + config.timeout);
                    armed = true;
                }
            }
            pong = pong_rx.recv() => {
                if pong.is_none() {
                    break;
                }
                armed = false;
            }
            () = &mut deadline, if armed => {
                armed = false;
                warn!(generation, "no heartbeat echo within {:?}", config.timeout);
                if events_tx.send(LinkEvent::Stalled { generation }).await.is_err() {
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn config() -> HeartbeatConfig {
        HeartbeatConfig::default()
    }

    #[tokio::test(start_paused = true)]
    async fn sends_ping_every_interval() {
        let (write_tx, mut write_rx) = mpsc::channel(16);
        let (pong_tx, pong_rx) = mpsc::channel(16);
        let (events_tx, _events_rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();

        tokio::spawn(heartbeat_pump(
            write_tx,
            pong_rx,
            events_tx,
            1,
            config(),
            cancel.clone(),
        ));

        for _ in 0..3 {
            let msg = write_rx.recv().await.unwrap();
            assert_eq!(msg, tungstenite::Message::Text(PING.into()));
            pong_tx.send(()).await.unwrap();
        }
        cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn answered_pings_never_stall() {
        let (write_tx, mut write_rx) = mpsc::channel(16);
        let (pong_tx, pong_rx) = mpsc::channel(16);
        let (events_tx, mut events_rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();

        tokio::spawn(heartbeat_pump(
            write_tx,
            pong_rx,
            events_tx,
            1,
            config(),
            cancel.clone(),
        ));

        for _ in 0..5 {
            write_rx.recv().await.unwrap();
            tokio::time::sleep(Duration::from_millis(100)).await;
            pong_tx.send(()).await.unwrap();
        }
        assert!(events_rx.try_recv().is_err());
        cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn unanswered_ping_stalls() {
        let (write_tx, mut write_rx) = mpsc::channel(16);
        let (_pong_tx, pong_rx) = mpsc::channel(16);
        let (events_tx, mut events_rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();

        tokio::spawn(heartbeat_pump(
            write_tx,
            pong_rx,
            events_tx,
            9,
            config(),
            cancel.clone(),
        ));

        write_rx.recv().await.unwrap();
        let event = tokio::time::timeout(Duration::from_secs(6), events_rx.recv())
            .await
            .expect("stall within timeout");
        assert_eq!(event, Some(LinkEvent::Stalled { generation: 9 }));
        cancel.cancel();
    }

    #[tokio::test]
    async fn stops_on_cancel() {
        let (write_tx, _write_rx) = mpsc::channel(16);
        let (_pong_tx, pong_rx) = mpsc::channel(16);
        let (events_tx, _events_rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(heartbeat_pump(
            write_tx,
            pong_rx,
            events_tx,
            1,
            config(),
            cancel.clone(),
        ));
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("should stop")
            .expect("no panic");
    }
}
