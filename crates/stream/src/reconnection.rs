//! Reconnect scheduling.
//!
//! At most one reconnect timer is pending at a time. Arming a new timer
//! cancels the previous one, so an error and a close raised by the same
//! failure never produce two attempts.

use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Holds the single pending reconnect timer.
#[derive(Default)]
pub(crate) struct ReconnectTimer {
    pending: Mutex<Option<(u64, CancellationToken)>>,
}

impl ReconnectTimer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Arms a timer that sends `generation` on `due_tx` after `delay`.
    ///
    /// Any previously armed timer is cancelled first.
    pub(crate) fn arm(&self, generation: u64, delay: Duration, due_tx: mpsc::Sender<u64>) {
        let cancel = CancellationToken::new();
        if let Ok(mut guard) = self.pending.lock() {
            if let Some((previous, token)) = guard.take() {
                trace!(previous, "replacing pending reconnect");
                token.cancel();
            }
            *guard = Some((generation, cancel.clone()));
        }

        // The deadline is fixed here, not when the task is first polled.
        let sleep = tokio::time::sleep(delay);
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(generation, "reconnect cancelled");
                }
                _ = sleep => {
                    let _ = due_tx.send(generation).await;
                }
            }
        });
    }

    /// Cancels the pending timer, if any.
    pub(crate) fn cancel(&self) {
        if let Ok(mut guard) = self.pending.lock()
            && let Some((_, token)) = guard.take()
        {
            token.cancel();
        }
    }

    /// Generation of the pending timer.
    #[cfg(test)]
    pub(crate) fn pending(&self) -> Option<u64> {
        self.pending
            .lock()
            .ok()
            .and_then(|guard| guard.as_ref().map(|(generation, _)| *generation))
    }
}

impl Drop for ReconnectTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}
