//! One-shot readiness latch shared by every control request.
//!
//! The gate starts closed and opens exactly once. Waiters park on a `watch`
//! channel, so a single `open()` releases every current waiter and any waiter
//! arriving afterwards returns immediately.

use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Debug)]
pub struct ReadinessGate {
    tx: watch::Sender<bool>,
}

impl ReadinessGate {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    /// Transition NotReady -> Ready.
    ///
    /// Returns `true` if this call performed the transition. A second call is a
    /// no-op that returns `false`; it never re-notifies waiters.
    pub fn open(&self) -> bool {
        let transitioned = self.tx.send_if_modified(|ready| {
            if *ready {
                false
            } else {
                *ready = true;
                true
            }
        });

        if transitioned {
            info!(
                "ReadinessGate: opened, releasing {} waiter(s)",
                self.tx.receiver_count()
            );
        } else {
            warn!("ReadinessGate: open() called on an already open gate, ignoring");
        }
        transitioned
    }

    pub fn is_ready(&self) -> bool {
        *self.tx.borrow()
    }

    /// Wait until the gate is open. Returns immediately if it already is.
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let _ = rx.wait_for(|ready| *ready).await;
    }
}

impl Default for ReadinessGate {
    fn default() -> Self {
        Self::new()
    }
}
