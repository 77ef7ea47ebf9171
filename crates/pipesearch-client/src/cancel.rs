//! Cancellation token for in-flight protocol calls.
//!
//! One token is created per search at dispatch time; cancelling it aborts
//! every in-flight round trip for that search without touching other
//! concurrent searches.

use std::sync::Arc;

use tokio::sync::watch;

/// A clonable cancellation token.
///
/// Cancellation is level-triggered and permanent: once cancelled, every
/// current and future [`cancelled()`](CancelToken::cancelled) wait
/// resolves immediately.
#[derive(Debug, Clone)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Cancel every call guarded by this token. Idempotent.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolve once the token is cancelled.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        // The borrow checks the current value first, so a token cancelled
        // before the wait started resolves without blocking.
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                // Sender kept alive through self; unreachable in practice.
                return;
            }
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}
