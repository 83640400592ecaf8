//! Cooperative cancellation for the retry and send loops.
//!
//! Loops check the signal at the top of each iteration only; an operation
//! already in flight is never interrupted.

use tokio::sync::watch;

/// Owner side: flips the signal.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    /// Request cancellation. Takes effect at the next iteration boundary.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// Observer side, cheap to clone and pass into loops.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once cancellation is requested.
    ///
    /// Never resolves if the handle is dropped without cancelling.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Create a linked handle/signal pair.
pub fn cancel_pair() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelSignal { rx })
}

/// Helper for optional signals.
pub(crate) fn is_cancelled(signal: Option<&CancelSignal>) -> bool {
    signal.is_some_and(CancelSignal::is_cancelled)
}
