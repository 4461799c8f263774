//! Shutdown signaling between the pipeline and its workers.
//!
//! Wraps a tokio watch channel carrying a single boolean: `false` while the
//! pipeline should keep running, flipped to `true` exactly once on shutdown.
//! Workers poll it between files and between topics; nothing interrupts a
//! file mid-processing.

use tokio::sync::watch;

/// Transmitter side of the shutdown signal.
pub type ShutdownTx = watch::Sender<bool>;

/// Receiver side of the shutdown signal.
#[derive(Debug, Clone)]
pub struct ShutdownRx(watch::Receiver<bool>);

impl ShutdownRx {
    /// Returns true once shutdown has been requested.
    pub fn is_shutdown(&self) -> bool {
        *self.0.borrow()
    }

    /// Completes when shutdown is requested, or immediately if it already was.
    pub async fn wait(&mut self) {
        if *self.0.borrow() {
            return;
        }
        // An error means the sender is gone, which we treat as shutdown.
        let _ = self.0.wait_for(|stop| *stop).await;
    }
}

/// Creates a connected shutdown channel, initially not shut down.
pub fn create_shutdown() -> (ShutdownTx, ShutdownRx) {
    let (tx, rx) = watch::channel(false);
    (tx, ShutdownRx(rx))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn signal_is_observed() {
        let (tx, mut rx) = create_shutdown();
        assert!(!rx.is_shutdown());

        tx.send(true).unwrap();
        rx.wait().await;
        assert!(rx.is_shutdown());
    }

    #[tokio::test]
    async fn dropped_sender_counts_as_shutdown() {
        let (tx, mut rx) = create_shutdown();
        drop(tx);
        rx.wait().await;
    }
}
