//! Turns a process signal into a broadcast shutdown for reader loops.

use std::future::Future;
use std::io;

use tokio::sync::broadcast;
use tracing::{error, info};

/// Wait for `signal`, then broadcast shutdown.
///
/// When the signal handler cannot be installed nothing is sent and the
/// readers keep running. Returns whether shutdown was delivered.
pub async fn forward_shutdown<F>(signal: F, tx: broadcast::Sender<()>) -> bool
where
    F: Future<Output = io::Result<()>>,
{
    if let Err(e) = signal.await {
        error!(error = %e, "Failed to listen for shutdown signal");
        return false;
    }
    info!("Received shutdown signal");
    tx.send(()).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast::error::TryRecvError;

    #[tokio::test]
    async fn test_signal_broadcasts_shutdown() {
        let (tx, mut rx) = broadcast::channel::<()>(1);
        assert!(forward_shutdown(async { Ok(()) }, tx).await);
        assert_eq!(rx.try_recv(), Ok(()));
    }

    #[tokio::test]
    async fn test_failed_handler_does_not_broadcast() {
        let (tx, mut rx) = broadcast::channel::<()>(1);
        let signal = async { Err(io::Error::new(io::ErrorKind::Other, "no signal driver")) };

        assert!(!forward_shutdown(signal, tx).await);
        assert_eq!(rx.try_recv(), Err(TryRecvError::Closed));
    }
}
