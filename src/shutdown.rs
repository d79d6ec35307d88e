//! Graceful Shutdown Handling
//!
//! Listens for SIGTERM and SIGINT and fans a single shutdown signal out to
//! the HTTP listener and every open relay connection. The signal is
//! latched, so a connection that subscribes after it fired still sees it.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::watch;
use tracing::info;
use crate::Result;

/// Shutdown coordinator that manages graceful shutdown process
#[derive(Clone)]
pub struct ShutdownCoordinator {
    /// Latched shutdown flag
    shutdown_tx: Arc<watch::Sender<bool>>,
    /// How long open connections get to finish once shutdown starts
    timeout: Duration,
}

impl ShutdownCoordinator {
    /// Create a new shutdown coordinator
    pub fn new(timeout: Duration) -> Self {
        let (shutdown_tx, _) = watch::channel(false);

        Self {
            shutdown_tx: Arc::new(shutdown_tx),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Get a shutdown receiver for components to listen for shutdown signals
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    pub fn is_triggered(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    /// A future that completes once shutdown has been triggered, including
    /// when it already was
    pub fn signalled(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut rx = self.subscribe();
        async move {
            wait_for_shutdown(&mut rx).await;
        }
    }

    /// Latch the shutdown signal for every current and future subscriber
    pub fn trigger(&self) {
        self.shutdown_tx.send_replace(true);
    }

    /// Wait for SIGTERM, SIGINT or Ctrl+C, then trigger shutdown
    pub async fn listen_for_signals(&self) -> Result<()> {
        info!("Starting shutdown signal listener");

        #[cfg(unix)]
        {
            let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;
            let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())?;

            tokio::select! {
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, initiating graceful shutdown");
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT, initiating graceful shutdown");
                }
                _ = signal::ctrl_c() => {
                    info!("Received Ctrl+C, initiating graceful shutdown");
                }
            }
        }

        #[cfg(windows)]
        {
            signal::ctrl_c().await?;
            info!("Received Ctrl+C, initiating graceful shutdown");
        }

        self.trigger();
        Ok(())
    }
}

/// Resolve once `rx` observes the shutdown flag
pub async fn wait_for_shutdown(rx: &mut watch::Receiver<bool>) {
    // the sender lives in the coordinator, so an error means it is gone
    let _ = rx.wait_for(|triggered| *triggered).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_shutdown_signal_broadcast() {
        let coordinator = ShutdownCoordinator::new(Duration::from_secs(5));
        let mut first = coordinator.subscribe();
        let mut second = coordinator.subscribe();

        coordinator.trigger();

        assert!(first.changed().await.is_ok());
        assert!(*first.borrow());
        assert!(second.changed().await.is_ok());
        assert!(coordinator.is_triggered());
    }

    #[tokio::test]
    async fn test_signalled_future_completes_after_trigger() {
        let coordinator = ShutdownCoordinator::new(Duration::from_secs(5));
        let signalled = coordinator.signalled();

        let trigger = coordinator.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.trigger();
        });

        tokio::time::timeout(Duration::from_secs(2), signalled)
            .await
            .expect("shutdown future should complete");
    }

    #[test]
    fn test_trigger_without_listeners_does_not_panic() {
        let coordinator = ShutdownCoordinator::new(Duration::from_secs(1));
        coordinator.trigger();
        assert!(coordinator.is_triggered());
        assert_eq!(coordinator.timeout(), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_late_subscriber_sees_earlier_trigger() {
        let coordinator = ShutdownCoordinator::new(Duration::from_secs(1));
        coordinator.trigger();

        let mut late = coordinator.subscribe();
        tokio::time::timeout(Duration::from_millis(200), wait_for_shutdown(&mut late))
            .await
            .expect("late subscriber should observe shutdown");
        tokio::time::timeout(Duration::from_millis(200), coordinator.signalled())
            .await
            .expect("signalled future should complete immediately");
    }
}
