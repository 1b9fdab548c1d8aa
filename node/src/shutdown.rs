//! Graceful shutdown for the civic node.
//!
//! A single `watch` flag flips to `true` once. Tasks that start listening
//! after the flip still see it, so a server spawned during shutdown stops
//! straight away instead of hanging.

use std::future::Future;

use tokio::signal;
use tokio::sync::watch;

/// Owns the shutdown flag. Shared by the node and the daemon.
pub struct ShutdownController {
    flag: watch::Sender<bool>,
}

/// A listener handed to one background task.
#[derive(Clone)]
pub struct ShutdownSignal {
    flag: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Resolve once shutdown has been requested. Returns immediately if it
    /// already was.
    pub async fn recv(&mut self) {
        // An error means the controller is gone, which also means stop.
        let _ = self.flag.wait_for(|stopping| *stopping).await;
    }

    pub fn is_stopping(&self) -> bool {
        *self.flag.borrow()
    }
}

impl ShutdownController {
    pub fn new() -> Self {
        let (flag, _) = watch::channel(false);
        Self { flag }
    }

    pub fn subscribe(&self) -> ShutdownSignal {
        ShutdownSignal {
            flag: self.flag.subscribe(),
        }
    }

    /// Request shutdown. Idempotent.
    pub fn shutdown(&self) {
        self.flag.send_replace(true);
    }

    pub fn is_stopping(&self) -> bool {
        *self.flag.borrow()
    }

    /// Owned future for APIs that take a graceful-shutdown future, such as
    /// `axum::serve(..).with_graceful_shutdown`.
    pub fn signalled(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut signal = self.subscribe();
        async move { signal.recv().await }
    }

    /// Block until SIGINT or SIGTERM arrives, then request shutdown.
    pub async fn wait_for_signal(&self) {
        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "cannot listen for SIGTERM, only SIGINT will stop the node");
                    std::future::pending::<()>().await;
                }
            }
        };
        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = signal::ctrl_c() => tracing::info!(signal = "SIGINT", "shutdown requested"),
            _ = terminate => tracing::info!(signal = "SIGTERM", "shutdown requested"),
        }
        self.shutdown();
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn every_listener_sees_the_request() {
        let controller = ShutdownController::new();
        let mut a = controller.subscribe();
        let mut b = controller.subscribe();
        controller.shutdown();
        a.recv().await;
        b.recv().await;
        assert!(a.is_stopping() && b.is_stopping());
    }

    #[tokio::test]
    async fn late_listener_returns_immediately() {
        let controller = ShutdownController::new();
        controller.shutdown();
        let late = controller.signalled();
        tokio::time::timeout(Duration::from_secs(1), late)
            .await
            .expect("already signalled");
    }

    #[tokio::test]
    async fn listener_waits_until_requested() {
        let controller = ShutdownController::new();
        let mut signal = controller.subscribe();
        assert!(tokio::time::timeout(Duration::from_millis(20), signal.recv())
            .await
            .is_err());
        controller.shutdown();
        signal.recv().await;
        assert!(controller.is_stopping());
    }
}
