use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// How long in-flight requests get to finish after a shutdown signal.
pub const HTTP_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Graceful shutdown coordinator.
///
/// A `CancellationToken` broadcasts shutdown to the HTTP server and the
/// background tasks. The server stops accepting connections and drains
/// in-flight map requests within [`HTTP_DRAIN_TIMEOUT`].
#[derive(Clone)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// Returns a clone of the cancellation token for use by tasks.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Triggers shutdown for all tasks listening on this token.
    pub fn trigger_shutdown(&self) {
        info!("shutdown signal received, broadcasting to all tasks");
        self.token.cancel();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Wait for SIGINT or SIGTERM, then trigger shutdown.
    ///
    /// If the SIGTERM handler cannot be installed only SIGINT is awaited.
    pub async fn wait_for_signal_and_shutdown(&self) {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for SIGINT");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                }
                Err(e) => {
                    warn!(error = %e, "failed to install SIGTERM handler");
                    std::future::pending::<()>().await;
                }
            }
        };
        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                info!("received SIGINT (Ctrl+C)");
            }
            _ = terminate => {
                info!("received SIGTERM");
            }
        }

        self.trigger_shutdown();
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_trigger_cancels_all_tokens() {
        let coordinator = ShutdownCoordinator::new();
        let token = coordinator.token();
        assert!(!coordinator.is_shutting_down());

        coordinator.trigger_shutdown();
        token.cancelled().await;
        assert!(coordinator.is_shutting_down());
        assert!(coordinator.clone().token().is_cancelled());
    }
}
