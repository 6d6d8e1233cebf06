//! Graceful shutdown handling for SIGTERM and SIGINT.
//!
//! Once a signal arrives the scheduler is shut down, which lets an in-flight backup
//! finish.

use tokio::signal;
use tracing::{error, info};

/// Shutdown coordinator
#[derive(Debug, Default)]
pub struct ShutdownCoordinator;

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self
    }

    /// Wait for SIGTERM or SIGINT.
    ///
    /// A handler that cannot be installed is logged and never fires.
    pub async fn wait_for_signal(&self) {
        let ctrl_c = async {
            if let Err(e) = signal::ctrl_c().await {
                error!(error = %e, "Failed to install Ctrl+C handler");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                }
                Err(e) => {
                    error!(error = %e, "Failed to install SIGTERM handler");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                info!("Received SIGINT (Ctrl+C), initiating graceful shutdown...");
            }
            _ = terminate => {
                info!("Received SIGTERM, initiating graceful shutdown...");
            }
        }
    }
}
