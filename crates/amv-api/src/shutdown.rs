use std::sync::Arc;

use amv_core::coordinator::UpdateCoordinator;

/// Everything the process needs to clean up before it exits.
pub struct ShutdownContext {
    coordinator: Arc<UpdateCoordinator>,
}

impl ShutdownContext {
    pub fn new(coordinator: Arc<UpdateCoordinator>) -> Self {
        Self { coordinator }
    }

    /// Delete the live server. Waits for any update run in progress first.
    pub async fn run(self) {
        if self.coordinator.shutdown().await {
            tracing::info!("shutdown cleanup complete");
        } else {
            tracing::error!("shutdown cleanup failed, a server may be left on the panel");
        }
    }
}

/// Resolves on Ctrl-C or, on Unix, SIGTERM.
pub async fn signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("received shutdown signal");
}
