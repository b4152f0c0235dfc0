use tokio::signal;

use crate::store::Store;

/// Wait for a shutdown signal (SIGINT or SIGTERM).
pub async fn wait_for_shutdown() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, stopping after the current commit...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, stopping after the current commit...");
        }
    }
}

/// Flush the store after an interrupted run.
///
/// Everything committed before the signal is kept; ids whose model update did
/// not finish stay pending and are picked up by the next run.
pub async fn graceful_shutdown(store: &Store) {
    tracing::info!("Starting graceful shutdown...");
    match store.persist().await {
        Ok(()) => tracing::info!("Graceful shutdown complete"),
        Err(e) => tracing::error!(error = %e, "Failed to persist store during shutdown"),
    }
}
