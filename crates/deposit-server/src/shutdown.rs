//! Graceful shutdown.

use std::future::Future;

use axum::Router;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Completes on SIGTERM or Ctrl+C.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl+C, initiating graceful shutdown"),
        () = terminate => tracing::info!("Received SIGTERM, initiating graceful shutdown"),
    }
}

/// Serve `router` until `shutdown` fires, then wait for the confirmation
/// worker to drain.
///
/// The router owns the last `ChannelSink` handles, so once it is dropped the
/// worker sees its channel close, credits whatever is still queued, and exits.
pub async fn serve_and_drain(
    listener: TcpListener,
    router: Router,
    worker: JoinHandle<()>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;

    tracing::info!("Draining queued confirmations");
    worker.await?;
    tracing::info!("Server shutdown complete");

    Ok(())
}
