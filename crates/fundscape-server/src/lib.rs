//! fundscape-server: read-only JSON API over the research-funding table
//!
//! # Endpoints
//!
//! - `GET /` - service metadata and endpoint catalog
//! - `GET /api/health` - table statistics, 500 when no table can be loaded
//! - `GET /api/fields`, `/api/subfields`, `/api/funders`, `/api/topics`,
//!   `/api/research_data` - aggregated views
//! - `POST /api/reload` - drop the cached table and read it again

pub mod error;
pub mod routes;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;

pub use error::{ApiError, StatusError};
pub use routes::{AppState, ListResponse, build_router};

/// Bind `listen` and serve until SIGINT/SIGTERM, then drain connections.
pub async fn serve(listen: SocketAddr, state: Arc<AppState>) -> anyhow::Result<()> {
    let preload = Arc::clone(&state);
    match tokio::task::spawn_blocking(move || preload.store.load()).await {
        Ok(Ok(_)) => {}
        // Not fatal: the next request retries, health reports the cause
        Ok(Err(e)) => log::warn!("table not loaded at startup: {e}"),
        Err(e) => log::warn!("table preload task failed: {e}"),
    }

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(listen)
        .await
        .with_context(|| format!("failed to bind {listen}"))?;
    log::info!("listening on http://{listen}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    log::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::warn!("failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                log::warn!("failed to listen for SIGTERM: {e}");
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
    log::info!("shutdown requested, draining connections");
}
