//! HTTP API.

pub mod response;
pub mod routes;

use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum::Router;
use axum::routing::{delete, get, post};
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use ua_directory::DirectoryLookup;

use crate::service::Analytics;

/// Creates the API router.
pub fn router<D>(analytics: Analytics<D>) -> Router
where
    D: DirectoryLookup + Clone + 'static,
{
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/analytics", post(routes::ingest::<D>))
        .route("/api/analytics/dashboard", get(routes::dashboard::<D>))
        .route("/api/analytics/clear", delete(routes::clear::<D>))
        .route("/api/analytics/errors", get(routes::errors::<D>))
        .route(
            "/api/analytics/broadcast-users",
            get(routes::broadcast_users::<D>),
        )
        .route(
            "/api/analytics/users/:user_id/sessions",
            get(routes::user_sessions::<D>),
        )
        .route("/health", get(routes::health))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(analytics)
}

/// Serves the API until Ctrl+C or SIGTERM.
pub async fn serve<D>(addr: SocketAddr, analytics: Analytics<D>) -> Result<()>
where
    D: DirectoryLookup + Clone + 'static,
{
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;
    tracing::info!(%addr, "listening");

    axum::serve(listener, router(analytics))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("received Ctrl+C"),
        () = terminate => tracing::info!("received terminate signal"),
    }
}
