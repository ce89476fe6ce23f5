//! HTTP server built on axum.
//!
//! Exposes the refresh polling protocol, the fan-id and track-listing
//! lookups, and read-only library views.

pub mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::{
    routing::{get, post},
    Router,
};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use crate::bandcamp::BandcampClient;
use crate::library::AlbumStore;
use crate::sync::SyncService;

/// Shared state for request handlers.
#[derive(Clone)]
pub struct AppState {
    pub sync: Arc<SyncService>,
    pub client: Arc<BandcampClient>,
    pub albums: Arc<dyn AlbumStore>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/bandcamp/refresh", post(handlers::refresh))
        .route("/api/bandcamp/status", get(handlers::active_status))
        .route("/api/bandcamp/status/{task_id}", get(handlers::task_status))
        .route("/api/bandcamp/fan-id", post(handlers::fan_id))
        .route("/api/bandcamp/tracks", post(handlers::tracks))
        .route("/api/albums", get(handlers::list_albums))
        .route("/api/albums/stats", get(handlers::album_stats))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until `shutdown` is cancelled, then drain in-flight requests.
pub async fn start_server(
    bind: SocketAddr,
    state: AppState,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;

    tracing::info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("HTTP server error")?;

    tracing::info!("Server stopped");
    Ok(())
}
