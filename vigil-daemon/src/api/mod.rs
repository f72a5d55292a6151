//! HTTP API and push channel.

use axum::routing::{get, post};
use axum::Router;
use std::net::SocketAddr;
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Notify};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use vigil_core::{HealthChecker, HistoryStore, SnapshotBus, Sources};

mod routes;
mod ws;

/// Shared state of every handler.
#[derive(Clone)]
pub struct AppState {
    pub sources: Sources,
    pub bus: SnapshotBus,
    pub history: HistoryStore,
    pub health: HealthChecker,
    /// Wakes the poll loop for an immediate cycle.
    pub refresh: Arc<Notify>,
    pub poll_interval: Duration,
    /// Default history window.
    pub window_hours: u32,
    pub push_clients: Arc<AtomicUsize>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(routes::index))
        .route("/health", get(routes::health))
        .route("/api/status", get(routes::status))
        .route("/api/refresh", post(routes::refresh))
        .route("/api/nextcloud", get(routes::nextcloud))
        .route("/api/proxmox", get(routes::proxmox))
        .route("/api/proxmox/detailed", get(routes::proxmox_detailed))
        .route("/api/:source/history", get(routes::history))
        .route("/ws", get(ws::upgrade))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until a shutdown message arrives.
pub async fn serve(
    state: AppState,
    addr: SocketAddr,
    mut shutdown: broadcast::Receiver<()>,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("HTTP API listening on {}", listener.local_addr()?);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await
}
