//! HTTP API Server
//!
//! Starts and manages the axum-based HTTP server.

use axum::Router;
use std::future::Future;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use hub_core::Orchestrator;

use crate::routes::routes;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
}

impl AppState {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self { orchestrator }
    }
}

/// Build the application with middleware applied
pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve the API on `addr` until `shutdown` resolves
pub async fn start_server<F>(addr: &str, state: AppState, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("HTTP API listening on {}", listener.local_addr()?);

    axum::serve(listener, app).with_graceful_shutdown(shutdown).await?;

    Ok(())
}
