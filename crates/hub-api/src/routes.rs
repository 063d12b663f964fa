//! Route definitions
//!
//! Defines all HTTP API endpoints.

use axum::{
    Router,
    routing::{get, post},
};

use crate::handlers::{
    delete_memory, export_learning, get_memory, health, learning_metrics, list_agents, process_request,
    record_attempt, record_pattern_failure, search_memory, similar_patterns, store_memory,
};
use crate::server::AppState;

/// Create the API router
pub fn routes() -> Router<AppState> {
    Router::new()
        // Health check
        .route("/health", get(health))
        // Orchestration
        .route("/api/requests", post(process_request))
        .route("/api/agents", get(list_agents))
        // Memory
        .route("/api/memory", post(store_memory))
        .route("/api/memory/search", get(search_memory))
        .route("/api/memory/{id}", get(get_memory).delete(delete_memory))
        // Learning
        .route("/api/learning/attempts", post(record_attempt))
        .route("/api/learning/patterns/{id}/failure", post(record_pattern_failure))
        .route("/api/learning/similar", get(similar_patterns))
        .route("/api/learning/metrics", get(learning_metrics))
        .route("/api/learning/export", get(export_learning))
}
