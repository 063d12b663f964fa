//! HTTP API handlers
//!
//! Thin adapters between JSON payloads and the core components.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use hub_core::agents::SubAgent;
use hub_core::learning::{FixAttempt, FixPattern, LearningMetrics, LearningSnapshot, SimilarPattern};
use hub_core::memory::{MemoryEntry, MemoryKind, NewMemory, SearchFilter};
use hub_core::types::{Request, RequestContext, RequestOptions, Response};

use crate::error::{ApiError, Result};
use crate::server::AppState;

const DEFAULT_SEARCH_LIMIT: usize = 10;
const DEFAULT_SIMILAR_LIMIT: usize = 5;

// ============================================================================
// Request/Response types
// ============================================================================

/// Orchestration request payload; the id is minted when absent
#[derive(Debug, Deserialize)]
pub struct ProcessRequest {
    pub id: Option<String>,
    pub prompt: String,
    pub context: Option<RequestContext>,
    pub options: Option<RequestOptions>,
}

impl ProcessRequest {
    fn into_request(self) -> Request {
        let id = self.id.unwrap_or_else(|| uuid::Uuid::now_v7().to_string());
        let mut request = Request::new(id, self.prompt);
        request.context = self.context;
        request.options = self.options;
        request
    }
}

/// Memory search query string
///
/// `kinds` and `tags` are comma separated.
#[derive(Debug, Default, Deserialize)]
pub struct MemorySearchParams {
    #[serde(default)]
    pub q: String,
    pub limit: Option<usize>,
    pub kinds: Option<String>,
    pub project_id: Option<String>,
    pub tags: Option<String>,
    pub entity_type: Option<String>,
}

impl MemorySearchParams {
    fn filter(&self) -> Result<SearchFilter> {
        let mut filter = SearchFilter {
            project_id: self.project_id.clone(),
            entity_type: self.entity_type.clone(),
            ..Default::default()
        };
        if let Some(tags) = &self.tags {
            filter = filter.with_tags(split_list(tags));
        }
        if let Some(kinds) = &self.kinds {
            let kinds = split_list(kinds)
                .map(|k| k.parse::<MemoryKind>())
                .collect::<hub_core::Result<Vec<_>>>()
                .map_err(|e| ApiError::InvalidRequest(e.to_string()))?;
            filter = filter.with_kinds(kinds);
        }
        Ok(filter)
    }
}

fn split_list(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(',').map(str::trim).filter(|s| !s.is_empty())
}

#[derive(Debug, Deserialize)]
pub struct SimilarParams {
    pub failure_type: String,
    pub error: String,
    pub limit: Option<usize>,
}

/// Outcome of recording a fix attempt
#[derive(Debug, Serialize)]
pub struct AttemptRecorded {
    pub recorded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<FixPattern>,
}

// ============================================================================
// Handler functions
// ============================================================================

/// Health check endpoint
pub async fn health() -> &'static str {
    "OK"
}

/// Orchestrate one request
pub async fn process_request(
    State(state): State<AppState>,
    Json(payload): Json<ProcessRequest>,
) -> Result<Json<Response>> {
    if payload.prompt.trim().is_empty() {
        return Err(ApiError::InvalidRequest("prompt must not be empty".into()));
    }
    let request = payload.into_request();
    debug!(request_id = %request.id, "Received request");

    let response = state.orchestrator.process_request(request).await?;
    Ok(Json(response))
}

/// Snapshot of registered agents
pub async fn list_agents(State(state): State<AppState>) -> Json<Vec<SubAgent>> {
    Json(state.orchestrator.registry().get_all_agents().await)
}

pub async fn store_memory(
    State(state): State<AppState>,
    Json(input): Json<NewMemory>,
) -> Result<(StatusCode, Json<MemoryEntry>)> {
    if input.content.trim().is_empty() {
        return Err(ApiError::InvalidRequest("content must not be empty".into()));
    }
    let entry = state.orchestrator.memory().store(input).await?;
    info!(memory_id = %entry.id, kind = %entry.kind, "Stored memory via API");
    Ok((StatusCode::CREATED, Json(entry)))
}

pub async fn search_memory(
    State(state): State<AppState>,
    Query(params): Query<MemorySearchParams>,
) -> Result<Json<Vec<MemoryEntry>>> {
    let filter = params.filter()?;
    let limit = params.limit.unwrap_or(DEFAULT_SEARCH_LIMIT);
    Ok(Json(state.orchestrator.memory().search(&params.q, limit, &filter).await))
}

pub async fn get_memory(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<MemoryEntry>> {
    state
        .orchestrator
        .memory()
        .get(&id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("memory {}", id)))
}

pub async fn delete_memory(State(state): State<AppState>, Path(id): Path<String>) -> Result<StatusCode> {
    if state.orchestrator.memory().delete(&id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("memory {}", id)))
    }
}

pub async fn record_attempt(
    State(state): State<AppState>,
    Json(attempt): Json<FixAttempt>,
) -> Json<AttemptRecorded> {
    let pattern = state.orchestrator.learning().record_fix_attempt(attempt).await;
    Json(AttemptRecorded { recorded: true, pattern })
}

pub async fn record_pattern_failure(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<FixPattern>> {
    state
        .orchestrator
        .learning()
        .record_pattern_failure(&id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("pattern {}", id)))
}

pub async fn similar_patterns(
    State(state): State<AppState>,
    Query(params): Query<SimilarParams>,
) -> Json<Vec<SimilarPattern>> {
    let limit = params.limit.unwrap_or(DEFAULT_SIMILAR_LIMIT);
    Json(
        state
            .orchestrator
            .learning()
            .find_similar_patterns(&params.failure_type, &params.error, limit)
            .await,
    )
}

pub async fn learning_metrics(State(state): State<AppState>) -> Json<LearningMetrics> {
    Json(state.orchestrator.learning().metrics())
}

pub async fn export_learning(State(state): State<AppState>) -> Json<LearningSnapshot> {
    Json(state.orchestrator.learning().export())
}
