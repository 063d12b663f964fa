//! Error types for hub-api

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// hub-api error type
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Core error: {0}")]
    Core(#[from] hub_core::Error),
}

/// Body of every error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) | Self::Json(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Core(e) => match e {
                hub_core::Error::NotInitialized | hub_core::Error::MemoryUnavailable(_) => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
                hub_core::Error::AgentNotFound(_) => StatusCode::NOT_FOUND,
                hub_core::Error::DuplicateAgent(_) | hub_core::Error::DuplicateMemory { .. } => {
                    StatusCode::CONFLICT
                }
                hub_core::Error::Config(_) | hub_core::Error::Json(_) => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "Request failed");
        }
        (status, Json(ErrorResponse { error: self.to_string() })).into_response()
    }
}

/// Result type alias for hub-api
pub type Result<T> = std::result::Result<T, ApiError>;
