//! hub-api: HTTP API for the agent hub
//!
//! Exposes the orchestrator, tiered memory and learning engine over REST.
//! Built with axum for async HTTP handling.

pub mod error;
pub mod handlers;
pub mod routes;
pub mod server;

pub use error::{ApiError, Result};
pub use server::{AppState, router, start_server};
