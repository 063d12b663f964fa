//! Error types for hub-core

use thiserror::Error;

/// Main error type for hub-core
#[derive(Error, Debug)]
pub enum Error {
    #[error("Agent already registered: {0}")]
    DuplicateAgent(String),

    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    #[error("Connection to agent {agent_id} failed: {message}")]
    Connection { agent_id: String, message: String },

    #[error("Agent not connected: {0}")]
    NotConnected(String),

    #[error("Tool invocation on agent {agent_id} failed: {message}")]
    ToolInvocation { agent_id: String, message: String },

    #[error("Orchestrator has not been initialized")]
    NotInitialized,

    #[error("Memory id already used in {kind} tier: {id}")]
    DuplicateMemory { id: String, kind: String },

    #[error("Memory store unavailable: {0}")]
    MemoryUnavailable(String),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Shorthand for a connection failure on a given agent
    pub fn connection(agent_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Connection {
            agent_id: agent_id.into(),
            message: message.into(),
        }
    }

    /// Shorthand for a failed tool call on a given agent
    pub fn tool_invocation(agent_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolInvocation {
            agent_id: agent_id.into(),
            message: message.into(),
        }
    }
}

/// Result type alias for hub-core
pub type Result<T> = std::result::Result<T, Error>;
