//! Request/Response boundary types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;

use crate::agents::SubAgentResult;

/// One turn of prior conversation forwarded with a request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationTurn {
    pub role: String,
    pub content: String,
}

/// Optional workspace context attached to a request
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RequestContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_code: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recent_files: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conversation_history: Vec<ConversationTurn>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, JsonValue>,
}

/// Model requested by the caller
///
/// Either a bare identifier (`"fast-model"`) or a structured model description.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ModelSelection {
    Named(String),
    Spec(ModelSpec),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u64>,
}

impl ModelSelection {
    /// The model identifier regardless of form
    pub fn name(&self) -> &str {
        match self {
            Self::Named(name) => name,
            Self::Spec(spec) => &spec.name,
        }
    }
}

/// Per-request options
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RequestOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u64>,
    /// Advisory, not enforced by the hub
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub preferred_agents: Vec<String>,
    #[serde(default)]
    pub exclude_agents: Vec<String>,
    #[serde(default = "default_parallel")]
    pub parallel: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<ModelSelection>,
}

fn default_parallel() -> bool {
    true
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            max_tokens: None,
            timeout_ms: None,
            preferred_agents: vec![],
            exclude_agents: vec![],
            parallel: default_parallel(),
            model: None,
        }
    }
}

/// Incoming request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Request {
    pub id: String,
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<RequestContext>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<RequestOptions>,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl Request {
    pub fn new(id: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            prompt: prompt.into(),
            context: None,
            options: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_context(mut self, context: RequestContext) -> Self {
        self.context = Some(context);
        self
    }

    pub fn with_options(mut self, options: RequestOptions) -> Self {
        self.options = Some(options);
        self
    }

    /// Project path from the context, if any
    pub fn project_path(&self) -> Option<&str> {
        self.context.as_ref().and_then(|c| c.project_path.as_deref())
    }
}

/// Aggregate bookkeeping attached to every response
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ResponseMetadata {
    pub total_tokens_used: u64,
    pub total_execution_time_ms: u64,
    pub agents_invoked: usize,
    pub memory_retrievals: usize,
    pub cached: bool,
}

/// Outgoing response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Response {
    pub id: String,
    pub request_id: String,
    pub content: String,
    pub sub_agent_results: Vec<SubAgentResult>,
    pub metadata: ResponseMetadata,
    pub timestamp: DateTime<Utc>,
}
