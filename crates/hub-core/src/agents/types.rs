//! Sub-agent types
//!
//! Defines the data the registry keeps about each sub-agent:
//! - SubAgent: identity, type, status and capabilities
//! - AgentConfig: what a caller supplies to register an agent
//! - SubAgentResult: one agent's answer to a dispatched request

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::{BTreeSet, HashMap};
use std::fmt;

/// Category of work a sub-agent performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentType {
    Validator,
    Knowledge,
    Task,
    Dynamic,
}

impl AgentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validator => "validator",
            Self::Knowledge => "knowledge",
            Self::Task => "task",
            Self::Dynamic => "dynamic",
        }
    }
}

impl fmt::Display for AgentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection status of a sub-agent
///
/// `Disconnected -> Idle -> Busy -> Idle | Error`. Nothing recovers an agent
/// from `Error` automatically; it stays selectable and the next successful
/// call moves it back through `Busy` to `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    #[default]
    Disconnected,
    Idle,
    Busy,
    Error,
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Idle => "idle",
            Self::Busy => "busy",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

/// How the hub reaches a sub-agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConnectionKind {
    /// Handled in-process, no channel
    Virtual,
    /// Child process speaking the tool protocol over stdio
    Process {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env: HashMap<String, String>,
    },
    /// Remote service speaking the tool protocol over HTTP
    Network { url: String },
}

impl ConnectionKind {
    /// Human-readable endpoint
    pub fn endpoint(&self, agent_id: &str) -> String {
        match self {
            Self::Virtual => format!("virtual://{}", agent_id),
            Self::Process { command, args, .. } => {
                if args.is_empty() {
                    command.clone()
                } else {
                    format!("{} {}", command, args.join(" "))
                }
            }
            Self::Network { url } => url.clone(),
        }
    }
}

/// Registration request for one sub-agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub agent_type: AgentType,
    pub connection: ConnectionKind,
    #[serde(default)]
    pub capabilities: BTreeSet<String>,
    #[serde(default)]
    pub metadata: HashMap<String, JsonValue>,
}

impl AgentConfig {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        agent_type: AgentType,
        connection: ConnectionKind,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            agent_type,
            connection,
            capabilities: BTreeSet::new(),
            metadata: HashMap::new(),
        }
    }

    /// Shorthand for an in-process agent
    pub fn virtual_agent(id: impl Into<String>, name: impl Into<String>, agent_type: AgentType) -> Self {
        Self::new(id, name, agent_type, ConnectionKind::Virtual)
    }

    pub fn with_capabilities<I, S>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capabilities = capabilities.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: JsonValue) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// Snapshot of a registered sub-agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubAgent {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub agent_type: AgentType,
    pub status: AgentStatus,
    pub endpoint: String,
    pub capabilities: BTreeSet<String>,
    pub metadata: HashMap<String, JsonValue>,
}

impl SubAgent {
    pub fn from_config(config: &AgentConfig) -> Self {
        Self {
            id: config.id.clone(),
            name: config.name.clone(),
            agent_type: config.agent_type,
            status: AgentStatus::Disconnected,
            endpoint: config.connection.endpoint(&config.id),
            capabilities: config.capabilities.clone(),
            metadata: config.metadata.clone(),
        }
    }

    pub fn has_any_capability<'a, I>(&self, wanted: I) -> bool
    where
        I: IntoIterator<Item = &'a str>,
    {
        wanted.into_iter().any(|c| self.capabilities.contains(c))
    }
}

/// Tool advertised by a sub-agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
    pub input_schema: JsonValue,
}

/// Resource advertised by a sub-agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceInfo {
    pub uri: String,
    pub name: String,
}

/// Raw output of one tool call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallOutput {
    pub content: String,
    pub is_error: bool,
}

impl ToolCallOutput {
    pub fn success(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: true,
        }
    }
}

/// One sub-agent's answer, as consumed by the aggregator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubAgentResult {
    pub agent_id: String,
    pub agent_name: String,
    pub agent_type: AgentType,
    pub content: String,
    /// Always within `[0, 1]`
    pub confidence: f64,
    pub tokens_used: u64,
    pub execution_time_ms: u64,
    pub tools_used: Vec<String>,
}

impl SubAgentResult {
    pub fn new(agent: &SubAgent, content: impl Into<String>, confidence: f64) -> Self {
        Self {
            agent_id: agent.id.clone(),
            agent_name: agent.name.clone(),
            agent_type: agent.agent_type,
            content: content.into(),
            confidence: clamp_unit(confidence),
            tokens_used: 0,
            execution_time_ms: 0,
            tools_used: vec![],
        }
    }

    pub fn with_tokens(mut self, tokens: u64) -> Self {
        self.tokens_used = tokens;
        self
    }

    pub fn with_execution_time(mut self, ms: u64) -> Self {
        self.execution_time_ms = ms;
        self
    }

    pub fn with_tools(mut self, tools: Vec<String>) -> Self {
        self.tools_used = tools;
        self
    }
}

/// Clamp into `[0, 1]`, mapping NaN to 0
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}
