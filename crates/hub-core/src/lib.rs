//! hub-core: Agent Hub Core Library
//!
//! Request routing, sub-agent registry, result aggregation, tiered memory
//! and fix-pattern learning for the agent hub.

pub mod agents;
pub mod aggregator;
pub mod config;
pub mod error;
pub mod events;
pub mod ids;
pub mod learning;
pub mod memory;
pub mod orchestrator;
pub mod ring;
pub mod router;
pub mod types;

pub use agents::{AgentChannel, AgentConfig, AgentRegistry, AgentStatus, AgentType, ChannelConnector, SubAgent, SubAgentResult};
pub use aggregator::{AggregationStrategy, ResultAggregator};
pub use config::Config;
pub use error::{Error, Result};
pub use events::{EventBus, HubEvent};
pub use learning::{FixAttempt, FixPattern, LearningEngine, LearningMetrics};
pub use memory::{MemoryEntry, MemoryKind, NewMemory, SearchFilter, TieredMemory};
pub use orchestrator::{Orchestrator, OrchestratorSettings};
pub use router::{RequestRouter, RoutingDecision};
pub use types::{Request, RequestContext, RequestOptions, Response};
