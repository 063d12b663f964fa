//! Sub-Agent Registry
//!
//! This module owns the hub's view of its sub-agents.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      AgentRegistry                           │
//! │  ┌────────────┐  ┌────────────┐  ┌────────────┐             │
//! │  │ Connection │  │ Connection │  │ Connection │   ...       │
//! │  │  (virtual) │  │ (process)  │  │ (network)  │             │
//! │  └────────────┘  └─────┬──────┘  └─────┬──────┘             │
//! └────────────────────────┼───────────────┼────────────────────┘
//!                          ▼               ▼
//!                   ┌─────────────────────────────┐
//!                   │  AgentChannel (opaque wire) │
//!                   │  list_tools / list_resources│
//!                   │  call_tool                  │
//!                   └─────────────────────────────┘
//! ```
//!
//! Channels for process- and network-attached agents are opened through a
//! `ChannelConnector`, so the core never depends on a concrete protocol.

pub mod channel;
pub mod connection;
pub mod registry;
pub mod types;

// Re-exports
pub use channel::{AgentChannel, ChannelConnector, VirtualOnlyConnector};
pub use connection::{AgentConnection, ToolCatalog};
pub use registry::{AgentRegistry, DEFAULT_MAX_CONCURRENT};
pub use types::{
    AgentConfig, AgentStatus, AgentType, ConnectionKind, ResourceInfo, SubAgent, SubAgentResult,
    ToolCallOutput, ToolInfo, clamp_unit,
};
