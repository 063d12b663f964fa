//! hub-mcp: MCP (Model Context Protocol) transport for sub-agents
//!
//! Implements the core's `AgentChannel`/`ChannelConnector` seam on top of
//! rmcp, for agents reached as child processes (stdio) or over streamable
//! HTTP.

pub mod channel;
pub mod connector;

pub use channel::McpChannel;
pub use connector::McpConnector;
