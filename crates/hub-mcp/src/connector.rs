//! MCP connector
//!
//! Opens an rmcp client session for process- and network-attached agents.

use async_trait::async_trait;
use rmcp::{
    service::ServiceExt,
    transport::{ConfigureCommandExt, StreamableHttpClientTransport, TokioChildProcess},
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::process::Command;
use tracing::info;

use hub_core::agents::{AgentChannel, ChannelConnector, ConnectionKind};
use hub_core::{Error, Result};

use crate::channel::McpChannel;

#[derive(Debug, Default, Clone, Copy)]
pub struct McpConnector;

impl McpConnector {
    pub fn new() -> Self {
        Self
    }

    async fn connect_process(
        &self,
        agent_id: &str,
        command: &str,
        args: &[String],
        env: &HashMap<String, String>,
    ) -> Result<McpChannel> {
        if command.trim().is_empty() {
            return Err(Error::connection(agent_id, "Empty command"));
        }

        let transport = TokioChildProcess::new(Command::new(command).configure(|c| {
            c.args(args);
            c.envs(env);
        }))
        .map_err(|e| Error::connection(agent_id, format!("Failed to create transport: {}", e)))?;

        let service = ()
            .serve(transport)
            .await
            .map_err(|e| Error::connection(agent_id, format!("Failed to connect: {}", e)))?;
        Ok(McpChannel::new(agent_id, service))
    }

    async fn connect_network(&self, agent_id: &str, url: &str) -> Result<McpChannel> {
        let transport = StreamableHttpClientTransport::from_uri(url.to_string());
        let service = ()
            .serve(transport)
            .await
            .map_err(|e| Error::connection(agent_id, format!("Failed to connect: {}", e)))?;
        Ok(McpChannel::new(agent_id, service))
    }
}

#[async_trait]
impl ChannelConnector for McpConnector {
    async fn connect(&self, agent_id: &str, kind: &ConnectionKind) -> Result<Arc<dyn AgentChannel>> {
        info!(agent_id, endpoint = %kind.endpoint(agent_id), "Opening MCP session");

        let channel = match kind {
            ConnectionKind::Virtual => {
                return Err(Error::connection(agent_id, "Virtual agents have no MCP session"));
            }
            ConnectionKind::Process { command, args, env } => {
                self.connect_process(agent_id, command, args, env).await?
            }
            ConnectionKind::Network { url } => self.connect_network(agent_id, url).await?,
        };

        info!(agent_id, server_name = channel.server_name(), "MCP session established");
        Ok(Arc::new(channel))
    }
}
