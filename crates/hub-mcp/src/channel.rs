//! MCP channel
//!
//! One rmcp client session per sub-agent.

use async_trait::async_trait;
use rmcp::{
    model::{CallToolRequestParams, RawContent, Tool},
    service::{Peer, RoleClient, RunningService},
};
use serde_json::Value as JsonValue;
use tokio::sync::Mutex;
use tracing::debug;

use hub_core::agents::{AgentChannel, ResourceInfo, ToolCallOutput, ToolInfo};
use hub_core::{Error, Result};

/// Convert an rmcp tool listing into the core's tool description
pub fn tool_info(tool: Tool) -> ToolInfo {
    ToolInfo {
        name: tool.name.to_string(),
        description: tool.description.clone().unwrap_or_default().to_string(),
        input_schema: JsonValue::Object(tool.input_schema.as_ref().clone()),
    }
}

/// Join the text parts of a tool result
pub fn text_content<I>(content: I) -> String
where
    I: IntoIterator<Item = RawContent>,
{
    content
        .into_iter()
        .filter_map(|c| match c {
            RawContent::Text(text) => Some(text.text),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Channel over a running MCP client session
pub struct McpChannel {
    agent_id: String,
    server_name: String,
    peer: Peer<RoleClient>,
    service: Mutex<Option<RunningService<RoleClient, ()>>>,
}

impl McpChannel {
    pub fn new(agent_id: impl Into<String>, service: RunningService<RoleClient, ()>) -> Self {
        let server_name = service
            .peer_info()
            .map(|info| info.server_info.name.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        Self {
            agent_id: agent_id.into(),
            server_name,
            peer: service.peer().clone(),
            service: Mutex::new(Some(service)),
        }
    }

    /// Name the server reported during initialization
    pub fn server_name(&self) -> &str {
        &self.server_name
    }
}

#[async_trait]
impl AgentChannel for McpChannel {
    async fn list_tools(&self) -> Result<Vec<ToolInfo>> {
        let result = self
            .peer
            .list_tools(Default::default())
            .await
            .map_err(|e| Error::connection(&self.agent_id, format!("Failed to list tools: {}", e)))?;
        Ok(result.tools.into_iter().map(tool_info).collect())
    }

    async fn list_resources(&self) -> Result<Vec<ResourceInfo>> {
        let result = self
            .peer
            .list_resources(Default::default())
            .await
            .map_err(|e| Error::connection(&self.agent_id, format!("Failed to list resources: {}", e)))?;
        Ok(result
            .resources
            .into_iter()
            .map(|r| ResourceInfo {
                uri: r.raw.uri,
                name: r.raw.name,
            })
            .collect())
    }

    async fn call_tool(&self, name: &str, args: JsonValue) -> Result<ToolCallOutput> {
        let result = self
            .peer
            .call_tool(CallToolRequestParams {
                meta: None,
                name: name.to_string().into(),
                arguments: args.as_object().cloned(),
                task: None,
            })
            .await
            .map_err(|e| Error::tool_invocation(&self.agent_id, format!("Tool call failed: {}", e)))?;

        let content = text_content(result.content.into_iter().map(|c| c.raw));
        Ok(ToolCallOutput {
            content,
            is_error: result.is_error.unwrap_or(false),
        })
    }

    async fn close(&self) -> Result<()> {
        let Some(service) = self.service.lock().await.take() else {
            return Ok(());
        };
        let reason = service
            .cancel()
            .await
            .map_err(|e| Error::connection(&self.agent_id, format!("Shutdown failed: {}", e)))?;
        debug!(agent_id = %self.agent_id, ?reason, "MCP session closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_content_joins_text_parts() {
        let parts = vec![RawContent::text("first"), RawContent::text("second")];
        assert_eq!(text_content(parts), "first\nsecond");
        assert_eq!(text_content(Vec::new()), "");
    }
}
