//! Agent connection
//!
//! Owns one sub-agent's channel, catalog and status. The status field is only
//! ever written from here.

use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::channel::{AgentChannel, ChannelConnector};
use super::types::{AgentConfig, AgentStatus, ConnectionKind, ResourceInfo, SubAgent, ToolCallOutput, ToolInfo};
use crate::events::{EventBus, HubEvent};
use crate::{Error, Result};

/// Tools and resources discovered on connect
#[derive(Debug, Clone, Default, Serialize)]
pub struct ToolCatalog {
    pub tools: Vec<ToolInfo>,
    pub resources: Vec<ResourceInfo>,
}

impl ToolCatalog {
    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.iter().any(|t| t.name == name)
    }
}

/// Live connection to one sub-agent
pub struct AgentConnection {
    agent: SubAgent,
    kind: ConnectionKind,
    status: RwLock<AgentStatus>,
    channel: RwLock<Option<Arc<dyn AgentChannel>>>,
    catalog: RwLock<ToolCatalog>,
    sequence: u64,
    events: EventBus,
}

impl AgentConnection {
    pub(crate) fn new(config: &AgentConfig, sequence: u64, events: EventBus) -> Self {
        Self {
            agent: SubAgent::from_config(config),
            kind: config.connection.clone(),
            status: RwLock::new(AgentStatus::Disconnected),
            channel: RwLock::new(None),
            catalog: RwLock::new(ToolCatalog::default()),
            sequence,
            events,
        }
    }

    pub fn id(&self) -> &str {
        &self.agent.id
    }

    pub fn kind(&self) -> &ConnectionKind {
        &self.kind
    }

    pub fn status(&self) -> AgentStatus {
        *self.status.read()
    }

    /// Registration order within the owning registry
    pub(crate) fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Snapshot of the agent with its current status
    pub fn agent(&self) -> SubAgent {
        SubAgent {
            status: self.status(),
            ..self.agent.clone()
        }
    }

    pub fn catalog(&self) -> ToolCatalog {
        self.catalog.read().clone()
    }

    fn transition(&self, to: AgentStatus) {
        let from = {
            let mut status = self.status.write();
            std::mem::replace(&mut *status, to)
        };
        if from != to {
            debug!(agent_id = %self.agent.id, %from, %to, "Agent status changed");
            self.events.publish(HubEvent::AgentStatusChanged {
                agent_id: self.agent.id.clone(),
                from,
                to,
            });
        }
    }

    /// Establish the connection according to its kind
    ///
    /// On failure the status is left at `Error` and the error is returned to
    /// the registry, which logs it instead of failing the registration.
    pub(crate) async fn connect(&self, connector: &dyn ChannelConnector) -> Result<()> {
        match &self.kind {
            ConnectionKind::Virtual => {
                self.transition(AgentStatus::Idle);
                info!(agent_id = %self.agent.id, "Virtual agent ready");
                Ok(())
            }
            ConnectionKind::Process { .. } | ConnectionKind::Network { .. } => {
                match self.open_and_discover(connector).await {
                    Ok(()) => {
                        self.transition(AgentStatus::Idle);
                        Ok(())
                    }
                    Err(e) => {
                        self.transition(AgentStatus::Error);
                        Err(e)
                    }
                }
            }
        }
    }

    async fn open_and_discover(&self, connector: &dyn ChannelConnector) -> Result<()> {
        let channel = connector.connect(&self.agent.id, &self.kind).await?;

        let tools = channel
            .list_tools()
            .await
            .map_err(|e| Error::connection(&self.agent.id, format!("tool discovery failed: {}", e)))?;
        let resources = channel
            .list_resources()
            .await
            .map_err(|e| Error::connection(&self.agent.id, format!("resource discovery failed: {}", e)))?;

        info!(
            agent_id = %self.agent.id,
            tool_count = tools.len(),
            resource_count = resources.len(),
            "Discovered agent capabilities"
        );

        *self.catalog.write() = ToolCatalog { tools, resources };
        *self.channel.write() = Some(channel);
        Ok(())
    }

    /// Invoke a tool on this agent
    pub async fn call_tool(&self, name: &str, args: JsonValue) -> Result<ToolCallOutput> {
        if self.status() == AgentStatus::Disconnected {
            return Err(Error::NotConnected(self.agent.id.clone()));
        }

        self.transition(AgentStatus::Busy);
        let started = Instant::now();

        let channel = self.channel.read().clone();
        let outcome = match channel {
            Some(channel) => channel.call_tool(name, args).await,
            None => Err(Error::Other(format!("{} has no tool channel", self.agent.endpoint))),
        };

        match outcome {
            Ok(output) => {
                self.transition(AgentStatus::Idle);
                debug!(
                    agent_id = %self.agent.id,
                    tool = name,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    is_error = output.is_error,
                    "Tool call completed"
                );
                Ok(output)
            }
            Err(e) => {
                self.transition(AgentStatus::Error);
                warn!(agent_id = %self.agent.id, tool = name, error = %e, "Tool call failed");
                Err(Error::tool_invocation(&self.agent.id, e.to_string()))
            }
        }
    }

    /// Close the channel and mark the agent disconnected
    pub(crate) async fn disconnect(&self) -> Result<()> {
        let channel = self.channel.write().take();
        self.transition(AgentStatus::Disconnected);
        if let Some(channel) = channel {
            channel.close().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::channel::mock::{MockChannel, MockConnector};
    use crate::agents::channel::VirtualOnlyConnector;
    use crate::agents::AgentType;
    use serde_json::json;

    fn process_config(id: &str) -> AgentConfig {
        AgentConfig::new(
            id,
            id.to_uppercase(),
            AgentType::Validator,
            ConnectionKind::Process {
                command: "agent".into(),
                args: vec![],
                env: Default::default(),
            },
        )
    }

    #[tokio::test]
    async fn test_virtual_connect_is_idle() {
        let conn = AgentConnection::new(
            &AgentConfig::virtual_agent("v", "V", AgentType::Dynamic),
            0,
            EventBus::default(),
        );
        conn.connect(&VirtualOnlyConnector).await.unwrap();
        assert_eq!(conn.status(), AgentStatus::Idle);
        assert!(conn.catalog().tools.is_empty());
    }

    #[tokio::test]
    async fn test_connect_discovers_catalog() {
        let connector = MockConnector::default().with("a", Arc::new(MockChannel::replying("ok")));
        let conn = AgentConnection::new(&process_config("a"), 0, EventBus::default());

        conn.connect(&connector).await.unwrap();

        assert_eq!(conn.status(), AgentStatus::Idle);
        let catalog = conn.catalog();
        assert!(catalog.has_tool("process"));
        assert_eq!(catalog.resources.len(), 1);
    }

    #[tokio::test]
    async fn test_connect_failure_sets_error() {
        let conn = AgentConnection::new(&process_config("a"), 0, EventBus::default());
        let err = conn.connect(&MockConnector::default()).await.unwrap_err();
        assert!(matches!(err, Error::Connection { .. }));
        assert_eq!(conn.status(), AgentStatus::Error);
    }

    #[tokio::test]
    async fn test_call_tool_when_disconnected() {
        let conn = AgentConnection::new(&process_config("a"), 0, EventBus::default());
        let err = conn.call_tool("process", json!({})).await.unwrap_err();
        assert!(matches!(err, Error::NotConnected(id) if id == "a"));
    }

    #[tokio::test]
    async fn test_call_tool_status_transitions() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        let connector = MockConnector::default().with("a", Arc::new(MockChannel::replying("done")));
        let conn = AgentConnection::new(&process_config("a"), 0, bus);
        conn.connect(&connector).await.unwrap();

        let output = conn.call_tool("process", json!({ "prompt": "hi" })).await.unwrap();
        assert_eq!(output.content, "done");
        assert_eq!(conn.status(), AgentStatus::Idle);

        let mut seen = vec![];
        while let Ok(HubEvent::AgentStatusChanged { to, .. }) = rx.try_recv() {
            seen.push(to);
        }
        assert_eq!(seen, vec![AgentStatus::Idle, AgentStatus::Busy, AgentStatus::Idle]);
    }

    #[tokio::test]
    async fn test_failed_call_leaves_error_status() {
        let connector = MockConnector::default().with("a", Arc::new(MockChannel::failing()));
        let conn = AgentConnection::new(&process_config("a"), 0, EventBus::default());
        conn.connect(&connector).await.unwrap();

        let err = conn.call_tool("process", json!({})).await.unwrap_err();
        assert!(matches!(err, Error::ToolInvocation { .. }));
        assert_eq!(conn.status(), AgentStatus::Error);
    }

    #[tokio::test]
    async fn test_successful_call_recovers_from_error() {
        let channel = Arc::new(MockChannel::failing());
        let connector = MockConnector::default().with("a", channel.clone());
        let conn = AgentConnection::new(&process_config("a"), 0, EventBus::default());
        conn.connect(&connector).await.unwrap();

        conn.call_tool("process", json!({})).await.unwrap_err();
        assert_eq!(conn.status(), AgentStatus::Error);

        channel.fail.store(false, std::sync::atomic::Ordering::SeqCst);
        let output = conn.call_tool("process", json!({})).await.unwrap();
        assert!(!output.is_error);
        assert_eq!(conn.status(), AgentStatus::Idle);
    }

    #[tokio::test]
    async fn test_virtual_call_has_no_channel() {
        let conn = AgentConnection::new(
            &AgentConfig::virtual_agent("v", "V", AgentType::Dynamic),
            0,
            EventBus::default(),
        );
        conn.connect(&VirtualOnlyConnector).await.unwrap();
        let err = conn.call_tool("process", json!({})).await.unwrap_err();
        assert!(matches!(err, Error::ToolInvocation { .. }));
    }

    #[tokio::test]
    async fn test_disconnect_closes_channel() {
        let channel = Arc::new(MockChannel::replying("ok"));
        let connector = MockConnector::default().with("a", channel.clone());
        let conn = AgentConnection::new(&process_config("a"), 0, EventBus::default());
        conn.connect(&connector).await.unwrap();

        conn.disconnect().await.unwrap();
        assert_eq!(conn.status(), AgentStatus::Disconnected);
        assert_eq!(channel.closed.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
