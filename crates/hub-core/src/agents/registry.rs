//! Agent Registry
//!
//! Owns every agent connection: registration, lookup, tool calls and
//! teardown. The connection map has a single writer (this type); routing and
//! dispatch read snapshots of it.

use futures::future::join_all;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use super::channel::{ChannelConnector, VirtualOnlyConnector};
use super::connection::AgentConnection;
use super::types::{AgentConfig, SubAgent, ToolCallOutput};
use crate::events::EventBus;
use crate::{Error, Result};

/// Default advisory connection limit
pub const DEFAULT_MAX_CONCURRENT: usize = 10;

/// Registry of sub-agent connections
pub struct AgentRegistry {
    connections: RwLock<HashMap<String, Arc<AgentConnection>>>,
    connector: Arc<dyn ChannelConnector>,
    max_concurrent: usize,
    next_sequence: AtomicU64,
    events: EventBus,
}

impl AgentRegistry {
    /// Create a registry that opens channels through `connector`
    pub fn new(connector: Arc<dyn ChannelConnector>, events: EventBus) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            connector,
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            next_sequence: AtomicU64::new(0),
            events,
        }
    }

    /// Registry that can only host virtual agents
    pub fn virtual_only() -> Self {
        Self::new(Arc::new(VirtualOnlyConnector), EventBus::default())
    }

    /// Set the advisory connection limit reported by `can_accept_connection`
    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent;
        self
    }

    /// Register and connect a sub-agent
    ///
    /// Fails only on a duplicate id. A connection or discovery failure is
    /// logged and leaves the agent registered in `Error` status.
    pub async fn register_agent(&self, config: AgentConfig) -> Result<SubAgent> {
        let connection = {
            let mut connections = self.connections.write().await;
            if connections.contains_key(&config.id) {
                return Err(Error::DuplicateAgent(config.id));
            }
            let sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed);
            let connection = Arc::new(AgentConnection::new(&config, sequence, self.events.clone()));
            connections.insert(config.id.clone(), connection.clone());
            connection
        };

        info!(
            agent_id = %config.id,
            agent_type = %config.agent_type,
            endpoint = %connection.agent().endpoint,
            "Registering sub-agent"
        );

        if let Err(e) = connection.connect(self.connector.as_ref()).await {
            error!(agent_id = %config.id, error = %e, "Failed to connect sub-agent");
        }

        Ok(connection.agent())
    }

    /// Remove an agent and close its channel
    pub async fn unregister_agent(&self, id: &str) -> Result<SubAgent> {
        let connection = self
            .connections
            .write()
            .await
            .remove(id)
            .ok_or_else(|| Error::AgentNotFound(id.to_string()))?;

        if let Err(e) = connection.disconnect().await {
            warn!(agent_id = id, error = %e, "Error while disconnecting sub-agent");
        }
        info!(agent_id = id, "Unregistered sub-agent");
        Ok(connection.agent())
    }

    pub async fn get_connection(&self, id: &str) -> Option<Arc<AgentConnection>> {
        self.connections.read().await.get(id).cloned()
    }

    /// Snapshot of every registered agent, in registration order
    pub async fn get_all_agents(&self) -> Vec<SubAgent> {
        let connections = self.connections.read().await;
        let mut ordered: Vec<_> = connections.values().collect();
        ordered.sort_by_key(|c| c.sequence());
        ordered.into_iter().map(|c| c.agent()).collect()
    }

    /// Call a tool on one agent
    pub async fn call_tool(&self, agent_id: &str, name: &str, args: JsonValue) -> Result<ToolCallOutput> {
        let connection = self
            .get_connection(agent_id)
            .await
            .ok_or_else(|| Error::AgentNotFound(agent_id.to_string()))?;
        connection.call_tool(name, args).await
    }

    /// Whether another agent fits under the advisory limit. Registration
    /// does not consult this.
    pub async fn can_accept_connection(&self) -> bool {
        self.connections.read().await.len() < self.max_concurrent
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.connections.read().await.is_empty()
    }

    /// Disconnect every agent concurrently. Failures are logged and skipped.
    pub async fn disconnect_all(&self) {
        let connections: Vec<_> = self.connections.read().await.values().cloned().collect();
        info!(agent_count = connections.len(), "Disconnecting all sub-agents");

        let outcomes = join_all(connections.iter().map(|c| c.disconnect())).await;
        for (connection, outcome) in connections.iter().zip(outcomes) {
            if let Err(e) = outcome {
                warn!(agent_id = connection.id(), error = %e, "Failed to disconnect sub-agent");
            }
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::channel::mock::{MockChannel, MockConnector};
    use crate::agents::{AgentStatus, AgentType, ConnectionKind};
    use serde_json::json;

    fn network(id: &str, agent_type: AgentType) -> AgentConfig {
        AgentConfig::new(
            id,
            id,
            agent_type,
            ConnectionKind::Network {
                url: format!("http://{}.local/mcp", id),
            },
        )
    }

    #[tokio::test]
    async fn test_register_duplicate_fails() {
        let registry = AgentRegistry::virtual_only();
        registry
            .register_agent(AgentConfig::virtual_agent("a", "A", AgentType::Task))
            .await
            .unwrap();

        let err = registry
            .register_agent(AgentConfig::virtual_agent("a", "Again", AgentType::Task))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateAgent(id) if id == "a"));
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_connection_failure_keeps_agent_registered() {
        let registry = AgentRegistry::new(Arc::new(MockConnector::default()), EventBus::default());
        let agent = registry.register_agent(network("kb", AgentType::Knowledge)).await.unwrap();

        assert_eq!(agent.status, AgentStatus::Error);
        assert!(registry.get_connection("kb").await.is_some());
    }

    #[tokio::test]
    async fn test_get_all_agents_in_registration_order() {
        let registry = AgentRegistry::virtual_only();
        for id in ["c", "a", "b"] {
            registry
                .register_agent(AgentConfig::virtual_agent(id, id, AgentType::Dynamic))
                .await
                .unwrap();
        }
        let ids: Vec<_> = registry.get_all_agents().await.into_iter().map(|a| a.id).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }

    #[tokio::test]
    async fn test_call_tool_routes_to_agent() {
        let channel = Arc::new(MockChannel::replying("validated"));
        let connector = MockConnector::default().with("v", channel.clone());
        let registry = AgentRegistry::new(Arc::new(connector), EventBus::default());
        registry.register_agent(network("v", AgentType::Validator)).await.unwrap();

        let output = registry
            .call_tool("v", "process", json!({ "prompt": "check" }))
            .await
            .unwrap();
        assert_eq!(output.content, "validated");
        assert_eq!(channel.last_args.lock().clone(), Some(json!({ "prompt": "check" })));
    }

    #[tokio::test]
    async fn test_call_tool_unknown_agent() {
        let registry = AgentRegistry::virtual_only();
        let err = registry.call_tool("ghost", "process", json!({})).await.unwrap_err();
        assert!(matches!(err, Error::AgentNotFound(_)));
    }

    #[tokio::test]
    async fn test_can_accept_connection_is_advisory() {
        let registry = AgentRegistry::virtual_only().with_max_concurrent(1);
        assert!(registry.can_accept_connection().await);
        registry
            .register_agent(AgentConfig::virtual_agent("a", "A", AgentType::Task))
            .await
            .unwrap();
        assert!(!registry.can_accept_connection().await);

        // The limit is not enforced on registration
        registry
            .register_agent(AgentConfig::virtual_agent("b", "B", AgentType::Task))
            .await
            .unwrap();
        assert_eq!(registry.len().await, 2);
    }

    #[tokio::test]
    async fn test_disconnect_all_is_best_effort() {
        let bad = Arc::new(MockChannel {
            fail_close: true,
            ..MockChannel::replying("x")
        });
        let good = Arc::new(MockChannel::replying("y"));
        let connector = MockConnector::default().with("bad", bad.clone()).with("good", good.clone());
        let registry = AgentRegistry::new(Arc::new(connector), EventBus::default());
        registry.register_agent(network("bad", AgentType::Task)).await.unwrap();
        registry.register_agent(network("good", AgentType::Task)).await.unwrap();

        registry.disconnect_all().await;

        for agent in registry.get_all_agents().await {
            assert_eq!(agent.status, AgentStatus::Disconnected);
        }
        assert_eq!(good.closed.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(bad.closed.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unregister_then_reregister() {
        let registry = AgentRegistry::virtual_only();
        registry
            .register_agent(AgentConfig::virtual_agent("a", "A", AgentType::Task))
            .await
            .unwrap();
        registry.unregister_agent("a").await.unwrap();
        assert!(registry.is_empty().await);

        let agent = registry
            .register_agent(AgentConfig::virtual_agent("a", "A", AgentType::Task))
            .await
            .unwrap();
        assert_eq!(agent.status, AgentStatus::Idle);
    }
}
