//! Agent channel traits
//!
//! The wire protocol used to reach a sub-agent is opaque to the core. A
//! channel only has to list its tools/resources and forward tool calls; a
//! connector opens channels for the non-virtual connection kinds.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::sync::Arc;

use super::types::{ConnectionKind, ResourceInfo, ToolCallOutput, ToolInfo};
use crate::Result;

/// Live request/response channel to one sub-agent
#[async_trait]
pub trait AgentChannel: Send + Sync {
    /// List the tools the agent exposes
    async fn list_tools(&self) -> Result<Vec<ToolInfo>>;

    /// List the resources the agent exposes
    async fn list_resources(&self) -> Result<Vec<ResourceInfo>>;

    /// Invoke a tool by name
    async fn call_tool(&self, name: &str, args: JsonValue) -> Result<ToolCallOutput>;

    /// Tear down the channel
    async fn close(&self) -> Result<()>;
}

/// Opens channels for process- and network-attached agents
#[async_trait]
pub trait ChannelConnector: Send + Sync {
    async fn connect(&self, agent_id: &str, kind: &ConnectionKind) -> Result<Arc<dyn AgentChannel>>;
}

/// Connector that refuses every connection; only virtual agents work with it
#[derive(Debug, Default, Clone, Copy)]
pub struct VirtualOnlyConnector;

#[async_trait]
impl ChannelConnector for VirtualOnlyConnector {
    async fn connect(&self, agent_id: &str, kind: &ConnectionKind) -> Result<Arc<dyn AgentChannel>> {
        Err(crate::Error::connection(
            agent_id,
            format!("no channel connector configured for {}", kind.endpoint(agent_id)),
        ))
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use crate::Error;

    /// Scripted channel for tests
    pub struct MockChannel {
        pub reply: String,
        pub fail: AtomicBool,
        pub calls: AtomicUsize,
        pub last_args: Mutex<Option<JsonValue>>,
        pub closed: AtomicUsize,
        pub fail_close: bool,
    }

    impl MockChannel {
        pub fn replying(reply: impl Into<String>) -> Self {
            Self {
                reply: reply.into(),
                fail: AtomicBool::new(false),
                calls: AtomicUsize::new(0),
                last_args: Mutex::new(None),
                closed: AtomicUsize::new(0),
                fail_close: false,
            }
        }

        pub fn failing() -> Self {
            Self {
                fail: AtomicBool::new(true),
                ..Self::replying("")
            }
        }
    }

    #[async_trait]
    impl AgentChannel for MockChannel {
        async fn list_tools(&self) -> Result<Vec<ToolInfo>> {
            Ok(vec![ToolInfo {
                name: "process".into(),
                description: "Process a prompt".into(),
                input_schema: serde_json::json!({ "type": "object" }),
            }])
        }

        async fn list_resources(&self) -> Result<Vec<ResourceInfo>> {
            Ok(vec![ResourceInfo {
                uri: "file:///rules.md".into(),
                name: "rules".into(),
            }])
        }

        async fn call_tool(&self, name: &str, args: JsonValue) -> Result<ToolCallOutput> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_args.lock() = Some(args);
            if self.fail.load(Ordering::SeqCst) {
                return Err(Error::Other(format!("tool {} exploded", name)));
            }
            Ok(ToolCallOutput::success(self.reply.clone()))
        }

        async fn close(&self) -> Result<()> {
            self.closed.fetch_add(1, Ordering::SeqCst);
            if self.fail_close {
                return Err(Error::Other("close failed".into()));
            }
            Ok(())
        }
    }

    /// Connector handing out pre-built channels by agent id; unknown ids fail
    #[derive(Default)]
    pub struct MockConnector {
        pub channels: Mutex<HashMap<String, Arc<MockChannel>>>,
    }

    impl MockConnector {
        pub fn with(self, agent_id: &str, channel: Arc<MockChannel>) -> Self {
            self.channels.lock().insert(agent_id.to_string(), channel);
            self
        }
    }

    #[async_trait]
    impl ChannelConnector for MockConnector {
        async fn connect(&self, agent_id: &str, _kind: &ConnectionKind) -> Result<Arc<dyn AgentChannel>> {
            match self.channels.lock().get(agent_id) {
                Some(channel) => Ok(channel.clone() as Arc<dyn AgentChannel>),
                None => Err(Error::connection(agent_id, "connection refused")),
            }
        }
    }
}
