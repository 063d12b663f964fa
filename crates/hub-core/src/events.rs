//! Event bus
//!
//! Typed pub/sub over a tokio broadcast channel. Publishers never block; a
//! subscriber that falls behind by more than the channel capacity loses the
//! oldest events and is told how many it missed.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::agents::AgentStatus;

/// Everything the hub announces to observers
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HubEvent {
    AgentStatusChanged {
        agent_id: String,
        from: AgentStatus,
        to: AgentStatus,
    },
    FixAttemptRecorded {
        attempt_id: String,
        failure_type: String,
        success: bool,
    },
    PatternLearned {
        pattern_id: String,
        failure_type: String,
        confidence: f64,
        reinforced: bool,
    },
    ValidatorResult {
        request_id: String,
        agent_id: String,
        confidence: f64,
    },
    ConflictDetected {
        request_id: String,
        spread: f64,
        agent_ids: Vec<String>,
    },
}

/// Event bus shared by every hub component
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<HubEvent>>,
}

impl EventBus {
    /// Create a new event bus buffering up to `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn with_default_capacity() -> Self {
        Self::new(1000)
    }

    /// Publish an event to all current subscribers
    pub fn publish(&self, event: HubEvent) {
        debug!(?event, "Publishing hub event");
        if self.sender.send(event).is_err() {
            debug!("No subscribers listening to event");
        }
    }

    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

/// Receiving half of a subscription
pub struct EventReceiver {
    receiver: broadcast::Receiver<HubEvent>,
}

impl EventReceiver {
    pub async fn recv(&mut self) -> Result<HubEvent, EventBusError> {
        self.receiver.recv().await.map_err(|e| match e {
            broadcast::error::RecvError::Closed => EventBusError::Closed,
            broadcast::error::RecvError::Lagged(n) => {
                warn!("Event receiver lagged by {} events", n);
                EventBusError::Lagged(n)
            }
        })
    }

    pub fn try_recv(&mut self) -> Result<HubEvent, EventBusError> {
        self.receiver.try_recv().map_err(|e| match e {
            broadcast::error::TryRecvError::Empty => EventBusError::Empty,
            broadcast::error::TryRecvError::Closed => EventBusError::Closed,
            broadcast::error::TryRecvError::Lagged(n) => {
                warn!("Event receiver lagged by {} events", n);
                EventBusError::Lagged(n)
            }
        })
    }
}

/// Errors that can occur when receiving events
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum EventBusError {
    #[error("Event bus is closed")]
    Closed,

    #[error("No events available")]
    Empty,

    #[error("Receiver lagged by {0} events")]
    Lagged(u64),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_subscribe() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();

        bus.publish(HubEvent::FixAttemptRecorded {
            attempt_id: "a-1".into(),
            failure_type: "build".into(),
            success: true,
        });

        match rx.recv().await.unwrap() {
            HubEvent::FixAttemptRecorded { attempt_id, .. } => assert_eq!(attempt_id, "a-1"),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::default();
        assert_eq!(bus.subscriber_count(), 0);
        bus.publish(HubEvent::ConflictDetected {
            request_id: "r".into(),
            spread: 0.5,
            agent_ids: vec![],
        });
    }

    #[test]
    fn test_try_recv_empty() {
        let bus = EventBus::new(2);
        let mut rx = bus.subscribe();
        assert_eq!(rx.try_recv().unwrap_err(), EventBusError::Empty);
    }

    #[test]
    fn test_lagged_receiver() {
        let bus = EventBus::new(1);
        let mut rx = bus.subscribe();
        for i in 0..3 {
            bus.publish(HubEvent::ValidatorResult {
                request_id: format!("r{}", i),
                agent_id: "v".into(),
                confidence: 0.9,
            });
        }
        assert!(matches!(rx.try_recv(), Err(EventBusError::Lagged(_))));
    }
}
