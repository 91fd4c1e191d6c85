//! Typed control-plane and simulation events on a broadcast bus.
//!
//! Every component that observes the system (CLI output, tests, future
//! sinks) subscribes here. Publishing never blocks and never fails: with no
//! subscribers the event is simply dropped after being traced.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Default buffered capacity of the event channel.
const DEFAULT_CAPACITY: usize = 1024;

/// Everything observable that happens in the control plane or the simulation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// An agent completed registration.
    AgentConnected { agent_id: String },
    /// An agent was unregistered (explicitly or after transport loss).
    AgentDisconnected { agent_id: String },
    /// The heartbeat sweep evicted an agent that went silent.
    AgentHeartbeatLost { agent_id: String, silent_ms: u64 },
    /// A dispatch frame was sent to a remote agent.
    TaskDispatched { agent_id: String, message_id: String },
    /// A progress frame arrived for an in-flight dispatch.
    AgentProgress {
        message_id: String,
        status: String,
        detail: Option<String>,
    },
    /// A terminal response frame resolved a dispatch.
    AgentResponse { message_id: String, success: bool },
    /// A simulation message passed the graph gate and was delivered.
    MessageSent { from: String, to: String, tick: u64 },
    /// A simulation message was blocked by the communication graph.
    MessageBlockedByGraph { from: String, to: String, tick: u64 },
    /// One tick of the simulation completed.
    TickAdvanced { tick: u64, messages_enqueued: usize },
}

/// Broadcast bus carrying [`Event`] values to any number of subscribers.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<Event>>,
}

impl EventBus {
    /// Create a bus with the given buffered capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Publish an event to all subscribers.
    pub fn emit(&self, event: Event) {
        tracing::debug!(?event, "event");
        let _ = self.sender.send(event);
    }

    /// Subscribe to all events from this point on.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// Drain every event currently buffered on a receiver.
///
/// Test helper: subscribe before acting, act, then collect.
#[cfg(test)]
pub fn drain(rx: &mut broadcast::Receiver<Event>) -> Vec<Event> {
    let mut out = Vec::new();
    while let Ok(event) = rx.try_recv() {
        out.push(event);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emit_reaches_subscriber() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        bus.emit(Event::AgentConnected {
            agent_id: "agent-1".to_string(),
        });

        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0],
            Event::AgentConnected {
                agent_id: "agent-1".to_string()
            }
        );
    }

    #[test]
    fn emit_without_subscribers_is_fine() {
        let bus = EventBus::default();
        bus.emit(Event::TickAdvanced {
            tick: 0,
            messages_enqueued: 0,
        });
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let json = serde_json::to_string(&Event::MessageBlockedByGraph {
            from: "a".to_string(),
            to: "b".to_string(),
            tick: 3,
        })
        .unwrap();
        assert!(json.contains("\"type\":\"message_blocked_by_graph\""));
    }
}
