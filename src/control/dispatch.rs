//! Correlated async dispatch to remote agents.
//!
//! Each dispatch gets a unique message id and a pending record that is
//! resolved exactly once, by whichever arrives first: a matching response
//! frame, the timeout sweep, or the agent's disconnection. Resolution is
//! structural: the pending record is removed from the map and its oneshot
//! consumed, so a second response for the same id finds nothing to resolve
//! and is discarded as an anomaly.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::control::registry::ConnectionRegistry;
use crate::error::{Error, Result};
use crate::events::{Event, EventBus};
use crate::protocol::{Frame, Usage};

/// Lifecycle of one dispatch request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchStatus {
    Pending,
    InFlight,
    Completed,
    TimedOut,
    Failed,
}

/// Terminal failure of a dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchFailure {
    /// The agent's connection went away while the request was in flight.
    Disconnected,
    /// The deadline elapsed before any terminal response.
    TimedOut,
    /// The agent answered with an error.
    Error(String),
}

impl std::fmt::Display for DispatchFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DispatchFailure::Disconnected => write!(f, "disconnected"),
            DispatchFailure::TimedOut => write!(f, "timed_out"),
            DispatchFailure::Error(msg) => write!(f, "error: {}", msg),
        }
    }
}

/// Successful dispatch payload.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchReply {
    pub content: String,
    pub usage: Option<Usage>,
}

/// Terminal outcome of a dispatch.
pub type DispatchResult = std::result::Result<DispatchReply, DispatchFailure>;

/// Awaitable bound to one message id.
#[derive(Debug)]
pub struct DispatchHandle {
    message_id: String,
    rx: oneshot::Receiver<DispatchResult>,
}

impl DispatchHandle {
    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    /// Await the terminal outcome.
    pub async fn wait(self) -> DispatchResult {
        self.rx
            .await
            .unwrap_or_else(|_| Err(DispatchFailure::Error("coordinator dropped".to_string())))
    }

    /// Test-only: a handle that is already resolved.
    #[cfg(test)]
    pub fn pre_resolved(message_id: &str, result: DispatchResult) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(result);
        Self {
            message_id: message_id.to_string(),
            rx,
        }
    }

    /// Non-blocking poll; `None` while still unresolved.
    pub fn poll_now(&mut self) -> Option<DispatchResult> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => {
                Some(Err(DispatchFailure::Error("coordinator dropped".to_string())))
            }
        }
    }
}

/// Cumulative per-agent dispatch accounting.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DispatchStats {
    pub dispatched: u64,
    pub completed: u64,
    pub failed: u64,
    pub timed_out: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

struct PendingDispatch {
    agent_id: String,
    tx: oneshot::Sender<DispatchResult>,
    deadline: Instant,
    status: DispatchStatus,
}

/// Message broker correlating dispatches with their async responses.
pub struct DispatchCoordinator {
    registry: Arc<ConnectionRegistry>,
    events: EventBus,
    default_timeout: Duration,
    pending: Mutex<HashMap<String, PendingDispatch>>,
    stats: Mutex<HashMap<String, DispatchStats>>,
}

impl DispatchCoordinator {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        events: EventBus,
        default_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            events,
            default_timeout,
            pending: Mutex::new(HashMap::new()),
            stats: Mutex::new(HashMap::new()),
        }
    }

    /// Send a task to a remote agent and return an awaitable for its
    /// terminal outcome.
    ///
    /// Fails `NotConnected` immediately, without starting any timer, if
    /// the target holds no connection.
    pub fn dispatch(
        &self,
        agent_id: &str,
        content: &str,
        context: Option<serde_json::Value>,
        timeout: Option<Duration>,
    ) -> Result<DispatchHandle> {
        let Some((sender, _generation)) = self.registry.sender_for(agent_id) else {
            return Err(Error::NotConnected(agent_id.to_string()));
        };

        let message_id = Frame::generate_message_id();
        let deadline = Instant::now() + timeout.unwrap_or(self.default_timeout);
        let (tx, rx) = oneshot::channel();

        {
            let mut pending = self.pending.lock().unwrap();
            pending.insert(
                message_id.clone(),
                PendingDispatch {
                    agent_id: agent_id.to_string(),
                    tx,
                    deadline,
                    status: DispatchStatus::Pending,
                },
            );
        }

        let frame = Frame::Dispatch {
            message_id: message_id.clone(),
            content: content.to_string(),
            context,
        };
        if sender.send(frame).is_err() {
            // Writer task already gone; treat as never connected.
            self.pending.lock().unwrap().remove(&message_id);
            return Err(Error::NotConnected(agent_id.to_string()));
        }

        {
            let mut pending = self.pending.lock().unwrap();
            if let Some(record) = pending.get_mut(&message_id) {
                record.status = DispatchStatus::InFlight;
            }
        }
        self.stats
            .lock()
            .unwrap()
            .entry(agent_id.to_string())
            .or_default()
            .dispatched += 1;

        self.events.emit(Event::TaskDispatched {
            agent_id: agent_id.to_string(),
            message_id: message_id.clone(),
        });
        tracing::debug!(agent_id, message_id, "Dispatched");

        Ok(DispatchHandle { message_id, rx })
    }

    /// Forward a progress frame to observers. Never resolves anything.
    pub fn on_progress(&self, message_id: &str, status: &str, detail: Option<String>) {
        let known = self.pending.lock().unwrap().contains_key(message_id);
        if !known {
            tracing::warn!(message_id, "Progress for unknown dispatch discarded");
            return;
        }
        self.events.emit(Event::AgentProgress {
            message_id: message_id.to_string(),
            status: status.to_string(),
            detail,
        });
    }

    /// Resolve a dispatch with its terminal response.
    ///
    /// Returns false when the id is unknown or already resolved; such
    /// responses are discarded and logged as anomalies, not errors.
    pub fn on_response(
        &self,
        message_id: &str,
        content: Option<String>,
        usage: Option<Usage>,
        error: Option<String>,
    ) -> bool {
        let Some(record) = self.pending.lock().unwrap().remove(message_id) else {
            tracing::warn!(message_id, "Late or duplicate response discarded");
            return false;
        };

        let success = error.is_none();
        let result = match error {
            Some(err) => Err(DispatchFailure::Error(err)),
            None => Ok(DispatchReply {
                content: content.unwrap_or_default(),
                usage: usage.clone(),
            }),
        };

        {
            let mut stats = self.stats.lock().unwrap();
            let agent_stats = stats.entry(record.agent_id.clone()).or_default();
            if success {
                agent_stats.completed += 1;
                if let Some(usage) = &usage {
                    agent_stats.input_tokens += usage.input_tokens;
                    agent_stats.output_tokens += usage.output_tokens;
                }
            } else {
                agent_stats.failed += 1;
            }
        }

        let _ = record.tx.send(result);
        self.events.emit(Event::AgentResponse {
            message_id: message_id.to_string(),
            success,
        });
        tracing::debug!(message_id, success, "Dispatch resolved");
        true
    }

    /// Resolve every dispatch whose deadline has elapsed as timed out.
    ///
    /// A response arriving after this finds no pending record and is
    /// discarded. Returns the number of dispatches timed out.
    pub fn sweep_timeouts(&self, now: Instant) -> usize {
        let expired: Vec<(String, PendingDispatch)> = {
            let mut pending = self.pending.lock().unwrap();
            let ids: Vec<String> = pending
                .iter()
                .filter(|(_, record)| now >= record.deadline)
                .map(|(id, _)| id.clone())
                .collect();
            ids.into_iter()
                .filter_map(|id| pending.remove(&id).map(|record| (id, record)))
                .collect()
        };

        let count = expired.len();
        for (message_id, record) in expired {
            tracing::warn!(message_id, agent_id = %record.agent_id, "Dispatch timed out");
            self.stats
                .lock()
                .unwrap()
                .entry(record.agent_id.clone())
                .or_default()
                .timed_out += 1;
            let _ = record.tx.send(Err(DispatchFailure::TimedOut));
        }
        count
    }

    /// Resolve every in-flight dispatch for one agent as disconnected.
    pub fn fail_agent(&self, agent_id: &str) -> usize {
        let failed: Vec<(String, PendingDispatch)> = {
            let mut pending = self.pending.lock().unwrap();
            let ids: Vec<String> = pending
                .iter()
                .filter(|(_, record)| record.agent_id == agent_id)
                .map(|(id, _)| id.clone())
                .collect();
            ids.into_iter()
                .filter_map(|id| pending.remove(&id).map(|record| (id, record)))
                .collect()
        };

        let count = failed.len();
        for (message_id, record) in failed {
            tracing::warn!(message_id, agent_id, "Dispatch failed: agent disconnected");
            self.stats
                .lock()
                .unwrap()
                .entry(record.agent_id.clone())
                .or_default()
                .failed += 1;
            let _ = record.tx.send(Err(DispatchFailure::Disconnected));
        }
        count
    }

    /// Number of unresolved dispatches.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().unwrap().len()
    }

    /// Status of one pending dispatch, if still unresolved.
    pub fn status(&self, message_id: &str) -> Option<DispatchStatus> {
        self.pending
            .lock()
            .unwrap()
            .get(message_id)
            .map(|record| record.status)
    }

    /// Cumulative stats for one agent.
    pub fn stats_for(&self, agent_id: &str) -> DispatchStats {
        self.stats
            .lock()
            .unwrap()
            .get(agent_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Spawn the periodic timeout sweep.
    pub fn spawn_sweeper(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                self.sweep_timeouts(Instant::now());
            }
        })
    }
}
