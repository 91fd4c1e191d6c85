//! Live agent connection registry.
//!
//! One entry per agent id. A connection is owned exclusively by the
//! registry from successful handshake until unregistration or eviction;
//! the transport handle it carries is the write side of the connection's
//! outbound frame channel. Every accepted registration gets a fresh
//! generation number so sweeps can never evict a connection they did not
//! observe.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::backend::TokenValidator;
use crate::error::{Error, Result};
use crate::events::{Event, EventBus};
use crate::protocol::Frame;

/// Write side of a connection's outbound frame channel.
pub type FrameSender = mpsc::UnboundedSender<Frame>;

/// Whether an agent runs inside this process or behind a connection.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    Local,
    Remote,
}

/// Connection status of an agent.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Disconnected,
    Connecting,
    Connected,
    Stale,
}

/// Public view of a registered agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentIdentity {
    pub id: String,
    pub label: String,
    pub capabilities: Vec<String>,
    pub workdir: Option<String>,
    pub kind: AgentKind,
    pub status: AgentStatus,
}

/// A live transport binding.
struct Connection {
    sender: FrameSender,
    last_heartbeat: Instant,
    generation: u64,
}

struct AgentEntry {
    label: String,
    capabilities: Vec<String>,
    workdir: Option<String>,
    kind: AgentKind,
    status: AgentStatus,
    connection: Option<Connection>,
}

/// Registry of agent identities and their connections.
pub struct ConnectionRegistry {
    agents: Mutex<HashMap<String, AgentEntry>>,
    validator: Arc<dyn TokenValidator>,
    events: EventBus,
    heartbeat_timeout: Duration,
    next_generation: AtomicU64,
}

impl ConnectionRegistry {
    pub fn new(
        validator: Arc<dyn TokenValidator>,
        events: EventBus,
        heartbeat_timeout: Duration,
    ) -> Self {
        Self {
            agents: Mutex::new(HashMap::new()),
            validator,
            events,
            heartbeat_timeout,
            next_generation: AtomicU64::new(1),
        }
    }

    /// Register an agent connection. Returns the connection's generation.
    ///
    /// Fails `Unauthorized` on a bad token and `AlreadyConnected` if the
    /// agent already holds a live, non-stale connection. A stale connection
    /// is evicted first and the new registration accepted.
    pub fn register(
        &self,
        agent_id: &str,
        sender: FrameSender,
        token: &str,
        capabilities: Vec<String>,
        workdir: Option<String>,
    ) -> Result<u64> {
        if !self.validator.validate(agent_id, token) {
            return Err(Error::Unauthorized {
                agent_id: agent_id.to_string(),
                reason: "invalid token".to_string(),
            });
        }

        let now = Instant::now();
        let mut agents = self.agents.lock().unwrap();

        let entry = agents.entry(agent_id.to_string()).or_insert_with(|| AgentEntry {
            label: agent_id.to_string(),
            capabilities: Vec::new(),
            workdir: None,
            kind: AgentKind::Remote,
            status: AgentStatus::Connecting,
            connection: None,
        });

        if let Some(existing) = &entry.connection {
            let stale = entry.status == AgentStatus::Stale
                || now.duration_since(existing.last_heartbeat) > self.heartbeat_timeout;
            if !stale {
                return Err(Error::AlreadyConnected(agent_id.to_string()));
            }
            entry.connection = None;
            self.events.emit(Event::AgentDisconnected {
                agent_id: agent_id.to_string(),
            });
            tracing::info!(agent_id, "Evicted stale connection for re-registration");
        }

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        entry.capabilities = capabilities;
        entry.workdir = workdir;
        entry.kind = AgentKind::Remote;
        entry.status = AgentStatus::Connected;
        entry.connection = Some(Connection {
            sender,
            last_heartbeat: now,
            generation,
        });

        self.events.emit(Event::AgentConnected {
            agent_id: agent_id.to_string(),
        });
        tracing::info!(agent_id, generation, "Agent registered");
        Ok(generation)
    }

    /// Drop an agent's connection. Idempotent; returns whether a
    /// connection was actually removed.
    pub fn unregister(&self, agent_id: &str) -> bool {
        let mut agents = self.agents.lock().unwrap();
        let Some(entry) = agents.get_mut(agent_id) else {
            return false;
        };
        if entry.connection.take().is_none() {
            return false;
        }
        entry.status = AgentStatus::Disconnected;
        self.events.emit(Event::AgentDisconnected {
            agent_id: agent_id.to_string(),
        });
        tracing::info!(agent_id, "Agent unregistered");
        true
    }

    /// Drop an agent's connection only if it still carries `generation`.
    ///
    /// Connection teardown paths use this so a reader task finishing late
    /// cannot tear down a newer registration that replaced it.
    pub fn unregister_generation(&self, agent_id: &str, generation: u64) -> bool {
        let current = {
            let agents = self.agents.lock().unwrap();
            agents
                .get(agent_id)
                .and_then(|e| e.connection.as_ref())
                .map(|c| c.generation)
        };
        if current != Some(generation) {
            return false;
        }
        self.unregister(agent_id)
    }

    /// Record a liveness signal. No-op for unknown or disconnected agents.
    pub fn record_heartbeat(&self, agent_id: &str) {
        let mut agents = self.agents.lock().unwrap();
        if let Some(entry) = agents.get_mut(agent_id) {
            if let Some(conn) = entry.connection.as_mut() {
                conn.last_heartbeat = Instant::now();
                entry.status = AgentStatus::Connected;
            }
        }
    }

    /// Whether an agent currently holds a connection.
    pub fn is_connected(&self, agent_id: &str) -> bool {
        let agents = self.agents.lock().unwrap();
        agents
            .get(agent_id)
            .map(|e| e.connection.is_some())
            .unwrap_or(false)
    }

    /// Transport handle and generation for an agent's connection.
    pub fn sender_for(&self, agent_id: &str) -> Option<(FrameSender, u64)> {
        let agents = self.agents.lock().unwrap();
        agents
            .get(agent_id)
            .and_then(|e| e.connection.as_ref())
            .map(|c| (c.sender.clone(), c.generation))
    }

    /// Current status of an agent id.
    pub fn status(&self, agent_id: &str) -> AgentStatus {
        let agents = self.agents.lock().unwrap();
        agents
            .get(agent_id)
            .map(|e| e.status)
            .unwrap_or(AgentStatus::Disconnected)
    }

    /// Snapshot of one agent's identity.
    pub fn identity(&self, agent_id: &str) -> Option<AgentIdentity> {
        let agents = self.agents.lock().unwrap();
        agents.get(agent_id).map(|e| to_identity(agent_id, e))
    }

    /// Snapshot of all known agents.
    pub fn list(&self) -> Vec<AgentIdentity> {
        let agents = self.agents.lock().unwrap();
        let mut out: Vec<AgentIdentity> =
            agents.iter().map(|(id, e)| to_identity(id, e)).collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }

    /// Delete an agent entirely, connection and identity both.
    pub fn remove(&self, agent_id: &str) -> bool {
        self.unregister(agent_id);
        let mut agents = self.agents.lock().unwrap();
        agents.remove(agent_id).is_some()
    }

    /// Mark overdue connections stale and return their (id, generation)
    /// pairs for the sweep to act on.
    pub fn mark_stale(&self, now: Instant) -> Vec<(String, u64)> {
        let mut agents = self.agents.lock().unwrap();
        let mut stale = Vec::new();
        for (id, entry) in agents.iter_mut() {
            if let Some(conn) = &entry.connection {
                if now.duration_since(conn.last_heartbeat) > self.heartbeat_timeout {
                    entry.status = AgentStatus::Stale;
                    stale.push((id.clone(), conn.generation));
                }
            }
        }
        stale
    }

    /// Evict a stale connection if it still carries `generation`.
    ///
    /// Re-checks the generation under the lock: a registration that landed
    /// between the sweep's observation and this call wins, and the eviction
    /// becomes a no-op. Returns how long the agent had been silent.
    pub fn evict(&self, agent_id: &str, generation: u64, now: Instant) -> Option<Duration> {
        let silent = {
            let mut agents = self.agents.lock().unwrap();
            let entry = agents.get_mut(agent_id)?;
            let conn = entry.connection.as_ref()?;
            if conn.generation != generation {
                return None;
            }
            let silent = now.duration_since(conn.last_heartbeat);
            entry.connection = None;
            entry.status = AgentStatus::Disconnected;
            silent
        };

        self.events.emit(Event::AgentHeartbeatLost {
            agent_id: agent_id.to_string(),
            silent_ms: silent.as_millis() as u64,
        });
        self.events.emit(Event::AgentDisconnected {
            agent_id: agent_id.to_string(),
        });
        tracing::warn!(agent_id, silent_ms = silent.as_millis() as u64, "Heartbeat lost, connection evicted");
        Some(silent)
    }
}

fn to_identity(id: &str, entry: &AgentEntry) -> AgentIdentity {
    AgentIdentity {
        id: id.to_string(),
        label: entry.label.clone(),
        capabilities: entry.capabilities.clone(),
        workdir: entry.workdir.clone(),
        kind: entry.kind,
        status: entry.status,
    }
}
