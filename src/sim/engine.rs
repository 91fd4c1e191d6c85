//! Tick engine: advances the simulation one atomic unit at a time.
//!
//! One tick pops exactly one message from the FIFO queue, gates it through
//! the communication graph, and either generates a deterministic stub reply
//! (local agents) or dispatches to the remote agent and buffers the pending
//! handle. Resolved remote responses are drained into the queue at the
//! start of the next tick, before the pop, so replay with the same
//! resolution schedule is identical. The engine owns no timer even in auto
//! mode; the caller drives every tick.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::SimulationSettings;
use crate::control::dispatch::{DispatchCoordinator, DispatchHandle};
use crate::control::registry::AgentKind;
use crate::error::{Error, Result};
use crate::events::{Event, EventBus};
use crate::sim::graph::CommunicationGraph;

/// How ticks are driven.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TickMode {
    /// The caller decides when each tick runs.
    #[default]
    Manual,
    /// The caller is expected to drive ticks on a timer at `auto_delay`.
    Auto,
}

/// Engine lifecycle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EngineStatus {
    Idle,
    Running,
    Paused,
    Completed,
}

/// One queued simulation message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SimMessage {
    pub from: String,
    pub to: String,
    pub content: String,
}

/// Roster entry: one participating agent with its role/model assignment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimAgent {
    pub id: String,
    #[serde(default)]
    pub label: String,
    pub role: String,
    pub model: String,
    pub kind: AgentKind,
}

/// What one `advance_tick` call did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickOutcome {
    /// Tick index after the call.
    pub tick: u64,
    /// Domain events emitted while processing the popped message.
    pub events_emitted: usize,
    /// Messages added to the queue (drained replies + generated replies).
    pub messages_enqueued: usize,
    /// Whether the engine transitioned to completed.
    pub completed: bool,
}

/// A dispatched remote reply the engine is still waiting on.
struct PendingRemote {
    responder: String,
    reply_to: String,
    handle: DispatchHandle,
}

/// The simulation coordinator.
///
/// Callers must serialize `advance_tick` calls on one instance; all state
/// is owned by the instance and nothing here spawns tasks.
pub struct TickEngine {
    status: EngineStatus,
    mode: TickMode,
    auto_delay: Duration,
    tick_budget: u32,
    settings: SimulationSettings,
    tick_index: u64,
    roster: HashMap<String, SimAgent>,
    graph: CommunicationGraph,
    queue: VecDeque<SimMessage>,
    acted: HashSet<String>,
    pending: Vec<PendingRemote>,
    dispatcher: Option<Arc<DispatchCoordinator>>,
    events: EventBus,
}

impl TickEngine {
    pub fn new(settings: SimulationSettings, events: EventBus) -> Self {
        Self {
            status: EngineStatus::Idle,
            mode: TickMode::Manual,
            auto_delay: Duration::from_millis(settings.auto_delay_min_ms),
            tick_budget: settings.tick_budget,
            settings,
            tick_index: 0,
            roster: HashMap::new(),
            graph: CommunicationGraph::default(),
            queue: VecDeque::new(),
            acted: HashSet::new(),
            pending: Vec::new(),
            dispatcher: None,
            events,
        }
    }

    /// Install the roster. Only while idle.
    pub fn set_roster(&mut self, agents: Vec<SimAgent>) -> Result<()> {
        self.require_idle("set roster")?;
        self.roster = agents
            .into_iter()
            .map(|mut a| {
                if a.label.is_empty() {
                    a.label = a.id.clone();
                }
                (a.id.clone(), a)
            })
            .collect();
        Ok(())
    }

    /// Install the communication graph. Only while idle.
    pub fn set_graph(&mut self, graph: CommunicationGraph) -> Result<()> {
        self.require_idle("set graph")?;
        self.graph = graph;
        Ok(())
    }

    /// Attach the dispatch coordinator used for remote agents.
    pub fn set_dispatcher(&mut self, dispatcher: Arc<DispatchCoordinator>) {
        self.dispatcher = Some(dispatcher);
    }

    /// Configure tick driving. Only while idle.
    pub fn configure(
        &mut self,
        mode: TickMode,
        auto_delay: Duration,
        tick_budget: u32,
    ) -> Result<()> {
        self.require_idle("configure")?;
        if tick_budget == 0 || tick_budget > self.settings.tick_budget {
            return Err(Error::Config(format!(
                "tick_budget must be in 1..={}",
                self.settings.tick_budget
            )));
        }
        if mode == TickMode::Auto {
            let min = Duration::from_millis(self.settings.auto_delay_min_ms);
            let max = Duration::from_millis(self.settings.auto_delay_max_ms);
            if auto_delay < min || auto_delay > max {
                return Err(Error::Config(format!(
                    "auto_delay must be within {}ms..={}ms",
                    self.settings.auto_delay_min_ms, self.settings.auto_delay_max_ms
                )));
            }
        }
        self.mode = mode;
        self.auto_delay = auto_delay;
        self.tick_budget = tick_budget;
        Ok(())
    }

    /// Start the simulation with one seeded message.
    pub fn start(&mut self, initial: SimMessage) -> Result<()> {
        self.require_idle("start")?;
        if self.roster.is_empty() {
            return Err(Error::Config("roster is empty".to_string()));
        }
        for agent in self.roster.values() {
            if agent.role.is_empty() || agent.model.is_empty() {
                return Err(Error::Config(format!(
                    "agent {} is missing a role/model assignment",
                    agent.id
                )));
            }
        }
        if initial.from != self.graph.broadcast_id() && !self.roster.contains_key(&initial.from) {
            return Err(Error::Config(format!(
                "initial message sender {} is not in the roster",
                initial.from
            )));
        }
        if !self.roster.contains_key(&initial.to) {
            return Err(Error::Config(format!(
                "initial message recipient {} is not in the roster",
                initial.to
            )));
        }

        self.tick_index = 0;
        self.queue.clear();
        self.acted.clear();
        self.pending.clear();
        self.queue.push_back(initial);
        self.status = EngineStatus::Running;
        tracing::info!(agents = self.roster.len(), edges = self.graph.edge_count(), "Simulation started");
        Ok(())
    }

    /// Advance the simulation by one tick.
    pub fn advance_tick(&mut self) -> Result<TickOutcome> {
        if self.status != EngineStatus::Running {
            return Err(Error::InvalidState(format!(
                "cannot advance tick while {:?}",
                self.status
            )));
        }

        self.acted.clear();
        let mut events_emitted = 0;
        let mut messages_enqueued = self.drain_resolved();

        let Some(message) = self.queue.pop_front() else {
            if self.pending.is_empty() {
                self.status = EngineStatus::Completed;
                tracing::info!(tick = self.tick_index, "Queue drained, simulation completed");
                return Ok(TickOutcome {
                    tick: self.tick_index,
                    events_emitted: 0,
                    messages_enqueued,
                    completed: true,
                });
            }
            // Remote replies still in flight: nothing to pop yet. The tick
            // index only moves with consumed messages.
            tracing::debug!(pending = self.pending.len(), "Awaiting remote replies");
            return Ok(TickOutcome {
                tick: self.tick_index,
                events_emitted: 0,
                messages_enqueued,
                completed: false,
            });
        };

        let tick = self.tick_index;
        if self.graph.validate(&message.from, &message.to) {
            self.events.emit(Event::MessageSent {
                from: message.from.clone(),
                to: message.to.clone(),
                tick,
            });
            events_emitted += 1;
            messages_enqueued += self.deliver(message, tick);
        } else {
            self.events.emit(Event::MessageBlockedByGraph {
                from: message.from.clone(),
                to: message.to.clone(),
                tick,
            });
            events_emitted += 1;
            tracing::debug!(from = %message.from, to = %message.to, tick, "Message blocked by graph");
        }

        self.tick_index += 1;
        self.events.emit(Event::TickAdvanced {
            tick: self.tick_index,
            messages_enqueued,
        });
        Ok(TickOutcome {
            tick: self.tick_index,
            events_emitted,
            messages_enqueued,
            completed: false,
        })
    }

    /// Advance up to `n` ticks, stopping at completion. Clamped by the
    /// configured tick budget to prevent runaway loops.
    pub fn advance_ticks(&mut self, n: u32) -> Result<Vec<TickOutcome>> {
        let limit = n.min(self.tick_budget);
        let mut outcomes = Vec::new();
        for _ in 0..limit {
            let outcome = self.advance_tick()?;
            let done = outcome.completed;
            outcomes.push(outcome);
            if done {
                break;
            }
        }
        Ok(outcomes)
    }

    /// Pause a running auto-mode simulation.
    pub fn pause(&mut self) -> Result<()> {
        if self.status != EngineStatus::Running || self.mode != TickMode::Auto {
            return Err(Error::InvalidState(
                "pause is only valid while running in auto mode".to_string(),
            ));
        }
        self.status = EngineStatus::Paused;
        tracing::info!(tick = self.tick_index, "Simulation paused");
        Ok(())
    }

    /// Resume a paused simulation.
    pub fn resume(&mut self) -> Result<()> {
        if self.status != EngineStatus::Paused {
            return Err(Error::InvalidState("resume requires a paused simulation".to_string()));
        }
        self.status = EngineStatus::Running;
        tracing::info!(tick = self.tick_index, "Simulation resumed");
        Ok(())
    }

    /// Return to idle. Tick state is cleared; roster and graph survive
    /// unless a full wipe is requested.
    pub fn reset(&mut self, full: bool) {
        self.status = EngineStatus::Idle;
        self.tick_index = 0;
        self.queue.clear();
        self.acted.clear();
        self.pending.clear();
        if full {
            self.roster.clear();
            self.graph = CommunicationGraph::new(self.graph.broadcast_id().to_string());
        }
        tracing::info!(full, "Simulation reset");
    }

    pub fn status(&self) -> EngineStatus {
        self.status
    }

    pub fn mode(&self) -> TickMode {
        self.mode
    }

    pub fn auto_delay(&self) -> Duration {
        self.auto_delay
    }

    pub fn tick_index(&self) -> u64 {
        self.tick_index
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn pending_remote(&self) -> usize {
        self.pending.len()
    }

    fn require_idle(&self, what: &str) -> Result<()> {
        if self.status != EngineStatus::Idle {
            return Err(Error::InvalidState(format!(
                "{} is only valid while idle (currently {:?})",
                what, self.status
            )));
        }
        Ok(())
    }

    /// Move every resolved remote reply into the queue, marking the
    /// responder as having acted this tick. Runs before the pop.
    fn drain_resolved(&mut self) -> usize {
        let mut enqueued = 0;
        let mut still_pending = Vec::new();
        for mut p in self.pending.drain(..) {
            match p.handle.poll_now() {
                None => still_pending.push(p),
                Some(Ok(reply)) => {
                    self.acted.insert(p.responder.clone());
                    self.queue.push_back(SimMessage {
                        from: p.responder,
                        to: p.reply_to,
                        content: reply.content,
                    });
                    enqueued += 1;
                }
                Some(Err(failure)) => {
                    tracing::warn!(responder = %p.responder, %failure, "Remote reply failed");
                }
            }
        }
        self.pending = still_pending;
        enqueued
    }

    /// Deliver a graph-approved message to its recipient. Returns how many
    /// messages were enqueued synchronously.
    fn deliver(&mut self, message: SimMessage, tick: u64) -> usize {
        let Some(responder) = self.roster.get(&message.to).cloned() else {
            tracing::warn!(to = %message.to, "Recipient not in roster, message dropped");
            return 0;
        };

        // Activity cap: one newly generated reply per agent per tick. A
        // capped message goes back to the queue front for the next tick.
        if self.acted.contains(&responder.id) {
            tracing::debug!(agent_id = %responder.id, tick, "Activity cap hit, reply deferred");
            self.queue.push_front(message);
            return 0;
        }

        match responder.kind {
            AgentKind::Local => {
                let content = stub_reply(&responder.id, &message.from, &message.content, tick);
                self.acted.insert(responder.id.clone());
                self.queue.push_back(SimMessage {
                    from: responder.id.clone(),
                    to: message.from,
                    content,
                });
                1
            }
            AgentKind::Remote => {
                let Some(dispatcher) = &self.dispatcher else {
                    tracing::warn!(agent_id = %responder.id, "No dispatcher attached, remote delivery dropped");
                    return 0;
                };
                match dispatcher.dispatch(&responder.id, &message.content, None, None) {
                    Ok(handle) => {
                        self.acted.insert(responder.id.clone());
                        self.pending.push(PendingRemote {
                            responder: responder.id.clone(),
                            reply_to: message.from,
                            handle,
                        });
                    }
                    Err(e) => {
                        tracing::warn!(agent_id = %responder.id, %e, "Remote dispatch failed");
                    }
                }
                0
            }
        }
    }
}

/// Deterministic stub reply for local agents: a digest over the responder,
/// the sender, the content, and the tick index.
fn stub_reply(responder: &str, sender: &str, content: &str, tick: u64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(responder.as_bytes());
    hasher.update(b"|");
    hasher.update(sender.as_bytes());
    hasher.update(b"|");
    hasher.update(content.as_bytes());
    hasher.update(b"|");
    hasher.update(tick.to_be_bytes());
    let digest = hex::encode(hasher.finalize());
    format!("stub:{}", &digest[..16])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::StaticTokenValidator;
    use crate::control::dispatch::DispatchResult;
    use crate::control::registry::{ConnectionRegistry, FrameSender};
    use crate::protocol::Frame;
    use crate::sim::graph::CommunicationEdge;
    use tokio::sync::mpsc;

    fn local(id: &str) -> SimAgent {
        SimAgent {
            id: id.to_string(),
            label: id.to_string(),
            role: "participant".to_string(),
            model: "stub-model".to_string(),
            kind: AgentKind::Local,
        }
    }

    fn remote(id: &str) -> SimAgent {
        SimAgent {
            kind: AgentKind::Remote,
            ..local(id)
        }
    }

    fn msg(from: &str, to: &str, content: &str) -> SimMessage {
        SimMessage {
            from: from.to_string(),
            to: to.to_string(),
            content: content.to_string(),
        }
    }

    fn engine_with(
        agents: Vec<SimAgent>,
        edges: Vec<(&str, &str)>,
        events: EventBus,
    ) -> TickEngine {
        let mut engine = TickEngine::new(SimulationSettings::default(), events);
        engine.set_roster(agents).unwrap();
        let edges = edges
            .into_iter()
            .map(|(from, to)| CommunicationEdge {
                from: from.to_string(),
                to: to.to_string(),
                label: None,
            })
            .collect();
        engine
            .set_graph(CommunicationGraph::with_edges("broadcast", edges))
            .unwrap();
        engine
    }

    #[test]
    fn advance_before_start_is_invalid_state() {
        let mut engine = engine_with(vec![local("a")], vec![], EventBus::default());
        let err = engine.advance_tick().unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
        assert_eq!(engine.tick_index(), 0);
    }

    #[test]
    fn start_requires_roster_and_known_endpoints() {
        let mut empty = TickEngine::new(SimulationSettings::default(), EventBus::default());
        assert!(matches!(
            empty.start(msg("a", "b", "hi")).unwrap_err(),
            Error::Config(_)
        ));

        let mut engine = engine_with(vec![local("a")], vec![], EventBus::default());
        assert!(matches!(
            engine.start(msg("a", "ghost", "hi")).unwrap_err(),
            Error::Config(_)
        ));
    }

    #[test]
    fn blocked_message_consumes_the_tick() {
        let events = EventBus::default();
        let mut rx = events.subscribe();
        let mut engine = engine_with(vec![local("a"), local("b")], vec![], events);
        engine.start(msg("a", "b", "hello")).unwrap();

        let outcome = engine.advance_tick().unwrap();
        assert_eq!(outcome.tick, 1);
        assert_eq!(outcome.messages_enqueued, 0);
        assert_eq!(engine.queue_len(), 0);

        let seen = crate::events::drain(&mut rx);
        assert!(seen.iter().any(|e| matches!(
            e,
            Event::MessageBlockedByGraph { from, to, tick: 0 } if from == "a" && to == "b"
        )));

        // Next tick finds an empty queue and completes without advancing.
        let outcome = engine.advance_tick().unwrap();
        assert!(outcome.completed);
        assert_eq!(engine.status(), EngineStatus::Completed);
        assert_eq!(engine.tick_index(), 1);
    }

    #[test]
    fn allowed_message_generates_a_stub_reply() {
        let mut engine = engine_with(
            vec![local("a"), local("b")],
            vec![("a", "b")],
            EventBus::default(),
        );
        engine.start(msg("a", "b", "hello")).unwrap();

        let outcome = engine.advance_tick().unwrap();
        assert_eq!(outcome.messages_enqueued, 1);
        assert_eq!(engine.queue_len(), 1);
        assert_eq!(engine.tick_index(), 1);
    }

    #[test]
    fn stub_replies_are_deterministic() {
        assert_eq!(stub_reply("b", "a", "hello", 0), stub_reply("b", "a", "hello", 0));
        assert_ne!(stub_reply("b", "a", "hello", 0), stub_reply("b", "a", "hello", 1));
        assert_ne!(stub_reply("b", "a", "hello", 0), stub_reply("c", "a", "hello", 0));
    }

    #[test]
    fn replay_emits_identical_events() {
        let run = || {
            let events = EventBus::default();
            let mut rx = events.subscribe();
            let mut engine = engine_with(
                vec![local("a"), local("b")],
                vec![("a", "b"), ("b", "a")],
                events,
            );
            engine.start(msg("a", "b", "hello")).unwrap();
            let mut ticks = Vec::new();
            loop {
                let outcome = engine.advance_tick().unwrap();
                if outcome.completed {
                    break;
                }
                ticks.push(outcome);
                if ticks.len() >= 6 {
                    break;
                }
            }
            (ticks, crate::events::drain(&mut rx))
        };

        let (ticks_a, events_a) = run();
        let (ticks_b, events_b) = run();
        assert_eq!(ticks_a, ticks_b);
        assert_eq!(events_a, events_b);
    }

    #[test]
    fn tick_budget_clamps_advance_ticks() {
        let mut engine = engine_with(
            vec![local("a"), local("b")],
            vec![("a", "b"), ("b", "a")],
            EventBus::default(),
        );
        engine
            .configure(TickMode::Manual, Duration::from_millis(100), 3)
            .unwrap();
        engine.start(msg("a", "b", "ping")).unwrap();

        // a<->b bounce forever; the budget stops the loop.
        let outcomes = engine.advance_ticks(50).unwrap();
        assert_eq!(outcomes.len(), 3);
        assert_eq!(engine.tick_index(), 3);
    }

    #[test]
    fn pause_rules_follow_mode() {
        let mut engine = engine_with(
            vec![local("a"), local("b")],
            vec![("a", "b")],
            EventBus::default(),
        );
        engine.start(msg("a", "b", "hi")).unwrap();
        // Manual mode cannot pause.
        assert!(matches!(engine.pause().unwrap_err(), Error::InvalidState(_)));
        engine.reset(false);

        engine
            .configure(TickMode::Auto, Duration::from_millis(200), 10)
            .unwrap();
        engine.start(msg("a", "b", "hi")).unwrap();
        engine.pause().unwrap();
        assert_eq!(engine.status(), EngineStatus::Paused);
        assert!(matches!(engine.advance_tick().unwrap_err(), Error::InvalidState(_)));
        engine.resume().unwrap();
        assert_eq!(engine.status(), EngineStatus::Running);
    }

    #[test]
    fn configure_is_idle_only_and_bounded() {
        let mut engine = engine_with(
            vec![local("a"), local("b")],
            vec![("a", "b")],
            EventBus::default(),
        );
        // Auto delay outside the configured bounds.
        assert!(matches!(
            engine
                .configure(TickMode::Auto, Duration::from_millis(1), 10)
                .unwrap_err(),
            Error::Config(_)
        ));
        // Budget above the ceiling.
        assert!(matches!(
            engine
                .configure(TickMode::Manual, Duration::from_millis(200), 100_000)
                .unwrap_err(),
            Error::Config(_)
        ));

        engine.start(msg("a", "b", "hi")).unwrap();
        assert!(matches!(
            engine
                .configure(TickMode::Manual, Duration::from_millis(200), 10)
                .unwrap_err(),
            Error::InvalidState(_)
        ));
    }

    #[test]
    fn reset_preserves_configuration_unless_full() {
        let mut engine = engine_with(
            vec![local("a"), local("b")],
            vec![("a", "b")],
            EventBus::default(),
        );
        engine.start(msg("a", "b", "hi")).unwrap();
        engine.advance_tick().unwrap();

        engine.reset(false);
        assert_eq!(engine.status(), EngineStatus::Idle);
        assert_eq!(engine.tick_index(), 0);
        assert_eq!(engine.queue_len(), 0);
        // Roster/graph survived; a new run starts cleanly.
        engine.start(msg("a", "b", "again")).unwrap();

        engine.reset(true);
        assert!(matches!(
            engine.start(msg("a", "b", "gone")).unwrap_err(),
            Error::Config(_)
        ));
    }

    #[test]
    fn activity_cap_defers_a_second_reply_to_the_next_tick() {
        let mut engine = engine_with(
            vec![local("a"), local("b"), remote("r")],
            vec![("a", "b"), ("b", "a"), ("r", "a"), ("a", "r")],
            EventBus::default(),
        );
        engine.start(msg("a", "b", "hello")).unwrap();

        // Simulate a remote reply from "b"'s twin resolving this tick: the
        // drain marks "b" as having acted before the pop reaches it.
        engine.pending.push(PendingRemote {
            responder: "b".to_string(),
            reply_to: "a".to_string(),
            handle: DispatchHandle::pre_resolved(
                "m-1",
                DispatchResult::Ok(crate::control::dispatch::DispatchReply {
                    content: "remote says hi".to_string(),
                    usage: None,
                }),
            ),
        });

        let outcome = engine.advance_tick().unwrap();
        // The drained reply was enqueued; the popped a->b message was
        // deferred, not dropped.
        assert_eq!(outcome.messages_enqueued, 1);
        assert_eq!(engine.queue_len(), 2);
        assert_eq!(engine.tick_index(), 1);

        // Next tick clears the acted set and the deferred message delivers.
        let outcome = engine.advance_tick().unwrap();
        assert_eq!(outcome.messages_enqueued, 1);
    }

    #[tokio::test]
    async fn remote_round_trip_drains_into_the_queue() {
        let events = EventBus::default();
        let registry = Arc::new(ConnectionRegistry::new(
            Arc::new(StaticTokenValidator::default()),
            events.clone(),
            Duration::from_secs(30),
        ));
        let dispatcher = Arc::new(DispatchCoordinator::new(
            registry.clone(),
            events.clone(),
            Duration::from_secs(30),
        ));

        let (tx, mut wire): (FrameSender, mpsc::UnboundedReceiver<Frame>) =
            mpsc::unbounded_channel();
        registry.register("r", tx, "t", vec![], None).unwrap();

        let mut engine = engine_with(
            vec![local("a"), remote("r")],
            vec![("a", "r"), ("r", "a")],
            events,
        );
        engine.set_dispatcher(dispatcher.clone());
        engine.start(msg("a", "r", "do work")).unwrap();

        // Tick 1: the message dispatches to the remote agent.
        let outcome = engine.advance_tick().unwrap();
        assert_eq!(outcome.messages_enqueued, 0);
        assert_eq!(engine.pending_remote(), 1);

        let message_id = match wire.recv().await.unwrap() {
            Frame::Dispatch { message_id, content, .. } => {
                assert_eq!(content, "do work");
                message_id
            }
            other => panic!("wrong frame: {:?}", other),
        };

        // Tick 2: nothing resolved yet; the engine waits without
        // completing or advancing.
        let outcome = engine.advance_tick().unwrap();
        assert!(!outcome.completed);
        assert_eq!(engine.tick_index(), 1);

        // The remote worker answers; the next tick drains it and the
        // reply flows back to "a".
        dispatcher.on_response(&message_id, Some("remote result".to_string()), None, None);
        let outcome = engine.advance_tick().unwrap();
        assert_eq!(outcome.messages_enqueued, 2);
        assert_eq!(engine.pending_remote(), 0);
        assert_eq!(engine.tick_index(), 2);
    }
}
