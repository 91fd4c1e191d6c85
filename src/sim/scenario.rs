//! Scenario files: roster, graph, and seed message for one simulation run.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::SimulationSettings;
use crate::error::{Error, Result};
use crate::events::EventBus;
use crate::sim::engine::{SimAgent, SimMessage, TickEngine, TickMode};
use crate::sim::graph::{CommunicationEdge, CommunicationGraph};

fn default_broadcast_id() -> String {
    "broadcast".to_string()
}

/// A complete simulation description, loadable from JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub name: Option<String>,

    /// The designated broadcast identity; messages from it pass the graph
    /// gate unconditionally.
    #[serde(default = "default_broadcast_id")]
    pub broadcast_id: String,

    pub agents: Vec<SimAgent>,

    #[serde(default)]
    pub edges: Vec<CommunicationEdge>,

    /// The seeded initial message.
    pub initial: SimMessage,

    #[serde(default)]
    pub mode: TickMode,

    /// Delay between caller-driven ticks in auto mode, milliseconds.
    #[serde(default)]
    pub auto_delay_ms: Option<u64>,

    /// Per-call tick ceiling; defaults to the settings ceiling.
    #[serde(default)]
    pub tick_budget: Option<u32>,
}

impl Scenario {
    /// Load and validate a scenario from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let scenario: Scenario = serde_json::from_str(&content)?;
        scenario.validate()?;
        tracing::debug!("Loaded scenario from {}", path.display());
        Ok(scenario)
    }

    /// Structural checks: unique agents, known edge endpoints, known seed
    /// endpoints.
    pub fn validate(&self) -> Result<()> {
        if self.agents.is_empty() {
            return Err(Error::Config("scenario has no agents".to_string()));
        }

        let mut ids = std::collections::HashSet::new();
        for agent in &self.agents {
            if agent.id.is_empty() {
                return Err(Error::Config("agent with empty id".to_string()));
            }
            if !ids.insert(agent.id.as_str()) {
                return Err(Error::Config(format!("duplicate agent id: {}", agent.id)));
            }
        }

        let known = |id: &str| id == self.broadcast_id || ids.contains(id);
        for edge in &self.edges {
            if !known(&edge.from) || !ids.contains(edge.to.as_str()) {
                return Err(Error::Config(format!(
                    "edge {} -> {} references an unknown agent",
                    edge.from, edge.to
                )));
            }
        }
        if !known(&self.initial.from) || !ids.contains(self.initial.to.as_str()) {
            return Err(Error::Config(
                "initial message references an unknown agent".to_string(),
            ));
        }
        Ok(())
    }

    /// Assemble a configured engine. The caller starts it with
    /// [`Scenario::initial_message`].
    pub fn build_engine(
        &self,
        settings: &SimulationSettings,
        events: EventBus,
    ) -> Result<TickEngine> {
        let mut engine = TickEngine::new(settings.clone(), events);
        engine.set_roster(self.agents.clone())?;
        engine.set_graph(CommunicationGraph::with_edges(
            self.broadcast_id.clone(),
            self.edges.clone(),
        ))?;

        let auto_delay = std::time::Duration::from_millis(
            self.auto_delay_ms.unwrap_or(settings.auto_delay_min_ms),
        );
        let tick_budget = self.tick_budget.unwrap_or(settings.tick_budget);
        engine.configure(self.mode, auto_delay, tick_budget)?;
        Ok(engine)
    }

    /// The seeded message for `TickEngine::start`.
    pub fn initial_message(&self) -> SimMessage {
        self.initial.clone()
    }

    /// Whether any roster entry is a remote agent.
    pub fn has_remote_agents(&self) -> bool {
        self.agents
            .iter()
            .any(|a| a.kind == crate::control::registry::AgentKind::Remote)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "name": "pair-review",
        "broadcast_id": "moderator",
        "agents": [
            {"id": "writer", "role": "author", "model": "stub-model", "kind": "local"},
            {"id": "critic", "role": "reviewer", "model": "stub-model", "kind": "local"}
        ],
        "edges": [
            {"from": "writer", "to": "critic"},
            {"from": "critic", "to": "writer", "label": "feedback"}
        ],
        "initial": {"from": "moderator", "to": "writer", "content": "begin"}
    }"#;

    #[test]
    fn parses_and_validates_sample() {
        let scenario: Scenario = serde_json::from_str(SAMPLE).unwrap();
        scenario.validate().unwrap();
        assert_eq!(scenario.agents.len(), 2);
        assert_eq!(scenario.mode, TickMode::Manual);
        assert!(!scenario.has_remote_agents());
    }

    #[test]
    fn rejects_unknown_edge_endpoint() {
        let mut scenario: Scenario = serde_json::from_str(SAMPLE).unwrap();
        scenario.edges.push(CommunicationEdge {
            from: "writer".to_string(),
            to: "ghost".to_string(),
            label: None,
        });
        assert!(matches!(scenario.validate().unwrap_err(), Error::Config(_)));
    }

    #[test]
    fn rejects_duplicate_agents() {
        let mut scenario: Scenario = serde_json::from_str(SAMPLE).unwrap();
        scenario.agents.push(scenario.agents[0].clone());
        assert!(matches!(scenario.validate().unwrap_err(), Error::Config(_)));
    }

    #[test]
    fn built_engine_runs_the_scenario() {
        let scenario: Scenario = serde_json::from_str(SAMPLE).unwrap();
        let mut engine = scenario
            .build_engine(&SimulationSettings::default(), EventBus::default())
            .unwrap();
        engine.start(scenario.initial_message()).unwrap();

        // moderator -> writer passes (broadcast identity), writer replies.
        let outcome = engine.advance_tick().unwrap();
        assert_eq!(outcome.messages_enqueued, 1);
    }

    #[test]
    fn load_round_trips_through_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scenario.json");
        std::fs::write(&path, SAMPLE).unwrap();

        let scenario = Scenario::load(&path).unwrap();
        assert_eq!(scenario.name.as_deref(), Some("pair-review"));
    }
}
