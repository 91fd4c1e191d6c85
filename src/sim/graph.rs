//! Directed allow-list of which agent may address which.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// One directed edge, with an optional human-readable label.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommunicationEdge {
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub label: Option<String>,
}

/// The communication graph gating simulation message delivery.
///
/// Pure over its edge set: edges are configured between runs and never
/// mutated mid-run. Delivery is allowed iff an edge exists, the sender
/// addresses itself, or the sender is the designated broadcast identity.
#[derive(Debug, Clone)]
pub struct CommunicationGraph {
    edges: HashMap<(String, String), Option<String>>,
    broadcast_id: String,
}

impl CommunicationGraph {
    pub fn new(broadcast_id: impl Into<String>) -> Self {
        Self {
            edges: HashMap::new(),
            broadcast_id: broadcast_id.into(),
        }
    }

    pub fn with_edges(broadcast_id: impl Into<String>, edges: Vec<CommunicationEdge>) -> Self {
        let mut graph = Self::new(broadcast_id);
        for edge in edges {
            graph.add_edge(edge.from, edge.to, edge.label);
        }
        graph
    }

    pub fn add_edge(
        &mut self,
        from: impl Into<String>,
        to: impl Into<String>,
        label: Option<String>,
    ) {
        self.edges.insert((from.into(), to.into()), label);
    }

    /// Whether `from` may address `to`.
    pub fn validate(&self, from: &str, to: &str) -> bool {
        from == to
            || from == self.broadcast_id
            || self
                .edges
                .contains_key(&(from.to_string(), to.to_string()))
    }

    pub fn broadcast_id(&self) -> &str {
        &self.broadcast_id
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// All edges, sorted for stable output.
    pub fn edges(&self) -> Vec<CommunicationEdge> {
        let mut out: Vec<CommunicationEdge> = self
            .edges
            .iter()
            .map(|((from, to), label)| CommunicationEdge {
                from: from.clone(),
                to: to.clone(),
                label: label.clone(),
            })
            .collect();
        out.sort_by(|a, b| (&a.from, &a.to).cmp(&(&b.from, &b.to)));
        out
    }
}

impl Default for CommunicationGraph {
    fn default() -> Self {
        Self::new("broadcast")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edge_gates_direction() {
        let mut graph = CommunicationGraph::default();
        graph.add_edge("a", "b", None);

        assert!(graph.validate("a", "b"));
        assert!(!graph.validate("b", "a"));
        assert!(graph.validate("a", "a"));
    }

    #[test]
    fn broadcast_identity_reaches_everyone() {
        let graph = CommunicationGraph::new("moderator");
        assert!(graph.validate("moderator", "a"));
        assert!(graph.validate("moderator", "b"));
        assert!(!graph.validate("a", "moderator"));
    }

    #[test]
    fn self_send_is_always_allowed() {
        let graph = CommunicationGraph::default();
        assert!(graph.validate("solo", "solo"));
    }

    #[test]
    fn edges_survive_reconfiguration_between_runs() {
        let mut graph = CommunicationGraph::default();
        graph.add_edge("a", "b", None);
        assert!(graph.validate("a", "b"));

        // Between runs the graph is rebuilt with a different edge set.
        let graph = CommunicationGraph::with_edges(
            "broadcast",
            vec![CommunicationEdge {
                from: "b".to_string(),
                to: "a".to_string(),
                label: Some("review".to_string()),
            }],
        );
        assert!(!graph.validate("a", "b"));
        assert!(graph.validate("b", "a"));
        assert_eq!(graph.edge_count(), 1);
    }
}
