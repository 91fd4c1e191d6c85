//! Simulation: communication graph, tick engine, scenario files.

pub mod engine;
pub mod graph;
pub mod scenario;

pub use engine::{EngineStatus, SimAgent, SimMessage, TickEngine, TickMode, TickOutcome};
pub use graph::{CommunicationEdge, CommunicationGraph};
pub use scenario::Scenario;
