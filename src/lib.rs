//! swarmlink library root.

pub mod backend;
pub mod cli;
pub mod config;
pub mod control;
pub mod error;
pub mod events;
pub mod logging;
pub mod protocol;
pub mod server;
pub mod sim;

pub use backend::{StaticTokenValidator, TaskBackend, TokenValidator};
pub use config::{load_settings, Settings};
pub use control::{ConnectionRegistry, ControlPlane, DispatchCoordinator, HeartbeatMonitor};
pub use error::{Error, Result};
pub use events::{Event, EventBus};
pub use protocol::Frame;
pub use server::{run_server, run_worker};
pub use sim::{CommunicationGraph, Scenario, SimMessage, TickEngine};
