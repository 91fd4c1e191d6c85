//! Control plane: connection registry, heartbeat sweep, dispatch broker.

pub mod dispatch;
pub mod heartbeat;
pub mod plane;
pub mod registry;

pub use dispatch::{
    DispatchCoordinator, DispatchFailure, DispatchHandle, DispatchReply, DispatchResult,
    DispatchStats, DispatchStatus,
};
pub use heartbeat::HeartbeatMonitor;
pub use plane::ControlPlane;
pub use registry::{AgentIdentity, AgentKind, AgentStatus, ConnectionRegistry, FrameSender};
