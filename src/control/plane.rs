//! The control plane: registry + dispatch coordinator, composed.
//!
//! Operations that span both live here, most importantly unregistration,
//! which must also fail the agent's in-flight dispatches as disconnected
//! rather than letting them wait out their timeouts.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::backend::TokenValidator;
use crate::config::Settings;
use crate::control::dispatch::DispatchCoordinator;
use crate::control::heartbeat::HeartbeatMonitor;
use crate::control::registry::{ConnectionRegistry, FrameSender};
use crate::error::Result;
use crate::events::EventBus;

pub struct ControlPlane {
    registry: Arc<ConnectionRegistry>,
    dispatch: Arc<DispatchCoordinator>,
    events: EventBus,
    heartbeat_interval: Duration,
    dispatch_sweep_interval: Duration,
}

impl ControlPlane {
    pub fn new(
        settings: &Settings,
        events: EventBus,
        validator: Arc<dyn TokenValidator>,
    ) -> Self {
        let registry = Arc::new(ConnectionRegistry::new(
            validator,
            events.clone(),
            Duration::from_secs(settings.heartbeat.timeout_secs),
        ));
        let dispatch = Arc::new(DispatchCoordinator::new(
            registry.clone(),
            events.clone(),
            Duration::from_secs(settings.dispatch.default_timeout_secs),
        ));
        Self {
            registry,
            dispatch,
            events,
            heartbeat_interval: Duration::from_secs(settings.heartbeat.interval_secs),
            dispatch_sweep_interval: Duration::from_secs(settings.dispatch.sweep_interval_secs),
        }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn dispatch(&self) -> &Arc<DispatchCoordinator> {
        &self.dispatch
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Register an agent connection.
    pub fn register(
        &self,
        agent_id: &str,
        sender: FrameSender,
        token: &str,
        capabilities: Vec<String>,
        workdir: Option<String>,
    ) -> Result<u64> {
        self.registry
            .register(agent_id, sender, token, capabilities, workdir)
    }

    /// Unregister an agent and fail its in-flight dispatches.
    pub fn unregister(&self, agent_id: &str) {
        if self.registry.unregister(agent_id) {
            self.dispatch.fail_agent(agent_id);
        }
    }

    /// Unregister only if the agent's connection still carries
    /// `generation`; a replaced connection is left alone.
    pub fn unregister_generation(&self, agent_id: &str, generation: u64) {
        if self.registry.unregister_generation(agent_id, generation) {
            self.dispatch.fail_agent(agent_id);
        }
    }

    /// Spawn the heartbeat and dispatch-timeout sweeps.
    pub fn spawn_sweepers(&self) -> Vec<JoinHandle<()>> {
        let monitor = HeartbeatMonitor::new(
            self.registry.clone(),
            self.dispatch.clone(),
            self.heartbeat_interval,
        );
        vec![
            monitor.spawn(),
            self.dispatch.clone().spawn_sweeper(self.dispatch_sweep_interval),
        ]
    }
}
