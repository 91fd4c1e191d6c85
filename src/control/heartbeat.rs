//! Periodic eviction of connections that stopped heartbeating.
//!
//! The sweep never blocks registration or dispatch: it observes
//! (id, generation) pairs in one pass, then evicts each with a
//! generation re-check, so a registration racing the sweep always wins.
//! Heartbeat loss is surfaced only as events; it is never escalated
//! synchronously to any caller.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;

use crate::control::dispatch::DispatchCoordinator;
use crate::control::registry::ConnectionRegistry;

/// Sweeps the registry for silent connections.
pub struct HeartbeatMonitor {
    registry: Arc<ConnectionRegistry>,
    dispatch: Arc<DispatchCoordinator>,
    interval: Duration,
}

impl HeartbeatMonitor {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        dispatch: Arc<DispatchCoordinator>,
        interval: Duration,
    ) -> Self {
        Self {
            registry,
            dispatch,
            interval,
        }
    }

    /// One sweep pass: evict overdue connections and fail their in-flight
    /// dispatches. Returns the number of evictions.
    pub fn sweep_once(&self, now: Instant) -> usize {
        let stale = self.registry.mark_stale(now);
        let mut evicted = 0;
        for (agent_id, generation) in stale {
            if self.registry.evict(&agent_id, generation, now).is_some() {
                let failed = self.dispatch.fail_agent(&agent_id);
                if failed > 0 {
                    tracing::warn!(
                        agent_id,
                        failed,
                        "Failed in-flight dispatches after heartbeat loss"
                    );
                }
                evicted += 1;
            }
        }
        evicted
    }

    /// Spawn the periodic sweep task.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            loop {
                ticker.tick().await;
                self.sweep_once(Instant::now());
            }
        })
    }
}
