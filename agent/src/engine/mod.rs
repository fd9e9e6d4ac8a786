//! Command synchronization and lock-state engine

pub mod dispatcher;
pub mod fsm;
pub mod reconciler;

use std::time::Duration;

/// Engine timings
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Wall-clock budget for the status fetch of one poll cycle
    pub cycle_budget: Duration,

    /// Delay between accepting a reset and wiping local state
    pub reset_delay: Duration,

    /// Length of the find/ring alert
    pub ring_duration: Duration,

    /// Send a heartbeat on every poll cycle
    pub send_telemetry: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            cycle_budget: Duration::from_secs(25),
            reset_delay: Duration::from_secs(10),
            ring_duration: Duration::from_secs(10),
            send_telemetry: true,
        }
    }
}
