//! Broker fault isolation.
//!
//! When `send_latency_fault_enable` is set, brokers that fail a delivery are
//! isolated for `fault_isolation_ms` and skipped by broker selection while a
//! healthy broker exists. After the window the broker gets a trial delivery
//! with real traffic; a successful one makes it available again.
//!
//! # Broker States
//!
//! - **Available**: normal operation
//! - **Isolated**: skipped by selection
//! - **Trial**: isolation window passed, next delivery decides

mod state;
mod tracker;

pub use state::{BrokerHealth, HealthData, HealthTransition};
pub use tracker::BrokerFaultTracker;

use crate::config::ProducerConfig;
use std::time::Duration;

/// Fault isolation settings
#[derive(Debug, Clone)]
pub struct FaultConfig {
    /// Consecutive failures before a broker is isolated
    pub failure_threshold: u32,
    /// How long an isolated broker is skipped
    pub isolation: Duration,
}

impl From<&ProducerConfig> for FaultConfig {
    fn from(config: &ProducerConfig) -> Self {
        Self {
            failure_threshold: 1,
            isolation: config.fault_isolation(),
        }
    }
}
