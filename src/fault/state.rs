//! Broker health state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Health of a broker as seen by this producer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BrokerHealth {
    /// Broker takes traffic normally
    Available,
    /// Broker is skipped until the isolation window passes
    Isolated,
    /// Isolation window passed, the next send is a trial delivery
    Trial,
}

impl BrokerHealth {
    /// Convert state to numeric value for Prometheus gauge
    pub fn to_metric_value(&self) -> f64 {
        match self {
            BrokerHealth::Available => 0.0,
            BrokerHealth::Isolated => 1.0,
            BrokerHealth::Trial => 2.0,
        }
    }
}

impl fmt::Display for BrokerHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BrokerHealth::Available => write!(f, "available"),
            BrokerHealth::Isolated => write!(f, "isolated"),
            BrokerHealth::Trial => write!(f, "trial"),
        }
    }
}

/// Represents a health change of a broker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthTransition {
    pub from: BrokerHealth,
    pub to: BrokerHealth,
    pub timestamp: DateTime<Utc>,
}

/// Internal health data for one broker
#[derive(Debug, Clone)]
pub struct HealthData {
    pub health: BrokerHealth,
    pub consecutive_failures: u32,
    pub isolated_at: Option<DateTime<Utc>>,
    pub transition_count: u64,
}

impl HealthData {
    pub fn new() -> Self {
        Self {
            health: BrokerHealth::Available,
            consecutive_failures: 0,
            isolated_at: None,
            transition_count: 0,
        }
    }

    /// Whether the isolation window has passed
    pub fn isolation_expired(&self, isolation: Duration) -> bool {
        if self.health != BrokerHealth::Isolated {
            return false;
        }

        match self.isolated_at {
            Some(isolated_at) => {
                let elapsed = Utc::now().signed_duration_since(isolated_at);
                elapsed.to_std().map(|e| e >= isolation).unwrap_or(false)
            }
            None => true,
        }
    }

    /// Transition to a new health state
    pub fn transition_to(&mut self, to: BrokerHealth) -> HealthTransition {
        let transition = HealthTransition {
            from: self.health,
            to,
            timestamp: Utc::now(),
        };

        self.health = to;
        self.transition_count += 1;

        match to {
            BrokerHealth::Isolated => self.isolated_at = Some(transition.timestamp),
            BrokerHealth::Available => {
                self.isolated_at = None;
                self.consecutive_failures = 0;
            }
            BrokerHealth::Trial => {}
        }

        transition
    }
}

impl Default for HealthData {
    fn default() -> Self {
        Self::new()
    }
}
