//! Per-broker failure tracking.

use crate::fault::{BrokerHealth, FaultConfig, HealthData, HealthTransition};
use crate::metrics::PRODUCER_METRICS;
use crate::transport::BrokerTarget;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info};

/// Tracks broker failures and isolates brokers that keep failing
#[derive(Debug, Clone)]
pub struct BrokerFaultTracker {
    config: FaultConfig,
    brokers: Arc<DashMap<String, Arc<RwLock<HealthData>>>>,
}

impl BrokerFaultTracker {
    pub fn new(config: FaultConfig) -> Self {
        Self {
            config,
            brokers: Arc::new(DashMap::new()),
        }
    }

    fn entry(&self, broker: &str) -> Arc<RwLock<HealthData>> {
        self.brokers
            .entry(broker.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(HealthData::new())))
            .clone()
    }

    /// Current health of a broker
    pub fn health(&self, broker: &str) -> BrokerHealth {
        self.brokers
            .get(broker)
            .map(|data| {
                let health = data.read().health;
                health
            })
            .unwrap_or(BrokerHealth::Available)
    }

    /// Whether a broker should receive traffic now
    ///
    /// An isolated broker whose window has passed moves to trial and is
    /// offered traffic again.
    pub fn is_available(&self, broker: &str) -> bool {
        let Some(data) = self.brokers.get(broker).map(|d| d.value().clone()) else {
            return true;
        };

        let mut data = data.write();
        if data.isolation_expired(self.config.isolation) {
            let transition = data.transition_to(BrokerHealth::Trial);
            self.log_transition(broker, &transition);
        }

        data.health != BrokerHealth::Isolated
    }

    /// Record a successful delivery
    pub fn record_success(&self, broker: &str) {
        let Some(data) = self.brokers.get(broker).map(|d| d.value().clone()) else {
            return;
        };

        let mut data = data.write();
        data.consecutive_failures = 0;
        if data.health != BrokerHealth::Available {
            let transition = data.transition_to(BrokerHealth::Available);
            self.log_transition(broker, &transition);
        }
    }

    /// Record a transient delivery failure
    pub fn record_failure(&self, broker: &str) {
        let data = self.entry(broker);
        let mut data = data.write();
        data.consecutive_failures += 1;

        debug!(
            broker = %broker,
            consecutive_failures = data.consecutive_failures,
            "Broker delivery failed"
        );

        let should_isolate = match data.health {
            BrokerHealth::Available => data.consecutive_failures >= self.config.failure_threshold,
            BrokerHealth::Trial => true,
            BrokerHealth::Isolated => false,
        };

        if should_isolate {
            let transition = data.transition_to(BrokerHealth::Isolated);
            self.log_transition(broker, &transition);
        }
    }

    /// Brokers that should receive traffic, or all of them if none should
    pub fn filter_available(&self, brokers: &[BrokerTarget]) -> Vec<BrokerTarget> {
        let available: Vec<BrokerTarget> = brokers
            .iter()
            .filter(|b| self.is_available(&b.name))
            .cloned()
            .collect();

        if available.is_empty() {
            brokers.to_vec()
        } else {
            available
        }
    }

    fn log_transition(&self, broker: &str, transition: &HealthTransition) {
        info!(
            broker = %broker,
            from = %transition.from,
            to = %transition.to,
            "Broker health transition"
        );

        PRODUCER_METRICS
            .broker_health
            .with_label_values(&[broker])
            .set(transition.to.to_metric_value());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn tracker(isolation: Duration) -> BrokerFaultTracker {
        BrokerFaultTracker::new(FaultConfig {
            failure_threshold: 1,
            isolation,
        })
    }

    #[test]
    fn test_failure_isolates_broker() {
        let tracker = tracker(Duration::from_secs(60));
        assert!(tracker.is_available("broker-a"));

        tracker.record_failure("broker-a");
        assert_eq!(tracker.health("broker-a"), BrokerHealth::Isolated);
        assert!(!tracker.is_available("broker-a"));
    }

    #[test]
    fn test_trial_after_window_and_recover() {
        let tracker = tracker(Duration::ZERO);
        tracker.record_failure("broker-a");

        assert!(tracker.is_available("broker-a"));
        assert_eq!(tracker.health("broker-a"), BrokerHealth::Trial);

        tracker.record_success("broker-a");
        assert_eq!(tracker.health("broker-a"), BrokerHealth::Available);
    }

    #[test]
    fn test_failed_trial_isolates_again() {
        let tracker = tracker(Duration::ZERO);
        tracker.record_failure("broker-a");
        assert!(tracker.is_available("broker-a"));

        tracker.record_failure("broker-a");
        assert_eq!(tracker.health("broker-a"), BrokerHealth::Isolated);
    }

    #[test]
    fn test_filter_falls_back_to_all_brokers() {
        let tracker = tracker(Duration::from_secs(60));
        let brokers = vec![
            BrokerTarget::new("broker-a", "10.0.0.1:10911"),
            BrokerTarget::new("broker-b", "10.0.0.2:10911"),
        ];

        tracker.record_failure("broker-a");
        let available = tracker.filter_available(&brokers);
        assert_eq!(available.len(), 1);
        assert_eq!(available[0].name, "broker-b");

        tracker.record_failure("broker-b");
        assert_eq!(tracker.filter_available(&brokers).len(), 2);
    }
}
