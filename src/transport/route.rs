use crate::error::{ProducerError, ProducerResult};
use crate::transport::BrokerTarget;
use std::collections::HashMap;

/// Resolves the brokers that serve a topic
///
/// Naming-server discovery is external; implementations may cache or poll it.
pub trait RouteResolver: Send + Sync {
    /// Known brokers for a topic, in a stable order
    fn brokers_for(&self, topic: &str) -> ProducerResult<Vec<BrokerTarget>>;
}

/// Route table fixed at startup
#[derive(Debug, Clone, Default)]
pub struct StaticRouteTable {
    routes: HashMap<String, Vec<BrokerTarget>>,
    default_brokers: Vec<BrokerTarget>,
}

impl StaticRouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Brokers used for topics without an explicit route
    pub fn with_default_brokers(mut self, brokers: Vec<BrokerTarget>) -> Self {
        self.default_brokers = brokers;
        self
    }

    /// Route a topic to a broker set
    pub fn with_route(mut self, topic: impl Into<String>, brokers: Vec<BrokerTarget>) -> Self {
        self.routes.insert(topic.into(), brokers);
        self
    }
}

impl RouteResolver for StaticRouteTable {
    fn brokers_for(&self, topic: &str) -> ProducerResult<Vec<BrokerTarget>> {
        let brokers = self
            .routes
            .get(topic)
            .filter(|brokers| !brokers.is_empty())
            .unwrap_or(&self.default_brokers);

        if brokers.is_empty() {
            return Err(ProducerError::Configuration(format!(
                "no route info for topic '{}'",
                topic
            )));
        }

        Ok(brokers.clone())
    }
}
