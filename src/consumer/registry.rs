use crate::error::{ProducerError, ProducerResult};
use crate::message::Message;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Identity of a listener: one topic consumed by one consumer group
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ListenerKey {
    pub topic: String,
    pub consumer_group: String,
}

impl ListenerKey {
    pub fn new(topic: impl Into<String>, consumer_group: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            consumer_group: consumer_group.into(),
        }
    }
}

impl fmt::Display for ListenerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.topic, self.consumer_group)
    }
}

/// Handler for messages of one topic
#[async_trait]
pub trait MessageListener: Send + Sync {
    async fn on_message(&self, message: &Message) -> anyhow::Result<()>;
}

/// Immutable (topic, consumer group) → listener mapping
#[derive(Clone, Default)]
pub struct ListenerRegistry {
    listeners: Arc<HashMap<ListenerKey, Arc<dyn MessageListener>>>,
}

impl ListenerRegistry {
    pub fn builder() -> ListenerRegistryBuilder {
        ListenerRegistryBuilder::default()
    }

    pub fn get(&self, key: &ListenerKey) -> Option<Arc<dyn MessageListener>> {
        self.listeners.get(key).cloned()
    }

    /// Registered identities, sorted
    pub fn keys(&self) -> Vec<ListenerKey> {
        let mut keys: Vec<ListenerKey> = self.listeners.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Hand a message to the listener registered for `key`
    pub async fn dispatch(&self, key: &ListenerKey, message: &Message) -> ProducerResult<()> {
        let listener = self.get(key).ok_or_else(|| {
            ProducerError::Configuration(format!("no listener registered for {}", key))
        })?;

        debug!(listener = %key, key = %message.key(), "Dispatching message");

        listener.on_message(message).await.map_err(|e| {
            warn!(listener = %key, key = %message.key(), error = %e, "Listener failed");
            ProducerError::PermanentSend(format!("listener {} failed: {}", key, e))
        })
    }
}

impl fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("keys", &self.keys())
            .finish()
    }
}

/// Collects listeners and rejects duplicate identities
#[derive(Default)]
pub struct ListenerRegistryBuilder {
    listeners: HashMap<ListenerKey, Arc<dyn MessageListener>>,
}

impl ListenerRegistryBuilder {
    pub fn register(
        mut self,
        key: ListenerKey,
        listener: Arc<dyn MessageListener>,
    ) -> ProducerResult<Self> {
        if key.topic.is_empty() || key.consumer_group.is_empty() {
            return Err(ProducerError::Configuration(format!(
                "listener identity '{}' needs both topic and consumer group",
                key
            )));
        }

        if self.listeners.contains_key(&key) {
            return Err(ProducerError::Configuration(format!(
                "listener {} is already registered",
                key
            )));
        }

        info!(listener = %key, "Registered message listener");
        self.listeners.insert(key, listener);
        Ok(self)
    }

    pub fn build(self) -> ListenerRegistry {
        ListenerRegistry {
            listeners: Arc::new(self.listeners),
        }
    }
}
