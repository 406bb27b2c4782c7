//! Transaction group → executor mapping, fixed at startup

use crate::error::{ProducerError, ProducerResult};
use crate::transaction::LocalTransactionExecutor;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::info;

/// Read-only registry of local transaction executors
///
/// Built once; lookups need no locking afterwards.
#[derive(Clone, Default)]
pub struct ExecutorRegistry {
    executors: Arc<HashMap<String, Arc<dyn LocalTransactionExecutor>>>,
}

impl ExecutorRegistry {
    pub fn builder() -> ExecutorRegistryBuilder {
        ExecutorRegistryBuilder::default()
    }

    /// Executor for a transaction group
    pub fn get(&self, group: &str) -> ProducerResult<Arc<dyn LocalTransactionExecutor>> {
        self.executors.get(group).cloned().ok_or_else(|| {
            ProducerError::Configuration(format!(
                "no local transaction executor registered for group '{}'",
                group
            ))
        })
    }

    pub fn contains(&self, group: &str) -> bool {
        self.executors.contains_key(group)
    }

    /// Registered group names, sorted
    pub fn groups(&self) -> Vec<String> {
        let mut groups: Vec<String> = self.executors.keys().cloned().collect();
        groups.sort();
        groups
    }

    pub fn len(&self) -> usize {
        self.executors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }
}

impl fmt::Debug for ExecutorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutorRegistry")
            .field("groups", &self.groups())
            .finish()
    }
}

/// Collects executors and rejects duplicate groups
#[derive(Default)]
pub struct ExecutorRegistryBuilder {
    executors: HashMap<String, Arc<dyn LocalTransactionExecutor>>,
}

impl ExecutorRegistryBuilder {
    /// Register the executor for a group
    ///
    /// Fails if the group is empty or already has an executor.
    pub fn register(
        mut self,
        group: impl Into<String>,
        executor: Arc<dyn LocalTransactionExecutor>,
    ) -> ProducerResult<Self> {
        let group = group.into();
        if group.is_empty() {
            return Err(ProducerError::Configuration(
                "transaction group name is empty".to_string(),
            ));
        }

        if self.executors.contains_key(&group) {
            return Err(ProducerError::Configuration(format!(
                "transaction group '{}' already has an executor",
                group
            )));
        }

        info!(group = %group, "Registered local transaction executor");
        self.executors.insert(group, executor);
        Ok(self)
    }

    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }

    pub fn build(self) -> ExecutorRegistry {
        ExecutorRegistry {
            executors: Arc::new(self.executors),
        }
    }
}
