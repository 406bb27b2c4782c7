//! Retry policy and broker selection shared by the sync and async paths

use crate::config::ProducerConfig;
use crate::error::ProducerError;
use crate::fault::BrokerFaultTracker;
use crate::transport::BrokerTarget;
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// How often and where a failed send is retried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Rotate to the next broker on every retry
    pub retry_next_server: bool,
}

impl RetryPolicy {
    /// Policy for blocking sends
    pub fn for_sync(config: &ProducerConfig) -> Self {
        Self {
            max_retries: config.retry_times_when_send_failed,
            retry_next_server: config.retry_next_server,
        }
    }

    /// Policy for callback sends
    pub fn for_async(config: &ProducerConfig) -> Self {
        Self {
            max_retries: config.retry_times_when_send_async_failed,
            retry_next_server: config.retry_next_server,
        }
    }

    /// Single attempt, used by one-way sends
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            retry_next_server: false,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Whether another attempt follows `attempts_made` failed ones
    pub fn should_retry(&self, error: &ProducerError, attempts_made: u32) -> bool {
        error.is_retryable() && attempts_made < self.max_attempts()
    }
}

/// Picks the broker for each attempt
///
/// The first attempt of every send advances a per-topic round-robin cursor.
/// Retries either stay on that broker or keep rotating, per [`RetryPolicy`].
#[derive(Debug, Default)]
pub struct BrokerSelector {
    cursors: DashMap<String, AtomicUsize>,
    faults: Option<BrokerFaultTracker>,
}

impl BrokerSelector {
    pub fn new(faults: Option<BrokerFaultTracker>) -> Self {
        Self {
            cursors: DashMap::new(),
            faults,
        }
    }

    /// Round-robin start position for a new send on `topic`
    pub fn next_start(&self, topic: &str) -> usize {
        if let Some(cursor) = self.cursors.get(topic) {
            return cursor.fetch_add(1, Ordering::Relaxed);
        }

        self.cursors
            .entry(topic.to_string())
            .or_insert_with(|| AtomicUsize::new(0))
            .fetch_add(1, Ordering::Relaxed)
    }

    /// Broker for attempt number `attempt` (0-based)
    ///
    /// `None` when `brokers` is empty.
    pub fn select(
        &self,
        brokers: &[BrokerTarget],
        start: usize,
        attempt: u32,
        policy: &RetryPolicy,
        first: Option<&BrokerTarget>,
    ) -> Option<BrokerTarget> {
        if let (Some(first), false) = (first, policy.retry_next_server) {
            return Some(first.clone());
        }

        let candidates = match &self.faults {
            Some(faults) => faults.filter_available(brokers),
            None => brokers.to_vec(),
        };
        if candidates.is_empty() {
            return None;
        }

        let index = start.wrapping_add(attempt as usize) % candidates.len();
        candidates.into_iter().nth(index)
    }

    pub fn faults(&self) -> Option<&BrokerFaultTracker> {
        self.faults.as_ref()
    }
}
