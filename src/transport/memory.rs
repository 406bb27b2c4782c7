//! In-process broker used by tests and the demo binary
//!
//! Stores accepted messages, keeps half messages until a decision arrives and
//! drives transaction checks the way a real broker would. Reachability,
//! scripted failures, latency and lost reports can be injected per broker.

use crate::message::Destination;
use crate::transaction::{CheckTransactionRequest, TransactionState};
use crate::transport::{
    BrokerAck, BrokerTarget, DeliveryMode, EndTransactionRequest, Transport, TransportError,
    TransportResult, WireMessage,
};
use crate::message::SendStatus;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Broker-side check policy
///
/// How a half message is resolved once the broker gives up checking is broker
/// policy, so it is configurable here rather than fixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BrokerCheckPolicy {
    /// Checks before the broker resolves on its own
    pub max_check_times: u32,
    /// Decision applied when checks are exhausted
    pub exhausted_resolution: TransactionState,
}

impl Default for BrokerCheckPolicy {
    fn default() -> Self {
        Self {
            max_check_times: 15,
            exhausted_resolution: TransactionState::Rollback,
        }
    }
}

/// One delivery attempt seen by the broker
#[derive(Debug, Clone)]
pub struct DeliveryRecord {
    pub broker: String,
    pub topic: String,
    pub key: String,
    pub mode: DeliveryMode,
    pub accepted: bool,
    pub at: DateTime<Utc>,
}

/// A half message awaiting a decision
#[derive(Debug, Clone)]
pub struct HalfMessage {
    pub msg_id: String,
    pub broker: BrokerTarget,
    pub group: String,
    pub destination: Destination,
    pub message: WireMessage,
    pub check_times: u32,
}

/// In-memory broker cluster
pub struct InMemoryBroker {
    unreachable: DashMap<String, ()>,
    scripted_failures: DashMap<String, VecDeque<TransportError>>,
    latency: Mutex<Option<Duration>>,
    deliveries: Mutex<Vec<DeliveryRecord>>,
    visible: Mutex<Vec<WireMessage>>,
    half_messages: DashMap<String, HalfMessage>,
    resolutions: DashMap<String, TransactionState>,
    end_requests: Mutex<Vec<EndTransactionRequest>>,
    reports_to_drop: AtomicU32,
    next_offset: AtomicU64,
    check_policy: BrokerCheckPolicy,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::with_check_policy(BrokerCheckPolicy::default())
    }

    pub fn with_check_policy(check_policy: BrokerCheckPolicy) -> Self {
        Self {
            unreachable: DashMap::new(),
            scripted_failures: DashMap::new(),
            latency: Mutex::new(None),
            deliveries: Mutex::new(Vec::new()),
            visible: Mutex::new(Vec::new()),
            half_messages: DashMap::new(),
            resolutions: DashMap::new(),
            end_requests: Mutex::new(Vec::new()),
            reports_to_drop: AtomicU32::new(0),
            next_offset: AtomicU64::new(0),
            check_policy,
        }
    }

    /// Mark a broker reachable or not
    pub fn set_reachable(&self, broker: &str, reachable: bool) {
        if reachable {
            self.unreachable.remove(broker);
        } else {
            self.unreachable.insert(broker.to_string(), ());
        }
    }

    /// Fail the next deliveries to a broker with the given errors, in order
    pub fn fail_next(&self, broker: &str, errors: impl IntoIterator<Item = TransportError>) {
        self.scripted_failures
            .entry(broker.to_string())
            .or_default()
            .extend(errors);
    }

    /// Delay every delivery
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.lock() = latency;
    }

    /// Lose the next `count` end-transaction reports
    pub fn drop_next_reports(&self, count: u32) {
        self.reports_to_drop.store(count, Ordering::SeqCst);
    }

    /// Every delivery attempt, in arrival order
    pub fn deliveries(&self) -> Vec<DeliveryRecord> {
        self.deliveries.lock().clone()
    }

    pub fn delivery_count(&self) -> usize {
        self.deliveries.lock().len()
    }

    /// Messages visible to consumers of a topic
    pub fn visible_messages(&self, topic: &str) -> Vec<WireMessage> {
        self.visible
            .lock()
            .iter()
            .filter(|m| m.topic == topic)
            .cloned()
            .collect()
    }

    /// Half messages still awaiting a decision
    pub fn pending_half_messages(&self) -> Vec<HalfMessage> {
        self.half_messages.iter().map(|e| e.value().clone()).collect()
    }

    /// Final decision for a transaction, once made
    pub fn resolution(&self, transaction_id: &str) -> Option<TransactionState> {
        self.resolutions.get(transaction_id).map(|e| *e.value())
    }

    /// End-transaction reports that reached the broker
    pub fn end_requests(&self) -> Vec<EndTransactionRequest> {
        self.end_requests.lock().clone()
    }

    /// Run one check round
    ///
    /// Half messages that exhausted their checks are resolved by policy; the
    /// rest yield a check request each.
    pub fn collect_check_requests(&self) -> Vec<CheckTransactionRequest> {
        let mut requests = Vec::new();
        let mut exhausted = Vec::new();

        for mut entry in self.half_messages.iter_mut() {
            let transaction_id = entry.key().clone();
            let half = entry.value_mut();
            if half.check_times >= self.check_policy.max_check_times {
                exhausted.push(transaction_id);
                continue;
            }

            half.check_times += 1;
            match half.message.to_message() {
                Ok(message) => requests.push(CheckTransactionRequest {
                    broker: half.broker.clone(),
                    group: half.group.clone(),
                    msg_id: half.msg_id.clone(),
                    transaction_id,
                    destination: half.destination.clone(),
                    message,
                    check_times: half.check_times,
                }),
                Err(e) => warn!(msg_id = %half.msg_id, error = %e, "Cannot rebuild half message"),
            }
        }

        for transaction_id in exhausted {
            info!(
                transaction_id = %transaction_id,
                resolution = %self.check_policy.exhausted_resolution,
                "Check limit reached, resolving half message by policy"
            );
            self.resolve(&transaction_id, self.check_policy.exhausted_resolution);
        }

        requests
    }

    /// Push one check round into a coordinator's inbound queue
    pub async fn dispatch_checks(&self, sender: &mpsc::Sender<CheckTransactionRequest>) -> usize {
        let mut sent = 0;
        for request in self.collect_check_requests() {
            if sender.send(request).await.is_err() {
                warn!("Check listener is gone");
                break;
            }
            sent += 1;
        }
        sent
    }

    fn resolve(&self, transaction_id: &str, state: TransactionState) {
        if !state.is_definitive() {
            return;
        }

        let Some((_, half)) = self.half_messages.remove(transaction_id) else {
            return;
        };

        if state == TransactionState::Commit {
            let mut message = half.message;
            message.flags &= !super::FLAG_TRANSACTION_PREPARED;
            self.visible.lock().push(message);
        }

        self.resolutions.insert(transaction_id.to_string(), state);
    }

    fn record(&self, target: &BrokerTarget, message: &WireMessage, mode: DeliveryMode, accepted: bool) {
        self.deliveries.lock().push(DeliveryRecord {
            broker: target.name.clone(),
            topic: message.topic.clone(),
            key: message.key.clone(),
            mode,
            accepted,
            at: Utc::now(),
        });
    }

    fn next_failure(&self, broker: &str) -> Option<TransportError> {
        if self.unreachable.contains_key(broker) {
            return Some(TransportError::Unreachable(format!("{} is down", broker)));
        }

        self.scripted_failures
            .get_mut(broker)
            .and_then(|mut queue| queue.pop_front())
    }
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for InMemoryBroker {
    async fn deliver(
        &self,
        target: &BrokerTarget,
        message: &WireMessage,
        mode: DeliveryMode,
    ) -> TransportResult<BrokerAck> {
        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        if let Some(err) = self.next_failure(&target.name) {
            self.record(target, message, mode, false);
            return Err(err);
        }

        let offset = self.next_offset.fetch_add(1, Ordering::SeqCst);
        let msg_id = format!("{}-{:016X}", target.name, offset);
        self.record(target, message, mode, true);

        if message.is_half_message() {
            let destination = match &message.tag {
                Some(tag) => Destination::with_tag(message.topic.clone(), tag.clone()),
                None => Destination::new(message.topic.clone()),
            }
            .map_err(|e| TransportError::Rejected {
                code: 17,
                reason: e.to_string(),
            })?;

            let group = message
                .properties
                .get(crate::message::properties::PRODUCER_GROUP)
                .cloned()
                .unwrap_or_default();

            self.half_messages.insert(
                message.key.clone(),
                HalfMessage {
                    msg_id: msg_id.clone(),
                    broker: target.clone(),
                    group,
                    destination,
                    message: message.clone(),
                    check_times: 0,
                },
            );
        } else {
            self.visible.lock().push(message.clone());
        }

        debug!(broker = %target, msg_id = %msg_id, mode = %mode, "Message stored");

        Ok(BrokerAck {
            status: SendStatus::Ok,
            msg_id,
            queue_offset: offset,
        })
    }

    async fn end_transaction(
        &self,
        target: &BrokerTarget,
        request: &EndTransactionRequest,
    ) -> TransportResult<()> {
        let dropped = self
            .reports_to_drop
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if dropped {
            return Err(TransportError::Timeout(0));
        }

        if self.unreachable.contains_key(&target.name) {
            return Err(TransportError::Unreachable(format!("{} is down", target.name)));
        }

        self.end_requests.lock().push(request.clone());
        self.resolve(&request.transaction_id, request.state);
        Ok(())
    }
}
