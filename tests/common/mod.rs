//! Shared fixtures for producer integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use dashmap::DashMap;
use llm_event_producer::transport::{BrokerTarget, InMemoryBroker, StaticRouteTable};
use llm_event_producer::{
    LocalTransactionExecutor, Message, Producer, ProducerConfig, TransactionArg, TransactionState,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const ORDERS_GROUP: &str = "orders-tx";

pub fn brokers() -> Vec<BrokerTarget> {
    vec![
        BrokerTarget::new("broker-a", "10.0.0.1:10911"),
        BrokerTarget::new("broker-b", "10.0.0.2:10911"),
    ]
}

/// Producer over an in-memory broker serving every topic from broker-a and broker-b
pub fn producer(config: ProducerConfig, broker: Arc<InMemoryBroker>) -> Producer {
    Producer::builder(config)
        .transport(broker)
        .routes(Arc::new(StaticRouteTable::new().with_default_brokers(brokers())))
        .build()
        .unwrap()
}

/// Same as [`producer`] with `executor` registered for [`ORDERS_GROUP`]
pub fn transactional_producer(
    config: ProducerConfig,
    broker: Arc<InMemoryBroker>,
    executor: Arc<RecordingExecutor>,
) -> Producer {
    Producer::builder(config)
        .transport(broker)
        .routes(Arc::new(StaticRouteTable::new().with_default_brokers(brokers())))
        .register_executor(ORDERS_GROUP, executor)
        .unwrap()
        .build()
        .unwrap()
}

/// What the executor does for one transaction id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Plan {
    /// Persist the decision and return it
    Decide(TransactionState),
    /// Persist the decision, then fail anyway
    DecideThenFail(TransactionState),
    /// Fail without touching durable state
    Fail,
    /// Work for a while, then persist the decision and return it
    SlowDecide(Duration, TransactionState),
    Panic,
}

/// Executor whose check answers come from a "durable" decision table
#[derive(Default)]
pub struct RecordingExecutor {
    plans: DashMap<String, Plan>,
    durable: DashMap<String, TransactionState>,
    pub executions: AtomicUsize,
    pub checks: AtomicUsize,
}

impl RecordingExecutor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn plan(&self, transaction_id: &str, plan: Plan) {
        self.plans.insert(transaction_id.to_string(), plan);
    }

    /// Change durable state behind the producer's back
    pub fn persist(&self, transaction_id: &str, state: TransactionState) {
        self.durable.insert(transaction_id.to_string(), state);
    }

    pub fn executions(&self) -> usize {
        self.executions.load(Ordering::SeqCst)
    }

    pub fn checks(&self) -> usize {
        self.checks.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LocalTransactionExecutor for RecordingExecutor {
    async fn execute_local_transaction(
        &self,
        message: &Message,
        _arg: TransactionArg<'_>,
    ) -> anyhow::Result<TransactionState> {
        self.executions.fetch_add(1, Ordering::SeqCst);

        let plan = self
            .plans
            .get(message.key())
            .map(|p| *p.value())
            .unwrap_or(Plan::Decide(TransactionState::Commit));

        match plan {
            Plan::Decide(state) => {
                self.persist(message.key(), state);
                Ok(state)
            }
            Plan::DecideThenFail(state) => {
                self.persist(message.key(), state);
                anyhow::bail!("connection reset after local commit")
            }
            Plan::Fail => anyhow::bail!("local database unavailable"),
            Plan::SlowDecide(delay, state) => {
                tokio::time::sleep(delay).await;
                self.persist(message.key(), state);
                Ok(state)
            }
            Plan::Panic => panic!("executor bug"),
        }
    }

    async fn check_local_transaction(&self, message: &Message) -> anyhow::Result<TransactionState> {
        self.checks.fetch_add(1, Ordering::SeqCst);

        Ok(self
            .durable
            .get(message.key())
            .map(|s| *s.value())
            .unwrap_or(TransactionState::Unknown))
    }
}

pub fn keyed(key: &str, payload: &str) -> Message {
    Message::builder().key(key).payload(payload).build()
}

/// Parse Prometheus exposition output into metric name → sample lines
pub fn parse_prometheus_output(output: &str) -> HashMap<String, Vec<String>> {
    let mut metrics: HashMap<String, Vec<String>> = HashMap::new();

    for line in output.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let name_end = line.find(|c| c == '{' || c == ' ').unwrap_or(line.len());
        metrics
            .entry(line[..name_end].to_string())
            .or_default()
            .push(line.to_string());
    }

    metrics
}

/// Extract labels from a sample line
///
/// `metric{a="1",b="2"} 3` → {"a": "1", "b": "2"}
pub fn extract_labels(line: &str) -> HashMap<String, String> {
    let mut labels = HashMap::new();

    if let (Some(start), Some(end)) = (line.find('{'), line.find('}')) {
        for pair in line[start + 1..end].split(',') {
            if let Some((key, value)) = pair.split_once('=') {
                labels.insert(key.trim().to_string(), value.trim().trim_matches('"').to_string());
            }
        }
    }

    labels
}

/// Value of a sample line
pub fn extract_metric_value(line: &str) -> Option<f64> {
    line.split_whitespace().last()?.parse::<f64>().ok()
}
