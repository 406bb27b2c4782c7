//! Half message → local execution → commit/rollback, plus broker checks

use crate::error::{ProducerError, ProducerResult};
use crate::message::{properties, Destination, Message, SendResult};
use crate::metrics::PRODUCER_METRICS;
use crate::producer::SendDispatcher;
use crate::transaction::check::{CheckListener, CheckTransactionRequest};
use crate::transaction::{
    ExecutorRegistry, LocalTransactionExecutor, PhaseTransition, TransactionArg,
    TransactionPhase, TransactionRecord, TransactionState,
};
use crate::transport::{BrokerTarget, EndTransactionRequest};
use dashmap::DashMap;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

/// Outcome of a transactional send
#[derive(Debug, Clone)]
pub struct TransactionSendResult {
    /// Acknowledgment of the half message
    pub send_result: SendResult,
    pub transaction_id: String,
    /// What the local executor decided
    pub local_state: TransactionState,
    /// Where the send ended up
    pub phase: TransactionPhase,
    /// Failure raised by the local executor, if any
    pub execution_error: Option<ProducerError>,
    pub history: Vec<PhaseTransition>,
}

/// Drives transactional sends and answers broker checks
#[derive(Clone)]
pub struct TransactionCoordinator {
    inner: Arc<CoordinatorInner>,
}

struct CoordinatorInner {
    dispatcher: SendDispatcher,
    executors: ExecutorRegistry,
    in_flight: DashMap<String, Arc<Mutex<()>>>,
}

impl TransactionCoordinator {
    pub fn new(dispatcher: SendDispatcher, executors: ExecutorRegistry) -> Self {
        Self {
            inner: Arc::new(CoordinatorInner {
                dispatcher,
                executors,
                in_flight: DashMap::new(),
            }),
        }
    }

    pub fn executors(&self) -> &ExecutorRegistry {
        &self.inner.executors
    }

    pub(crate) fn runtime(&self) -> &Handle {
        self.inner.dispatcher.runtime()
    }

    /// Send a half message, run the local transaction and report its outcome
    ///
    /// Fails only when the group has no executor or the half message is not
    /// accepted; in both cases the local transaction never runs. Executor
    /// failures and lost reports leave the message pending a broker check.
    pub async fn send_in_transaction(
        &self,
        group: &str,
        destination: &Destination,
        message: &Message,
        arg: TransactionArg<'_>,
    ) -> ProducerResult<TransactionSendResult> {
        let executor = self.inner.executors.get(group)?;
        let transaction_id = message.key().to_string();

        let lock = self.transaction_lock(&transaction_id);
        let result = {
            let _guard = lock.lock().await;
            self.run_transaction(executor, group, destination, message, arg)
                .await
        };
        drop(lock);
        self.release_lock(&transaction_id);

        result
    }

    async fn run_transaction(
        &self,
        executor: Arc<dyn LocalTransactionExecutor>,
        group: &str,
        destination: &Destination,
        message: &Message,
        arg: TransactionArg<'_>,
    ) -> ProducerResult<TransactionSendResult> {
        let transaction_id = message.key().to_string();
        let half = message.with_properties([
            (properties::TRANSACTION_PREPARED.to_string(), "true".to_string()),
            (properties::PRODUCER_GROUP.to_string(), group.to_string()),
        ]);

        let send_result = self.inner.dispatcher.send_sync(destination, &half).await?;

        let mut record = TransactionRecord::half_message_sent(&transaction_id, group);
        self.advance(&mut record, TransactionPhase::Executing, "half message stored");

        let (local_state, execution_error) = self.execute(executor.as_ref(), &half, arg).await;

        let reported = self
            .report(
                &send_result.broker,
                EndTransactionRequest {
                    msg_id: send_result.msg_id.clone(),
                    transaction_id: transaction_id.clone(),
                    group: group.to_string(),
                    state: local_state,
                    from_check: false,
                },
            )
            .await;

        let phase = if reported {
            TransactionPhase::settled_by(local_state)
        } else {
            TransactionPhase::PendingRecheck
        };
        let reason = if reported {
            format!("reported {}", local_state)
        } else {
            format!("report of {} lost", local_state)
        };
        self.advance(&mut record, phase, reason);

        PRODUCER_METRICS
            .transactions
            .with_label_values(&[group, &local_state.to_string()])
            .inc();

        info!(
            transaction_id = %transaction_id,
            group = %group,
            topic = %destination.topic(),
            local_state = %local_state,
            phase = %record.phase(),
            "Transactional send finished"
        );

        Ok(TransactionSendResult {
            send_result,
            transaction_id,
            local_state,
            phase: record.phase(),
            execution_error,
            history: record.history().to_vec(),
        })
    }

    /// Answer a broker check and report the answer back
    ///
    /// Safe to call repeatedly and concurrently for the same transaction; a
    /// check for a transaction still inside `send_in_transaction` waits for it
    /// to finish. The answer comes from the executor's durable state.
    pub async fn handle_check(
        &self,
        request: &CheckTransactionRequest,
    ) -> ProducerResult<TransactionState> {
        let executor = self.inner.executors.get(&request.group)?;

        let lock = self.transaction_lock(&request.transaction_id);
        let state = {
            let _guard = lock.lock().await;
            self.check(executor.as_ref(), request).await
        };
        drop(lock);
        self.release_lock(&request.transaction_id);

        PRODUCER_METRICS
            .transaction_checks
            .with_label_values(&[&request.group, &state.to_string()])
            .inc();

        info!(
            transaction_id = %request.transaction_id,
            group = %request.group,
            check_times = request.check_times,
            state = %state,
            "Answering transaction check"
        );

        self.report(
            &request.broker,
            EndTransactionRequest {
                msg_id: request.msg_id.clone(),
                transaction_id: request.transaction_id.clone(),
                group: request.group.clone(),
                state,
                from_check: true,
            },
        )
        .await;

        Ok(state)
    }

    /// Start serving inbound checks on a bounded pool
    pub fn start_check_listener(&self) -> CheckListener {
        let config = self.inner.dispatcher.config();
        CheckListener::spawn(
            self.clone(),
            config.check_request_queue,
            config.check_concurrency,
        )
    }

    async fn execute(
        &self,
        executor: &dyn LocalTransactionExecutor,
        message: &Message,
        arg: TransactionArg<'_>,
    ) -> (TransactionState, Option<ProducerError>) {
        let outcome = AssertUnwindSafe(executor.execute_local_transaction(message, arg))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(state)) => (state, None),
            Ok(Err(err)) => {
                warn!(
                    transaction_id = %message.key(),
                    error = %err,
                    "Local transaction failed, leaving decision to broker check"
                );
                (
                    TransactionState::Unknown,
                    Some(ProducerError::TransactionExecution(err.to_string())),
                )
            }
            Err(_) => {
                error!(
                    transaction_id = %message.key(),
                    "Local transaction panicked, leaving decision to broker check"
                );
                (
                    TransactionState::Unknown,
                    Some(ProducerError::TransactionExecution(
                        "local transaction panicked".to_string(),
                    )),
                )
            }
        }
    }

    async fn check(
        &self,
        executor: &dyn LocalTransactionExecutor,
        request: &CheckTransactionRequest,
    ) -> TransactionState {
        let outcome = AssertUnwindSafe(executor.check_local_transaction(&request.message))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(state)) => state,
            Ok(Err(err)) => {
                warn!(
                    transaction_id = %request.transaction_id,
                    error = %err,
                    "Transaction check failed, answering UNKNOWN"
                );
                TransactionState::Unknown
            }
            Err(_) => {
                error!(
                    transaction_id = %request.transaction_id,
                    "Transaction check panicked, answering UNKNOWN"
                );
                TransactionState::Unknown
            }
        }
    }

    /// Report a decision; `false` when it did not reach the broker
    async fn report(&self, broker: &BrokerTarget, request: EndTransactionRequest) -> bool {
        let timeout = self.inner.dispatcher.config().send_timeout();
        let transport = self.inner.dispatcher.transport();

        match tokio::time::timeout(timeout, transport.end_transaction(broker, &request)).await {
            Ok(Ok(())) => true,
            Ok(Err(err)) => {
                warn!(
                    transaction_id = %request.transaction_id,
                    broker = %broker,
                    state = %request.state,
                    error = %err,
                    "End-transaction report failed"
                );
                false
            }
            Err(_) => {
                warn!(
                    transaction_id = %request.transaction_id,
                    broker = %broker,
                    state = %request.state,
                    "End-transaction report timed out"
                );
                false
            }
        }
    }

    fn advance(&self, record: &mut TransactionRecord, to: TransactionPhase, reason: impl Into<String>) {
        if let Err(err) = record.advance(to, reason) {
            error!(transaction_id = %record.transaction_id, error = %err, "Phase change rejected");
        }
    }

    fn transaction_lock(&self, transaction_id: &str) -> Arc<Mutex<()>> {
        self.inner
            .in_flight
            .entry(transaction_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn release_lock(&self, transaction_id: &str) {
        self.inner
            .in_flight
            .remove_if(transaction_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}
