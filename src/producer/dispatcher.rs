//! Send dispatcher: blocking, callback and one-way sends

use crate::config::ProducerConfig;
use crate::error::{ProducerError, ProducerResult};
use crate::message::{Destination, Message, SendResult};
use crate::metrics::PRODUCER_METRICS;
use crate::producer::callback::SendCallback;
use crate::producer::retry::{BrokerSelector, RetryPolicy};
use crate::transport::{
    BrokerTarget, DeliveryMode, RouteResolver, Transport, TransportError, WireMessage,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tracing::{debug, error, warn};

/// Sends messages through a [`Transport`] with retry and broker selection
///
/// Cheap to clone; clones share the same state and worker pool.
#[derive(Clone)]
pub struct SendDispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    config: Arc<ProducerConfig>,
    transport: Arc<dyn Transport>,
    routes: Arc<dyn RouteResolver>,
    selector: BrokerSelector,
    runtime: Handle,
    async_permits: Arc<Semaphore>,
    running: AtomicBool,
}

impl SendDispatcher {
    /// Create a dispatcher bound to the current tokio runtime
    pub fn new(
        config: Arc<ProducerConfig>,
        transport: Arc<dyn Transport>,
        routes: Arc<dyn RouteResolver>,
        selector: BrokerSelector,
    ) -> ProducerResult<Self> {
        let runtime = Handle::try_current().map_err(|_| {
            ProducerError::Configuration(
                "producer must be created inside a tokio runtime".to_string(),
            )
        })?;

        let async_permits = Arc::new(Semaphore::new(config.async_send_concurrency));

        Ok(Self {
            inner: Arc::new(DispatcherInner {
                config,
                transport,
                routes,
                selector,
                runtime,
                async_permits,
                running: AtomicBool::new(true),
            }),
        })
    }

    pub fn config(&self) -> &ProducerConfig {
        &self.inner.config
    }

    pub(crate) fn transport(&self) -> &Arc<dyn Transport> {
        &self.inner.transport
    }

    pub(crate) fn runtime(&self) -> &Handle {
        &self.inner.runtime
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Send and wait for the broker acknowledgment
    ///
    /// Returns once a broker acknowledged the message or a terminal failure
    /// occurred: a permanent error, exhausted retries or an exhausted timeout
    /// budget.
    pub async fn send_sync(
        &self,
        destination: &Destination,
        message: &Message,
    ) -> ProducerResult<SendResult> {
        if !self.is_running() {
            return Err(ProducerError::NotRunning);
        }

        let policy = RetryPolicy::for_sync(&self.inner.config);
        self.send_with_retry(destination, message, DeliveryMode::Sync, policy)
            .await
    }

    /// Send on a background task and report through `callback`
    ///
    /// Returns immediately. Concurrent background sends are bounded by
    /// `async_send_concurrency`; excess sends wait for a slot.
    pub fn send_async<C>(&self, destination: Destination, message: Message, callback: C)
    where
        C: SendCallback,
    {
        let callback: Box<dyn SendCallback> = Box::new(callback);
        let this = self.clone();

        self.inner.runtime.spawn(async move {
            if !this.is_running() {
                callback.on_failure(ProducerError::NotRunning);
                return;
            }

            let permit = match this.inner.async_permits.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    callback.on_failure(ProducerError::NotRunning);
                    return;
                }
            };

            let policy = RetryPolicy::for_async(&this.inner.config);
            let result = this
                .send_with_retry(&destination, &message, DeliveryMode::Async, policy)
                .await;

            match result {
                Ok(send_result) => callback.on_success(send_result),
                Err(err) => callback.on_failure(err),
            }

            drop(permit);
        });
    }

    /// Fire-and-forget send
    ///
    /// Never blocks and never reports failure; a single attempt is made and
    /// any error is logged and dropped. The background attempt shares the
    /// `async_send_concurrency` pool with callback sends, so shutdown waits
    /// for it too.
    pub fn send_one_way(&self, destination: Destination, message: Message) {
        if !self.is_running() {
            debug!(topic = %destination.topic(), "One-way send dropped, producer not running");
            return;
        }

        let this = self.clone();
        self.inner.runtime.spawn(async move {
            let permit = match this.inner.async_permits.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    debug!(topic = %destination.topic(), "One-way send dropped, producer shut down");
                    return;
                }
            };

            let result = this
                .send_with_retry(&destination, &message, DeliveryMode::OneWay, RetryPolicy::no_retry())
                .await;

            if let Err(err) = result {
                debug!(
                    topic = %destination.topic(),
                    key = %message.key(),
                    error = %err,
                    "One-way send dropped"
                );
            }

            drop(permit);
        });
    }

    /// Stop accepting sends and wait for in-flight callback sends
    pub async fn shutdown(&self) {
        if !self.inner.running.swap(false, Ordering::SeqCst) {
            return;
        }

        let permits = self.inner.config.async_send_concurrency as u32;
        if let Ok(all) = self.inner.async_permits.acquire_many(permits).await {
            drop(all);
        }
        self.inner.async_permits.close();
    }

    /// Run the retry loop for one message
    pub(crate) async fn send_with_retry(
        &self,
        destination: &Destination,
        message: &Message,
        mode: DeliveryMode,
        policy: RetryPolicy,
    ) -> ProducerResult<SendResult> {
        let started = Instant::now();
        let topic = destination.topic();
        let result = self
            .attempt_loop(destination, message, mode, policy, started)
            .await;

        let outcome = match &result {
            Ok(_) => "success".to_string(),
            Err(err) => err.kind().to_string(),
        };
        PRODUCER_METRICS
            .messages_sent
            .with_label_values(&[topic, &mode.to_string(), &outcome])
            .inc();
        PRODUCER_METRICS
            .send_latency
            .with_label_values(&[topic, &mode.to_string()])
            .observe(started.elapsed().as_secs_f64());

        result
    }

    async fn attempt_loop(
        &self,
        destination: &Destination,
        message: &Message,
        mode: DeliveryMode,
        policy: RetryPolicy,
        started: Instant,
    ) -> ProducerResult<SendResult> {
        let config = &self.inner.config;
        let topic = destination.topic();

        let wire = WireMessage::encode(destination, message, config)?;
        let brokers = self.inner.routes.brokers_for(topic)?;
        if brokers.is_empty() {
            return Err(no_route(topic));
        }
        let budget = config.send_timeout();
        let start = self.inner.selector.next_start(topic);

        let mut first: Option<BrokerTarget> = None;
        let mut last_error: Option<ProducerError> = None;
        let mut attempts = 0;

        while attempts < policy.max_attempts() {
            let elapsed = started.elapsed();
            if elapsed >= budget {
                error!(
                    topic = %topic,
                    key = %message.key(),
                    attempts,
                    "Send timeout budget exhausted"
                );
                return Err(ProducerError::Timeout {
                    elapsed_ms: elapsed.as_millis() as u64,
                    attempts,
                });
            }
            let remaining = budget - elapsed;

            let target = self
                .inner
                .selector
                .select(&brokers, start, attempts, &policy, first.as_ref())
                .ok_or_else(|| no_route(topic))?;
            first.get_or_insert_with(|| target.clone());

            if attempts > 0 {
                PRODUCER_METRICS.send_retries.with_label_values(&[topic]).inc();
                warn!(
                    topic = %topic,
                    key = %message.key(),
                    broker = %target,
                    attempt = attempts + 1,
                    max_attempts = policy.max_attempts(),
                    "Retrying send"
                );
            }
            PRODUCER_METRICS.send_attempts.with_label_values(&[topic]).inc();
            attempts += 1;

            let delivery = self.inner.transport.deliver(&target, &wire, mode);
            let outcome = match tokio::time::timeout(remaining, delivery).await {
                Ok(Ok(ack)) => Ok(ack),
                Ok(Err(err)) => Err(err.into_producer_error(&target)),
                Err(_) => Err(TransportError::Timeout(remaining.as_millis() as u64)
                    .into_producer_error(&target)),
            };

            match outcome {
                Ok(ack) => {
                    if let Some(faults) = self.inner.selector.faults() {
                        faults.record_success(&target.name);
                    }

                    debug!(
                        topic = %topic,
                        key = %message.key(),
                        broker = %target,
                        msg_id = %ack.msg_id,
                        attempts,
                        "Message delivered"
                    );

                    return Ok(SendResult {
                        status: ack.status,
                        msg_id: ack.msg_id,
                        message_key: message.key().to_string(),
                        broker: target,
                        queue_offset: ack.queue_offset,
                        attempts,
                    });
                }
                Err(err) => {
                    if err.is_retryable() {
                        if let Some(faults) = self.inner.selector.faults() {
                            faults.record_failure(&target.name);
                        }
                    }

                    if !policy.should_retry(&err, attempts) {
                        if err.is_retryable() {
                            error!(
                                topic = %topic,
                                key = %message.key(),
                                attempts,
                                error = %err,
                                "Send failed after exhausting retries"
                            );
                        }
                        return Err(err);
                    }

                    last_error = Some(err);
                }
            }
        }

        Err(last_error.unwrap_or(ProducerError::Timeout {
            elapsed_ms: started.elapsed().as_millis() as u64,
            attempts,
        }))
    }
}

fn no_route(topic: &str) -> ProducerError {
    ProducerError::Configuration(format!("no route info for topic '{}'", topic))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::producer::callback::oneshot_callback;
    use crate::transport::{InMemoryBroker, StaticRouteTable};

    fn dispatcher(config: ProducerConfig, broker: Arc<InMemoryBroker>) -> SendDispatcher {
        let routes = StaticRouteTable::new().with_default_brokers(vec![
            BrokerTarget::new("broker-a", "10.0.0.1:10911"),
            BrokerTarget::new("broker-b", "10.0.0.2:10911"),
        ]);

        SendDispatcher::new(
            Arc::new(config),
            broker,
            Arc::new(routes),
            BrokerSelector::new(None),
        )
        .unwrap()
    }

    fn orders() -> Destination {
        Destination::parse("orders").unwrap()
    }

    #[tokio::test]
    async fn test_sync_send_delivers_once() {
        let broker = Arc::new(InMemoryBroker::new());
        let dispatcher = dispatcher(ProducerConfig::default(), broker.clone());

        let result = dispatcher
            .send_sync(&orders(), &Message::new("created"))
            .await
            .unwrap();

        assert!(result.is_ok());
        assert_eq!(result.attempts, 1);
        assert_eq!(broker.delivery_count(), 1);
    }

    #[tokio::test]
    async fn test_permanent_error_not_retried() {
        let broker = Arc::new(InMemoryBroker::new());
        broker.fail_next(
            "broker-a",
            [TransportError::Rejected {
                code: 13,
                reason: "illegal".to_string(),
            }],
        );
        let dispatcher = dispatcher(ProducerConfig::default(), broker.clone());

        let err = dispatcher
            .send_sync(&orders(), &Message::new("x"))
            .await
            .unwrap_err();

        assert!(matches!(err, ProducerError::PermanentSend(_)));
        assert_eq!(broker.delivery_count(), 1);
    }

    #[tokio::test]
    async fn test_transient_error_recovers_on_retry() {
        let broker = Arc::new(InMemoryBroker::new());
        broker.fail_next("broker-a", [TransportError::BrokerBusy("busy".to_string())]);
        let dispatcher = dispatcher(ProducerConfig::default(), broker.clone());

        let result = dispatcher.send_sync(&orders(), &Message::new("x")).await.unwrap();

        assert_eq!(result.attempts, 2);
        assert_eq!(result.broker.name, "broker-a");
    }

    #[tokio::test]
    async fn test_timeout_budget_is_terminal() {
        let broker = Arc::new(InMemoryBroker::new());
        broker.set_latency(Some(std::time::Duration::from_millis(200)));
        let config = ProducerConfig {
            send_message_timeout_ms: 50,
            ..Default::default()
        };
        let dispatcher = dispatcher(config, broker);

        let err = dispatcher
            .send_sync(&orders(), &Message::new("x"))
            .await
            .unwrap_err();

        assert!(matches!(err, ProducerError::Timeout { attempts: 1, .. }));
    }

    #[tokio::test]
    async fn test_shutdown_rejects_new_sends() {
        let broker = Arc::new(InMemoryBroker::new());
        let dispatcher = dispatcher(ProducerConfig::default(), broker.clone());
        dispatcher.shutdown().await;

        let err = dispatcher
            .send_sync(&orders(), &Message::new("x"))
            .await
            .unwrap_err();
        assert_eq!(err, ProducerError::NotRunning);

        let (callback, rx) = oneshot_callback();
        dispatcher.send_async(orders(), Message::new("x"), callback);
        assert_eq!(rx.await.unwrap(), Err(ProducerError::NotRunning));
        assert_eq!(broker.delivery_count(), 0);
    }

    struct NoBrokers;

    impl RouteResolver for NoBrokers {
        fn brokers_for(&self, _topic: &str) -> ProducerResult<Vec<BrokerTarget>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_empty_route_is_configuration_error() {
        let broker = Arc::new(InMemoryBroker::new());
        let dispatcher = SendDispatcher::new(
            Arc::new(ProducerConfig::default()),
            broker.clone(),
            Arc::new(NoBrokers),
            BrokerSelector::new(None),
        )
        .unwrap();

        let err = dispatcher
            .send_sync(&orders(), &Message::new("x"))
            .await
            .unwrap_err();

        assert!(matches!(err, ProducerError::Configuration(_)));
        assert_eq!(broker.delivery_count(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_one_way_send() {
        let broker = Arc::new(InMemoryBroker::new());
        broker.set_latency(Some(std::time::Duration::from_millis(50)));
        let dispatcher = dispatcher(ProducerConfig::default(), broker.clone());

        dispatcher.send_one_way(orders(), Message::new("tick"));
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        dispatcher.shutdown().await;

        assert_eq!(broker.visible_messages("orders").len(), 1);
    }

    #[test]
    fn test_requires_runtime() {
        let result = SendDispatcher::new(
            Arc::new(ProducerConfig::default()),
            Arc::new(InMemoryBroker::new()),
            Arc::new(StaticRouteTable::new()),
            BrokerSelector::new(None),
        );
        assert!(matches!(result, Err(ProducerError::Configuration(_))));
    }
}
