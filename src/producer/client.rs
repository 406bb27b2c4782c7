//! Producer facade

use crate::config::{ensure_valid, ProducerConfig};
use crate::error::{ProducerError, ProducerResult};
use crate::fault::{BrokerFaultTracker, FaultConfig};
use crate::message::{Destination, Message, SendResult};
use crate::producer::{BrokerSelector, SendCallback, SendDispatcher};
use crate::transaction::{
    CheckListener, CheckTransactionRequest, ExecutorRegistry, ExecutorRegistryBuilder,
    LocalTransactionExecutor, TransactionArg, TransactionCoordinator, TransactionSendResult,
    TransactionState,
};
use crate::transport::{RouteResolver, Transport};
use std::sync::Arc;
use tracing::info;

/// Message producer
///
/// Cheap to clone. Must be built inside a tokio runtime; background sends and
/// transaction checks run on that runtime.
#[derive(Clone)]
pub struct Producer {
    dispatcher: SendDispatcher,
    coordinator: TransactionCoordinator,
}

impl Producer {
    pub fn builder(config: ProducerConfig) -> ProducerBuilder {
        ProducerBuilder::new(config)
    }

    pub fn config(&self) -> &ProducerConfig {
        self.dispatcher.config()
    }

    /// Send and wait for the broker acknowledgment
    pub async fn send_sync(
        &self,
        destination: &Destination,
        message: &Message,
    ) -> ProducerResult<SendResult> {
        self.dispatcher.send_sync(destination, message).await
    }

    /// Send in the background; `callback` fires exactly once
    pub fn send_async<C>(&self, destination: Destination, message: Message, callback: C)
    where
        C: SendCallback,
    {
        self.dispatcher.send_async(destination, message, callback)
    }

    /// Fire-and-forget send with no acknowledgment and no retry
    pub fn send_one_way(&self, destination: Destination, message: Message) {
        self.dispatcher.send_one_way(destination, message)
    }

    /// Transactional send for `group`
    pub async fn send_in_transaction(
        &self,
        group: &str,
        destination: &Destination,
        message: &Message,
        arg: TransactionArg<'_>,
    ) -> ProducerResult<TransactionSendResult> {
        if !self.dispatcher.is_running() {
            return Err(ProducerError::NotRunning);
        }

        self.coordinator
            .send_in_transaction(group, destination, message, arg)
            .await
    }

    /// Answer a broker check for an undecided half message
    pub async fn handle_check(
        &self,
        request: &CheckTransactionRequest,
    ) -> ProducerResult<TransactionState> {
        self.coordinator.handle_check(request).await
    }

    /// Start serving broker checks in the background
    pub fn start_check_listener(&self) -> CheckListener {
        self.coordinator.start_check_listener()
    }

    pub fn coordinator(&self) -> &TransactionCoordinator {
        &self.coordinator
    }

    pub fn is_running(&self) -> bool {
        self.dispatcher.is_running()
    }

    /// Stop accepting sends and wait for in-flight callback sends
    pub async fn shutdown(&self) {
        info!(group = %self.config().producer_group, "Shutting down producer");
        self.dispatcher.shutdown().await;
        info!(group = %self.config().producer_group, "Producer stopped");
    }
}

/// Builder for [`Producer`]
pub struct ProducerBuilder {
    config: ProducerConfig,
    transport: Option<Arc<dyn Transport>>,
    routes: Option<Arc<dyn RouteResolver>>,
    executors: ExecutorRegistryBuilder,
    registry: Option<ExecutorRegistry>,
}

impl ProducerBuilder {
    pub fn new(config: ProducerConfig) -> Self {
        Self {
            config,
            transport: None,
            routes: None,
            executors: ExecutorRegistry::builder(),
            registry: None,
        }
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn routes(mut self, routes: Arc<dyn RouteResolver>) -> Self {
        self.routes = Some(routes);
        self
    }

    /// Register the local transaction executor for `group`
    ///
    /// Fails on an empty or already registered group.
    pub fn register_executor(
        mut self,
        group: impl Into<String>,
        executor: Arc<dyn LocalTransactionExecutor>,
    ) -> ProducerResult<Self> {
        self.executors = self.executors.register(group, executor)?;
        Ok(self)
    }

    /// Use a prebuilt registry instead of individual registrations
    ///
    /// Combining this with [`register_executor`](Self::register_executor)
    /// fails at [`build`](Self::build).
    pub fn executors(mut self, registry: ExecutorRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn build(self) -> ProducerResult<Producer> {
        ensure_valid(&self.config)?;

        let transport = self.transport.ok_or_else(|| {
            ProducerError::Configuration("producer transport is not set".to_string())
        })?;
        let routes = self.routes.ok_or_else(|| {
            ProducerError::Configuration("producer route resolver is not set".to_string())
        })?;

        let faults = self
            .config
            .send_latency_fault_enable
            .then(|| BrokerFaultTracker::new(FaultConfig::from(&self.config)));
        let selector = BrokerSelector::new(faults);

        let registry = match self.registry {
            Some(_) if !self.executors.is_empty() => {
                return Err(ProducerError::Configuration(
                    "executors were registered individually and as a prebuilt registry"
                        .to_string(),
                ));
            }
            Some(registry) => registry,
            None => self.executors.build(),
        };

        let config = Arc::new(self.config);
        let dispatcher = SendDispatcher::new(config.clone(), transport, routes, selector)?;
        let coordinator = TransactionCoordinator::new(dispatcher.clone(), registry);

        info!(
            group = %config.producer_group,
            transaction_groups = ?coordinator.executors().groups(),
            fault_isolation = config.send_latency_fault_enable,
            "Producer started"
        );

        Ok(Producer {
            dispatcher,
            coordinator,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{BrokerTarget, InMemoryBroker, StaticRouteTable};
    use async_trait::async_trait;

    struct NoopExecutor;

    #[async_trait]
    impl LocalTransactionExecutor for NoopExecutor {
        async fn execute_local_transaction(
            &self,
            _message: &Message,
            _arg: TransactionArg<'_>,
        ) -> anyhow::Result<TransactionState> {
            Ok(TransactionState::Commit)
        }

        async fn check_local_transaction(
            &self,
            _message: &Message,
        ) -> anyhow::Result<TransactionState> {
            Ok(TransactionState::Commit)
        }
    }

    fn routes() -> Arc<StaticRouteTable> {
        Arc::new(
            StaticRouteTable::new()
                .with_default_brokers(vec![BrokerTarget::new("broker-a", "10.0.0.1:10911")]),
        )
    }

    #[tokio::test]
    async fn test_build_requires_transport() {
        let result = Producer::builder(ProducerConfig::default())
            .routes(routes())
            .build();
        assert!(matches!(result, Err(ProducerError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_build_rejects_invalid_config() {
        let config = ProducerConfig {
            producer_group: String::new(),
            ..Default::default()
        };
        let result = Producer::builder(config)
            .transport(Arc::new(InMemoryBroker::new()))
            .routes(routes())
            .build();
        assert!(matches!(result, Err(ProducerError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_build_rejects_mixed_executor_sources() {
        let registry = ExecutorRegistry::builder()
            .register("payments-tx", Arc::new(NoopExecutor))
            .unwrap()
            .build();

        let result = Producer::builder(ProducerConfig::default())
            .transport(Arc::new(InMemoryBroker::new()))
            .routes(routes())
            .register_executor("orders-tx", Arc::new(NoopExecutor))
            .unwrap()
            .executors(registry)
            .build();

        assert!(matches!(result, Err(ProducerError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_build_accepts_prebuilt_registry() {
        let registry = ExecutorRegistry::builder()
            .register("payments-tx", Arc::new(NoopExecutor))
            .unwrap()
            .build();

        let producer = Producer::builder(ProducerConfig::default())
            .transport(Arc::new(InMemoryBroker::new()))
            .routes(routes())
            .executors(registry)
            .build()
            .unwrap();

        assert_eq!(producer.coordinator.executors().groups(), vec!["payments-tx"]);
    }

    #[tokio::test]
    async fn test_shutdown_rejects_transactional_send() {
        let producer = Producer::builder(ProducerConfig::default())
            .transport(Arc::new(InMemoryBroker::new()))
            .routes(routes())
            .build()
            .unwrap();
        producer.shutdown().await;

        let destination = Destination::parse("orders").unwrap();
        let err = producer
            .send_in_transaction("orders-tx", &destination, &Message::new("x"), None)
            .await
            .unwrap_err();
        assert_eq!(err, ProducerError::NotRunning);
        assert!(!producer.is_running());
    }
}
