//! Broker transport boundary
//!
//! The wire protocol and network layer live outside this crate. The producer
//! talks to brokers only through the [`Transport`] trait and learns which
//! brokers serve a topic through a [`RouteResolver`].

mod codec;
mod memory;
mod route;

pub use codec::{WireMessage, FLAG_COMPRESSED, FLAG_TRANSACTION_PREPARED};
pub use memory::{BrokerCheckPolicy, DeliveryRecord, HalfMessage, InMemoryBroker};
pub use route::{RouteResolver, StaticRouteTable};

use crate::error::ProducerError;
use crate::message::SendStatus;
use crate::transaction::TransactionState;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use strum::Display;

/// Identity of one broker instance
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BrokerTarget {
    /// Broker name
    pub name: String,
    /// Network address (`host:port`)
    pub addr: String,
}

impl BrokerTarget {
    pub fn new(name: impl Into<String>, addr: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            addr: addr.into(),
        }
    }
}

impl fmt::Display for BrokerTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.addr)
    }
}

/// How the broker is asked to handle a delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[strum(serialize_all = "snake_case")]
pub enum DeliveryMode {
    Sync,
    Async,
    OneWay,
}

/// Broker acknowledgment for a delivered message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerAck {
    pub status: SendStatus,
    pub msg_id: String,
    pub queue_offset: u64,
}

/// Report of a local transaction outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndTransactionRequest {
    /// Broker-assigned id of the half message
    pub msg_id: String,
    /// Transaction id (message key)
    pub transaction_id: String,
    /// Transaction group
    pub group: String,
    /// Decision
    pub state: TransactionState,
    /// Whether this answers a broker check
    pub from_check: bool,
}

/// Errors raised by a transport
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Broker could not be reached
    #[error("broker unreachable: {0}")]
    Unreachable(String),

    /// No response within the attempt deadline
    #[error("timed out after {0} ms")]
    Timeout(u64),

    /// Broker is overloaded
    #[error("broker busy: {0}")]
    BrokerBusy(String),

    /// Broker rejected the request
    #[error("rejected with code {code}: {reason}")]
    Rejected { code: i32, reason: String },
}

impl TransportError {
    /// Whether retrying may succeed
    pub fn is_transient(&self) -> bool {
        !matches!(self, TransportError::Rejected { .. })
    }

    /// Attach the broker identity and classify
    pub fn into_producer_error(self, broker: &BrokerTarget) -> ProducerError {
        if self.is_transient() {
            ProducerError::TransientBroker {
                broker: broker.to_string(),
                reason: self.to_string(),
            }
        } else {
            ProducerError::PermanentSend(format!("{} from {}", self, broker))
        }
    }
}

/// Result type for transport operations
pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Capability to deliver serialized messages to brokers
#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver a message to a broker
    ///
    /// For [`DeliveryMode::OneWay`] the returned acknowledgment carries no
    /// guarantee and is ignored by the producer.
    async fn deliver(
        &self,
        target: &BrokerTarget,
        message: &WireMessage,
        mode: DeliveryMode,
    ) -> TransportResult<BrokerAck>;

    /// Report the outcome of a local transaction for a half message
    async fn end_transaction(
        &self,
        target: &BrokerTarget,
        request: &EndTransactionRequest,
    ) -> TransportResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_classification() {
        let broker = BrokerTarget::new("broker-a", "10.0.0.1:10911");

        let err = TransportError::Unreachable("connection refused".to_string())
            .into_producer_error(&broker);
        assert!(err.is_retryable());
        assert!(err.to_string().contains("broker-a@10.0.0.1:10911"));

        let err = TransportError::Rejected {
            code: 13,
            reason: "message illegal".to_string(),
        }
        .into_producer_error(&broker);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_delivery_mode_names() {
        assert_eq!(DeliveryMode::OneWay.to_string(), "one_way");
        assert_eq!(DeliveryMode::Sync.to_string(), "sync");
    }
}
