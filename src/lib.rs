//! Message producer client
//!
//! Delivers application events to a message broker in three modes:
//!
//! - [`Producer::send_sync`] waits for the broker acknowledgment, retrying
//!   transient failures within the send timeout budget.
//! - [`Producer::send_async`] returns immediately and reports the outcome
//!   through a [`SendCallback`] exactly once.
//! - [`Producer::send_one_way`] fires and forgets.
//!
//! [`Producer::send_in_transaction`] ties message visibility to a local unit
//! of work: a half message is stored, the group's
//! [`LocalTransactionExecutor`] runs, and the outcome is reported to the
//! broker. Messages left undecided are resolved through broker checks.
//!
//! The broker wire protocol is not part of this crate; the producer talks to
//! brokers through the [`transport::Transport`] trait.

pub mod config;
pub mod consumer;
pub mod error;
pub mod fault;
pub mod message;
pub mod metrics;
pub mod producer;
pub mod transaction;
pub mod transport;

pub use config::ProducerConfig;
pub use error::{ErrorKind, ProducerError, ProducerResult};
pub use message::{Destination, Message, MessageBuilder, SendResult, SendStatus};
pub use producer::{callback_fn, oneshot_callback, Producer, ProducerBuilder, SendCallback};
pub use transaction::{
    CheckTransactionRequest, ExecutorRegistry, LocalTransactionExecutor, TransactionArg,
    TransactionPhase, TransactionSendResult, TransactionState,
};
