//! Producer: send modes, retry and the client facade

mod callback;
mod client;
mod dispatcher;
mod retry;

pub use callback::{callback_fn, oneshot_callback, FnCallback, OneshotCallback, SendCallback};
pub use client::{Producer, ProducerBuilder};
pub use dispatcher::SendDispatcher;
pub use retry::{BrokerSelector, RetryPolicy};
