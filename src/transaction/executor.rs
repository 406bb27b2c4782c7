//! Application-side local transaction capability

use crate::message::Message;
use crate::transaction::TransactionState;
use async_trait::async_trait;
use std::any::Any;

/// Opaque argument handed from `send_in_transaction` to the executor
pub type TransactionArg<'a> = Option<&'a (dyn Any + Send + Sync)>;

/// Runs and checks the local unit of work tied to a half message
///
/// `check_local_transaction` may be called many times, concurrently with other
/// checks and after a process restart. It must answer from durable
/// application state (for example an order row's committed flag), never from
/// memory, and return the same answer while that state is unchanged.
#[async_trait]
pub trait LocalTransactionExecutor: Send + Sync {
    /// Execute the local transaction once the half message is stored
    ///
    /// Errors are treated as [`TransactionState::Unknown`].
    async fn execute_local_transaction(
        &self,
        message: &Message,
        arg: TransactionArg<'_>,
    ) -> anyhow::Result<TransactionState>;

    /// Answer a broker check for a half message left undecided
    async fn check_local_transaction(&self, message: &Message) -> anyhow::Result<TransactionState>;
}
