//! Transactional messaging
//!
//! A transactional send stores a half message on the broker, runs the local
//! transaction through the group's [`LocalTransactionExecutor`] and reports
//! the outcome. Undecided half messages are resolved later through broker
//! checks answered by [`TransactionCoordinator::handle_check`].

mod check;
mod coordinator;
mod executor;
mod registry;
mod state;

pub use check::{CheckListener, CheckTransactionRequest};
pub use coordinator::{TransactionCoordinator, TransactionSendResult};
pub use executor::{LocalTransactionExecutor, TransactionArg};
pub use registry::{ExecutorRegistry, ExecutorRegistryBuilder};
pub use state::{
    InvalidPhaseTransition, PhaseTransition, TransactionPhase, TransactionRecord,
    TransactionState,
};
