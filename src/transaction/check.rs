//! Inbound transaction checks from brokers

use crate::message::{Destination, Message};
use crate::transaction::TransactionCoordinator;
use crate::transport::BrokerTarget;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// A broker asking for the outcome of an undecided half message
#[derive(Debug, Clone)]
pub struct CheckTransactionRequest {
    /// Broker holding the half message; the answer goes back to it
    pub broker: BrokerTarget,
    /// Transaction group recorded on the half message
    pub group: String,
    /// Broker-assigned id of the half message
    pub msg_id: String,
    /// Transaction id (message key)
    pub transaction_id: String,
    pub destination: Destination,
    pub message: Message,
    /// How many times the broker has asked so far
    pub check_times: u32,
}

/// Running check listener
///
/// Dropping every clone of `sender` stops the listener; `handle` completes
/// once every queued check has been answered.
pub struct CheckListener {
    pub sender: mpsc::Sender<CheckTransactionRequest>,
    pub handle: JoinHandle<()>,
}

impl CheckListener {
    /// Serve requests from a bounded queue on a bounded pool of tasks
    pub(crate) fn spawn(
        coordinator: TransactionCoordinator,
        queue: usize,
        concurrency: usize,
    ) -> Self {
        let (sender, mut receiver) = mpsc::channel::<CheckTransactionRequest>(queue);
        let permits = Arc::new(Semaphore::new(concurrency));
        let runtime = coordinator.runtime().clone();

        let handle = runtime.spawn(async move {
            info!(queue, concurrency, "Transaction check listener started");

            while let Some(request) = receiver.recv().await {
                let permit = match permits.clone().acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => break,
                };
                let coordinator = coordinator.clone();

                tokio::spawn(async move {
                    match coordinator.handle_check(&request).await {
                        Ok(state) => debug!(
                            transaction_id = %request.transaction_id,
                            state = %state,
                            "Transaction check answered"
                        ),
                        Err(err) => warn!(
                            transaction_id = %request.transaction_id,
                            group = %request.group,
                            error = %err,
                            "Transaction check failed"
                        ),
                    }
                    drop(permit);
                });
            }

            if let Ok(all) = permits.acquire_many(concurrency as u32).await {
                drop(all);
            }
            info!("Transaction check listener stopped");
        });

        Self { sender, handle }
    }
}
