//! Sled-backed order ledger used as the demo's local transaction

use anyhow::{bail, Context};
use async_trait::async_trait;
use llm_event_producer::{LocalTransactionExecutor, Message, TransactionArg, TransactionState};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Order carried as the message payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: String,
    pub customer: String,
    pub amount_cents: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Placed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OrderRow {
    order: Order,
    status: OrderStatus,
}

/// Per-send options passed through the transaction argument
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceOptions {
    /// Record the order as cancelled and fail the local transaction
    pub fail: bool,
}

/// Order table whose rows decide transaction outcomes
///
/// An order row with status `Placed` commits its message; a cancelled or
/// missing row rolls it back. Checks read the row, so they answer the same
/// way after a restart.
#[derive(Clone)]
pub struct OrderLedger {
    orders: sled::Tree,
}

impl OrderLedger {
    pub fn open<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let db = sled::open(path.as_ref())
            .with_context(|| format!("failed to open ledger at {:?}", path.as_ref()))?;
        let orders = db.open_tree("orders").context("failed to open orders tree")?;

        info!(path = ?path.as_ref(), "Opened order ledger");
        Ok(Self { orders })
    }

    pub fn status(&self, order_id: &str) -> anyhow::Result<Option<OrderStatus>> {
        let row = self
            .orders
            .get(order_id.as_bytes())
            .context("failed to read order row")?;

        match row {
            Some(bytes) => {
                let row: OrderRow =
                    bincode::deserialize(&bytes).context("corrupt order row")?;
                Ok(Some(row.status))
            }
            None => Ok(None),
        }
    }

    async fn write(&self, order: &Order, status: OrderStatus) -> anyhow::Result<()> {
        let row = OrderRow {
            order: order.clone(),
            status,
        };
        let bytes = bincode::serialize(&row).context("failed to encode order row")?;

        self.orders
            .insert(order.order_id.as_bytes(), bytes)
            .context("failed to write order row")?;
        self.orders.flush_async().await.context("failed to flush ledger")?;
        Ok(())
    }
}

#[async_trait]
impl LocalTransactionExecutor for OrderLedger {
    async fn execute_local_transaction(
        &self,
        message: &Message,
        arg: TransactionArg<'_>,
    ) -> anyhow::Result<TransactionState> {
        let options = arg
            .and_then(|a| a.downcast_ref::<PlaceOptions>())
            .copied()
            .unwrap_or_default();
        let order: Order =
            serde_json::from_slice(message.payload()).context("payload is not an order")?;

        if options.fail {
            self.write(&order, OrderStatus::Cancelled).await?;
            bail!("order {} could not be placed", order.order_id);
        }

        self.write(&order, OrderStatus::Placed).await?;
        info!(order_id = %order.order_id, amount_cents = order.amount_cents, "Order placed");

        Ok(TransactionState::Commit)
    }

    async fn check_local_transaction(&self, message: &Message) -> anyhow::Result<TransactionState> {
        let order: Order =
            serde_json::from_slice(message.payload()).context("payload is not an order")?;

        Ok(match self.status(&order.order_id)? {
            Some(OrderStatus::Placed) => TransactionState::Commit,
            Some(OrderStatus::Cancelled) | None => TransactionState::Rollback,
        })
    }
}
