//! Message model shared by every send mode

mod destination;
mod message;
mod result;

pub use destination::Destination;
pub use message::{Message, MessageBuilder};
pub use result::{SendResult, SendStatus};

/// Well-known message property names
pub mod properties {
    /// Unique client-side message key, doubles as the transaction id
    pub const UNIQUE_KEY: &str = "UNIQ_KEY";
    /// Marks a half (prepared) message
    pub const TRANSACTION_PREPARED: &str = "TRAN_MSG";
    /// Transaction group that owns a half message
    pub const PRODUCER_GROUP: &str = "PGROUP";
    /// Business keys used for lookup on the broker
    pub const KEYS: &str = "KEYS";
    /// Message tag
    pub const TAGS: &str = "TAGS";
}
