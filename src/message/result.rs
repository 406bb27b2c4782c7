use crate::transport::BrokerTarget;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Broker acknowledgment outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum SendStatus {
    Ok,
    FlushDiskTimeout,
    FlushSlaveTimeout,
    SlaveNotAvailable,
}

/// Result of an acknowledged send
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendResult {
    /// Outcome reported by the broker
    pub status: SendStatus,

    /// Broker-assigned message id
    pub msg_id: String,

    /// Client message key
    pub message_key: String,

    /// Broker that accepted the message
    pub broker: BrokerTarget,

    /// Offset within the broker queue
    pub queue_offset: u64,

    /// Number of delivery attempts used
    pub attempts: u32,
}

impl SendResult {
    /// Whether the broker persisted without caveats
    pub fn is_ok(&self) -> bool {
        self.status == SendStatus::Ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_status_names() {
        assert_eq!(SendStatus::FlushDiskTimeout.to_string(), "FLUSH_DISK_TIMEOUT");
        assert_eq!(
            SendStatus::from_str("SLAVE_NOT_AVAILABLE").unwrap(),
            SendStatus::SlaveNotAvailable
        );
        assert_eq!(SendStatus::Ok.to_string(), "OK");
    }
}
