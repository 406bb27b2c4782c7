use strum::Display;
use thiserror::Error;

/// Producer error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProducerError {
    /// Retryable broker or network failure (timeout, broker busy, unreachable)
    #[error("Transient broker error from {broker}: {reason}")]
    TransientBroker { broker: String, reason: String },

    /// Message body exceeds the configured maximum size
    #[error("Message body size {size} exceeds limit of {max} bytes")]
    MessageTooLarge { size: usize, max: usize },

    /// Non-retryable send failure (invalid message, rejected by broker, serialization)
    #[error("Permanent send error: {0}")]
    PermanentSend(String),

    /// Missing executor registration, duplicate group, invalid options
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Local transaction executor raised
    #[error("Transaction execution error: {0}")]
    TransactionExecution(String),

    /// Total send timeout budget exhausted
    #[error("Send timed out after {elapsed_ms} ms ({attempts} attempts)")]
    Timeout { elapsed_ms: u64, attempts: u32 },

    /// Producer is not accepting sends
    #[error("Producer is not running")]
    NotRunning,
}

/// Coarse classification used by the retry policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    Transient,
    Permanent,
    Configuration,
    TransactionExecution,
    Timeout,
}

impl ProducerError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProducerError::TransientBroker { .. } => ErrorKind::Transient,
            ProducerError::MessageTooLarge { .. } | ProducerError::PermanentSend(_) => {
                ErrorKind::Permanent
            }
            ProducerError::Configuration(_) | ProducerError::NotRunning => {
                ErrorKind::Configuration
            }
            ProducerError::TransactionExecution(_) => ErrorKind::TransactionExecution,
            ProducerError::Timeout { .. } => ErrorKind::Timeout,
        }
    }

    /// Whether the retry policy may attempt the send again
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }

    /// Get error code string
    pub fn error_code(&self) -> &str {
        match self {
            ProducerError::TransientBroker { .. } => "TRANSIENT_BROKER_ERROR",
            ProducerError::MessageTooLarge { .. } => "MESSAGE_TOO_LARGE",
            ProducerError::PermanentSend(_) => "PERMANENT_SEND_ERROR",
            ProducerError::Configuration(_) => "CONFIGURATION_ERROR",
            ProducerError::TransactionExecution(_) => "TRANSACTION_EXECUTION_ERROR",
            ProducerError::Timeout { .. } => "TIMEOUT",
            ProducerError::NotRunning => "NOT_RUNNING",
        }
    }
}

/// Conversion from serde_json::Error
impl From<serde_json::Error> for ProducerError {
    fn from(err: serde_json::Error) -> Self {
        ProducerError::PermanentSend(format!("serialization failed: {}", err))
    }
}

/// Conversion from validator::ValidationErrors
impl From<validator::ValidationErrors> for ProducerError {
    fn from(err: validator::ValidationErrors) -> Self {
        ProducerError::Configuration(err.to_string())
    }
}

/// Conversion from config::ConfigError
impl From<config::ConfigError> for ProducerError {
    fn from(err: config::ConfigError) -> Self {
        ProducerError::Configuration(err.to_string())
    }
}

/// Result type alias
pub type ProducerResult<T> = std::result::Result<T, ProducerError>;
