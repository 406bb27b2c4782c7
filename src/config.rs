//! Producer configuration
//!
//! Options mirror the broker client's well-known settings; file and
//! environment keys use the snake_case field names
//! (`send_message_timeout_ms`, `retry_next_server`, ...).

use crate::error::{ProducerError, ProducerResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use validator::{Validate, ValidationError};

/// Main producer configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
#[serde(default)]
pub struct ProducerConfig {
    /// Naming server addresses, comma-separated `host:port` list
    #[validate(custom(function = "validate_name_servers"))]
    pub name_server_address: String,

    /// Producer group
    #[validate(length(min = 1, max = 255))]
    pub producer_group: String,

    /// Send timeout budget in milliseconds, shared by all attempts of one send
    #[validate(range(min = 1))]
    pub send_message_timeout_ms: u64,

    /// Bodies larger than this are compressed before transmission
    pub compress_message_body_threshold: usize,

    /// zlib compression level
    #[validate(range(max = 9))]
    pub compress_level: u32,

    /// Bodies larger than this are rejected before any network attempt
    #[validate(range(min = 1))]
    pub max_message_size: usize,

    /// Retries for blocking sends
    pub retry_times_when_send_failed: u32,

    /// Retries for callback sends
    pub retry_times_when_send_async_failed: u32,

    /// Rotate to another broker on retry
    pub retry_next_server: bool,

    /// Isolate failing brokers and prefer healthy ones
    pub send_latency_fault_enable: bool,

    /// How long a failing broker stays isolated
    #[validate(range(min = 1))]
    pub fault_isolation_ms: u64,

    /// Concurrently running async and one-way sends
    #[validate(range(min = 1, max = 65536))]
    pub async_send_concurrency: usize,

    /// Concurrently serviced transaction checks
    #[validate(range(min = 1, max = 65536))]
    pub check_concurrency: usize,

    /// Inbound transaction check queue bound
    #[validate(range(min = 1, max = 1000000))]
    pub check_request_queue: usize,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            name_server_address: "127.0.0.1:9876".to_string(),
            producer_group: "DEFAULT_PRODUCER".to_string(),
            send_message_timeout_ms: 3000,
            compress_message_body_threshold: 1024,
            compress_level: 5,
            max_message_size: 4096,
            retry_times_when_send_failed: 2,
            retry_times_when_send_async_failed: 2,
            retry_next_server: false,
            send_latency_fault_enable: false,
            fault_isolation_ms: 30_000,
            async_send_concurrency: 64,
            check_concurrency: 8,
            check_request_queue: 2000,
        }
    }
}

impl ProducerConfig {
    /// Load configuration from defaults, an optional TOML file and environment
    ///
    /// Environment variables use the `PRODUCER__` prefix, e.g.
    /// `PRODUCER__RETRY_NEXT_SERVER=true`.
    pub fn load(path: Option<&Path>) -> ProducerResult<Self> {
        let defaults = Self::default();

        let mut builder = config::Config::builder()
            .set_default("name_server_address", defaults.name_server_address.clone())?
            .set_default("producer_group", defaults.producer_group.clone())?
            .set_default("send_message_timeout_ms", defaults.send_message_timeout_ms as i64)?
            .set_default(
                "compress_message_body_threshold",
                defaults.compress_message_body_threshold as i64,
            )?
            .set_default("compress_level", defaults.compress_level as i64)?
            .set_default("max_message_size", defaults.max_message_size as i64)?
            .set_default(
                "retry_times_when_send_failed",
                defaults.retry_times_when_send_failed as i64,
            )?
            .set_default(
                "retry_times_when_send_async_failed",
                defaults.retry_times_when_send_async_failed as i64,
            )?
            .set_default("retry_next_server", defaults.retry_next_server)?
            .set_default("send_latency_fault_enable", defaults.send_latency_fault_enable)?
            .set_default("fault_isolation_ms", defaults.fault_isolation_ms as i64)?
            .set_default("async_send_concurrency", defaults.async_send_concurrency as i64)?
            .set_default("check_concurrency", defaults.check_concurrency as i64)?
            .set_default("check_request_queue", defaults.check_request_queue as i64)?;

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(false));
        }

        let config: ProducerConfig = builder
            .add_source(
                config::Environment::with_prefix("PRODUCER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Send timeout budget
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_message_timeout_ms)
    }

    /// Broker isolation window
    pub fn fault_isolation(&self) -> Duration {
        Duration::from_millis(self.fault_isolation_ms)
    }

    /// Parsed naming server list
    pub fn name_servers(&self) -> Vec<String> {
        self.name_server_address
            .split(',')
            .map(str::trim)
            .filter(|addr| !addr.is_empty())
            .map(str::to_string)
            .collect()
    }
}

fn validate_name_servers(value: &str) -> Result<(), ValidationError> {
    let mut seen = 0;
    for addr in value.split(',').map(str::trim).filter(|a| !a.is_empty()) {
        let valid = match addr.rsplit_once(':') {
            Some((host, port)) => !host.is_empty() && port.parse::<u16>().is_ok(),
            None => false,
        };
        if !valid {
            return Err(ValidationError::new("name_server_address"));
        }
        seen += 1;
    }

    if seen == 0 {
        return Err(ValidationError::new("name_server_address"));
    }
    Ok(())
}

/// Validate and convert to a producer error
pub(crate) fn ensure_valid(config: &ProducerConfig) -> ProducerResult<()> {
    config
        .validate()
        .map_err(|e| ProducerError::Configuration(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ProducerConfig::default();
        assert_eq!(config.send_message_timeout_ms, 3000);
        assert_eq!(config.compress_message_body_threshold, 1024);
        assert_eq!(config.max_message_size, 4096);
        assert_eq!(config.retry_times_when_send_failed, 2);
        assert_eq!(config.retry_times_when_send_async_failed, 2);
        assert!(!config.retry_next_server);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_name_server_list() {
        let config = ProducerConfig {
            name_server_address: "10.0.0.1:9876, 10.0.0.2:9876".to_string(),
            ..Default::default()
        };
        assert_eq!(config.name_servers(), vec!["10.0.0.1:9876", "10.0.0.2:9876"]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_options_rejected() {
        let config = ProducerConfig {
            name_server_address: "localhost".to_string(),
            ..Default::default()
        };
        assert!(ensure_valid(&config).is_err());

        let config = ProducerConfig {
            producer_group: String::new(),
            ..Default::default()
        };
        assert!(matches!(
            ensure_valid(&config),
            Err(ProducerError::Configuration(_))
        ));

        let config = ProducerConfig {
            send_message_timeout_ms: 0,
            ..Default::default()
        };
        assert!(ensure_valid(&config).is_err());
    }

    #[test]
    fn test_pool_sizes_are_bounded() {
        let config = ProducerConfig {
            async_send_concurrency: 65536,
            check_concurrency: 65536,
            ..Default::default()
        };
        assert!(ensure_valid(&config).is_ok());

        let config = ProducerConfig {
            async_send_concurrency: 65537,
            ..Default::default()
        };
        assert!(matches!(
            ensure_valid(&config),
            Err(ProducerError::Configuration(_))
        ));

        let config = ProducerConfig {
            check_concurrency: usize::MAX,
            ..Default::default()
        };
        assert!(ensure_valid(&config).is_err());

        let config = ProducerConfig {
            check_request_queue: usize::MAX,
            ..Default::default()
        };
        assert!(ensure_valid(&config).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("producer.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "producer_group = \"orders\"").unwrap();
        writeln!(file, "retry_next_server = true").unwrap();
        writeln!(file, "retry_times_when_send_failed = 4").unwrap();

        let config = ProducerConfig::load(Some(&path)).unwrap();
        assert_eq!(config.producer_group, "orders");
        assert!(config.retry_next_server);
        assert_eq!(config.retry_times_when_send_failed, 4);
        assert_eq!(config.max_message_size, 4096);
    }
}
