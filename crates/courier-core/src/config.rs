//! Configuration loaded from TOML with a few environment overrides.
//!
//! ```toml
//! [store]
//! backend = "redis"
//! redis_url = "redis://127.0.0.1:6379/0"
//!
//! [stream]
//! name = "order_events"
//! group = "sms_notification_cg"
//! dead_letter = "order_events:dlq"
//!
//! [worker]
//! count = 2
//!
//! [retry]
//! max_attempts = 3
//! base_delay_ms = 1000
//! ```
//!
//! Every field has a default, so an empty file is valid.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info};

use crate::app::{PoolSettings, ReadSettings, ReclaimSettings, RetryPolicy};
use crate::domain::ConfigError;

pub const ENV_CONFIG: &str = "COURIER_CONFIG";
pub const ENV_REDIS_URL: &str = "COURIER_REDIS_URL";
pub const ENV_STREAM: &str = "COURIER_STREAM";
pub const ENV_GROUP: &str = "COURIER_GROUP";
pub const ENV_WORKERS: &str = "COURIER_WORKERS";

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct CourierConfig {
    pub store: StoreConfig,
    pub stream: StreamConfig,
    pub worker: WorkerConfig,
    pub retry: RetryConfig,
    pub shutdown: ShutdownConfig,
    pub reclaim: ReclaimConfig,
    pub demo: DemoConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    Redis,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub redis_url: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            redis_url: "redis://127.0.0.1:6379/0".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub name: String,
    pub group: String,
    pub consumer_prefix: String,
    /// Dead-letter stream. Unset means log-and-drop.
    pub dead_letter: Option<String>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            name: "order_events".to_string(),
            group: "sms_notification_cg".to_string(),
            consumer_prefix: "sms_sender".to_string(),
            dead_letter: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub count: usize,
    pub batch_size: usize,
    pub block_ms: u64,
    pub store_backoff_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            count: 2,
            batch_size: 1,
            block_ms: 5_000,
            store_backoff_ms: 1_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ShutdownConfig {
    pub timeout_ms: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self { timeout_ms: 10_000 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ReclaimConfig {
    pub enabled: bool,
    pub interval_ms: u64,
    pub min_idle_ms: u64,
}

impl Default for ReclaimConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_ms: 30_000,
            min_idle_ms: 60_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    /// Publish sample orders on startup.
    pub enabled: bool,
    /// Probability that the demo sender fails a send.
    pub failure_rate: f64,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            failure_rate: 0.3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Used when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl CourierConfig {
    /// Load from `path`, apply environment overrides, validate.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let mut config = Self::parse(&content)?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults plus environment overrides, for running without a file.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        debug!("Parsing TOML configuration");
        Ok(toml::from_str(content)?)
    }

    /// Apply `COURIER_*` overrides read through `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_REDIS_URL) {
            self.store.redis_url = url;
            self.store.backend = StoreBackend::Redis;
        }
        if let Some(stream) = lookup(ENV_STREAM) {
            self.stream.name = stream;
        }
        if let Some(group) = lookup(ENV_GROUP) {
            self.stream.group = group;
        }
        if let Some(workers) = lookup(ENV_WORKERS) {
            self.worker.count = workers.trim().parse().map_err(|_| {
                ConfigError::Invalid(format!("{ENV_WORKERS} must be a number, got {workers:?}"))
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker.count == 0 {
            return Err(ConfigError::Invalid("worker.count must be at least 1".into()));
        }
        if self.worker.batch_size == 0 {
            return Err(ConfigError::Invalid("worker.batch_size must be at least 1".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid("retry.max_attempts must be at least 1".into()));
        }
        if !(0.0..=1.0).contains(&self.demo.failure_rate) {
            return Err(ConfigError::Invalid(format!(
                "demo.failure_rate must be within [0, 1], got {}",
                self.demo.failure_rate
            )));
        }
        if self.stream.name.is_empty() || self.stream.group.is_empty() {
            return Err(ConfigError::Invalid("stream.name and stream.group must be set".into()));
        }
        if self.stream.dead_letter.as_deref() == Some(self.stream.name.as_str()) {
            return Err(ConfigError::Invalid(
                "stream.dead_letter must differ from stream.name".into(),
            ));
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry.max_attempts,
            Duration::from_millis(self.retry.base_delay_ms),
        )
    }

    pub fn pool_settings(&self) -> PoolSettings {
        let reclaim = self.reclaim.enabled.then(|| ReclaimSettings {
            interval: Duration::from_millis(self.reclaim.interval_ms),
            min_idle: Duration::from_millis(self.reclaim.min_idle_ms),
            batch_size: self.worker.batch_size,
        });
        PoolSettings {
            stream: self.stream.name.clone(),
            group: self.stream.group.clone(),
            consumer_prefix: self.stream.consumer_prefix.clone(),
            workers: self.worker.count,
            read: ReadSettings {
                batch_size: self.worker.batch_size,
                block: Duration::from_millis(self.worker.block_ms),
                store_backoff: Duration::from_millis(self.worker.store_backoff_ms),
            },
            retry: self.retry_policy(),
            shutdown_timeout: Duration::from_millis(self.shutdown.timeout_ms),
            reclaim,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn empty_file_yields_defaults() {
        let config = CourierConfig::parse("").unwrap();
        assert_eq!(config, CourierConfig::default());

        let settings = config.pool_settings();
        assert_eq!(settings.stream, "order_events");
        assert_eq!(settings.group, "sms_notification_cg");
        assert_eq!(settings.consumer_prefix, "sms_sender");
        assert_eq!(settings.workers, 2);
        assert_eq!(settings.read.batch_size, 1);
        assert_eq!(settings.read.block, Duration::from_secs(5));
        assert_eq!(settings.retry, RetryPolicy::new(3, Duration::from_secs(1)));
        assert_eq!(settings.shutdown_timeout, Duration::from_secs(10));
        assert!(settings.reclaim.is_none());
    }

    #[test]
    fn parses_all_sections() {
        let config = CourierConfig::parse(
            r#"
            [store]
            backend = "redis"
            redis_url = "redis://cache:6379/2"

            [stream]
            name = "orders"
            group = "sms"
            consumer_prefix = "sender"
            dead_letter = "orders:dlq"

            [worker]
            count = 4
            batch_size = 10
            block_ms = 2000

            [retry]
            max_attempts = 5
            base_delay_ms = 200

            [shutdown]
            timeout_ms = 3000

            [reclaim]
            enabled = true
            interval_ms = 1000
            min_idle_ms = 30000

            [demo]
            enabled = false
            failure_rate = 0.0

            [log]
            level = "debug"
            "#,
        )
        .unwrap();
        config.validate().unwrap();

        assert_eq!(config.store.backend, StoreBackend::Redis);
        assert_eq!(config.stream.dead_letter.as_deref(), Some("orders:dlq"));
        assert!(!config.demo.enabled);
        assert_eq!(config.log.level, "debug");

        let settings = config.pool_settings();
        assert_eq!(settings.workers, 4);
        assert_eq!(settings.retry.base_delay, Duration::from_millis(200));
        assert_eq!(
            settings.reclaim,
            Some(ReclaimSettings {
                interval: Duration::from_secs(1),
                min_idle: Duration::from_secs(30),
                batch_size: 10,
            })
        );
    }

    #[test]
    fn unknown_backend_is_a_parse_error() {
        let err = CourierConfig::parse("[store]\nbackend = \"kafka\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn environment_overrides_file_values() {
        let mut config = CourierConfig::default();
        config
            .apply_overrides(env(&[
                (ENV_REDIS_URL, "redis://override:6379"),
                (ENV_STREAM, "orders_v2"),
                (ENV_GROUP, "sms_v2"),
                (ENV_WORKERS, "8"),
            ]))
            .unwrap();

        assert_eq!(config.store.backend, StoreBackend::Redis);
        assert_eq!(config.store.redis_url, "redis://override:6379");
        assert_eq!(config.stream.name, "orders_v2");
        assert_eq!(config.stream.group, "sms_v2");
        assert_eq!(config.worker.count, 8);
    }

    #[test]
    fn non_numeric_worker_override_is_invalid() {
        let mut config = CourierConfig::default();
        let err = config.apply_overrides(env(&[(ENV_WORKERS, "many")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[rstest]
    #[case::zero_workers("[worker]\ncount = 0")]
    #[case::zero_batch("[worker]\nbatch_size = 0")]
    #[case::zero_attempts("[retry]\nmax_attempts = 0")]
    #[case::negative_failure_rate("[demo]\nfailure_rate = -0.1")]
    #[case::failure_rate_above_one("[demo]\nfailure_rate = 1.5")]
    #[case::dead_letter_is_source("[stream]\nname = \"a\"\ndead_letter = \"a\"")]
    fn validation_rejects(#[case] toml: &str) {
        let config = CourierConfig::parse(toml).unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = CourierConfig::load_from("/nonexistent/courier.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
