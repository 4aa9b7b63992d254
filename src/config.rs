use crate::buffer::DEFAULT_MAX_SIZE;
use crate::delivery::DEFAULT_TIMEOUT;
use crate::retry::RetryPolicy;
use crate::scheduler::{DeliveryMode, SchedulerConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Agent configuration. The five top-level keys are the ones the collector-side setup
/// documents; the tables are optional tuning with defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_server_url")]
    pub server_url: String,
    #[serde(default)]
    pub api_key: String,
    /// Seconds between samples.
    #[serde(default = "default_collection_interval")]
    pub collection_interval: u64,
    /// Seconds between aggregate flushes.
    #[serde(default = "default_buffer_interval")]
    pub buffer_interval: u64,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub buffer: BufferConfig,
    #[serde(default)]
    pub delivery: DeliveryConfig,
    #[serde(default)]
    pub spool: SpoolConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BufferConfig {
    #[serde(default = "default_max_size")]
    pub max_size: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
    #[serde(default)]
    pub mode: DeliveryMode,
    /// Aggregates waiting for the delivery worker (queued mode).
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpoolConfig {
    #[serde(default = "default_spool_path")]
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Directory for daily log files. An empty string turns file logging off.
    #[serde(default = "default_log_dir")]
    pub log_dir: Option<String>,
}

impl LoggingConfig {
    /// The file log directory, or None for stdout only.
    pub fn log_dir(&self) -> Option<&str> {
        self.log_dir.as_deref().filter(|d| !d.trim().is_empty())
    }
}

fn default_server_url() -> String {
    "http://localhost:8000/api/metrics".into()
}

fn default_collection_interval() -> u64 {
    30
}

fn default_buffer_interval() -> u64 {
    300
}

fn default_log_level() -> String {
    "info".into()
}

fn default_max_size() -> usize {
    DEFAULT_MAX_SIZE
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT.as_secs()
}

fn default_max_retries() -> u32 {
    RetryPolicy::default().max_retries
}

fn default_retry_delay_secs() -> u64 {
    RetryPolicy::default().retry_delay.as_secs()
}

fn default_queue_capacity() -> usize {
    16
}

fn default_spool_path() -> String {
    "data/metrics.db".into()
}

fn default_log_dir() -> Option<String> {
    Some("logs".into())
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            max_size: default_max_size(),
        }
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            retry_delay_secs: default_retry_delay_secs(),
            mode: DeliveryMode::default(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl Default for SpoolConfig {
    fn default() -> Self {
        Self {
            path: default_spool_path(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: default_log_dir(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            api_key: String::new(),
            collection_interval: default_collection_interval(),
            buffer_interval: default_buffer_interval(),
            log_level: default_log_level(),
            buffer: BufferConfig::default(),
            delivery: DeliveryConfig::default(),
            spool: SpoolConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Where a loaded config came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSource {
    File,
    /// The file was missing; defaults were written to it.
    CreatedDefault,
}

impl AppConfig {
    /// Path from `CONFIG_FILE`, else `config.toml`.
    pub fn path_from_env() -> String {
        std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".into())
    }

    /// Loads `path`; if it does not exist, writes and returns the defaults.
    pub fn load_or_create(path: &Path) -> anyhow::Result<(Self, ConfigSource)> {
        if !path.exists() {
            let config = Self::default();
            config.save(path)?;
            return Ok((config, ConfigSource::CreatedDefault));
        }
        let s = std::fs::read_to_string(path)?;
        Ok((Self::load_from_str(&s)?, ConfigSource::File))
    }

    /// Parse and validate config from a string (e.g. for tests).
    pub fn load_from_str(s: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            !self.server_url.trim().is_empty(),
            "server_url must be non-empty"
        );
        anyhow::ensure!(
            self.collection_interval >= 10,
            "collection_interval must be at least 10 seconds, got {}",
            self.collection_interval
        );
        anyhow::ensure!(
            self.buffer_interval >= 60,
            "buffer_interval must be at least 60 seconds, got {}",
            self.buffer_interval
        );
        anyhow::ensure!(
            self.buffer_interval >= self.collection_interval,
            "buffer_interval ({}) must not be less than collection_interval ({})",
            self.buffer_interval,
            self.collection_interval
        );
        anyhow::ensure!(
            LOG_LEVELS.contains(&self.log_level.to_lowercase().as_str()),
            "log_level must be one of {:?}, got {:?}",
            LOG_LEVELS,
            self.log_level
        );
        anyhow::ensure!(
            self.buffer.max_size >= 2,
            "buffer.max_size must be >= 2, got {}",
            self.buffer.max_size
        );
        anyhow::ensure!(
            self.delivery.timeout_secs > 0,
            "delivery.timeout_secs must be > 0, got {}",
            self.delivery.timeout_secs
        );
        anyhow::ensure!(
            self.delivery.max_retries > 0,
            "delivery.max_retries must be > 0, got {}",
            self.delivery.max_retries
        );
        anyhow::ensure!(
            self.delivery.queue_capacity > 0,
            "delivery.queue_capacity must be > 0, got {}",
            self.delivery.queue_capacity
        );
        anyhow::ensure!(!self.spool.path.is_empty(), "spool.path must be non-empty");
        Ok(())
    }

    pub fn collection_interval(&self) -> Duration {
        Duration::from_secs(self.collection_interval)
    }

    pub fn buffer_interval(&self) -> Duration {
        Duration::from_secs(self.buffer_interval)
    }

    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_secs(self.delivery.timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.delivery.max_retries,
            retry_delay: Duration::from_secs(self.delivery.retry_delay_secs),
        }
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            collection_interval: self.collection_interval(),
            delivery_mode: self.delivery.mode,
            queue_capacity: self.delivery.queue_capacity,
        }
    }
}
