//! Configuration management

use queuerelay_core::{ConfigError, Settings};
use queuerelay_worker::{DeadLetterRouting, PollerConfig};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub queue: QueueConfig,

    #[serde(default)]
    pub consumer: ConsumerConfig,

    #[serde(default)]
    pub memory: MemoryConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Which queue service the relay talks to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueBackend {
    #[default]
    Sqs,
    /// Process-local queues, for running without a queue service
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    #[serde(default)]
    pub backend: QueueBackend,

    #[serde(default = "default_service_endpoint")]
    pub service_endpoint: String,

    #[serde(default = "default_queue_endpoint")]
    pub queue_endpoint: String,

    #[serde(default)]
    pub region: Option<String>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            backend: QueueBackend::default(),
            service_endpoint: default_service_endpoint(),
            queue_endpoint: default_queue_endpoint(),
            region: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConsumerConfig {
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,

    #[serde(default = "default_max_batch")]
    pub max_batch: usize,

    #[serde(default = "default_wait_time_secs")]
    pub wait_time_secs: u64,

    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,

    #[serde(default = "default_error_backoff_base_secs")]
    pub error_backoff_base_secs: u64,

    #[serde(default = "default_error_backoff_max_secs")]
    pub error_backoff_max_secs: u64,

    #[serde(default)]
    pub dead_letter_routing: DeadLetterRouting,

    #[serde(default = "default_dead_letter_max_in_flight")]
    pub dead_letter_max_in_flight: usize,

    #[serde(default = "default_true")]
    pub purge_dead_letter_on_start: bool,

    #[serde(default = "default_purge_timeout_secs")]
    pub purge_timeout_secs: u64,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            max_in_flight: default_max_in_flight(),
            max_batch: default_max_batch(),
            wait_time_secs: default_wait_time_secs(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
            error_backoff_base_secs: default_error_backoff_base_secs(),
            error_backoff_max_secs: default_error_backoff_max_secs(),
            dead_letter_routing: DeadLetterRouting::default(),
            dead_letter_max_in_flight: default_dead_letter_max_in_flight(),
            purge_dead_letter_on_start: default_true(),
            purge_timeout_secs: default_purge_timeout_secs(),
        }
    }
}

impl ConsumerConfig {
    /// Poller settings for the main queue
    pub fn main_poller(&self) -> PollerConfig {
        PollerConfig {
            max_in_flight: self.max_in_flight,
            max_batch: self.max_batch,
            wait_time: Duration::from_secs(self.wait_time_secs),
            shutdown_grace: Duration::from_secs(self.shutdown_grace_secs),
            error_backoff_base: Duration::from_secs(self.error_backoff_base_secs),
            error_backoff_max: Duration::from_secs(self.error_backoff_max_secs),
        }
    }

    /// Poller settings for the dead-letter queue, which never asks for more
    /// than it may process at once
    pub fn dead_letter_poller(&self) -> PollerConfig {
        PollerConfig {
            max_in_flight: self.dead_letter_max_in_flight,
            max_batch: self.max_batch.min(self.dead_letter_max_in_flight.max(1)),
            ..self.main_poller()
        }
    }

    pub fn purge_timeout(&self) -> Duration {
        Duration::from_secs(self.purge_timeout_secs)
    }
}

/// In-memory backend settings
#[derive(Debug, Clone, Deserialize)]
pub struct MemoryConfig {
    #[serde(default = "default_visibility_timeout_secs")]
    pub visibility_timeout_secs: u64,

    /// Deliveries before the main queue redrives a message to `queue-dl`
    #[serde(default = "default_max_receive_count")]
    pub max_receive_count: u32,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            visibility_timeout_secs: default_visibility_timeout_secs(),
            max_receive_count: default_max_receive_count(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_service_endpoint() -> String {
    "http://localhost:4566".to_string()
}

fn default_queue_endpoint() -> String {
    "http://localhost:4566/000000000000".to_string()
}

fn default_max_in_flight() -> usize {
    10
}

fn default_max_batch() -> usize {
    10
}

fn default_wait_time_secs() -> u64 {
    20
}

fn default_shutdown_grace_secs() -> u64 {
    30
}

fn default_error_backoff_base_secs() -> u64 {
    1
}

fn default_error_backoff_max_secs() -> u64 {
    60
}

fn default_dead_letter_max_in_flight() -> usize {
    1
}

fn default_purge_timeout_secs() -> u64 {
    30
}

fn default_visibility_timeout_secs() -> u64 {
    30
}

fn default_max_receive_count() -> u32 {
    3
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Without an explicit path, `queuerelay.toml` in the working directory
    /// is read if present. Environment variables such as
    /// `QUEUERELAY__SERVER__PORT` override file values.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let file = match path {
            Some(path) => config::File::from(path).required(true),
            None => config::File::with_name("queuerelay").required(false),
        };

        let config = config::Config::builder()
            .add_source(file)
            .add_source(
                config::Environment::with_prefix("QUEUERELAY")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config = config.try_deserialize::<Config>()?;
        config.validate()?;
        Ok(config)
    }

    pub fn settings(&self) -> Result<Settings, ConfigError> {
        Settings::parse(&self.queue.service_endpoint, &self.queue.queue_endpoint)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.settings()?;
        self.consumer.main_poller().validate()?;
        self.consumer.dead_letter_poller().validate()?;
        if self.queue.backend == QueueBackend::Memory && self.memory.max_receive_count == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_receive_count",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}
