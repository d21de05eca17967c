//! Consumer configuration

use queuerelay_core::ConfigError;
use queuerelay_sqs::MAX_RECEIVE_BATCH;
use serde::Deserialize;
use std::time::Duration;

/// How messages flagged for the dead-letter queue leave the main queue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeadLetterRouting {
    /// Send the body to the dead-letter queue, then delete it from the main queue
    #[default]
    Explicit,
    /// Leave the delivery unacknowledged; the queue's redrive policy moves it
    /// once its receive count exceeds the configured maximum
    Redrive,
}

/// Settings for a polling loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollerConfig {
    /// Cap on concurrently processed envelopes
    pub max_in_flight: usize,
    /// Largest batch requested per receive
    pub max_batch: usize,
    /// Long-poll wait window per receive
    pub wait_time: Duration,
    /// How long in-flight envelopes may run after cancellation
    pub shutdown_grace: Duration,
    pub error_backoff_base: Duration,
    pub error_backoff_max: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            max_in_flight: 10,
            max_batch: MAX_RECEIVE_BATCH,
            wait_time: Duration::from_secs(20),
            shutdown_grace: Duration::from_secs(30),
            error_backoff_base: Duration::from_secs(1),
            error_backoff_max: Duration::from_secs(60),
        }
    }
}

impl PollerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_in_flight == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_in_flight",
                reason: "must be at least 1".to_string(),
            });
        }
        if !(1..=MAX_RECEIVE_BATCH).contains(&self.max_batch) {
            return Err(ConfigError::InvalidValue {
                field: "max_batch",
                reason: format!("must be between 1 and {}", MAX_RECEIVE_BATCH),
            });
        }
        if self.error_backoff_base > self.error_backoff_max {
            return Err(ConfigError::InvalidValue {
                field: "error_backoff_base",
                reason: "must not exceed error_backoff_max".to_string(),
            });
        }
        Ok(())
    }

    /// Delay before the next receive after `consecutive_errors` failed ones
    pub fn error_backoff(&self, consecutive_errors: u32) -> Duration {
        let exponent = consecutive_errors.saturating_sub(1).min(16);
        self.error_backoff_base
            .saturating_mul(2_u32.saturating_pow(exponent))
            .min(self.error_backoff_max)
    }
}
