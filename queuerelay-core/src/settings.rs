//! Queue endpoint settings

use serde::Deserialize;
use thiserror::Error;
use url::Url;

/// Name of the primary queue under the queue endpoint
pub const MAIN_QUEUE_NAME: &str = "queue";

/// Name of the dead-letter queue under the queue endpoint
pub const DEAD_LETTER_QUEUE_NAME: &str = "queue-dl";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid URL for {field}: {source}")]
    InvalidUrl {
        field: &'static str,
        #[source]
        source: url::ParseError,
    },
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// Endpoints of the queue service, read-only after startup
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Settings {
    /// Queue service API endpoint
    pub service_endpoint: Url,
    /// Base URL the queue URLs are derived from
    pub queue_endpoint: Url,
}

impl Settings {
    pub fn parse(service_endpoint: &str, queue_endpoint: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            service_endpoint: Url::parse(service_endpoint).map_err(|source| {
                ConfigError::InvalidUrl {
                    field: "service_endpoint",
                    source,
                }
            })?,
            queue_endpoint: Url::parse(queue_endpoint).map_err(|source| {
                ConfigError::InvalidUrl {
                    field: "queue_endpoint",
                    source,
                }
            })?,
        })
    }

    pub fn queue_urls(&self) -> QueueUrls {
        QueueUrls::from_base(&self.queue_endpoint)
    }
}

/// URLs of the main and dead-letter queues
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueUrls {
    pub main: String,
    pub dead_letter: String,
}

impl QueueUrls {
    /// Derive `<base>/queue` and `<base>/queue-dl`
    pub fn from_base(base: &Url) -> Self {
        let base = base.as_str().trim_end_matches('/');
        Self {
            main: format!("{}/{}", base, MAIN_QUEUE_NAME),
            dead_letter: format!("{}/{}", base, DEAD_LETTER_QUEUE_NAME),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_urls_from_base() {
        let settings = Settings::parse(
            "http://localhost:4566",
            "http://localhost:4566/000000000000",
        )
        .unwrap();

        let urls = settings.queue_urls();
        assert_eq!(urls.main, "http://localhost:4566/000000000000/queue");
        assert_eq!(urls.dead_letter, "http://localhost:4566/000000000000/queue-dl");
    }

    #[test]
    fn test_trailing_slash_is_ignored() {
        let base = Url::parse("http://localhost:4566/").unwrap();
        let urls = QueueUrls::from_base(&base);
        assert_eq!(urls.main, "http://localhost:4566/queue");
    }

    #[test]
    fn test_invalid_url() {
        let result = Settings::parse("not a url", "http://localhost:4566");
        assert!(matches!(
            result,
            Err(ConfigError::InvalidUrl {
                field: "service_endpoint",
                ..
            })
        ));
    }
}
