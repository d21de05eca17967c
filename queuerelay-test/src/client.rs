//! Client for the relay's HTTP API

use queuerelay_core::{Message, ProcessedState};
use reqwest::Client;
use serde::Deserialize;

/// Client for interacting with a running relay
pub struct RelayClient {
    base_url: String,
    client: Client,
}

/// Response to a successful publish
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishedMessage {
    pub message_id: String,
    pub message: Message,
}

impl RelayClient {
    /// Create a new client
    pub fn new(base_url: String) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self { base_url, client }
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Publish a message stamped with the current time
    pub async fn publish(&self, to_dead_letter: bool) -> Result<PublishedMessage, ClientError> {
        let url = format!("{}/queue?toDeadLetter={}", self.base_url, to_dead_letter);
        let response = self.client.post(&url).send().await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(ClientError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        serde_json::from_str(&text).map_err(|e| ClientError::ParseError(e.to_string()))
    }

    /// POST `/queue` with a raw query string, returning status and JSON body
    pub async fn publish_raw(
        &self,
        query: &str,
    ) -> Result<(u16, serde_json::Value), ClientError> {
        let url = format!("{}/queue?{}", self.base_url, query);
        let response = self.client.post(&url).send().await?;

        let status = response.status().as_u16();
        let text = response.text().await?;
        let body = serde_json::from_str(&text).map_err(|e| ClientError::ParseError(e.to_string()))?;
        Ok((status, body))
    }

    /// Last message seen on each path
    pub async fn processed(&self) -> Result<ProcessedState, ClientError> {
        let url = format!("{}/queue", self.base_url);
        let response = self.client.get(&url).send().await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(ClientError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        serde_json::from_str(&text).map_err(|e| ClientError::ParseError(e.to_string()))
    }

    /// Whether the relay answers its health check
    pub async fn health(&self) -> Result<bool, ClientError> {
        let url = format!("{}/health", self.base_url);
        let response = self.client.get(&url).send().await?;
        Ok(response.status().is_success())
    }
}

/// Client errors
#[derive(Debug)]
pub enum ClientError {
    RequestError(reqwest::Error),
    Status { status: u16, body: String },
    ParseError(String),
}

impl std::fmt::Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientError::RequestError(e) => write!(f, "Request error: {}", e),
            ClientError::Status { status, body } => write!(f, "HTTP {}: {}", status, body),
            ClientError::ParseError(e) => write!(f, "Parse error: {}", e),
        }
    }
}

impl std::error::Error for ClientError {}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        ClientError::RequestError(e)
    }
}
