//! Amazon SQS implementation of [`QueueClient`]

use async_trait::async_trait;
use aws_config::{retry::RetryConfig, BehaviorVersion};
use aws_sdk_sqs::{
    config::Region,
    error::DisplayErrorContext,
    types::{Message, MessageSystemAttributeName},
};
use std::time::Duration;
use tracing::{debug, warn};

use crate::client::{Envelope, QueueClient, MAX_RECEIVE_BATCH};
use crate::error::QueueError;

/// Longest long-poll wait SQS accepts
const MAX_WAIT_TIME_SECS: u64 = 20;

/// [`QueueClient`] backed by `aws-sdk-sqs`
#[derive(Debug, Clone)]
pub struct SqsQueueClient {
    client: aws_sdk_sqs::Client,
}

impl SqsQueueClient {
    pub fn new(client: aws_sdk_sqs::Client) -> Self {
        Self { client }
    }

    pub fn from_conf(config: aws_sdk_sqs::Config) -> Self {
        Self::new(aws_sdk_sqs::Client::from_conf(config))
    }

    /// Build a client for the given service endpoint.
    ///
    /// Credentials come from the default provider chain. SDK retries are
    /// disabled so failures reach the caller unchanged.
    pub async fn connect(service_endpoint: &str, region: Option<String>) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .endpoint_url(service_endpoint)
            .retry_config(RetryConfig::disabled());

        if let Some(region) = region {
            loader = loader.region(Region::new(region));
        }

        let config = loader.load().await;
        Self::new(aws_sdk_sqs::Client::new(&config))
    }
}

fn service_error<E>(operation: &'static str, err: E) -> QueueError
where
    E: std::error::Error,
{
    QueueError::Service {
        operation,
        message: DisplayErrorContext(err).to_string(),
    }
}

fn to_envelope(message: Message) -> Option<Envelope> {
    let receive_count = message
        .attributes()
        .and_then(|attrs| attrs.get(&MessageSystemAttributeName::ApproximateReceiveCount))
        .and_then(|count| count.parse().ok())
        .unwrap_or(1);

    let message_id = message.message_id.unwrap_or_default();
    let Some(receipt_handle) = message.receipt_handle else {
        warn!(message_id = %message_id, "Received message without receipt handle, skipping");
        return None;
    };

    Some(Envelope {
        message_id,
        receipt_handle,
        body: message.body.unwrap_or_default(),
        receive_count,
    })
}

#[async_trait]
impl QueueClient for SqsQueueClient {
    async fn send(&self, queue_url: &str, body: &str) -> Result<String, QueueError> {
        let output = self
            .client
            .send_message()
            .queue_url(queue_url)
            .message_body(body)
            .send()
            .await
            .map_err(|e| service_error("SendMessage", e))?;

        let message_id = output.message_id.unwrap_or_default();
        debug!(queue_url = %queue_url, message_id = %message_id, "Sent message");
        Ok(message_id)
    }

    async fn receive(
        &self,
        queue_url: &str,
        max_messages: usize,
        wait: Duration,
    ) -> Result<Vec<Envelope>, QueueError> {
        let max_messages = max_messages.clamp(1, MAX_RECEIVE_BATCH) as i32;
        let wait_time_secs = wait.as_secs().min(MAX_WAIT_TIME_SECS) as i32;

        let output = self
            .client
            .receive_message()
            .queue_url(queue_url)
            .max_number_of_messages(max_messages)
            .wait_time_seconds(wait_time_secs)
            .message_system_attribute_names(MessageSystemAttributeName::ApproximateReceiveCount)
            .send()
            .await
            .map_err(|e| service_error("ReceiveMessage", e))?;

        Ok(output
            .messages
            .unwrap_or_default()
            .into_iter()
            .filter_map(to_envelope)
            .collect())
    }

    async fn delete(&self, queue_url: &str, receipt_handle: &str) -> Result<(), QueueError> {
        self.client
            .delete_message()
            .queue_url(queue_url)
            .receipt_handle(receipt_handle)
            .send()
            .await
            .map_err(|e| service_error("DeleteMessage", e))?;
        Ok(())
    }

    async fn purge(&self, queue_url: &str) -> Result<(), QueueError> {
        self.client
            .purge_queue()
            .queue_url(queue_url)
            .send()
            .await
            .map_err(|e| service_error("PurgeQueue", e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_sqs::config::Credentials;
    use std::collections::HashMap;

    const UNREACHABLE: &str = "http://127.0.0.1:1";

    fn unreachable_client() -> SqsQueueClient {
        let config = aws_sdk_sqs::Config::builder()
            .behavior_version(aws_sdk_sqs::config::BehaviorVersion::latest())
            .region(Region::new("us-east-1"))
            .credentials_provider(Credentials::new("test", "test", None, None, "test"))
            .endpoint_url(UNREACHABLE)
            .retry_config(aws_sdk_sqs::config::retry::RetryConfig::disabled())
            .build();
        SqsQueueClient::from_conf(config)
    }

    #[tokio::test]
    async fn test_send_surfaces_transport_error() {
        let client = unreachable_client();
        let result = client
            .send(&format!("{}/000000000000/queue", UNREACHABLE), "{}")
            .await;

        assert!(matches!(
            result,
            Err(QueueError::Service {
                operation: "SendMessage",
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_receive_surfaces_transport_error() {
        let client = unreachable_client();
        let result = client
            .receive(
                &format!("{}/000000000000/queue", UNREACHABLE),
                10,
                Duration::ZERO,
            )
            .await;

        assert!(matches!(
            result,
            Err(QueueError::Service {
                operation: "ReceiveMessage",
                ..
            })
        ));
    }

    #[test]
    fn test_to_envelope() {
        let message = Message::builder()
            .message_id("id-1")
            .receipt_handle("handle-1")
            .body(r#"{"toDeadLetter":false}"#)
            .set_attributes(Some(HashMap::from([(
                MessageSystemAttributeName::ApproximateReceiveCount,
                "3".to_string(),
            )])))
            .build();

        let envelope = to_envelope(message).unwrap();
        assert_eq!(envelope.message_id, "id-1");
        assert_eq!(envelope.receipt_handle, "handle-1");
        assert_eq!(envelope.receive_count, 3);
    }

    #[test]
    fn test_to_envelope_without_receipt_handle() {
        let message = Message::builder().message_id("id-1").body("{}").build();
        assert!(to_envelope(message).is_none());
    }
}
