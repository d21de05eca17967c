//! Queue client abstraction

use async_trait::async_trait;
use std::time::Duration;

use crate::error::QueueError;

/// Maximum number of messages a single receive may return
pub const MAX_RECEIVE_BATCH: usize = 10;

/// A single delivery of a queued message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub message_id: String,
    /// Opaque token identifying this delivery; required to delete it
    pub receipt_handle: String,
    pub body: String,
    /// How many times the message has been delivered, including this one
    pub receive_count: u32,
}

/// Operations the relay needs from the managed queue service.
///
/// Implementations report service failures as-is and never retry; retry
/// policy belongs to the caller.
#[async_trait]
pub trait QueueClient: Send + Sync {
    /// Send a message body, returning the service-assigned message id
    async fn send(&self, queue_url: &str, body: &str) -> Result<String, QueueError>;

    /// Receive up to `max_messages` envelopes, waiting at most `wait` for the
    /// first one to arrive. An empty result means the queue stayed empty.
    async fn receive(
        &self,
        queue_url: &str,
        max_messages: usize,
        wait: Duration,
    ) -> Result<Vec<Envelope>, QueueError>;

    /// Receive at most one envelope
    async fn receive_one(
        &self,
        queue_url: &str,
        wait: Duration,
    ) -> Result<Option<Envelope>, QueueError> {
        Ok(self.receive(queue_url, 1, wait).await?.into_iter().next())
    }

    /// Acknowledge a delivery
    async fn delete(&self, queue_url: &str, receipt_handle: &str) -> Result<(), QueueError>;

    /// Remove every message from the queue
    async fn purge(&self, queue_url: &str) -> Result<(), QueueError>;
}
