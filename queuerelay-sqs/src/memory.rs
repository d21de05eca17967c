//! In-memory queue service
//!
//! Emulates the parts of SQS the relay relies on:
//! - Visibility timeout with a fresh receipt handle per delivery
//! - Redrive to a dead-letter queue after `max_receive_count` receives
//! - Long polling up to the requested wait window

use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::client::{Envelope, QueueClient, MAX_RECEIVE_BATCH};
use crate::error::QueueError;

/// Upper bound on a single long-poll sleep, so messages whose visibility
/// timeout expires are picked up without a send to wake the poller.
const VISIBILITY_RECHECK: Duration = Duration::from_millis(25);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedrivePolicy {
    /// Name of the queue that receives exhausted messages
    pub dead_letter_queue: String,
    pub max_receive_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueAttributes {
    pub visibility_timeout: Duration,
    pub redrive_policy: Option<RedrivePolicy>,
}

impl Default for QueueAttributes {
    fn default() -> Self {
        Self {
            visibility_timeout: Duration::from_secs(30),
            redrive_policy: None,
        }
    }
}

#[derive(Debug, Clone)]
struct StoredMessage {
    message_id: String,
    receipt_handle: Option<String>,
    body: String,
    receive_count: u32,
    visible_at: Instant,
}

impl StoredMessage {
    fn new(body: String) -> Self {
        Self {
            message_id: uuid::Uuid::new_v4().to_string(),
            receipt_handle: None,
            body,
            receive_count: 0,
            visible_at: Instant::now(),
        }
    }
}

#[derive(Debug)]
struct QueueData {
    attributes: QueueAttributes,
    messages: VecDeque<StoredMessage>,
}

/// In-process [`QueueClient`] with SQS-like delivery semantics.
///
/// Queues are addressed by URL; the last path segment is the queue name.
#[derive(Debug)]
pub struct InMemoryQueue {
    base_url: String,
    queues: DashMap<String, QueueData>,
    arrivals: Notify,
}

fn queue_name(queue_url: &str) -> &str {
    queue_url.split('/').next_back().unwrap_or(queue_url)
}

impl InMemoryQueue {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            queues: DashMap::new(),
            arrivals: Notify::new(),
        }
    }

    pub fn queue_url(&self, name: &str) -> String {
        format!("{}/{}", self.base_url, name)
    }

    pub fn create_queue(
        &self,
        name: &str,
        attributes: QueueAttributes,
    ) -> Result<String, QueueError> {
        if self.queues.contains_key(name) {
            return Err(QueueError::QueueAlreadyExists(name.to_string()));
        }
        if attributes
            .redrive_policy
            .as_ref()
            .is_some_and(|policy| policy.max_receive_count == 0)
        {
            return Err(QueueError::InvalidParameter(
                "max_receive_count must be at least 1".to_string(),
            ));
        }

        let url = self.queue_url(name);
        info!(name = %name, url = %url, "Creating queue");
        self.queues.insert(
            name.to_string(),
            QueueData {
                attributes,
                messages: VecDeque::new(),
            },
        );
        Ok(url)
    }

    pub fn delete_queue(&self, name: &str) -> Result<(), QueueError> {
        if self.queues.remove(name).is_none() {
            return Err(QueueError::QueueNotFound(name.to_string()));
        }

        info!(name = %name, "Deleting queue");
        Ok(())
    }

    /// Number of stored messages, visible or in flight
    pub fn message_count(&self, name: &str) -> Result<usize, QueueError> {
        self.queues
            .get(name)
            .map(|q| q.messages.len())
            .ok_or_else(|| QueueError::QueueNotFound(name.to_string()))
    }

    /// Number of messages a receive could return right now
    pub fn visible_message_count(&self, name: &str) -> Result<usize, QueueError> {
        let now = Instant::now();
        self.queues
            .get(name)
            .map(|q| q.messages.iter().filter(|m| m.visible_at <= now).count())
            .ok_or_else(|| QueueError::QueueNotFound(name.to_string()))
    }

    pub fn send_message(&self, name: &str, body: String) -> Result<String, QueueError> {
        let message = StoredMessage::new(body);
        let message_id = message.message_id.clone();

        self.queues
            .get_mut(name)
            .ok_or_else(|| QueueError::QueueNotFound(name.to_string()))?
            .messages
            .push_back(message);
        self.arrivals.notify_waiters();

        debug!(queue = %name, message_id = %message_id, "Sent message");
        Ok(message_id)
    }

    /// Receive without waiting
    pub fn receive_messages(&self, name: &str, max: usize) -> Result<Vec<Envelope>, QueueError> {
        let max = max.clamp(1, MAX_RECEIVE_BATCH);
        let now = Instant::now();
        let mut received = Vec::new();
        let mut exhausted = Vec::new();

        let redrive_policy = {
            let mut queue = self
                .queues
                .get_mut(name)
                .ok_or_else(|| QueueError::QueueNotFound(name.to_string()))?;
            let visibility_timeout = queue.attributes.visibility_timeout;
            let redrive_policy = queue.attributes.redrive_policy.clone();

            let mut i = 0;
            while i < queue.messages.len() && received.len() < max {
                if queue.messages[i].visible_at > now {
                    i += 1;
                    continue;
                }

                if let Some(policy) = &redrive_policy {
                    if queue.messages[i].receive_count >= policy.max_receive_count {
                        if let Some(message) = queue.messages.remove(i) {
                            exhausted.push(message);
                        }
                        continue;
                    }
                }

                let receipt_handle = uuid::Uuid::new_v4().to_string();
                let message = &mut queue.messages[i];
                message.receive_count += 1;
                message.visible_at = now + visibility_timeout;
                message.receipt_handle = Some(receipt_handle.clone());

                received.push(Envelope {
                    message_id: message.message_id.clone(),
                    receipt_handle,
                    body: message.body.clone(),
                    receive_count: message.receive_count,
                });
                i += 1;
            }

            redrive_policy
        };

        // The source queue guard is released before touching the target queue.
        if let Some(policy) = redrive_policy {
            if !exhausted.is_empty() {
                self.redrive(name, &policy.dead_letter_queue, exhausted);
            }
        }

        if !received.is_empty() {
            debug!(queue = %name, count = received.len(), "Received messages");
        }
        Ok(received)
    }

    fn redrive(&self, source: &str, target: &str, messages: Vec<StoredMessage>) {
        let Some(mut queue) = self.queues.get_mut(target) else {
            warn!(
                queue = %source,
                dead_letter_queue = %target,
                count = messages.len(),
                "Dead-letter queue does not exist, dropping exhausted messages"
            );
            return;
        };

        let now = Instant::now();
        for mut message in messages {
            info!(
                queue = %source,
                dead_letter_queue = %target,
                message_id = %message.message_id,
                receive_count = message.receive_count,
                "Moving message to dead-letter queue"
            );
            message.receipt_handle = None;
            message.receive_count = 0;
            message.visible_at = now;
            queue.messages.push_back(message);
        }
        drop(queue);
        self.arrivals.notify_waiters();
    }

    pub fn delete_message(&self, name: &str, receipt_handle: &str) -> Result<(), QueueError> {
        let mut queue = self
            .queues
            .get_mut(name)
            .ok_or_else(|| QueueError::QueueNotFound(name.to_string()))?;

        let original_len = queue.messages.len();
        queue
            .messages
            .retain(|m| m.receipt_handle.as_deref() != Some(receipt_handle));

        if queue.messages.len() == original_len {
            return Err(QueueError::ReceiptHandleInvalid(receipt_handle.to_string()));
        }

        debug!(queue = %name, receipt_handle = %receipt_handle, "Deleted message");
        Ok(())
    }

    pub fn purge_queue(&self, name: &str) -> Result<(), QueueError> {
        let mut queue = self
            .queues
            .get_mut(name)
            .ok_or_else(|| QueueError::QueueNotFound(name.to_string()))?;

        info!(queue = %name, count = queue.messages.len(), "Purging queue");
        queue.messages.clear();
        Ok(())
    }
}

#[async_trait]
impl QueueClient for InMemoryQueue {
    async fn send(&self, queue_url: &str, body: &str) -> Result<String, QueueError> {
        self.send_message(queue_name(queue_url), body.to_string())
    }

    async fn receive(
        &self,
        queue_url: &str,
        max_messages: usize,
        wait: Duration,
    ) -> Result<Vec<Envelope>, QueueError> {
        let name = queue_name(queue_url);
        let deadline = Instant::now() + wait;

        loop {
            // Registered before checking, so a send in between still wakes us.
            let arrival = self.arrivals.notified();

            let envelopes = self.receive_messages(name, max_messages)?;
            let now = Instant::now();
            if !envelopes.is_empty() || now >= deadline {
                return Ok(envelopes);
            }

            let nap = (deadline - now).min(VISIBILITY_RECHECK);
            let _ = tokio::time::timeout(nap, arrival).await;
        }
    }

    async fn delete(&self, queue_url: &str, receipt_handle: &str) -> Result<(), QueueError> {
        self.delete_message(queue_name(queue_url), receipt_handle)
    }

    async fn purge(&self, queue_url: &str) -> Result<(), QueueError> {
        self.purge_queue(queue_name(queue_url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const BASE: &str = "http://localhost:4566/000000000000";

    fn queue_with(visibility_timeout: Duration) -> InMemoryQueue {
        let queue = InMemoryQueue::new(BASE);
        queue
            .create_queue(
                "queue",
                QueueAttributes {
                    visibility_timeout,
                    redrive_policy: None,
                },
            )
            .unwrap();
        queue
    }

    #[tokio::test]
    async fn test_send_receive_delete() {
        let queue = queue_with(Duration::from_secs(30));
        let url = queue.queue_url("queue");

        let message_id = queue.send(&url, "hello").await.unwrap();
        let envelope = queue.receive_one(&url, Duration::ZERO).await.unwrap().unwrap();

        assert_eq!(envelope.message_id, message_id);
        assert_eq!(envelope.body, "hello");
        assert_eq!(envelope.receive_count, 1);

        queue.delete(&url, &envelope.receipt_handle).await.unwrap();
        assert_eq!(queue.message_count("queue").unwrap(), 0);
    }

    #[tokio::test]
    async fn test_received_message_is_hidden() {
        let queue = queue_with(Duration::from_secs(30));
        let url = queue.queue_url("queue");
        queue.send(&url, "hello").await.unwrap();

        assert!(queue.receive_one(&url, Duration::ZERO).await.unwrap().is_some());
        assert!(queue.receive_one(&url, Duration::ZERO).await.unwrap().is_none());
        assert_eq!(queue.message_count("queue").unwrap(), 1);
        assert_eq!(queue.visible_message_count("queue").unwrap(), 0);
    }

    #[tokio::test]
    async fn test_visibility_timeout_redelivers_with_new_handle() {
        let queue = queue_with(Duration::from_millis(50));
        let url = queue.queue_url("queue");
        queue.send(&url, "hello").await.unwrap();

        let first = queue.receive_one(&url, Duration::ZERO).await.unwrap().unwrap();
        tokio::time::sleep(Duration::from_millis(80)).await;
        let second = queue.receive_one(&url, Duration::ZERO).await.unwrap().unwrap();

        assert_eq!(first.message_id, second.message_id);
        assert_ne!(first.receipt_handle, second.receipt_handle);
        assert_eq!(second.receive_count, 2);

        let stale = queue.delete(&url, &first.receipt_handle).await;
        assert!(matches!(stale, Err(QueueError::ReceiptHandleInvalid(_))));
        queue.delete(&url, &second.receipt_handle).await.unwrap();
    }

    #[tokio::test]
    async fn test_receive_respects_max_messages() {
        let queue = queue_with(Duration::from_secs(30));
        let url = queue.queue_url("queue");
        for i in 0..15 {
            queue.send(&url, &format!("message-{}", i)).await.unwrap();
        }

        assert_eq!(queue.receive(&url, 3, Duration::ZERO).await.unwrap().len(), 3);
        assert_eq!(queue.receive(&url, 50, Duration::ZERO).await.unwrap().len(), 10);
        assert_eq!(queue.receive(&url, 10, Duration::ZERO).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_redrive_after_max_receive_count() {
        let queue = InMemoryQueue::new(BASE);
        queue.create_queue("queue-dl", QueueAttributes::default()).unwrap();
        queue
            .create_queue(
                "queue",
                QueueAttributes {
                    visibility_timeout: Duration::from_millis(10),
                    redrive_policy: Some(RedrivePolicy {
                        dead_letter_queue: "queue-dl".to_string(),
                        max_receive_count: 2,
                    }),
                },
            )
            .unwrap();
        let url = queue.queue_url("queue");
        let dl_url = queue.queue_url("queue-dl");
        let message_id = queue.send(&url, "poison").await.unwrap();

        for _ in 0..2 {
            assert!(queue.receive_one(&url, Duration::ZERO).await.unwrap().is_some());
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        assert!(queue.receive_one(&url, Duration::ZERO).await.unwrap().is_none());
        assert_eq!(queue.message_count("queue").unwrap(), 0);

        let moved = queue.receive_one(&dl_url, Duration::ZERO).await.unwrap().unwrap();
        assert_eq!(moved.message_id, message_id);
        assert_eq!(moved.body, "poison");
        assert_eq!(moved.receive_count, 1);
    }

    #[tokio::test]
    async fn test_long_poll_wakes_on_send() {
        let queue = Arc::new(queue_with(Duration::from_secs(30)));
        let url = queue.queue_url("queue");

        let sender = {
            let queue = queue.clone();
            let url = url.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                queue.send(&url, "late").await.unwrap();
            })
        };

        let started = Instant::now();
        let envelope = queue
            .receive_one(&url, Duration::from_secs(5))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(envelope.body, "late");
        assert!(started.elapsed() < Duration::from_secs(5));
        sender.await.unwrap();
    }

    #[tokio::test]
    async fn test_long_poll_times_out_empty() {
        let queue = queue_with(Duration::from_secs(30));
        let url = queue.queue_url("queue");

        let envelopes = queue
            .receive(&url, 10, Duration::from_millis(60))
            .await
            .unwrap();
        assert!(envelopes.is_empty());
    }

    #[tokio::test]
    async fn test_purge() {
        let queue = queue_with(Duration::from_secs(30));
        let url = queue.queue_url("queue");
        queue.send(&url, "a").await.unwrap();
        queue.send(&url, "b").await.unwrap();

        queue.purge(&url).await.unwrap();
        assert_eq!(queue.message_count("queue").unwrap(), 0);
    }

    #[tokio::test]
    async fn test_missing_queue() {
        let queue = InMemoryQueue::new(BASE);
        let url = queue.queue_url("nonexistent");

        assert!(matches!(
            queue.send(&url, "hello").await,
            Err(QueueError::QueueNotFound(_))
        ));
        assert!(matches!(
            queue.receive(&url, 1, Duration::ZERO).await,
            Err(QueueError::QueueNotFound(_))
        ));
        assert!(matches!(
            queue.purge(&url).await,
            Err(QueueError::QueueNotFound(_))
        ));
    }

    #[test]
    fn test_create_queue_twice() {
        let queue = InMemoryQueue::new(BASE);
        queue.create_queue("queue", QueueAttributes::default()).unwrap();

        let result = queue.create_queue("queue", QueueAttributes::default());
        assert!(matches!(result, Err(QueueError::QueueAlreadyExists(_))));

        queue.delete_queue("queue").unwrap();
        assert!(matches!(
            queue.delete_queue("queue"),
            Err(QueueError::QueueNotFound(_))
        ));
    }
}
