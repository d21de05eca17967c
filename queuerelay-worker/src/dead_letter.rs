//! Dead-letter consumer

use async_trait::async_trait;
use queuerelay_core::{Message, ProcessedStateStore};
use queuerelay_sqs::{Envelope, QueueClient};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::PollerConfig;
use crate::error::ConsumerError;
use crate::poller::{EnvelopeHandler, Outcome, Poller};

/// Records dead-lettered messages, then deletes them
pub struct DeadLetterHandler {
    client: Arc<dyn QueueClient>,
    store: Arc<ProcessedStateStore>,
    queue_url: String,
}

impl DeadLetterHandler {
    pub fn new(
        client: Arc<dyn QueueClient>,
        store: Arc<ProcessedStateStore>,
        queue_url: impl Into<String>,
    ) -> Self {
        Self {
            client,
            store,
            queue_url: queue_url.into(),
        }
    }
}

#[async_trait]
impl EnvelopeHandler for DeadLetterHandler {
    async fn handle(&self, envelope: &Envelope) -> Result<Outcome, ConsumerError> {
        let message =
            Message::from_body(&envelope.body).map_err(|source| ConsumerError::Decode {
                message_id: envelope.message_id.clone(),
                source,
            })?;

        self.store.set_last_dead_lettered(message);
        self.client
            .delete(&self.queue_url, &envelope.receipt_handle)
            .await
            .map_err(|source| ConsumerError::Delete {
                message_id: envelope.message_id.clone(),
                source,
            })?;

        debug!(message_id = %envelope.message_id, "Recorded dead-lettered message");
        Ok(Outcome::Processed)
    }
}

/// Longest the startup purge may take before polling starts regardless
pub const DEFAULT_PURGE_TIMEOUT: Duration = Duration::from_secs(30);

/// Background loop draining the dead-letter queue
pub struct DeadLetterConsumer {
    poller: Poller,
    handler: Arc<DeadLetterHandler>,
    client: Arc<dyn QueueClient>,
    purge_on_start: bool,
    purge_timeout: Duration,
}

impl DeadLetterConsumer {
    pub fn new(
        client: Arc<dyn QueueClient>,
        store: Arc<ProcessedStateStore>,
        queue_url: impl Into<String>,
        purge_on_start: bool,
        config: PollerConfig,
    ) -> Self {
        let queue_url = queue_url.into();
        Self {
            poller: Poller::new("dead-letter", client.clone(), queue_url.clone(), config),
            handler: Arc::new(DeadLetterHandler::new(client.clone(), store, queue_url)),
            client,
            purge_on_start,
            purge_timeout: DEFAULT_PURGE_TIMEOUT,
        }
    }

    pub fn with_purge_timeout(mut self, purge_timeout: Duration) -> Self {
        self.purge_timeout = purge_timeout;
        self
    }

    /// Clear stale backlog.
    ///
    /// Bounded by `purge_timeout` and abandoned on cancellation. Problems are
    /// logged and never keep polling from starting.
    pub async fn purge_backlog(&self, token: &CancellationToken) {
        let queue_url = self.poller.queue_url();
        tokio::select! {
            biased;
            _ = token.cancelled() => {
                info!(queue_url = %queue_url, "Shutdown signal received, skipping dead-letter purge");
            }
            result = tokio::time::timeout(self.purge_timeout, self.client.purge(queue_url)) => match result {
                Ok(Ok(())) => info!(queue_url = %queue_url, "Purged dead-letter queue"),
                Ok(Err(e)) => warn!(
                    queue_url = %queue_url,
                    error = %e,
                    "Failed to purge dead-letter queue, continuing"
                ),
                Err(_) => warn!(
                    queue_url = %queue_url,
                    timeout_ms = self.purge_timeout.as_millis() as u64,
                    "Dead-letter purge timed out, continuing"
                ),
            },
        }
    }

    /// Purge (when enabled) before returning, then poll in the background.
    ///
    /// Awaiting this before starting the main-queue consumer keeps a completed
    /// purge from discarding messages that consumer routes.
    pub async fn spawn(self, token: CancellationToken) -> JoinHandle<()> {
        if self.purge_on_start {
            self.purge_backlog(&token).await;
        }
        let Self {
            poller, handler, ..
        } = self;
        tokio::spawn(async move { poller.run(handler, token).await })
    }
}
