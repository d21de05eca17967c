//! Polling engine shared by both consumers

use async_trait::async_trait;
use queuerelay_sqs::{Envelope, QueueClient};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::PollerConfig;
use crate::error::ConsumerError;

/// What a handler did with an envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// State updated and the delivery deleted
    Processed,
    /// Forwarded to the dead-letter queue and deleted from the source queue
    RoutedToDeadLetter,
    /// Left unacknowledged for the queue's redrive policy
    LeftForRedrive,
}

/// Per-envelope processing logic plugged into a [`Poller`]
#[async_trait]
pub trait EnvelopeHandler: Send + Sync + 'static {
    async fn handle(&self, envelope: &Envelope) -> Result<Outcome, ConsumerError>;
}

/// Long-polls one queue and hands every envelope to a handler on its own
/// task, with at most `max_in_flight` tasks alive at once.
pub struct Poller {
    name: &'static str,
    client: Arc<dyn QueueClient>,
    queue_url: String,
    config: PollerConfig,
}

impl Poller {
    pub fn new(
        name: &'static str,
        client: Arc<dyn QueueClient>,
        queue_url: impl Into<String>,
        config: PollerConfig,
    ) -> Self {
        Self {
            name,
            client,
            queue_url: queue_url.into(),
            config,
        }
    }

    pub fn queue_url(&self) -> &str {
        &self.queue_url
    }

    /// Poll until `token` is cancelled, then drain in-flight envelopes for
    /// at most `shutdown_grace`.
    pub async fn run<H: EnvelopeHandler>(&self, handler: Arc<H>, token: CancellationToken) {
        let queue = self.name;
        let semaphore = Arc::new(Semaphore::new(self.config.max_in_flight));
        let mut inflight = JoinSet::new();
        let mut consecutive_errors: u32 = 0;

        info!(
            queue = queue,
            queue_url = %self.queue_url,
            max_in_flight = self.config.max_in_flight,
            wait_time_secs = self.config.wait_time.as_secs(),
            "Starting consumer"
        );

        loop {
            while let Some(result) = inflight.try_join_next() {
                log_task_result(queue, result);
            }

            if token.is_cancelled() {
                info!(queue = queue, "Shutdown signal received, stopping consumer");
                break;
            }

            // Never pull more than we can start processing right away.
            let first_permit = tokio::select! {
                biased;
                _ = token.cancelled() => {
                    info!(queue = queue, "Shutdown signal received while at capacity, stopping consumer");
                    break;
                }
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(e) => {
                        error!(queue = queue, error = %e, "Semaphore closed, stopping consumer");
                        break;
                    }
                },
            };
            let batch_size = (semaphore.available_permits() + 1).min(self.config.max_batch);

            let received = tokio::select! {
                biased;
                _ = token.cancelled() => {
                    info!(queue = queue, "Shutdown signal received during poll, stopping consumer");
                    break;
                }
                result = self.client.receive(&self.queue_url, batch_size, self.config.wait_time) => result,
            };

            let envelopes = match received {
                Ok(envelopes) => {
                    consecutive_errors = 0;
                    envelopes
                }
                Err(e) => {
                    consecutive_errors = consecutive_errors.saturating_add(1);
                    let backoff = self.config.error_backoff(consecutive_errors);
                    error!(
                        queue = queue,
                        error = %e,
                        consecutive_errors = consecutive_errors,
                        backoff_ms = backoff.as_millis() as u64,
                        "Failed to receive messages, backing off"
                    );
                    drop(first_permit);
                    tokio::select! {
                        _ = tokio::time::sleep(backoff) => {}
                        _ = token.cancelled() => {
                            info!(queue = queue, "Shutdown signal received during backoff, stopping consumer");
                            break;
                        }
                    }
                    continue;
                }
            };

            if !envelopes.is_empty() {
                debug!(queue = queue, count = envelopes.len(), "Received messages");
            }

            let mut first_permit = Some(first_permit);
            for envelope in envelopes {
                let permit = match first_permit.take() {
                    Some(permit) => permit,
                    None => match semaphore.clone().acquire_owned().await {
                        Ok(permit) => permit,
                        Err(e) => {
                            error!(queue = queue, error = %e, "Semaphore closed, dropping envelope");
                            break;
                        }
                    },
                };
                let handler = handler.clone();

                inflight.spawn(async move {
                    let _permit = permit;
                    match handler.handle(&envelope).await {
                        Ok(outcome) => debug!(
                            queue = queue,
                            message_id = %envelope.message_id,
                            outcome = ?outcome,
                            "Handled message"
                        ),
                        Err(e) => error!(
                            queue = queue,
                            message_id = %envelope.message_id,
                            receive_count = envelope.receive_count,
                            error = %e,
                            "Failed to handle message, leaving it on the queue"
                        ),
                    }
                });
            }
        }

        if !inflight.is_empty() {
            info!(
                queue = queue,
                count = inflight.len(),
                grace_ms = self.config.shutdown_grace.as_millis() as u64,
                "Draining in-flight messages"
            );
            let drained = tokio::time::timeout(self.config.shutdown_grace, async {
                while let Some(result) = inflight.join_next().await {
                    log_task_result(queue, result);
                }
            })
            .await;

            match drained {
                Ok(()) => info!(queue = queue, "All in-flight messages drained"),
                Err(_) => {
                    warn!(
                        queue = queue,
                        remaining = inflight.len(),
                        "Drain timed out, abandoning remaining messages"
                    );
                    inflight.abort_all();
                }
            }
        }

        info!(queue = queue, "Consumer stopped");
    }
}

fn log_task_result(queue: &str, result: Result<(), JoinError>) {
    match result {
        Ok(()) => {}
        Err(e) if e.is_panic() => {
            error!(queue = queue, error = %e, "Message handler panicked");
        }
        Err(e) => {
            warn!(queue = queue, error = %e, "Message task did not complete");
        }
    }
}
