//! Main-queue consumer

use async_trait::async_trait;
use queuerelay_core::{Message, ProcessedStateStore, QueueUrls};
use queuerelay_sqs::{Envelope, QueueClient};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{DeadLetterRouting, PollerConfig};
use crate::error::ConsumerError;
use crate::poller::{EnvelopeHandler, Outcome, Poller};

/// Classifies main-queue envelopes.
///
/// Normal messages update `last_received` before their delivery is deleted,
/// so a crash in between leads to redelivery rather than loss.
pub struct MainQueueHandler {
    client: Arc<dyn QueueClient>,
    store: Arc<ProcessedStateStore>,
    queues: QueueUrls,
    routing: DeadLetterRouting,
}

impl MainQueueHandler {
    pub fn new(
        client: Arc<dyn QueueClient>,
        store: Arc<ProcessedStateStore>,
        queues: QueueUrls,
        routing: DeadLetterRouting,
    ) -> Self {
        Self {
            client,
            store,
            queues,
            routing,
        }
    }

    async fn delete(&self, envelope: &Envelope) -> Result<(), ConsumerError> {
        self.client
            .delete(&self.queues.main, &envelope.receipt_handle)
            .await
            .map_err(|source| ConsumerError::Delete {
                message_id: envelope.message_id.clone(),
                source,
            })
    }

    async fn route_to_dead_letter(&self, envelope: &Envelope) -> Result<Outcome, ConsumerError> {
        match self.routing {
            DeadLetterRouting::Explicit => {
                self.client
                    .send(&self.queues.dead_letter, &envelope.body)
                    .await
                    .map_err(|source| ConsumerError::Route {
                        message_id: envelope.message_id.clone(),
                        source,
                    })?;
                // A failed delete here means redelivery and a duplicate on the
                // dead-letter queue; recording it twice is harmless.
                self.delete(envelope).await?;

                info!(
                    message_id = %envelope.message_id,
                    dead_letter_queue = %self.queues.dead_letter,
                    "Routed message to dead-letter queue"
                );
                Ok(Outcome::RoutedToDeadLetter)
            }
            DeadLetterRouting::Redrive => {
                warn!(
                    message_id = %envelope.message_id,
                    receive_count = envelope.receive_count,
                    "Message flagged for dead-letter, leaving it for redrive"
                );
                Ok(Outcome::LeftForRedrive)
            }
        }
    }
}

#[async_trait]
impl EnvelopeHandler for MainQueueHandler {
    async fn handle(&self, envelope: &Envelope) -> Result<Outcome, ConsumerError> {
        let message =
            Message::from_body(&envelope.body).map_err(|source| ConsumerError::Decode {
                message_id: envelope.message_id.clone(),
                source,
            })?;

        if message.to_dead_letter {
            return self.route_to_dead_letter(envelope).await;
        }

        self.store.set_last_received(message);
        self.delete(envelope).await?;

        debug!(message_id = %envelope.message_id, "Processed message");
        Ok(Outcome::Processed)
    }
}

/// Background loop draining the main queue
pub struct MainQueueConsumer {
    poller: Poller,
    handler: Arc<MainQueueHandler>,
}

impl MainQueueConsumer {
    pub fn new(
        client: Arc<dyn QueueClient>,
        store: Arc<ProcessedStateStore>,
        queues: QueueUrls,
        routing: DeadLetterRouting,
        config: PollerConfig,
    ) -> Self {
        let poller = Poller::new("main", client.clone(), queues.main.clone(), config);
        Self {
            poller,
            handler: Arc::new(MainQueueHandler::new(client, store, queues, routing)),
        }
    }

    pub async fn run(self, token: CancellationToken) {
        self.poller.run(self.handler, token).await;
    }

    pub fn spawn(self, token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(token))
    }
}
