//! Wiring of the queue client, consumers and HTTP server

use queuerelay_core::{
    ProcessedStateStore, QueueUrls, DEAD_LETTER_QUEUE_NAME, MAIN_QUEUE_NAME,
};
use queuerelay_sqs::{
    InMemoryQueue, QueueAttributes, QueueClient, RedrivePolicy, SqsQueueClient,
};
use queuerelay_worker::{DeadLetterConsumer, MainQueueConsumer};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::{Config, QueueBackend};
use crate::router::{create_router, AppState};

/// The relay: one HTTP server and two consumer loops sharing a store
pub struct Relay {
    config: Config,
    client: Arc<dyn QueueClient>,
    store: Arc<ProcessedStateStore>,
    queues: QueueUrls,
}

impl Relay {
    /// Build the queue client the configuration asks for
    pub async fn connect(config: Config) -> anyhow::Result<Self> {
        let settings = config.settings()?;
        let client: Arc<dyn QueueClient> = match config.queue.backend {
            QueueBackend::Sqs => {
                info!(
                    service_endpoint = %settings.service_endpoint,
                    region = ?config.queue.region,
                    "Using SQS backend"
                );
                Arc::new(
                    SqsQueueClient::connect(
                        settings.service_endpoint.as_str(),
                        config.queue.region.clone(),
                    )
                    .await,
                )
            }
            QueueBackend::Memory => {
                info!("Using in-memory backend");
                Arc::new(in_memory_queues(&config, settings.queue_endpoint.as_str())?)
            }
        };

        Self::with_client(config, client)
    }

    /// Use an existing queue client
    pub fn with_client(config: Config, client: Arc<dyn QueueClient>) -> anyhow::Result<Self> {
        let queues = config.settings()?.queue_urls();
        info!(main = %queues.main, dead_letter = %queues.dead_letter, "Resolved queue URLs");

        Ok(Self {
            config,
            client,
            store: Arc::new(ProcessedStateStore::new()),
            queues,
        })
    }

    pub fn store(&self) -> Arc<ProcessedStateStore> {
        self.store.clone()
    }

    pub fn queues(&self) -> &QueueUrls {
        &self.queues
    }

    /// Serve the API and run both consumers until `token` is cancelled.
    ///
    /// The dead-letter purge finishes, times out or is cancelled before the
    /// main consumer starts, so a completed purge never drops messages routed
    /// by this run.
    pub async fn run(self, listener: TcpListener, token: CancellationToken) -> anyhow::Result<()> {
        let consumer = &self.config.consumer;

        let dead_letter = DeadLetterConsumer::new(
            self.client.clone(),
            self.store.clone(),
            self.queues.dead_letter.clone(),
            consumer.purge_dead_letter_on_start,
            consumer.dead_letter_poller(),
        )
        .with_purge_timeout(consumer.purge_timeout())
        .spawn(token.child_token())
        .await;

        let main = MainQueueConsumer::new(
            self.client.clone(),
            self.store.clone(),
            self.queues.clone(),
            consumer.dead_letter_routing,
            consumer.main_poller(),
        )
        .spawn(token.child_token());

        let app = create_router(AppState::new(
            self.client.clone(),
            self.store.clone(),
            self.queues.clone(),
        ));

        info!(addr = %listener.local_addr()?, "Listening");
        let shutdown = token.clone();
        let served = axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await;

        // Stop the consumers even when the server failed on its own.
        token.cancel();
        let (main, dead_letter) = tokio::join!(main, dead_letter);
        main?;
        dead_letter?;
        served?;

        info!("Relay stopped");
        Ok(())
    }
}

/// Create `queue` and `queue-dl`, with the main queue redriving into the
/// dead-letter queue after the configured number of deliveries
pub fn in_memory_queues(config: &Config, base_url: &str) -> anyhow::Result<InMemoryQueue> {
    let queue = InMemoryQueue::new(base_url);
    let visibility_timeout = Duration::from_secs(config.memory.visibility_timeout_secs);

    queue.create_queue(
        DEAD_LETTER_QUEUE_NAME,
        QueueAttributes {
            visibility_timeout,
            redrive_policy: None,
        },
    )?;
    queue.create_queue(
        MAIN_QUEUE_NAME,
        QueueAttributes {
            visibility_timeout,
            redrive_policy: Some(RedrivePolicy {
                dead_letter_queue: DEAD_LETTER_QUEUE_NAME.to_string(),
                max_receive_count: config.memory.max_receive_count,
            }),
        },
    )?;

    Ok(queue)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_queues_are_created() {
        let config = Config::default();
        let queue = in_memory_queues(&config, "http://localhost:4566/000000000000").unwrap();

        assert_eq!(queue.message_count(MAIN_QUEUE_NAME).unwrap(), 0);
        assert_eq!(queue.message_count(DEAD_LETTER_QUEUE_NAME).unwrap(), 0);
    }

    #[test]
    fn test_rejects_invalid_endpoint() {
        let mut config = Config::default();
        config.queue.queue_endpoint = "::".to_string();
        let result = Relay::with_client(config, Arc::new(InMemoryQueue::new("http://unused")));
        assert!(result.is_err());
    }

    #[test]
    fn test_queue_urls_follow_endpoint() {
        let mut config = Config::default();
        config.queue.queue_endpoint = "http://queues.internal/42".to_string();
        let relay =
            Relay::with_client(config, Arc::new(InMemoryQueue::new("http://unused"))).unwrap();

        assert_eq!(relay.queues().main, "http://queues.internal/42/queue");
        assert_eq!(relay.queues().dead_letter, "http://queues.internal/42/queue-dl");
    }
}
