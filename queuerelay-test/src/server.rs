//! Test server management

use queuerelay::{in_memory_queues, Config, QueueBackend, Relay};
use queuerelay_core::{ProcessedStateStore, QueueUrls};
use queuerelay_sqs::InMemoryQueue;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::{RelayClient, STARTUP_TIMEOUT_SECS};

/// A relay running in-process against in-memory queues
pub struct TestServer {
    base_url: String,
    queue: Arc<InMemoryQueue>,
    store: Arc<ProcessedStateStore>,
    queues: QueueUrls,
    token: CancellationToken,
    handle: Option<JoinHandle<Result<(), String>>>,
}

impl TestServer {
    /// Configuration tuned for fast tests: short polls, a one-second
    /// visibility timeout and redrive after two deliveries
    pub fn test_config() -> Config {
        let mut config = Config::default();
        config.server.host = "127.0.0.1".to_string();
        config.server.port = 0;
        config.queue.backend = QueueBackend::Memory;
        config.consumer.wait_time_secs = 1;
        config.consumer.shutdown_grace_secs = 5;
        config.consumer.error_backoff_max_secs = 1;
        config.memory.visibility_timeout_secs = 1;
        config.memory.max_receive_count = 2;
        config
    }

    /// Start a relay on a random port with `queue` and `queue-dl` created
    pub async fn start() -> Result<Self, TestError> {
        let config = Self::test_config();
        let queue = in_memory_queues(&config, &config.queue.queue_endpoint)
            .map_err(|e| TestError::StartFailed(e.to_string()))?;
        Self::start_with(config, Arc::new(queue)).await
    }

    /// Start a relay with the given configuration, backed by `queue`
    pub async fn start_with(config: Config, queue: Arc<InMemoryQueue>) -> Result<Self, TestError> {
        let listener = TcpListener::bind(("127.0.0.1", 0))
            .await
            .map_err(|e| TestError::BindFailed(e.to_string()))?;
        let port = listener
            .local_addr()
            .map_err(|e| TestError::BindFailed(e.to_string()))?
            .port();

        let relay = Relay::with_client(config, queue.clone())
            .map_err(|e| TestError::StartFailed(e.to_string()))?;
        let store = relay.store();
        let queues = relay.queues().clone();

        info!(port = port, "Starting queuerelay test server");

        let token = CancellationToken::new();
        let run_token = token.clone();
        let handle = tokio::spawn(async move {
            relay
                .run(listener, run_token)
                .await
                .map_err(|e| e.to_string())
        });

        let server = Self {
            base_url: format!("http://127.0.0.1:{}", port),
            queue,
            store,
            queues,
            token,
            handle: Some(handle),
        };
        server.wait_ready().await?;
        Ok(server)
    }

    async fn wait_ready(&self) -> Result<(), TestError> {
        let client = self.client();
        let start = std::time::Instant::now();

        while start.elapsed() < Duration::from_secs(STARTUP_TIMEOUT_SECS) {
            if let Ok(true) = client.health().await {
                info!(url = %self.base_url, "queuerelay ready");
                return Ok(());
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        self.token.cancel();
        Err(TestError::StartupTimeout)
    }

    /// Get the base URL
    pub fn url(&self) -> &str {
        &self.base_url
    }

    /// The queues behind the relay
    pub fn queue(&self) -> &Arc<InMemoryQueue> {
        &self.queue
    }

    pub fn queues(&self) -> &QueueUrls {
        &self.queues
    }

    pub fn store(&self) -> &Arc<ProcessedStateStore> {
        &self.store
    }

    /// Get a client for the HTTP API
    pub fn client(&self) -> RelayClient {
        RelayClient::new(self.base_url.clone())
    }

    /// Cancel the relay and wait for it to drain
    pub async fn stop(&mut self) -> Result<(), TestError> {
        info!("Stopping queuerelay test server");
        self.token.cancel();

        if let Some(handle) = self.handle.take() {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => return Err(TestError::StopFailed(e)),
                Err(e) => return Err(TestError::StopFailed(e.to_string())),
            }
        }

        info!("queuerelay test server stopped");
        Ok(())
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Errors that can occur with test server
#[derive(Debug)]
pub enum TestError {
    BindFailed(String),
    StartFailed(String),
    StartupTimeout,
    StopFailed(String),
}

impl std::fmt::Display for TestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TestError::BindFailed(msg) => write!(f, "Failed to bind listener: {}", msg),
            TestError::StartFailed(msg) => write!(f, "Failed to start relay: {}", msg),
            TestError::StartupTimeout => write!(f, "Relay startup timed out"),
            TestError::StopFailed(msg) => write!(f, "Relay did not stop cleanly: {}", msg),
        }
    }
}

impl std::error::Error for TestError {}
