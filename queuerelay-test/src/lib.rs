//! Test utilities for queuerelay
//!
//! Provides utilities for end-to-end testing of the relay:
//! - Run a relay in-process on a random port against in-memory queues
//! - Inspect and seed those queues directly
//! - Client helpers for the HTTP API
//!
//! ## Usage
//!
//! ```rust,no_run
//! use queuerelay_test::TestServer;
//!
//! #[tokio::test]
//! async fn test_publish() {
//!     let server = TestServer::start().await.unwrap();
//!     let client = server.client();
//!
//!     client.publish(false).await.unwrap();
//!     println!("{:?}", client.processed().await.unwrap());
//!
//!     server.stop().await;
//! }
//! ```

pub mod client;
pub mod server;

pub use client::{ClientError, PublishedMessage, RelayClient};
pub use server::{TestError, TestServer};

/// Timeout for waiting on the relay
pub const STARTUP_TIMEOUT_SECS: u64 = 10;
