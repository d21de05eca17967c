//! Queue client adapter for queuerelay
//!
//! Provides the [`QueueClient`] abstraction over the managed queue service with:
//! - An Amazon SQS implementation backed by `aws-sdk-sqs`
//! - An in-memory implementation with visibility timeout and redrive support

mod client;
mod error;
pub mod memory;
mod sqs;

pub use client::{Envelope, QueueClient, MAX_RECEIVE_BATCH};
pub use error::QueueError;
pub use memory::{InMemoryQueue, QueueAttributes, RedrivePolicy};
pub use sqs::SqsQueueClient;
