//! Queue consumers for queuerelay
//!
//! Two long-running loops share one polling engine:
//! - [`MainQueueConsumer`] records normal messages and routes dead-letter ones
//! - [`DeadLetterConsumer`] purges stale backlog, then records dead-lettered messages
//!
//! Both dispatch each envelope to its own task, capped by a semaphore, and
//! drain in-flight work for a bounded grace period on cancellation.

pub mod config;
pub mod dead_letter;
pub mod error;
pub mod main_queue;
pub mod poller;

pub use config::{DeadLetterRouting, PollerConfig};
pub use dead_letter::{DeadLetterConsumer, DeadLetterHandler, DEFAULT_PURGE_TIMEOUT};
pub use error::ConsumerError;
pub use main_queue::{MainQueueConsumer, MainQueueHandler};
pub use poller::{EnvelopeHandler, Outcome, Poller};
