//! queuerelay - HTTP ingress and queue consumers
//!
//! Publishes messages to a main queue over HTTP, consumes them in the
//! background, routes flagged messages through a dead-letter queue, and
//! reports the last message seen on each path.

pub mod app;
pub mod config;
pub mod router;
pub mod signal;

pub use app::{in_memory_queues, Relay};
pub use config::{Config, QueueBackend};
pub use router::{create_router, AppState};
