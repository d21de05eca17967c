//! Core types for queuerelay
//!
//! This crate provides the message model, the processed-state store and the
//! error types shared by the adapter, the consumers and the HTTP API.

pub mod error;
pub mod message;
pub mod settings;
pub mod state;

pub use error::{ApiError, ErrorCode};
pub use message::Message;
pub use settings::{ConfigError, QueueUrls, Settings, DEAD_LETTER_QUEUE_NAME, MAIN_QUEUE_NAME};
pub use state::{ProcessedState, ProcessedStateStore};
