use thiserror::Error;

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Queue does not exist: {0}")]
    QueueNotFound(String),
    #[error("Queue already exists: {0}")]
    QueueAlreadyExists(String),
    #[error("Receipt handle is invalid: {0}")]
    ReceiptHandleInvalid(String),
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("{operation} failed: {message}")]
    Service {
        operation: &'static str,
        message: String,
    },
}
