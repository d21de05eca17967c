use queuerelay_sqs::QueueError;
use thiserror::Error;

/// Failure while handling a single envelope.
///
/// The envelope is left undeleted in every case, so the queue redelivers it
/// or eventually redrives it.
#[derive(Debug, Error)]
pub enum ConsumerError {
    #[error("Malformed body in message {message_id}: {source}")]
    Decode {
        message_id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to route message {message_id} to the dead-letter queue: {source}")]
    Route {
        message_id: String,
        #[source]
        source: QueueError,
    },

    #[error("Failed to delete message {message_id}: {source}")]
    Delete {
        message_id: String,
        #[source]
        source: QueueError,
    },
}
