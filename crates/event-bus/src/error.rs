use thiserror::Error;

/// Errors that can occur when interacting with the event bus or the
/// processed-event store.
#[derive(Debug, Error)]
pub enum EventBusError {
    /// A consumer asked for a queue that was never declared.
    #[error("Queue not found: {0}")]
    QueueNotFound(String),

    /// A settlement referenced a delivery that is not in flight.
    #[error("Unknown delivery tag: {0}")]
    UnknownDelivery(u64),

    /// The broker could not be reached or refused the operation.
    #[error("Broker unavailable: {0}")]
    Unavailable(String),

    /// An envelope could not be built from the given parts.
    #[error("Invalid envelope: {0}")]
    InvalidEnvelope(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The AMQP connection or channel failed.
    #[error("AMQP error: {0}")]
    Amqp(#[from] lapin::Error),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EventBusError {
    /// Returns true for failures that may succeed if attempted again.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            EventBusError::Unavailable(_) | EventBusError::Database(_) | EventBusError::Amqp(_)
        )
    }
}

/// Why an envelope could not be turned into a typed event.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// The event type is not part of the family being decoded.
    #[error("Unknown event type: {0}")]
    UnknownType(String),

    /// The event type is known but the payload does not match its contract.
    #[error("Malformed {event_type} event: {reason}")]
    Malformed { event_type: String, reason: String },
}

/// Result type for event bus operations.
pub type Result<T> = std::result::Result<T, EventBusError>;
