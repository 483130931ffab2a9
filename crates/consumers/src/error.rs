//! Consumer error types.

use domain::DomainError;
use event_bus::EventBusError;
use thiserror::Error;

/// How a handler failed, which decides how the delivery is settled.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HandlerError {
    /// The payload breaks its contract. Dead-lettered, never retried.
    #[error("Malformed event: {0}")]
    Malformed(String),

    /// A dependency was unavailable. Requeued.
    #[error("Transient failure: {0}")]
    Transient(String),

    /// Retrying cannot help. Logged and acked.
    #[error("Permanent failure: {0}")]
    Permanent(String),
}

impl From<DomainError> for HandlerError {
    fn from(e: DomainError) -> Self {
        if e.is_retryable() {
            HandlerError::Transient(e.to_string())
        } else {
            HandlerError::Permanent(e.to_string())
        }
    }
}

impl From<EventBusError> for HandlerError {
    fn from(e: EventBusError) -> Self {
        if e.is_transient() {
            HandlerError::Transient(e.to_string())
        } else {
            HandlerError::Permanent(e.to_string())
        }
    }
}

/// The mail transport refused a message.
#[derive(Debug, Error)]
pub enum MailerError {
    #[error("Mail transport failed: {0}")]
    Transport(String),

    #[error("Invalid email: {0}")]
    InvalidMessage(String),
}

/// Result type for handlers.
pub type Result<T> = std::result::Result<T, HandlerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_domain_errors_are_transient() {
        let err: HandlerError = DomainError::transient("ledger", "pool timed out").into();
        assert!(matches!(err, HandlerError::Transient(_)));

        let err: HandlerError = DomainError::not_found("Product", 4).into();
        assert!(matches!(err, HandlerError::Permanent(_)));
    }

    #[test]
    fn broker_outage_is_transient() {
        let err: HandlerError = EventBusError::Unavailable("down".into()).into();
        assert!(matches!(err, HandlerError::Transient(_)));
    }
}
