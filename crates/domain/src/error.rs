//! Domain error types.

use common::{CartId, InvoiceId};
use event_bus::EventBusError;
use thiserror::Error;

use crate::invoice::InvoiceStatus;

/// How an error should be treated by callers: whether it is retried, and
/// which HTTP status it surfaces as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad input. Never retried.
    Validation,
    /// Missing entity. Never retried.
    NotFound,
    /// Optimistic-concurrency collision or a transition the state machine refuses.
    Conflict,
    /// Peer service, gateway or broker unreachable. Retried with backoff, then surfaced.
    TransientDependency,
    /// Signature mismatch or forged reference. Never retried, always logged.
    Security,
    /// The principal is not allowed to touch the resource.
    Forbidden,
    /// Storage or serialization fault.
    Internal,
}

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Cart {0} is empty")]
    EmptyCart(CartId),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A conditional write lost against a concurrent writer.
    #[error("Concurrent modification of {entity} {id} (expected {expected})")]
    ConcurrentModification {
        entity: &'static str,
        id: String,
        expected: String,
    },

    #[error("Invoice {invoice_id} cannot move from {from} to {to}")]
    InvalidTransition {
        invoice_id: InvoiceId,
        from: InvoiceStatus,
        to: InvoiceStatus,
    },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("{dependency} unavailable: {reason}")]
    TransientDependency { dependency: String, reason: String },

    /// A peer answered with an error that retrying will not fix.
    #[error("{dependency} rejected the request ({status}): {reason}")]
    Rejected {
        dependency: String,
        status: u16,
        reason: String,
    },

    #[error("Security violation: {0}")]
    Security(String),

    #[error("Access denied: {0}")]
    Forbidden(String),

    #[error("Event bus error: {0}")]
    EventBus(#[from] EventBusError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DomainError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        DomainError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn concurrent_modification(
        entity: &'static str,
        id: impl ToString,
        expected: impl ToString,
    ) -> Self {
        DomainError::ConcurrentModification {
            entity,
            id: id.to_string(),
            expected: expected.to_string(),
        }
    }

    pub fn transient(dependency: impl Into<String>, reason: impl ToString) -> Self {
        DomainError::TransientDependency {
            dependency: dependency.into(),
            reason: reason.to_string(),
        }
    }

    /// Classifies the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            DomainError::Validation(_) | DomainError::EmptyCart(_) => ErrorKind::Validation,
            DomainError::NotFound { .. } => ErrorKind::NotFound,
            DomainError::ConcurrentModification { .. }
            | DomainError::InvalidTransition { .. }
            | DomainError::Conflict(_) => ErrorKind::Conflict,
            DomainError::TransientDependency { .. } => ErrorKind::TransientDependency,
            DomainError::Rejected { status, .. } => match status {
                404 => ErrorKind::NotFound,
                409 => ErrorKind::Conflict,
                401 | 403 => ErrorKind::Forbidden,
                _ => ErrorKind::Validation,
            },
            DomainError::Security(_) => ErrorKind::Security,
            DomainError::Forbidden(_) => ErrorKind::Forbidden,
            DomainError::EventBus(e) if e.is_transient() => ErrorKind::TransientDependency,
            DomainError::Database(
                sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_),
            ) => ErrorKind::TransientDependency,
            DomainError::EventBus(_) | DomainError::Database(_) | DomainError::Serialization(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// True only for a lost optimistic-concurrency race.
    pub fn is_concurrent_modification(&self) -> bool {
        matches!(self, DomainError::ConcurrentModification { .. })
    }

    /// True for failures worth another attempt: lost races and transient
    /// dependency failures. Validation, not-found, security and state-machine
    /// refusals never are.
    pub fn is_retryable(&self) -> bool {
        self.is_concurrent_modification() || self.kind() == ErrorKind::TransientDependency
    }
}

/// Result type for domain operations.
pub type Result<T> = std::result::Result<T, DomainError>;
