//! Payment error types.

use common::InvoiceId;
use domain::{DomainError, ErrorKind};
use thiserror::Error;

/// Errors that can occur in the payment adapter.
#[derive(Debug, Error)]
pub enum PaymentError {
    /// The callback signature is missing, malformed or does not match, or
    /// the reference does not belong to the named invoice.
    #[error("Invalid transaction signature: {0}")]
    InvalidSignature(String),

    #[error("Missing parameter: {0}")]
    MissingParameter(&'static str),

    #[error("Invalid parameter {name}: {value}")]
    InvalidParameter { name: &'static str, value: String },

    #[error("Invoice not found: {0}")]
    InvoiceNotFound(InvoiceId),

    #[error("Invoice {0} is already paid")]
    AlreadyPaid(InvoiceId),

    /// The hash secret could not key the MAC.
    #[error("Invalid gateway configuration: {0}")]
    Configuration(String),

    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),
}

impl PaymentError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PaymentError::InvalidSignature(_) => ErrorKind::Security,
            PaymentError::MissingParameter(_) | PaymentError::InvalidParameter { .. } => {
                ErrorKind::Validation
            }
            PaymentError::InvoiceNotFound(_) => ErrorKind::NotFound,
            PaymentError::AlreadyPaid(_) => ErrorKind::Conflict,
            PaymentError::Configuration(_) => ErrorKind::Internal,
            PaymentError::Domain(e) => e.kind(),
        }
    }

    /// Machine-readable code returned to the gateway redirect.
    pub fn code(&self) -> &'static str {
        match self {
            PaymentError::InvalidSignature(_) => "INVALID_SIGNATURE",
            PaymentError::MissingParameter(_) | PaymentError::InvalidParameter { .. } => {
                "INVALID_REQUEST"
            }
            PaymentError::InvoiceNotFound(_) => "INVOICE_NOT_FOUND",
            PaymentError::AlreadyPaid(_) => "ALREADY_PAID",
            PaymentError::Configuration(_) | PaymentError::Domain(_) => "PAYMENT_ERROR",
        }
    }
}

/// Convenience type alias for payment results.
pub type Result<T> = std::result::Result<T, PaymentError>;
