//! Checkout error types.

use common::CartId;
use domain::{DomainError, ErrorKind};
use thiserror::Error;

/// Errors that can occur during checkout.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// The cart does not exist.
    #[error("Cart not found: {0}")]
    CartNotFound(CartId),

    /// The cart has no lines.
    #[error("Cart {0} is empty")]
    EmptyCart(CartId),

    /// The caller does not own the cart.
    #[error("Access denied to cart {0}")]
    Forbidden(CartId),

    /// Invoice creation failed or was not acknowledged. Nothing was changed.
    #[error("Invoice creation for cart {cart_id} failed: {source}")]
    InvoiceCreation {
        cart_id: CartId,
        #[source]
        source: DomainError,
    },

    /// Domain error.
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),
}

impl CheckoutError {
    /// Classifies the error the same way domain errors are classified.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CheckoutError::CartNotFound(_) => ErrorKind::NotFound,
            CheckoutError::EmptyCart(_) => ErrorKind::Validation,
            CheckoutError::Forbidden(_) => ErrorKind::Forbidden,
            CheckoutError::InvoiceCreation { source, .. } => source.kind(),
            CheckoutError::Domain(e) => e.kind(),
        }
    }
}

/// Convenience type alias for checkout results.
pub type Result<T> = std::result::Result<T, CheckoutError>;
