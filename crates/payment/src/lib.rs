//! Payment gateway adapter.
//!
//! - [`signing`]: canonical parameter encoding and HMAC-SHA512 signatures
//! - [`GatewayConfig`]: merchant settings for the hosted payment page
//! - [`PaymentAdapter`]: creates signed payment sessions, verifies gateway
//!   callbacks and answers status queries
//!
//! No payment or invoice status changes without a verified signature, and
//! the reference in a callback must belong to the invoice it names.

pub mod adapter;
pub mod error;
pub mod gateway;
pub mod signing;

pub use adapter::{CallbackOutcome, PaymentAdapter, PaymentRequest, PaymentSession, PaymentStatusView};
pub use error::{PaymentError, Result};
pub use gateway::GatewayConfig;
pub use signing::Signer;
