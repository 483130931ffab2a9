//! Shared building blocks for the order-fulfillment services.
//!
//! - Typed identifiers so a `ProductId` can never be passed where an
//!   `InvoiceId` is expected
//! - [`Money`] in minor units
//! - [`Principal`], the verified caller identity passed explicitly to every
//!   call that needs credentials
//! - [`RetryPolicy`] and the retry helpers used at every network and
//!   optimistic-concurrency call site

pub mod money;
pub mod principal;
pub mod retry;
pub mod types;

pub use money::Money;
pub use principal::{Principal, Role};
pub use retry::{RetryPolicy, RetryPolicyBuilder, retry_if, retry_with_backoff};
pub use types::{
    CartId, CartLineId, InvoiceId, InvoiceItemId, PaymentTransactionId, ProductId, UserId, Version,
};
