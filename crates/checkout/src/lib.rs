//! Cart checkout orchestration.
//!
//! Checkout turns a cart into an invoice in four steps:
//! 1. Create the invoice from a snapshot of the cart (the atomicity boundary)
//! 2. Decrement inventory per line, best-effort
//! 3. Clear the cart
//! 4. Announce `CART_CHECKOUT` carrying the new invoice id
//!
//! A failure in step 1 aborts with the cart untouched. Lines whose decrement
//! failed in step 2 are handed to the inventory reconciler as one
//! `ORDER_PLACED` event instead of being compensated.
//!
//! The invoice and product owners are reached through the ports in
//! [`domain::ports`]: in process directly, or across processes through
//! [`HttpPeerClient`].

pub mod clients;
pub mod error;
pub mod orchestrator;
pub mod steps;

pub use clients::{HttpPeerClient, PeerClientConfig};
pub use error::{CheckoutError, Result};
pub use orchestrator::{CheckoutOrchestrator, CheckoutReceipt};
