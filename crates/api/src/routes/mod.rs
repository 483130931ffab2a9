//! HTTP route handlers.

pub mod carts;
pub mod checkout;
pub mod invoices;
pub mod ops;
pub mod payments;
pub mod products;
