//! Domain layer for the order-fulfillment workflow.
//!
//! This crate owns the entities, their stores and the services that mutate
//! them:
//!
//! - **Cart**: per-user cart lines priced at the time they were added
//! - **Invoice**: the order record and its payment-status state machine
//! - **Payment**: provider transactions keyed by the gateway reference
//! - **Inventory**: per-product stock under optimistic concurrency
//!
//! Every service publishes its facts through an [`event_bus::EventPublisher`]
//! using the contracts in [`events`]. The [`ports`] traits are the seams
//! where a peer service may live in-process or behind HTTP.

pub mod cart;
pub mod error;
pub mod events;
pub mod inventory;
pub mod invoice;
pub mod payment;
pub mod ports;
pub mod postgres;

pub use cart::{Cart, CartLine, CartService, CartStore, InMemoryCartStore, PostgresCartStore};
pub use error::{DomainError, ErrorKind, Result};
pub use inventory::{
    InMemoryInventoryLedger, InventoryChange, InventoryEntry, InventoryLedger, InventoryService,
    NewProduct, PostgresInventoryLedger, with_optimistic_retry,
};
pub use invoice::{
    InMemoryInvoiceStore, Invoice, InvoiceItem, InvoiceService, InvoiceStatus, InvoiceStore,
    NewInvoice, NewInvoiceItem, PostgresInvoiceStore,
};
pub use payment::{
    InMemoryPaymentStore, NewPaymentTransaction, PaymentCompletion, PaymentStatus, PaymentStore,
    PaymentTransaction, PostgresPaymentStore,
};
pub use ports::{
    CreateInvoiceRequest, InventoryGateway, InvoiceGateway, InvoiceLineRequest, InvoiceLookup,
    InvoiceReceipt, InvoiceSummary, ProductCatalog, ProductSnapshot,
};
