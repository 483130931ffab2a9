//! Event consumers of the order workflow.
//!
//! A [`QueueWorker`] pulls deliveries from one durable queue and settles each
//! one according to what its [`EventHandler`] reports:
//! - success, or a permanent failure worth no retry: ack
//! - a transient failure: requeue, until the delivery cap dead-letters it
//! - an unparseable envelope or a malformed payload: dead-letter
//!
//! Handlers:
//! - [`InventoryReconciler`] applies order deltas to stock, deduplicated by
//!   event id and product
//! - [`InvoicePaymentConsumer`] moves invoices along the payment state machine
//! - [`NotificationDispatcher`] renders and sends customer emails

pub mod error;
pub mod handler;
pub mod invoice_payments;
pub mod notifications;
pub mod reconciler;
pub mod worker;

pub use error::{HandlerError, MailerError, Result};
pub use handler::EventHandler;
pub use invoice_payments::InvoicePaymentConsumer;
pub use notifications::{
    EmailMessage, InMemoryMailer, LogMailer, Mailer, NotificationDispatcher, SmtpMailer,
    SmtpSecurity, SmtpSettings,
};
pub use reconciler::{InventoryReconciler, net_deltas};
pub use worker::QueueWorker;
