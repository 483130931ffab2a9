//! Customer notifications.
//!
//! Best-effort: a notification that cannot be rendered or sent is logged,
//! counted and dropped. Nothing here asks the bus for a redelivery.

mod dispatcher;
mod mailer;
mod smtp;
mod templates;

pub use dispatcher::NotificationDispatcher;
pub use mailer::{InMemoryMailer, LogMailer, Mailer};
pub use smtp::{SmtpMailer, SmtpSecurity, SmtpSettings};
pub use templates::EmailMessage;
