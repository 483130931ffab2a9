use async_trait::async_trait;
use domain::events::{InvoiceEvent, PaymentEvent, UserEvent};
use event_bus::{DecodeError, EventContract, EventEnvelope};

use super::mailer::Mailer;
use super::templates::{self, Draft};
use crate::error::Result;
use crate::handler::EventHandler;

const CONSUMER: &str = "notification-dispatcher";
const DEFAULT_RESET_URL: &str = "http://localhost:3000/reset-password";

/// Why an event produced no email.
enum Skip {
    UnknownType,
    Malformed(String),
}

/// Renders payment, invoice and user lifecycle events into customer emails.
///
/// Serves `email.queue.payment`, `email.queue.invoice` and `email.queue.auth`.
/// Every outcome acks: unknown types, unreadable payloads, missing recipients
/// and mail transport failures are logged and counted, never retried.
pub struct NotificationDispatcher<M> {
    mailer: M,
    reset_url: String,
}

impl<M: Mailer> NotificationDispatcher<M> {
    pub fn new(mailer: M) -> Self {
        Self {
            mailer,
            reset_url: DEFAULT_RESET_URL.to_string(),
        }
    }

    /// Base of the password-reset link; the token is appended as `?token=`.
    pub fn with_reset_url(mut self, reset_url: impl Into<String>) -> Self {
        self.reset_url = reset_url.into();
        self
    }

    pub fn mailer(&self) -> &M {
        &self.mailer
    }

    /// Picks the event family by type and renders it, returning the
    /// recipient the event names (if any) with the draft.
    fn compose(&self, envelope: &EventEnvelope) -> std::result::Result<(Option<String>, Draft), Skip> {
        let event_type = envelope.event_type.as_str();

        if PaymentEvent::EVENT_TYPES.contains(&event_type) {
            let event: PaymentEvent = envelope.decode()?;
            Ok((event.data().customer_email.clone(), templates::payment(&event)))
        } else if InvoiceEvent::EVENT_TYPES.contains(&event_type) {
            let event: InvoiceEvent = envelope.decode()?;
            Ok((event.data().customer_email.clone(), templates::invoice(&event)))
        } else if UserEvent::EVENT_TYPES.contains(&event_type) {
            let event: UserEvent = envelope.decode()?;
            Ok((event.data().email.clone(), templates::user(&event, &self.reset_url)))
        } else {
            Err(Skip::UnknownType)
        }
    }
}

impl From<DecodeError> for Skip {
    fn from(e: DecodeError) -> Self {
        match e {
            DecodeError::UnknownType(_) => Skip::UnknownType,
            DecodeError::Malformed { .. } => Skip::Malformed(e.to_string()),
        }
    }
}

fn dropped(reason: &'static str) {
    metrics::counter!("notifications_dropped_total", "reason" => reason).increment(1);
}

#[async_trait]
impl<M: Mailer> EventHandler for NotificationDispatcher<M> {
    fn name(&self) -> &'static str {
        CONSUMER
    }

    #[tracing::instrument(skip(self, envelope), fields(event_id = %envelope.event_id, event_type = %envelope.event_type))]
    async fn handle(&self, envelope: &EventEnvelope) -> Result<()> {
        let (recipient, draft) = match self.compose(envelope) {
            Ok(composed) => composed,
            Err(Skip::UnknownType) => {
                tracing::warn!("no template for event type, notification dropped");
                dropped("unknown_type");
                return Ok(());
            }
            Err(Skip::Malformed(reason)) => {
                tracing::warn!(%reason, "unreadable event, notification dropped");
                dropped("malformed");
                return Ok(());
            }
        };

        let Some(to) = recipient.filter(|to| !to.trim().is_empty()) else {
            tracing::warn!(template = draft.template, "recipient email missing, notification dropped");
            dropped("missing_email");
            return Ok(());
        };

        let template = draft.template;
        let message = draft.addressed_to(to);
        match self.mailer.send(&message).await {
            Ok(()) => {
                metrics::counter!("notifications_sent_total", "template" => template).increment(1);
                tracing::info!(template, to = %message.to, "notification sent");
            }
            Err(e) => {
                tracing::error!(template, to = %message.to, error = %e, "notification not sent");
                dropped("send_failed");
            }
        }
        Ok(())
    }
}
