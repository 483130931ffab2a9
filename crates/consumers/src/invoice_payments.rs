//! Applies payment outcomes to invoices.

use std::sync::Arc;

use async_trait::async_trait;
use domain::events::PaymentEvent;
use domain::{DomainError, InvoiceService, InvoiceStatus, InvoiceStore};
use event_bus::{EventBus, EventEnvelope};

use crate::error::Result;
use crate::handler::{EventHandler, decode};

const CONSUMER: &str = "invoice-payments";

/// Consumes `invoice.payment.events`.
///
/// Completed payments mark the invoice PAID, failed ones PAYMENT_FAILED. A
/// redelivered event re-applies the same status, which the invoice treats as
/// a no-op. An event the state machine refuses, such as a late failure for
/// an invoice already PAID, is stale: it is logged and acked.
pub struct InvoicePaymentConsumer<S, B> {
    invoices: Arc<InvoiceService<S, B>>,
}

impl<S: InvoiceStore, B: EventBus> InvoicePaymentConsumer<S, B> {
    pub fn new(invoices: Arc<InvoiceService<S, B>>) -> Self {
        Self { invoices }
    }
}

#[async_trait]
impl<S: InvoiceStore, B: EventBus> EventHandler for InvoicePaymentConsumer<S, B> {
    fn name(&self) -> &'static str {
        CONSUMER
    }

    #[tracing::instrument(skip(self, envelope), fields(event_id = %envelope.event_id, event_type = %envelope.event_type))]
    async fn handle(&self, envelope: &EventEnvelope) -> Result<()> {
        let Some(event) = decode::<PaymentEvent>(CONSUMER, envelope)? else {
            return Ok(());
        };

        let status = match &event {
            PaymentEvent::PaymentInitialized(_) => return Ok(()),
            PaymentEvent::PaymentCompleted(_) => InvoiceStatus::Paid,
            PaymentEvent::PaymentFailed(_) => InvoiceStatus::PaymentFailed,
        };
        let data = event.data();

        match self
            .invoices
            .update_status(data.invoice_id, status, Some(&data.transaction_id))
            .await
        {
            Ok(_) => Ok(()),
            Err(DomainError::InvalidTransition { from, to, .. }) => {
                metrics::counter!("stale_payment_events_total").increment(1);
                tracing::warn!(
                    invoice_id = %data.invoice_id,
                    transaction_id = %data.transaction_id,
                    %from,
                    %to,
                    "stale payment event ignored"
                );
                Ok(())
            }
            Err(DomainError::NotFound { .. }) => {
                tracing::warn!(invoice_id = %data.invoice_id, "payment event for unknown invoice dropped");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}
