use common::{InvoiceId, Money, UserId};
use serde::{Deserialize, Serialize};

use super::event_family;
use crate::payment::PaymentStatus;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentEventData {
    /// The provider transaction reference issued at session creation.
    pub transaction_id: String,
    pub invoice_id: InvoiceId,
    #[serde(default)]
    pub user_id: Option<UserId>,
    pub amount: Money,
    pub status: PaymentStatus,
    pub payment_method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bank_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_transaction_no: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default)]
    pub customer_email: Option<String>,
    #[serde(default)]
    pub customer_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_url: Option<String>,
}

/// Published on `payment.events`, `invoice.payment.events` and
/// `email.payment.events`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "eventType", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentEvent {
    PaymentInitialized(PaymentEventData),
    PaymentCompleted(PaymentEventData),
    PaymentFailed(PaymentEventData),
}

event_family!(PaymentEvent {
    PaymentInitialized => "PAYMENT_INITIALIZED",
    PaymentCompleted => "PAYMENT_COMPLETED",
    PaymentFailed => "PAYMENT_FAILED",
});

impl PaymentEvent {
    pub fn data(&self) -> &PaymentEventData {
        match self {
            PaymentEvent::PaymentInitialized(d)
            | PaymentEvent::PaymentCompleted(d)
            | PaymentEvent::PaymentFailed(d) => d,
        }
    }
}
