use chrono::{DateTime, Utc};
use common::{InvoiceId, Money, ProductId, UserId};
use serde::{Deserialize, Serialize};

use super::event_family;
use crate::invoice::InvoiceStatus;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceEventItem {
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: u32,
    pub price: Money,
    pub subtotal: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceEventData {
    pub invoice_id: InvoiceId,
    pub user_id: UserId,
    pub status: InvoiceStatus,
    pub total_amount: Money,
    #[serde(default)]
    pub transaction_id: Option<String>,
    #[serde(default)]
    pub ship_address: Option<String>,
    pub order_date: DateTime<Utc>,
    #[serde(default)]
    pub customer_email: Option<String>,
    #[serde(default)]
    pub customer_name: Option<String>,
    #[serde(default)]
    pub items: Vec<InvoiceEventItem>,
}

/// Published on `invoice.events` and `email.invoice.events`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "eventType", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvoiceEvent {
    InvoiceCreated(InvoiceEventData),
    InvoiceUpdated(InvoiceEventData),
}

event_family!(InvoiceEvent {
    InvoiceCreated => "INVOICE_CREATED",
    InvoiceUpdated => "INVOICE_UPDATED",
});

impl InvoiceEvent {
    pub fn data(&self) -> &InvoiceEventData {
        match self {
            InvoiceEvent::InvoiceCreated(d) | InvoiceEvent::InvoiceUpdated(d) => d,
        }
    }
}
