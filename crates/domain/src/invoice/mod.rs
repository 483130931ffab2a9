//! Invoices: the order record and its payment status.

mod postgres;
mod service;
mod state;
mod store;

use chrono::{DateTime, Utc};
use common::{InvoiceId, InvoiceItemId, Money, ProductId, UserId};
use serde::{Deserialize, Serialize};

use crate::events::{InvoiceEventData, InvoiceEventItem};
use crate::ports::InvoiceSummary;

pub use postgres::PostgresInvoiceStore;
pub use service::InvoiceService;
pub use state::InvoiceStatus;
pub use store::{InMemoryInvoiceStore, InvoiceStore};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceItem {
    pub id: InvoiceItemId,
    pub product_id: ProductId,
    pub product_name: Option<String>,
    pub quantity: u32,
    pub price: Money,
    pub subtotal: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    pub id: InvoiceId,
    pub user_id: UserId,
    pub ship_address: String,
    pub status: InvoiceStatus,
    pub transaction_id: Option<String>,
    pub total_amount: Money,
    pub customer_email: Option<String>,
    pub customer_name: Option<String>,
    pub order_date: DateTime<Utc>,
    pub status_updated_at: DateTime<Utc>,
    pub items: Vec<InvoiceItem>,
}

impl Invoice {
    /// Sum of the item subtotals.
    pub fn items_total(&self) -> Money {
        self.items.iter().map(|item| item.subtotal).sum()
    }

    pub fn to_event_data(&self) -> InvoiceEventData {
        InvoiceEventData {
            invoice_id: self.id,
            user_id: self.user_id,
            status: self.status,
            total_amount: self.total_amount,
            transaction_id: self.transaction_id.clone(),
            ship_address: Some(self.ship_address.clone()),
            order_date: self.order_date,
            customer_email: self.customer_email.clone(),
            customer_name: self.customer_name.clone(),
            items: self
                .items
                .iter()
                .map(|item| InvoiceEventItem {
                    product_id: item.product_id,
                    product_name: item.product_name.clone().unwrap_or_default(),
                    quantity: item.quantity,
                    price: item.price,
                    subtotal: item.subtotal,
                })
                .collect(),
        }
    }

    pub fn summary(&self) -> InvoiceSummary {
        InvoiceSummary {
            invoice_id: self.id,
            user_id: self.user_id,
            status: self.status,
            total_amount: self.total_amount,
            customer_email: self.customer_email.clone(),
            customer_name: self.customer_name.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewInvoiceItem {
    pub product_id: ProductId,
    pub product_name: Option<String>,
    pub quantity: u32,
    pub price: Money,
}

impl NewInvoiceItem {
    pub fn subtotal(&self) -> Money {
        self.price.multiply(self.quantity)
    }
}

/// A validated invoice ready to be stored. The total is fixed by the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct NewInvoice {
    pub user_id: UserId,
    pub ship_address: String,
    pub total_amount: Money,
    pub customer_email: Option<String>,
    pub customer_name: Option<String>,
    pub items: Vec<NewInvoiceItem>,
}
