//! Carts: a user's draft order, priced when lines are added.

mod postgres;
mod service;
mod store;

use chrono::{DateTime, Utc};
use common::{CartId, CartLineId, InvoiceId, Money, ProductId, UserId};
use serde::{Deserialize, Serialize};

use crate::events::{CartEventData, CartEventItem};

pub use postgres::PostgresCartStore;
pub use service::CartService;
pub use store::{CartStore, InMemoryCartStore};

/// A cart line. `total` is `unit_price * quantity`, with the unit price
/// captured when the line was last added or updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub id: CartLineId,
    pub cart_id: CartId,
    pub product_id: ProductId,
    pub product_name: Option<String>,
    pub quantity: u32,
    pub unit_price: Money,
    pub total: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    pub id: CartId,
    pub user_id: UserId,
    pub lines: Vec<CartLine>,
    pub total: Money,
    pub updated_at: DateTime<Utc>,
}

impl Cart {
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn line(&self, product_id: ProductId) -> Option<&CartLine> {
        self.lines.iter().find(|line| line.product_id == product_id)
    }

    pub fn lines_total(&self) -> Money {
        self.lines.iter().map(|line| line.total).sum()
    }

    pub fn to_event_data(&self, invoice_id: Option<InvoiceId>) -> CartEventData {
        CartEventData {
            cart_id: self.id,
            user_id: self.user_id,
            total: self.total,
            items: self
                .lines
                .iter()
                .map(|line| CartEventItem {
                    product_id: line.product_id,
                    quantity: line.quantity,
                    total: line.total,
                })
                .collect(),
            invoice_id,
        }
    }
}

/// A line to insert, or to replace the existing line for the same product.
#[derive(Debug, Clone, PartialEq)]
pub struct NewCartLine {
    pub product_id: ProductId,
    pub product_name: Option<String>,
    pub quantity: u32,
    pub unit_price: Money,
}

impl NewCartLine {
    pub fn total(&self) -> Money {
        self.unit_price.multiply(self.quantity)
    }
}
