//! Inventory ledger: per-product stock under optimistic concurrency.

mod cas;
mod ledger;
mod postgres;
mod service;

use common::{Money, ProductId, Version};
use serde::{Deserialize, Serialize};

use crate::events::InventoryChangeRecord;
use crate::ports::ProductSnapshot;

pub use cas::with_optimistic_retry;
pub use ledger::{InMemoryInventoryLedger, InventoryLedger};
pub use postgres::PostgresInventoryLedger;
pub use service::InventoryService;

/// Applies a signed delta to a stock level, clamping at zero.
pub fn apply_delta(current: i64, delta: i64) -> i64 {
    current.saturating_add(delta).max(0)
}

/// True when stock fell and ended at or below the reorder level.
///
/// Covers a product crossing its threshold as well as one that keeps
/// draining below it. A product sitting at zero does not alert again.
pub fn low_stock_alert_due(previous: i64, new: i64, reorder_level: i64) -> bool {
    new < previous && new <= reorder_level
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryEntry {
    pub product_id: ProductId,
    pub name: String,
    pub price: Money,
    pub quantity: i64,
    pub reorder_level: i64,
    pub version: Version,
}

impl InventoryEntry {
    pub fn is_low_stock(&self) -> bool {
        self.quantity <= self.reorder_level
    }

    pub fn snapshot(&self) -> ProductSnapshot {
        ProductSnapshot {
            id: self.product_id,
            name: self.name.clone(),
            price: self.price,
            quantity: self.quantity,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProduct {
    pub name: String,
    pub price: Money,
    pub quantity: i64,
    #[serde(default)]
    pub reorder_level: i64,
}

/// The outcome of one stock mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryChange {
    pub product_id: ProductId,
    pub previous_quantity: i64,
    pub new_quantity: i64,
    pub reorder_level: i64,
}

impl InventoryChange {
    /// The delta actually applied, which differs from the requested one
    /// when the clamp kicked in.
    pub fn applied_delta(&self) -> i64 {
        self.new_quantity - self.previous_quantity
    }

    pub fn low_stock_alert_due(&self) -> bool {
        low_stock_alert_due(self.previous_quantity, self.new_quantity, self.reorder_level)
    }

    pub fn to_record(&self) -> InventoryChangeRecord {
        InventoryChangeRecord {
            product_id: self.product_id,
            previous_quantity: self.previous_quantity,
            new_quantity: self.new_quantity,
            delta: self.applied_delta(),
            reorder_level: self.reorder_level,
        }
    }
}
