use common::ProductId;
use event_bus::EventId;
use serde::{Deserialize, Serialize};

use super::event_family;

/// The before and after of one product's stock level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryChangeRecord {
    pub product_id: ProductId,
    pub previous_quantity: i64,
    pub new_quantity: i64,
    /// The delta actually applied, after clamping at zero.
    pub delta: i64,
    pub reorder_level: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryEventData {
    /// The order event that caused the change, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_event_id: Option<EventId>,
    pub changes: Vec<InventoryChangeRecord>,
}

/// Published on `product.inventory` after a reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "eventType", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InventoryEvent {
    InventoryChanged(InventoryEventData),
    LowStockAlert(InventoryEventData),
}

event_family!(InventoryEvent {
    InventoryChanged => "INVENTORY_CHANGED",
    LowStockAlert => "LOW_STOCK_ALERT",
});

impl InventoryEvent {
    pub fn data(&self) -> &InventoryEventData {
        match self {
            InventoryEvent::InventoryChanged(d) | InventoryEvent::LowStockAlert(d) => d,
        }
    }
}
