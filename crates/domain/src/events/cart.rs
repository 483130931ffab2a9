use common::{CartId, InvoiceId, Money, ProductId, UserId};
use serde::{Deserialize, Serialize};

use super::event_family;

/// A cart line as carried in cart events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartEventItem {
    pub product_id: ProductId,
    pub quantity: u32,
    pub total: Money,
}

/// Snapshot of a cart at the moment the event was raised.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartEventData {
    pub cart_id: CartId,
    pub user_id: UserId,
    pub total: Money,
    #[serde(default)]
    pub items: Vec<CartEventItem>,
    /// Set on `CART_CHECKOUT`: the invoice created from this snapshot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invoice_id: Option<InvoiceId>,
}

/// Published on `cart.events`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "eventType", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CartEvent {
    CartCreated(CartEventData),
    CartUpdated(CartEventData),
    CartCleared(CartEventData),
    CartCheckout(CartEventData),
}

event_family!(CartEvent {
    CartCreated => "CART_CREATED",
    CartUpdated => "CART_UPDATED",
    CartCleared => "CART_CLEARED",
    CartCheckout => "CART_CHECKOUT",
});

impl CartEvent {
    pub fn data(&self) -> &CartEventData {
        match self {
            CartEvent::CartCreated(d)
            | CartEvent::CartUpdated(d)
            | CartEvent::CartCleared(d)
            | CartEvent::CartCheckout(d) => d,
        }
    }
}
