use common::{InvoiceId, Money, ProductId, UserId};
use serde::{Deserialize, Serialize};

use super::event_family;

/// One line of an order event.
///
/// Every field is optional on the wire. Lines without a product or with a
/// missing or non-positive quantity carry no inventory effect and are
/// skipped by [`OrderEventData::effective_lines`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLine {
    #[serde(default)]
    pub product_id: Option<ProductId>,
    #[serde(default)]
    pub quantity: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<Money>,
}

impl OrderLine {
    pub fn new(product_id: ProductId, quantity: i64) -> Self {
        Self {
            product_id: Some(product_id),
            quantity: Some(quantity),
            price: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderEventData {
    #[serde(default)]
    pub invoice_id: Option<InvoiceId>,
    #[serde(default)]
    pub user_id: Option<UserId>,
    /// Required: an order event without an item list is malformed.
    pub items: Vec<OrderLine>,
}

impl OrderEventData {
    /// Lines that identify a product and carry a positive quantity.
    pub fn effective_lines(&self) -> impl Iterator<Item = (ProductId, i64)> + '_ {
        self.items.iter().filter_map(|line| match (line.product_id, line.quantity) {
            (Some(product_id), Some(quantity)) if quantity > 0 => Some((product_id, quantity)),
            _ => None,
        })
    }
}

/// Published on `product.order`, consumed by the inventory reconciler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "eventType", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderEvent {
    OrderCreated(OrderEventData),
    OrderPlaced(OrderEventData),
    OrderCancelled(OrderEventData),
}

event_family!(OrderEvent {
    OrderCreated => "ORDER_CREATED",
    OrderPlaced => "ORDER_PLACED",
    OrderCancelled => "ORDER_CANCELLED",
});

impl OrderEvent {
    pub fn data(&self) -> &OrderEventData {
        match self {
            OrderEvent::OrderCreated(d)
            | OrderEvent::OrderPlaced(d)
            | OrderEvent::OrderCancelled(d) => d,
        }
    }

    /// Direction of the stock movement: orders take stock, cancellations
    /// return it.
    pub fn sign(&self) -> i64 {
        match self {
            OrderEvent::OrderCreated(_) | OrderEvent::OrderPlaced(_) => -1,
            OrderEvent::OrderCancelled(_) => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use event_bus::{DecodeError, EventEnvelope};
    use serde_json::json;

    fn envelope(body: serde_json::Value) -> EventEnvelope {
        EventEnvelope::from_slice(body.to_string().as_bytes()).unwrap()
    }

    #[test]
    fn decodes_placed_order_and_skips_unusable_lines() {
        let env = envelope(json!({
            "eventId": "7f0b3c1e-9a44-4c3e-8a5e-0b8f1d2c3e4f",
            "eventType": "ORDER_PLACED",
            "eventTime": "2026-03-01T10:00:00Z",
            "invoiceId": 12,
            "items": [
                {"productId": 1, "quantity": 2},
                {"productId": 2, "quantity": 0},
                {"productId": 3},
                {"quantity": 5},
                {"productId": 4, "quantity": -1}
            ]
        }));

        let event: OrderEvent = env.decode().unwrap();
        assert_eq!(event.sign(), -1);
        let lines: Vec<_> = event.data().effective_lines().collect();
        assert_eq!(lines, vec![(ProductId::new(1), 2)]);
    }

    #[test]
    fn missing_items_is_malformed() {
        let env = envelope(json!({
            "eventId": "7f0b3c1e-9a44-4c3e-8a5e-0b8f1d2c3e4f",
            "eventType": "ORDER_CANCELLED",
            "eventTime": "2026-03-01T10:00:00Z",
            "invoiceId": 12
        }));

        assert!(matches!(
            env.decode::<OrderEvent>(),
            Err(DecodeError::Malformed { .. })
        ));
    }

    #[test]
    fn foreign_event_type_is_unknown() {
        let env = envelope(json!({
            "eventId": "7f0b3c1e-9a44-4c3e-8a5e-0b8f1d2c3e4f",
            "eventType": "ORDER_SHIPPED",
            "eventTime": "2026-03-01T10:00:00Z",
            "items": []
        }));

        assert_eq!(
            env.decode::<OrderEvent>().unwrap_err(),
            DecodeError::UnknownType("ORDER_SHIPPED".to_string())
        );
    }
}
