//! Exchanges, routing keys and queues of the order workflow.

use serde::{Deserialize, Serialize};

pub mod exchanges {
    pub const CART: &str = "cart.exchange";
    pub const INVOICE: &str = "invoice.exchange";
    pub const PAYMENT: &str = "payment.exchange";
    pub const PRODUCT: &str = "product.exchange";
    pub const USER: &str = "user.exchange";
}

pub mod routing_keys {
    /// CART_CREATED / CART_UPDATED / CART_CLEARED / CART_CHECKOUT
    pub const CART_EVENTS: &str = "cart.events";
    /// INVOICE_CREATED / INVOICE_UPDATED
    pub const INVOICE_EVENTS: &str = "invoice.events";
    pub const EMAIL_INVOICE_EVENTS: &str = "email.invoice.events";
    /// PAYMENT_INITIALIZED / PAYMENT_COMPLETED / PAYMENT_FAILED
    pub const PAYMENT_EVENTS: &str = "payment.events";
    pub const INVOICE_PAYMENT_EVENTS: &str = "invoice.payment.events";
    pub const EMAIL_PAYMENT_EVENTS: &str = "email.payment.events";
    /// ORDER_CREATED / ORDER_PLACED / ORDER_CANCELLED
    pub const PRODUCT_ORDER: &str = "product.order";
    /// INVENTORY_CHANGED / LOW_STOCK_ALERT
    pub const PRODUCT_INVENTORY: &str = "product.inventory";
    /// USER_REGISTERED / PASSWORD_RESET_REQUESTED
    pub const EMAIL_AUTH_EVENTS: &str = "email.auth.events";

    /// Every routing key a payment lifecycle event is published to.
    pub const PAYMENT_FAN_OUT: [&str; 3] =
        [PAYMENT_EVENTS, INVOICE_PAYMENT_EVENTS, EMAIL_PAYMENT_EVENTS];

    /// Every routing key an invoice lifecycle event is published to.
    pub const INVOICE_FAN_OUT: [&str; 2] = [INVOICE_EVENTS, EMAIL_INVOICE_EVENTS];
}

pub mod queues {
    pub const PRODUCT_ORDER: &str = "product.order.queue";
    pub const PRODUCT_INVENTORY: &str = "product.inventory.queue";
    pub const INVOICE_PAYMENT: &str = "invoice.payment.queue";
    pub const EMAIL_PAYMENT: &str = "email.queue.payment";
    pub const EMAIL_INVOICE: &str = "email.queue.invoice";
    pub const EMAIL_AUTH: &str = "email.queue.auth";
}

/// A durable queue bound to an exchange by a routing pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueBinding {
    pub queue: String,
    pub exchange: String,
    pub pattern: String,
}

impl QueueBinding {
    pub fn new(
        queue: impl Into<String>,
        exchange: impl Into<String>,
        pattern: impl Into<String>,
    ) -> Self {
        Self {
            queue: queue.into(),
            exchange: exchange.into(),
            pattern: pattern.into(),
        }
    }

    /// Returns true if a message published with these coordinates lands in the queue.
    pub fn accepts(&self, exchange: &str, routing_key: &str) -> bool {
        self.exchange == exchange && routing_key_matches(&self.pattern, routing_key)
    }
}

/// Name of the holding area for messages dead-lettered from `queue`.
pub fn dead_letter_queue(queue: &str) -> String {
    format!("{queue}.dlq")
}

/// The queues every deployment declares.
pub fn standard_bindings() -> Vec<QueueBinding> {
    use self::{exchanges as x, queues as q, routing_keys as rk};

    vec![
        QueueBinding::new(q::PRODUCT_ORDER, x::PRODUCT, rk::PRODUCT_ORDER),
        QueueBinding::new(q::PRODUCT_INVENTORY, x::PRODUCT, rk::PRODUCT_INVENTORY),
        QueueBinding::new(q::INVOICE_PAYMENT, x::PAYMENT, rk::INVOICE_PAYMENT_EVENTS),
        QueueBinding::new(q::EMAIL_PAYMENT, x::PAYMENT, rk::EMAIL_PAYMENT_EVENTS),
        QueueBinding::new(q::EMAIL_INVOICE, x::INVOICE, rk::EMAIL_INVOICE_EVENTS),
        QueueBinding::new(q::EMAIL_AUTH, x::USER, rk::EMAIL_AUTH_EVENTS),
    ]
}

/// Topic-exchange matching: words are separated by `.`, `*` matches exactly
/// one word and `#` matches zero or more words.
pub fn routing_key_matches(pattern: &str, routing_key: &str) -> bool {
    let pattern: Vec<&str> = pattern.split('.').collect();
    let key: Vec<&str> = routing_key.split('.').collect();
    matches_words(&pattern, &key)
}

fn matches_words(pattern: &[&str], key: &[&str]) -> bool {
    match pattern.split_first() {
        None => key.is_empty(),
        Some((&"#", rest)) => (0..=key.len()).any(|skip| matches_words(rest, &key[skip..])),
        Some((&word, rest)) => match key.split_first() {
            Some((&head, tail)) => (word == "*" || word == head) && matches_words(rest, tail),
            None => false,
        },
    }
}
