use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::{EventEnvelope, QueueBinding, Result};

/// Identifies one in-flight delivery so that it can be settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeliveryTag(pub u64);

/// A message handed to a consumer. It stays in flight until settled.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub tag: DeliveryTag,
    pub queue: String,
    pub exchange: String,
    pub routing_key: String,
    /// Raw message body. Parsing is the consumer's job so that a malformed
    /// body can be dead-lettered instead of crashing the receive loop.
    pub body: Vec<u8>,
    /// How many times this message has been delivered, including this one.
    pub delivery_count: u32,
}

impl Delivery {
    pub fn redelivered(&self) -> bool {
        self.delivery_count > 1
    }
}

/// What a consumer decided to do with a delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settlement {
    /// Processed (or deliberately dropped); remove from the queue.
    Ack,
    /// Transient failure; put back at the tail for another attempt.
    Requeue,
    /// Permanent or structural failure; move to the dead-letter holding area.
    DeadLetter { reason: String },
}

/// Message counts of one queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Waiting for a consumer; in-flight messages are not counted.
    pub ready: usize,
    /// Parked in the queue's dead-letter holding area.
    pub dead_lettered: usize,
}

/// Core trait for message broker implementations.
///
/// Delivery is at-least-once: a message stays in flight until settled, and a
/// requeued message will be delivered again, possibly to a different
/// competing consumer. All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Declares a durable queue and binds it. Declaring twice is a no-op.
    async fn declare(&self, binding: &QueueBinding) -> Result<()>;

    /// Publishes an envelope to an exchange. Every queue whose binding
    /// matches the routing key receives its own copy; with no match the
    /// message is dropped.
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        envelope: &EventEnvelope,
    ) -> Result<()>;

    /// Takes the next message from `queue`, waiting up to `wait` for one.
    async fn receive(&self, queue: &str, wait: Duration) -> Result<Option<Delivery>>;

    /// Settles an in-flight delivery.
    async fn settle(&self, delivery: &Delivery, settlement: Settlement) -> Result<()>;

    /// Current message counts of a declared queue.
    async fn queue_stats(&self, queue: &str) -> Result<QueueStats>;
}

#[async_trait]
impl<T: EventBus + ?Sized> EventBus for Arc<T> {
    async fn declare(&self, binding: &QueueBinding) -> Result<()> {
        (**self).declare(binding).await
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        envelope: &EventEnvelope,
    ) -> Result<()> {
        (**self).publish(exchange, routing_key, envelope).await
    }

    async fn receive(&self, queue: &str, wait: Duration) -> Result<Option<Delivery>> {
        (**self).receive(queue, wait).await
    }

    async fn settle(&self, delivery: &Delivery, settlement: Settlement) -> Result<()> {
        (**self).settle(delivery, settlement).await
    }

    async fn queue_stats(&self, queue: &str) -> Result<QueueStats> {
        (**self).queue_stats(queue).await
    }
}
