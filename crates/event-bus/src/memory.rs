use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

use crate::{
    Delivery, DeliveryTag, EventBus, EventBusError, EventEnvelope, QueueBinding, QueueStats,
    Result, Settlement,
};

/// Most recent publishes kept for inspection; older ones are dropped.
pub const PUBLISHED_LOG_CAPACITY: usize = 1_024;

#[derive(Debug, Clone)]
struct Message {
    exchange: String,
    routing_key: String,
    body: Vec<u8>,
    delivery_count: u32,
}

/// A message moved out of a queue by a dead-letter settlement.
#[derive(Debug, Clone)]
pub struct DeadLetter {
    pub queue: String,
    pub routing_key: String,
    pub body: Vec<u8>,
    pub reason: String,
    pub delivery_count: u32,
}

#[derive(Debug, Default)]
struct BusState {
    bindings: Vec<QueueBinding>,
    queues: HashMap<String, VecDeque<Message>>,
    in_flight: HashMap<u64, (String, Message)>,
    dead_letters: HashMap<String, Vec<DeadLetter>>,
    published: VecDeque<(String, String, EventEnvelope)>,
    next_tag: u64,
}

#[derive(Debug, Default)]
struct Inner {
    state: Mutex<BusState>,
    arrivals: Notify,
    unavailable: AtomicBool,
}

/// In-process topic-exchange broker.
///
/// Queues are shared by every clone, so several workers polling the same
/// queue behave as competing consumers: each message goes to exactly one of
/// them at a time, and comes back if it is requeued.
#[derive(Debug, Clone, Default)]
pub struct InMemoryEventBus {
    inner: Arc<Inner>,
}

impl InMemoryEventBus {
    /// Creates a new empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a bus with every standard queue declared.
    pub async fn with_standard_topology() -> Self {
        let bus = Self::new();
        {
            let mut state = bus.inner.state.lock().await;
            for binding in crate::standard_bindings() {
                Self::declare_locked(&mut state, &binding);
            }
        }
        bus
    }

    /// Simulates a broker outage: publishes fail with `Unavailable` while set.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.inner.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Publishes a raw body, bypassing envelope serialization.
    pub async fn publish_raw(&self, exchange: &str, routing_key: &str, body: Vec<u8>) -> usize {
        let mut state = self.inner.state.lock().await;
        let routed = Self::route_locked(&mut state, exchange, routing_key, body);
        drop(state);
        self.inner.arrivals.notify_waiters();
        routed
    }

    /// Envelopes published with `routing_key`, in publish order. Only the
    /// last [`PUBLISHED_LOG_CAPACITY`] publishes on any key are kept.
    pub async fn published(&self, routing_key: &str) -> Vec<EventEnvelope> {
        self.inner
            .state
            .lock()
            .await
            .published
            .iter()
            .filter(|(_, key, _)| key == routing_key)
            .map(|(_, _, envelope)| envelope.clone())
            .collect()
    }

    /// Every envelope published with `routing_key` and the given event type.
    pub async fn published_of_type(&self, routing_key: &str, event_type: &str) -> Vec<EventEnvelope> {
        self.published(routing_key)
            .await
            .into_iter()
            .filter(|e| e.event_type == event_type)
            .collect()
    }

    /// Number of messages waiting in `queue` (not counting in-flight ones).
    pub async fn queue_depth(&self, queue: &str) -> usize {
        self.inner
            .state
            .lock()
            .await
            .queues
            .get(queue)
            .map_or(0, VecDeque::len)
    }

    /// Number of delivered but unsettled messages across all queues.
    pub async fn in_flight_count(&self) -> usize {
        self.inner.state.lock().await.in_flight.len()
    }

    /// Messages dead-lettered from `queue`.
    pub async fn dead_letters(&self, queue: &str) -> Vec<DeadLetter> {
        self.inner
            .state
            .lock()
            .await
            .dead_letters
            .get(queue)
            .cloned()
            .unwrap_or_default()
    }

    fn declare_locked(state: &mut BusState, binding: &QueueBinding) {
        if !state.bindings.contains(binding) {
            state.bindings.push(binding.clone());
        }
        state.queues.entry(binding.queue.clone()).or_default();
    }

    fn route_locked(state: &mut BusState, exchange: &str, routing_key: &str, body: Vec<u8>) -> usize {
        let targets: Vec<String> = state
            .bindings
            .iter()
            .filter(|b| b.accepts(exchange, routing_key))
            .map(|b| b.queue.clone())
            .collect();

        if targets.is_empty() {
            tracing::debug!(exchange, routing_key, "no queue bound, message dropped");
        }

        for queue in &targets {
            state
                .queues
                .entry(queue.clone())
                .or_default()
                .push_back(Message {
                    exchange: exchange.to_string(),
                    routing_key: routing_key.to_string(),
                    body: body.clone(),
                    delivery_count: 0,
                });
        }

        targets.len()
    }

    async fn try_take(&self, queue: &str) -> Result<Option<Delivery>> {
        let mut state = self.inner.state.lock().await;
        let Some(pending) = state.queues.get_mut(queue) else {
            return Err(EventBusError::QueueNotFound(queue.to_string()));
        };
        let Some(mut message) = pending.pop_front() else {
            return Ok(None);
        };

        message.delivery_count += 1;
        state.next_tag += 1;
        let tag = state.next_tag;

        let delivery = Delivery {
            tag: DeliveryTag(tag),
            queue: queue.to_string(),
            exchange: message.exchange.clone(),
            routing_key: message.routing_key.clone(),
            body: message.body.clone(),
            delivery_count: message.delivery_count,
        };
        state.in_flight.insert(tag, (queue.to_string(), message));

        Ok(Some(delivery))
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    async fn declare(&self, binding: &QueueBinding) -> Result<()> {
        let mut state = self.inner.state.lock().await;
        Self::declare_locked(&mut state, binding);
        Ok(())
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        envelope: &EventEnvelope,
    ) -> Result<()> {
        if self.inner.unavailable.load(Ordering::SeqCst) {
            return Err(EventBusError::Unavailable(format!(
                "cannot publish to {exchange}"
            )));
        }

        let body = envelope.to_bytes()?;
        let mut state = self.inner.state.lock().await;
        Self::route_locked(&mut state, exchange, routing_key, body);
        if state.published.len() == PUBLISHED_LOG_CAPACITY {
            state.published.pop_front();
        }
        state.published.push_back((
            exchange.to_string(),
            routing_key.to_string(),
            envelope.clone(),
        ));
        drop(state);

        self.inner.arrivals.notify_waiters();
        Ok(())
    }

    async fn receive(&self, queue: &str, wait: Duration) -> Result<Option<Delivery>> {
        let deadline = Instant::now() + wait;

        loop {
            // Register interest before checking so a publish in between is not missed.
            let arrival = self.inner.arrivals.notified();

            if let Some(delivery) = self.try_take(queue).await? {
                return Ok(Some(delivery));
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() || tokio::time::timeout(remaining, arrival).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn settle(&self, delivery: &Delivery, settlement: Settlement) -> Result<()> {
        let mut state = self.inner.state.lock().await;
        let (queue, message) = state
            .in_flight
            .remove(&delivery.tag.0)
            .ok_or(EventBusError::UnknownDelivery(delivery.tag.0))?;

        match settlement {
            Settlement::Ack => {}
            Settlement::Requeue => {
                state.queues.entry(queue).or_default().push_back(message);
                drop(state);
                self.inner.arrivals.notify_waiters();
            }
            Settlement::DeadLetter { reason } => {
                state
                    .dead_letters
                    .entry(queue.clone())
                    .or_default()
                    .push(DeadLetter {
                        queue,
                        routing_key: message.routing_key,
                        body: message.body,
                        reason,
                        delivery_count: message.delivery_count,
                    });
            }
        }

        Ok(())
    }

    async fn queue_stats(&self, queue: &str) -> Result<QueueStats> {
        let state = self.inner.state.lock().await;
        let ready = state
            .queues
            .get(queue)
            .ok_or_else(|| EventBusError::QueueNotFound(queue.to_string()))?
            .len();
        Ok(QueueStats {
            ready,
            dead_lettered: state.dead_letters.get(queue).map_or(0, Vec::len),
        })
    }
}
