//! Receive loop for one durable queue.

use std::time::Duration;

use event_bus::{Delivery, EventBus, EventEnvelope, Result, Settlement};
use tokio::sync::watch;

use crate::error::HandlerError;
use crate::handler::EventHandler;

/// Deliveries of one message before a transient failure is given up on.
pub const DEFAULT_MAX_DELIVERIES: u32 = 5;

/// Feeds one queue to one handler and settles every delivery.
///
/// Several workers may poll the same queue; the bus hands each message to
/// one of them at a time.
pub struct QueueWorker<B, H> {
    bus: B,
    queue: String,
    handler: H,
    max_deliveries: u32,
    poll_interval: Duration,
    requeue_delay: Duration,
}

impl<B: EventBus, H: EventHandler> QueueWorker<B, H> {
    pub fn new(bus: B, queue: impl Into<String>, handler: H) -> Self {
        Self {
            bus,
            queue: queue.into(),
            handler,
            max_deliveries: DEFAULT_MAX_DELIVERIES,
            poll_interval: Duration::from_secs(1),
            requeue_delay: Duration::from_millis(100),
        }
    }

    /// Caps redeliveries of a transiently failing message; the last one is
    /// dead-lettered.
    pub fn with_max_deliveries(mut self, max_deliveries: u32) -> Self {
        self.max_deliveries = max_deliveries.max(1);
        self
    }

    /// How long one receive waits for a message.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Pause before a failed message goes back to the queue.
    pub fn with_requeue_delay(mut self, delay: Duration) -> Self {
        self.requeue_delay = delay;
        self
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Waits up to the poll interval for one message and settles it.
    /// Returns `None` when nothing arrived.
    pub async fn process_next(&self) -> Result<Option<Settlement>> {
        self.process(self.poll_interval).await
    }

    /// Settles messages until the queue is empty, including redeliveries of
    /// requeued ones. Returns how many deliveries were settled.
    pub async fn drain(&self) -> Result<usize> {
        let mut settled = 0;
        while self.process(Duration::ZERO).await?.is_some() {
            settled += 1;
        }
        Ok(settled)
    }

    /// Runs until `shutdown` turns true. A message being handled when the
    /// signal arrives is settled before the loop exits.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(queue = %self.queue, handler = self.handler.name(), "consumer started");

        loop {
            let stopping = *shutdown.borrow_and_update();
            if stopping {
                break;
            }
            if let Err(e) = self.process_next().await {
                tracing::error!(queue = %self.queue, error = %e, "receive failed");
                tokio::select! {
                    _ = tokio::time::sleep(self.poll_interval) => {}
                    _ = shutdown.changed() => {}
                }
            }
        }

        tracing::info!(queue = %self.queue, handler = self.handler.name(), "consumer stopped");
    }

    async fn process(&self, wait: Duration) -> Result<Option<Settlement>> {
        let Some(delivery) = self.bus.receive(&self.queue, wait).await? else {
            return Ok(None);
        };

        let settlement = self.settlement_for(&delivery).await;
        if settlement == Settlement::Requeue && !self.requeue_delay.is_zero() {
            tokio::time::sleep(self.requeue_delay).await;
        }
        self.bus.settle(&delivery, settlement.clone()).await?;

        metrics::counter!(
            "consumer_messages_total",
            "queue" => self.queue.clone(),
            "outcome" => outcome(&settlement)
        )
        .increment(1);
        Ok(Some(settlement))
    }

    #[tracing::instrument(skip(self, delivery), fields(queue = %self.queue, delivery_count = delivery.delivery_count))]
    async fn settlement_for(&self, delivery: &Delivery) -> Settlement {
        let envelope = match EventEnvelope::from_slice(&delivery.body) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::error!(error = %e, "unparseable message dead-lettered");
                return Settlement::DeadLetter {
                    reason: format!("malformed envelope: {e}"),
                };
            }
        };

        match self.handler.handle(&envelope).await {
            Ok(()) => Settlement::Ack,
            Err(HandlerError::Malformed(reason)) => {
                tracing::error!(
                    event_id = %envelope.event_id,
                    event_type = %envelope.event_type,
                    %reason,
                    "malformed event dead-lettered"
                );
                Settlement::DeadLetter { reason }
            }
            Err(HandlerError::Permanent(reason)) => {
                tracing::error!(
                    event_id = %envelope.event_id,
                    event_type = %envelope.event_type,
                    %reason,
                    "event dropped after permanent failure"
                );
                Settlement::Ack
            }
            Err(HandlerError::Transient(reason))
                if delivery.delivery_count >= self.max_deliveries =>
            {
                tracing::error!(
                    event_id = %envelope.event_id,
                    event_type = %envelope.event_type,
                    %reason,
                    "delivery cap reached, event dead-lettered"
                );
                Settlement::DeadLetter {
                    reason: format!(
                        "gave up after {} deliveries: {reason}",
                        delivery.delivery_count
                    ),
                }
            }
            Err(HandlerError::Transient(reason)) => {
                tracing::warn!(
                    event_id = %envelope.event_id,
                    event_type = %envelope.event_type,
                    %reason,
                    "transient failure, event requeued"
                );
                Settlement::Requeue
            }
        }
    }
}

fn outcome(settlement: &Settlement) -> &'static str {
    match settlement {
        Settlement::Ack => "ack",
        Settlement::Requeue => "requeue",
        Settlement::DeadLetter { .. } => "dead_letter",
    }
}
