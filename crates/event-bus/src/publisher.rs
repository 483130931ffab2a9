use common::{RetryPolicy, retry_if};

use crate::{EventBus, EventBusError, EventContract, EventEnvelope, Result};

/// Publishes typed events, retrying transient broker failures.
///
/// One envelope is built per event and the same envelope, with the same
/// event id, goes to every routing key, so consumers on different queues
/// can correlate and deduplicate copies of one fact.
#[derive(Debug, Clone)]
pub struct EventPublisher<B> {
    bus: B,
    retry: RetryPolicy,
}

impl<B: EventBus> EventPublisher<B> {
    pub fn new(bus: B, retry: RetryPolicy) -> Self {
        Self { bus, retry }
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    /// Wraps `event` and publishes it to `exchange` under each routing key.
    #[tracing::instrument(skip(self, event), fields(event_type = event.event_type()))]
    pub async fn publish<E: EventContract>(
        &self,
        exchange: &str,
        routing_keys: &[&str],
        event: &E,
    ) -> Result<EventEnvelope> {
        let envelope = EventEnvelope::wrap(event)?;
        self.publish_envelope(exchange, routing_keys, &envelope)
            .await?;
        Ok(envelope)
    }

    /// Publishes an already built envelope under each routing key.
    pub async fn publish_envelope(
        &self,
        exchange: &str,
        routing_keys: &[&str],
        envelope: &EventEnvelope,
    ) -> Result<()> {
        for routing_key in routing_keys {
            retry_if(
                &self.retry,
                || self.bus.publish(exchange, routing_key, envelope),
                EventBusError::is_transient,
            )
            .await
            .inspect_err(|e| {
                tracing::error!(
                    exchange,
                    routing_key,
                    event_id = %envelope.event_id,
                    error = %e,
                    "event publication failed"
                );
            })?;

            metrics::counter!("events_published_total", "exchange" => exchange.to_string())
                .increment(1);
            tracing::debug!(
                exchange,
                routing_key,
                event_id = %envelope.event_id,
                event_type = %envelope.event_type,
                "event published"
            );
        }
        Ok(())
    }
}
