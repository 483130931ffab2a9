//! The handler trait queue workers dispatch to.

use std::sync::Arc;

use async_trait::async_trait;
use event_bus::{DecodeError, EventContract, EventEnvelope};

use crate::error::{HandlerError, Result};

/// Processes one event from a queue.
///
/// Delivery is at-least-once, so `handle` must tolerate seeing the same
/// envelope again, possibly concurrently on another worker.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Name used in logs and as the deduplication scope.
    fn name(&self) -> &'static str;

    async fn handle(&self, envelope: &EventEnvelope) -> Result<()>;
}

#[async_trait]
impl<T: EventHandler + ?Sized> EventHandler for Arc<T> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    async fn handle(&self, envelope: &EventEnvelope) -> Result<()> {
        (**self).handle(envelope).await
    }
}

/// Decodes `envelope` into a family the handler understands.
///
/// An event type from another family yields `None` after a warning; a
/// payload that breaks its family's contract is [`HandlerError::Malformed`].
pub(crate) fn decode<E: EventContract>(
    handler: &'static str,
    envelope: &EventEnvelope,
) -> Result<Option<E>> {
    match envelope.decode::<E>() {
        Ok(event) => Ok(Some(event)),
        Err(DecodeError::UnknownType(event_type)) => {
            tracing::warn!(
                handler,
                %event_type,
                event_id = %envelope.event_id,
                "unknown event type dropped"
            );
            Ok(None)
        }
        Err(e @ DecodeError::Malformed { .. }) => Err(HandlerError::Malformed(e.to_string())),
    }
}
