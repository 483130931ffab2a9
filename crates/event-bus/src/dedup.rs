//! Consumer-side deduplication.
//!
//! Delivery is at-least-once and competing consumers may see the same event
//! concurrently, so a consumer whose effect is not naturally idempotent
//! claims a key (usually the event id, possibly suffixed with a sub-key)
//! before applying the effect. Exactly one claimant wins. If applying fails
//! in a way that should be retried, the claim is released so that the
//! redelivery can win it again.
//!
//! A claim can also carry pending work: something the winner still owes
//! after its effect was applied, such as announcing it. A redelivery that
//! loses the claim finds the pending work and finishes it.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::Result;

#[async_trait]
pub trait ProcessedEvents: Send + Sync {
    /// Records `key` for `consumer`. Returns false if it was already recorded.
    async fn try_claim(&self, consumer: &str, key: &str) -> Result<bool>;

    /// Forgets a claim so that the key can be processed again.
    async fn release(&self, consumer: &str, key: &str) -> Result<()>;

    /// Returns true if `key` has been claimed by `consumer`.
    async fn is_processed(&self, consumer: &str, key: &str) -> Result<bool>;

    /// Attaches pending work to an existing claim, or clears it with `None`.
    async fn set_pending(&self, consumer: &str, key: &str, pending: Option<Value>) -> Result<()>;

    /// Pending work attached to a claim, if any.
    async fn pending(&self, consumer: &str, key: &str) -> Result<Option<Value>>;
}

#[async_trait]
impl<T: ProcessedEvents + ?Sized> ProcessedEvents for Arc<T> {
    async fn try_claim(&self, consumer: &str, key: &str) -> Result<bool> {
        (**self).try_claim(consumer, key).await
    }

    async fn release(&self, consumer: &str, key: &str) -> Result<()> {
        (**self).release(consumer, key).await
    }

    async fn is_processed(&self, consumer: &str, key: &str) -> Result<bool> {
        (**self).is_processed(consumer, key).await
    }

    async fn set_pending(&self, consumer: &str, key: &str, pending: Option<Value>) -> Result<()> {
        (**self).set_pending(consumer, key, pending).await
    }

    async fn pending(&self, consumer: &str, key: &str) -> Result<Option<Value>> {
        (**self).pending(consumer, key).await
    }
}

/// In-memory processed-event store for tests and single-process deployments.
#[derive(Debug, Clone, Default)]
pub struct InMemoryProcessedEvents {
    claims: Arc<RwLock<HashMap<(String, String), Option<Value>>>>,
}

impl InMemoryProcessedEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.claims.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.claims.read().await.is_empty()
    }
}

#[async_trait]
impl ProcessedEvents for InMemoryProcessedEvents {
    async fn try_claim(&self, consumer: &str, key: &str) -> Result<bool> {
        let mut claims = self.claims.write().await;
        let claim = (consumer.to_string(), key.to_string());
        if claims.contains_key(&claim) {
            return Ok(false);
        }
        claims.insert(claim, None);
        Ok(true)
    }

    async fn release(&self, consumer: &str, key: &str) -> Result<()> {
        self.claims
            .write()
            .await
            .remove(&(consumer.to_string(), key.to_string()));
        Ok(())
    }

    async fn is_processed(&self, consumer: &str, key: &str) -> Result<bool> {
        Ok(self
            .claims
            .read()
            .await
            .contains_key(&(consumer.to_string(), key.to_string())))
    }

    async fn set_pending(&self, consumer: &str, key: &str, pending: Option<Value>) -> Result<()> {
        if let Some(slot) = self
            .claims
            .write()
            .await
            .get_mut(&(consumer.to_string(), key.to_string()))
        {
            *slot = pending;
        }
        Ok(())
    }

    async fn pending(&self, consumer: &str, key: &str) -> Result<Option<Value>> {
        Ok(self
            .claims
            .read()
            .await
            .get(&(consumer.to_string(), key.to_string()))
            .cloned()
            .flatten())
    }
}
