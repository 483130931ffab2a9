//! Inventory reconciler: applies order events to stock.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::ProductId;
use domain::events::OrderEvent;
use domain::{ErrorKind, InventoryChange, InventoryLedger, InventoryService};
use event_bus::{EventBus, EventEnvelope, ProcessedEvents};

use crate::error::{HandlerError, Result};
use crate::handler::{EventHandler, decode};

/// Deduplication scope of the reconciler's claims.
pub const CONSUMER: &str = "inventory-reconciler";

/// Net stock delta per product of an order event.
///
/// A product may appear on several lines; its quantities are summed. Orders
/// take stock and cancellations return it.
pub fn net_deltas(event: &OrderEvent) -> BTreeMap<ProductId, i64> {
    let sign = event.sign();
    let mut net = BTreeMap::new();
    for (product_id, quantity) in event.data().effective_lines() {
        let entry: &mut i64 = net.entry(product_id).or_default();
        *entry = entry.saturating_add(sign * quantity);
    }
    net
}

/// Consumes `product.order` and applies each product's net delta through the
/// compare-and-swap helper.
///
/// Each (event, product) pair is claimed before it is applied, so a replayed
/// or concurrently delivered event never moves stock twice. Products fail in
/// isolation: a product whose delta cannot be applied does not hold back the
/// others. Its claim is released so that a redelivery can try again.
///
/// An applied change is kept on its claim until its inventory events are
/// out. If publishing fails the message is requeued, and the redelivery
/// announces the kept changes without touching stock again.
pub struct InventoryReconciler<L, B, P> {
    inventory: Arc<InventoryService<L, B>>,
    processed: P,
}

impl<L, B, P> InventoryReconciler<L, B, P>
where
    L: InventoryLedger,
    B: EventBus,
    P: ProcessedEvents,
{
    pub fn new(inventory: Arc<InventoryService<L, B>>, processed: P) -> Self {
        Self {
            inventory,
            processed,
        }
    }

    async fn release(&self, key: &str) {
        if let Err(e) = self.processed.release(CONSUMER, key).await {
            tracing::error!(key, error = %e, "claim not released");
        }
    }

    /// A change applied by an earlier delivery whose events never went out.
    async fn unannounced(&self, key: &str) -> Result<Option<InventoryChange>> {
        let Some(pending) = self.processed.pending(CONSUMER, key).await? else {
            return Ok(None);
        };
        match serde_json::from_value(pending) {
            Ok(change) => Ok(Some(change)),
            Err(e) => {
                tracing::error!(key, error = %e, "unreadable pending inventory change dropped");
                Ok(None)
            }
        }
    }

    async fn keep_until_announced(&self, key: &str, change: &InventoryChange) {
        let pending = match serde_json::to_value(change) {
            Ok(value) => value,
            Err(e) => {
                tracing::error!(key, error = %e, "inventory change not kept");
                return;
            }
        };
        if let Err(e) = self.processed.set_pending(CONSUMER, key, Some(pending)).await {
            tracing::warn!(key, error = %e, "inventory change not kept for redelivery");
        }
    }
}

#[async_trait]
impl<L, B, P> EventHandler for InventoryReconciler<L, B, P>
where
    L: InventoryLedger,
    B: EventBus,
    P: ProcessedEvents,
{
    fn name(&self) -> &'static str {
        CONSUMER
    }

    #[tracing::instrument(skip(self, envelope), fields(event_id = %envelope.event_id, event_type = %envelope.event_type))]
    async fn handle(&self, envelope: &EventEnvelope) -> Result<()> {
        let Some(event) = decode::<OrderEvent>(CONSUMER, envelope)? else {
            return Ok(());
        };

        let deltas = net_deltas(&event);
        if deltas.is_empty() {
            tracing::info!("order event carries no inventory effect");
            return Ok(());
        }

        let mut changes = Vec::with_capacity(deltas.len());
        let mut claimed = Vec::with_capacity(deltas.len());
        let mut transient = Vec::new();

        for (product_id, delta) in deltas {
            let key = format!("{}:{product_id}", envelope.event_id);
            if !self.processed.try_claim(CONSUMER, &key).await? {
                match self.unannounced(&key).await? {
                    Some(change) => {
                        tracing::info!(%product_id, "announcing change applied by an earlier delivery");
                        changes.push(change);
                        claimed.push(key);
                    }
                    None => tracing::debug!(%product_id, "delta already applied"),
                }
                continue;
            }

            match self.inventory.apply_delta(product_id, delta).await {
                Ok(change) => {
                    self.keep_until_announced(&key, &change).await;
                    changes.push(change);
                    claimed.push(key);
                }
                Err(e) => {
                    metrics::counter!("inventory_delta_failures_total").increment(1);
                    self.release(&key).await;
                    if e.kind() == ErrorKind::TransientDependency {
                        tracing::warn!(%product_id, delta, error = %e, "inventory delta deferred");
                        transient.push(product_id);
                    } else {
                        tracing::error!(%product_id, delta, error = %e, "inventory delta not applied");
                    }
                }
            }
        }

        if let Err(e) = self
            .inventory
            .publish_changes(&changes, Some(envelope.event_id))
            .await
        {
            tracing::error!(error = %e, changes = changes.len(), "inventory events not published");
            return Err(HandlerError::Transient(format!(
                "inventory events not published: {e}"
            )));
        }
        for key in &claimed {
            if let Err(e) = self.processed.set_pending(CONSUMER, key, None).await {
                tracing::warn!(key, error = %e, "announced change still marked pending");
            }
        }

        if transient.is_empty() {
            Ok(())
        } else {
            Err(HandlerError::Transient(format!(
                "{} product(s) could not be reached",
                transient.len()
            )))
        }
    }
}
