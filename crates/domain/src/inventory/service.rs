use async_trait::async_trait;
use common::{Principal, ProductId, RetryPolicy};
use event_bus::topology::{exchanges, routing_keys};
use event_bus::{EventBus, EventId, EventPublisher};

use super::{
    InventoryChange, InventoryEntry, InventoryLedger, NewProduct, apply_delta, with_optimistic_retry,
};
use crate::error::{DomainError, Result};
use crate::events::{InventoryEvent, InventoryEventData};
use crate::ports::{InventoryGateway, ProductCatalog, ProductSnapshot};

/// Owns stock levels. Every mutation goes through the compare-and-swap
/// helper, so concurrent writers never lose each other's deltas.
pub struct InventoryService<L, B> {
    ledger: L,
    publisher: EventPublisher<B>,
    cas_retry: RetryPolicy,
}

impl<L: InventoryLedger, B: EventBus> InventoryService<L, B> {
    pub fn new(ledger: L, publisher: EventPublisher<B>, cas_retry: RetryPolicy) -> Self {
        Self {
            ledger,
            publisher,
            cas_retry,
        }
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    #[tracing::instrument(skip(self))]
    pub async fn get(&self, product_id: ProductId) -> Result<InventoryEntry> {
        self.ledger
            .get(product_id)
            .await?
            .ok_or_else(|| DomainError::not_found("Product", product_id))
    }

    #[tracing::instrument(skip(self, product), fields(name = %product.name))]
    pub async fn create_product(&self, product: NewProduct) -> Result<InventoryEntry> {
        if product.name.trim().is_empty() {
            return Err(DomainError::Validation("name must not be empty".to_string()));
        }
        if product.price.cents() < 0 || product.quantity < 0 || product.reorder_level < 0 {
            return Err(DomainError::Validation(
                "price, quantity and reorderLevel must not be negative".to_string(),
            ));
        }
        let entry = self.ledger.insert(product).await?;
        tracing::info!(product_id = %entry.product_id, "product created");
        Ok(entry)
    }

    /// Applies a signed delta, clamped at zero, without publishing.
    #[tracing::instrument(skip(self))]
    pub async fn apply_delta(&self, product_id: ProductId, delta: i64) -> Result<InventoryChange> {
        let change = with_optimistic_retry(&self.cas_retry, "Product", || {
            self.write_conditionally(product_id, |current| apply_delta(current, delta))
        })
        .await?;

        metrics::counter!("inventory_deltas_applied_total").increment(1);
        tracing::info!(
            %product_id,
            requested = delta,
            previous = change.previous_quantity,
            new = change.new_quantity,
            "inventory delta applied"
        );
        Ok(change)
    }

    /// Sets an absolute stock level, without publishing.
    #[tracing::instrument(skip(self))]
    pub async fn set_quantity(&self, product_id: ProductId, quantity: i64) -> Result<InventoryChange> {
        if quantity < 0 {
            return Err(DomainError::Validation(
                "quantity must not be negative".to_string(),
            ));
        }
        with_optimistic_retry(&self.cas_retry, "Product", || {
            self.write_conditionally(product_id, |_| quantity)
        })
        .await
    }

    /// Applies a delta and publishes the resulting inventory events.
    pub async fn adjust(&self, product_id: ProductId, delta: i64) -> Result<InventoryChange> {
        let change = self.apply_delta(product_id, delta).await?;
        self.announce(&change).await;
        Ok(change)
    }

    /// Sets a stock level and publishes the resulting inventory events.
    pub async fn restock(&self, product_id: ProductId, quantity: i64) -> Result<InventoryChange> {
        let change = self.set_quantity(product_id, quantity).await?;
        self.announce(&change).await;
        Ok(change)
    }

    /// The stock change is committed; a publish failure is logged, not surfaced.
    async fn announce(&self, change: &InventoryChange) {
        if let Err(e) = self
            .publish_changes(std::slice::from_ref(change), None)
            .await
        {
            tracing::error!(
                product_id = %change.product_id,
                error = %e,
                "inventory events not published"
            );
        }
    }

    /// One read-modify-write attempt.
    async fn write_conditionally(
        &self,
        product_id: ProductId,
        next_quantity: impl Fn(i64) -> i64,
    ) -> Result<InventoryChange> {
        let entry = self.get(product_id).await?;
        let new_quantity = next_quantity(entry.quantity);

        if new_quantity != entry.quantity
            && self
                .ledger
                .compare_and_set(product_id, entry.version, new_quantity)
                .await?
                .is_none()
        {
            return Err(DomainError::concurrent_modification(
                "Product",
                product_id,
                format!("version {}", entry.version),
            ));
        }

        Ok(InventoryChange {
            product_id,
            previous_quantity: entry.quantity,
            new_quantity,
            reorder_level: entry.reorder_level,
        })
    }

    /// Emits one `INVENTORY_CHANGED` covering every change and, when any
    /// product fell to or below its reorder level, one `LOW_STOCK_ALERT`
    /// covering just those.
    pub async fn publish_changes(
        &self,
        changes: &[InventoryChange],
        source_event_id: Option<EventId>,
    ) -> Result<()> {
        if changes.is_empty() {
            return Ok(());
        }

        let summary = InventoryEventData {
            source_event_id,
            changes: changes.iter().map(InventoryChange::to_record).collect(),
        };
        self.publisher
            .publish(
                exchanges::PRODUCT,
                &[routing_keys::PRODUCT_INVENTORY],
                &InventoryEvent::InventoryChanged(summary),
            )
            .await?;

        let low: Vec<_> = changes
            .iter()
            .filter(|change| change.low_stock_alert_due())
            .map(InventoryChange::to_record)
            .collect();
        if low.is_empty() {
            return Ok(());
        }

        for record in &low {
            tracing::warn!(
                product_id = %record.product_id,
                quantity = record.new_quantity,
                reorder_level = record.reorder_level,
                "product fell to its reorder level"
            );
        }
        metrics::counter!("low_stock_alerts_total").increment(low.len() as u64);
        self.publisher
            .publish(
                exchanges::PRODUCT,
                &[routing_keys::PRODUCT_INVENTORY],
                &InventoryEvent::LowStockAlert(InventoryEventData {
                    source_event_id,
                    changes: low,
                }),
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl<L: InventoryLedger, B: EventBus> ProductCatalog for InventoryService<L, B> {
    async fn product(
        &self,
        product_id: ProductId,
        _principal: &Principal,
    ) -> Result<ProductSnapshot> {
        Ok(self.get(product_id).await?.snapshot())
    }
}

#[async_trait]
impl<L: InventoryLedger, B: EventBus> InventoryGateway for InventoryService<L, B> {
    async fn adjust(
        &self,
        product_id: ProductId,
        delta: i64,
        _principal: &Principal,
    ) -> Result<InventoryChange> {
        InventoryService::adjust(self, product_id, delta).await
    }
}
