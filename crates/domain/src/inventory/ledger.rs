use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{ProductId, Version};
use tokio::sync::RwLock;

use super::{InventoryEntry, NewProduct};
use crate::error::Result;

/// Storage for stock levels. Every write is conditional on the version
/// that was read.
#[async_trait]
pub trait InventoryLedger: Send + Sync {
    async fn get(&self, product_id: ProductId) -> Result<Option<InventoryEntry>>;

    /// Writes `quantity` only if the entry is still at `expected`.
    ///
    /// Returns the new version, or `None` if another writer got there first
    /// or the product does not exist.
    async fn compare_and_set(
        &self,
        product_id: ProductId,
        expected: Version,
        quantity: i64,
    ) -> Result<Option<Version>>;

    async fn insert(&self, product: NewProduct) -> Result<InventoryEntry>;
}

#[async_trait]
impl<T: InventoryLedger + ?Sized> InventoryLedger for Arc<T> {
    async fn get(&self, product_id: ProductId) -> Result<Option<InventoryEntry>> {
        (**self).get(product_id).await
    }

    async fn compare_and_set(
        &self,
        product_id: ProductId,
        expected: Version,
        quantity: i64,
    ) -> Result<Option<Version>> {
        (**self).compare_and_set(product_id, expected, quantity).await
    }

    async fn insert(&self, product: NewProduct) -> Result<InventoryEntry> {
        (**self).insert(product).await
    }
}

/// In-memory ledger for tests and single-process deployments.
#[derive(Debug, Clone, Default)]
pub struct InMemoryInventoryLedger {
    entries: Arc<RwLock<BTreeMap<ProductId, InventoryEntry>>>,
}

impl InMemoryInventoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds an entry with a fixed id, replacing any existing one.
    pub async fn seed(&self, product_id: ProductId, product: NewProduct) -> InventoryEntry {
        let entry = InventoryEntry {
            product_id,
            name: product.name,
            price: product.price,
            quantity: product.quantity,
            reorder_level: product.reorder_level,
            version: Version::initial(),
        };
        self.entries.write().await.insert(product_id, entry.clone());
        entry
    }
}

#[async_trait]
impl InventoryLedger for InMemoryInventoryLedger {
    async fn get(&self, product_id: ProductId) -> Result<Option<InventoryEntry>> {
        Ok(self.entries.read().await.get(&product_id).cloned())
    }

    async fn compare_and_set(
        &self,
        product_id: ProductId,
        expected: Version,
        quantity: i64,
    ) -> Result<Option<Version>> {
        let mut entries = self.entries.write().await;
        match entries.get_mut(&product_id) {
            Some(entry) if entry.version == expected => {
                entry.quantity = quantity;
                entry.version = entry.version.next();
                Ok(Some(entry.version))
            }
            _ => Ok(None),
        }
    }

    async fn insert(&self, product: NewProduct) -> Result<InventoryEntry> {
        let mut entries = self.entries.write().await;
        let next_id = entries
            .keys()
            .next_back()
            .map_or(1, |id| id.as_i64() + 1);
        let entry = InventoryEntry {
            product_id: ProductId::new(next_id),
            name: product.name,
            price: product.price,
            quantity: product.quantity,
            reorder_level: product.reorder_level,
            version: Version::initial(),
        };
        entries.insert(entry.product_id, entry.clone());
        Ok(entry)
    }
}
