use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{InvoiceId, InvoiceItemId, Money, UserId};
use tokio::sync::RwLock;

use super::{Invoice, InvoiceItem, InvoiceStatus, NewInvoice};
use crate::error::Result;

/// Persistence for invoices and their items.
#[async_trait]
pub trait InvoiceStore: Send + Sync {
    /// Stores the invoice and all of its items atomically.
    async fn insert(&self, invoice: NewInvoice) -> Result<Invoice>;

    async fn get(&self, invoice_id: InvoiceId) -> Result<Option<Invoice>>;

    /// Invoices of one user, newest first.
    async fn list_by_user(&self, user_id: UserId) -> Result<Vec<Invoice>>;

    /// Moves the invoice to `status` only if it is still in `expected`.
    ///
    /// Returns `false` when the invoice is missing or another writer moved it
    /// first. A `transaction_id` of `None` keeps the stored one.
    async fn compare_and_set_status(
        &self,
        invoice_id: InvoiceId,
        expected: InvoiceStatus,
        status: InvoiceStatus,
        transaction_id: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<bool>;

    /// Replaces an item's quantity and price, recomputing its subtotal and
    /// the invoice total. Returns `None` when the item is not on the invoice.
    async fn update_item(
        &self,
        invoice_id: InvoiceId,
        item_id: InvoiceItemId,
        quantity: u32,
        price: Money,
    ) -> Result<Option<Invoice>>;

    /// Returns `false` when there was nothing to delete.
    async fn delete(&self, invoice_id: InvoiceId) -> Result<bool>;
}

#[async_trait]
impl<T: InvoiceStore + ?Sized> InvoiceStore for Arc<T> {
    async fn insert(&self, invoice: NewInvoice) -> Result<Invoice> {
        (**self).insert(invoice).await
    }

    async fn get(&self, invoice_id: InvoiceId) -> Result<Option<Invoice>> {
        (**self).get(invoice_id).await
    }

    async fn list_by_user(&self, user_id: UserId) -> Result<Vec<Invoice>> {
        (**self).list_by_user(user_id).await
    }

    async fn compare_and_set_status(
        &self,
        invoice_id: InvoiceId,
        expected: InvoiceStatus,
        status: InvoiceStatus,
        transaction_id: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        (**self)
            .compare_and_set_status(invoice_id, expected, status, transaction_id, at)
            .await
    }

    async fn update_item(
        &self,
        invoice_id: InvoiceId,
        item_id: InvoiceItemId,
        quantity: u32,
        price: Money,
    ) -> Result<Option<Invoice>> {
        (**self)
            .update_item(invoice_id, item_id, quantity, price)
            .await
    }

    async fn delete(&self, invoice_id: InvoiceId) -> Result<bool> {
        (**self).delete(invoice_id).await
    }
}

#[derive(Debug, Default)]
struct InvoiceTable {
    next_invoice_id: i64,
    next_item_id: i64,
    rows: BTreeMap<InvoiceId, Invoice>,
}

/// In-memory invoice store for tests and single-process deployments.
#[derive(Debug, Clone, Default)]
pub struct InMemoryInvoiceStore {
    table: Arc<RwLock<InvoiceTable>>,
}

impl InMemoryInvoiceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.table.read().await.rows.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl InvoiceStore for InMemoryInvoiceStore {
    async fn insert(&self, invoice: NewInvoice) -> Result<Invoice> {
        let mut table = self.table.write().await;
        table.next_invoice_id += 1;
        let id = InvoiceId::new(table.next_invoice_id);

        let mut items = Vec::with_capacity(invoice.items.len());
        for item in &invoice.items {
            table.next_item_id += 1;
            items.push(InvoiceItem {
                id: InvoiceItemId::new(table.next_item_id),
                product_id: item.product_id,
                product_name: item.product_name.clone(),
                quantity: item.quantity,
                price: item.price,
                subtotal: item.subtotal(),
            });
        }

        let now = Utc::now();
        let stored = Invoice {
            id,
            user_id: invoice.user_id,
            ship_address: invoice.ship_address,
            status: InvoiceStatus::Pending,
            transaction_id: None,
            total_amount: invoice.total_amount,
            customer_email: invoice.customer_email,
            customer_name: invoice.customer_name,
            order_date: now,
            status_updated_at: now,
            items,
        };
        table.rows.insert(id, stored.clone());
        Ok(stored)
    }

    async fn get(&self, invoice_id: InvoiceId) -> Result<Option<Invoice>> {
        Ok(self.table.read().await.rows.get(&invoice_id).cloned())
    }

    async fn list_by_user(&self, user_id: UserId) -> Result<Vec<Invoice>> {
        let table = self.table.read().await;
        Ok(table
            .rows
            .values()
            .rev()
            .filter(|invoice| invoice.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn compare_and_set_status(
        &self,
        invoice_id: InvoiceId,
        expected: InvoiceStatus,
        status: InvoiceStatus,
        transaction_id: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut table = self.table.write().await;
        match table.rows.get_mut(&invoice_id) {
            Some(invoice) if invoice.status == expected => {
                invoice.status = status;
                if let Some(txn) = transaction_id {
                    invoice.transaction_id = Some(txn.to_string());
                }
                invoice.status_updated_at = at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn update_item(
        &self,
        invoice_id: InvoiceId,
        item_id: InvoiceItemId,
        quantity: u32,
        price: Money,
    ) -> Result<Option<Invoice>> {
        let mut table = self.table.write().await;
        let Some(invoice) = table.rows.get_mut(&invoice_id) else {
            return Ok(None);
        };
        let Some(item) = invoice.items.iter_mut().find(|item| item.id == item_id) else {
            return Ok(None);
        };

        item.quantity = quantity;
        item.price = price;
        item.subtotal = price.multiply(quantity);
        invoice.total_amount = invoice.items_total();
        Ok(Some(invoice.clone()))
    }

    async fn delete(&self, invoice_id: InvoiceId) -> Result<bool> {
        Ok(self.table.write().await.rows.remove(&invoice_id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invoice::NewInvoiceItem;
    use common::ProductId;

    fn new_invoice(user: i64) -> NewInvoice {
        NewInvoice {
            user_id: UserId::new(user),
            ship_address: "12 Le Loi".to_string(),
            total_amount: Money::from_cents(5_000),
            customer_email: None,
            customer_name: None,
            items: vec![NewInvoiceItem {
                product_id: ProductId::new(1),
                product_name: Some("Runner".to_string()),
                quantity: 2,
                price: Money::from_cents(2_500),
            }],
        }
    }

    #[tokio::test]
    async fn insert_assigns_ids_and_starts_pending() {
        let store = InMemoryInvoiceStore::new();
        let invoice = store.insert(new_invoice(1)).await.unwrap();

        assert_eq!(invoice.id, InvoiceId::new(1));
        assert_eq!(invoice.status, InvoiceStatus::Pending);
        assert_eq!(invoice.items[0].subtotal, Money::from_cents(5_000));
        assert_eq!(store.get(invoice.id).await.unwrap(), Some(invoice));
    }

    #[tokio::test]
    async fn compare_and_set_requires_expected_status() {
        let store = InMemoryInvoiceStore::new();
        let invoice = store.insert(new_invoice(1)).await.unwrap();
        let now = Utc::now();

        assert!(
            store
                .compare_and_set_status(
                    invoice.id,
                    InvoiceStatus::Pending,
                    InvoiceStatus::Paid,
                    Some("T1"),
                    now
                )
                .await
                .unwrap()
        );
        assert!(
            !store
                .compare_and_set_status(
                    invoice.id,
                    InvoiceStatus::Pending,
                    InvoiceStatus::PaymentFailed,
                    None,
                    now
                )
                .await
                .unwrap()
        );

        let stored = store.get(invoice.id).await.unwrap().unwrap();
        assert_eq!(stored.status, InvoiceStatus::Paid);
        assert_eq!(stored.transaction_id.as_deref(), Some("T1"));
    }

    #[tokio::test]
    async fn update_item_recomputes_totals() {
        let store = InMemoryInvoiceStore::new();
        let invoice = store.insert(new_invoice(1)).await.unwrap();
        let item_id = invoice.items[0].id;

        let updated = store
            .update_item(invoice.id, item_id, 3, Money::from_cents(1_000))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(updated.items[0].subtotal, Money::from_cents(3_000));
        assert_eq!(updated.total_amount, Money::from_cents(3_000));
        assert!(
            store
                .update_item(invoice.id, InvoiceItemId::new(99), 1, Money::zero())
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn list_by_user_is_newest_first() {
        let store = InMemoryInvoiceStore::new();
        let first = store.insert(new_invoice(7)).await.unwrap();
        store.insert(new_invoice(8)).await.unwrap();
        let second = store.insert(new_invoice(7)).await.unwrap();

        let ids: Vec<_> = store
            .list_by_user(UserId::new(7))
            .await
            .unwrap()
            .into_iter()
            .map(|i| i.id)
            .collect();
        assert_eq!(ids, vec![second.id, first.id]);
    }
}
