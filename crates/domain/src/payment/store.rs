use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use common::{InvoiceId, PaymentTransactionId};
use tokio::sync::RwLock;

use super::{NewPaymentTransaction, PaymentCompletion, PaymentStatus, PaymentTransaction};
use crate::error::{DomainError, Result};

#[async_trait]
pub trait PaymentStore: Send + Sync {
    /// Fails with [`DomainError::Conflict`] when the provider reference is
    /// already taken.
    async fn insert(&self, transaction: NewPaymentTransaction) -> Result<PaymentTransaction>;

    async fn find_by_ref(&self, provider_txn_ref: &str) -> Result<Option<PaymentTransaction>>;

    /// The most recently updated transaction of an invoice; ties go to the
    /// newest row.
    async fn latest_for_invoice(&self, invoice_id: InvoiceId)
    -> Result<Option<PaymentTransaction>>;

    /// Settles a transaction if it is still in `expected`.
    ///
    /// Returns `None` when another caller settled it first, so exactly one
    /// caller observes the transition.
    async fn complete(
        &self,
        provider_txn_ref: &str,
        expected: PaymentStatus,
        status: PaymentStatus,
        completion: PaymentCompletion,
    ) -> Result<Option<PaymentTransaction>>;

    /// Records that the settlement event went out. Returns `false` when the
    /// reference is unknown.
    async fn mark_settlement_published(&self, provider_txn_ref: &str) -> Result<bool>;
}

#[async_trait]
impl<T: PaymentStore + ?Sized> PaymentStore for Arc<T> {
    async fn insert(&self, transaction: NewPaymentTransaction) -> Result<PaymentTransaction> {
        (**self).insert(transaction).await
    }

    async fn find_by_ref(&self, provider_txn_ref: &str) -> Result<Option<PaymentTransaction>> {
        (**self).find_by_ref(provider_txn_ref).await
    }

    async fn latest_for_invoice(
        &self,
        invoice_id: InvoiceId,
    ) -> Result<Option<PaymentTransaction>> {
        (**self).latest_for_invoice(invoice_id).await
    }

    async fn complete(
        &self,
        provider_txn_ref: &str,
        expected: PaymentStatus,
        status: PaymentStatus,
        completion: PaymentCompletion,
    ) -> Result<Option<PaymentTransaction>> {
        (**self)
            .complete(provider_txn_ref, expected, status, completion)
            .await
    }

    async fn mark_settlement_published(&self, provider_txn_ref: &str) -> Result<bool> {
        (**self).mark_settlement_published(provider_txn_ref).await
    }
}

/// In-memory payment store for tests and single-process deployments.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPaymentStore {
    rows: Arc<RwLock<BTreeMap<PaymentTransactionId, PaymentTransaction>>>,
}

impl InMemoryPaymentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl PaymentStore for InMemoryPaymentStore {
    async fn insert(&self, transaction: NewPaymentTransaction) -> Result<PaymentTransaction> {
        let mut rows = self.rows.write().await;
        if rows
            .values()
            .any(|row| row.provider_txn_ref == transaction.provider_txn_ref)
        {
            return Err(DomainError::Conflict(format!(
                "transaction reference {} already exists",
                transaction.provider_txn_ref
            )));
        }

        let id = PaymentTransactionId::new(
            rows.keys().next_back().map_or(1, |id| id.as_i64() + 1),
        );
        let now = Utc::now();
        let row = PaymentTransaction {
            id,
            provider_txn_ref: transaction.provider_txn_ref,
            provider_transaction_no: None,
            invoice_id: transaction.invoice_id,
            user_id: transaction.user_id,
            amount: transaction.amount,
            status: transaction.status,
            bank_code: transaction.bank_code,
            error_code: None,
            error_message: transaction.error_message,
            settlement_published: false,
            created_at: now,
            updated_at: now,
        };
        rows.insert(id, row.clone());
        Ok(row)
    }

    async fn find_by_ref(&self, provider_txn_ref: &str) -> Result<Option<PaymentTransaction>> {
        Ok(self
            .rows
            .read()
            .await
            .values()
            .find(|row| row.provider_txn_ref == provider_txn_ref)
            .cloned())
    }

    async fn latest_for_invoice(
        &self,
        invoice_id: InvoiceId,
    ) -> Result<Option<PaymentTransaction>> {
        Ok(self
            .rows
            .read()
            .await
            .values()
            .filter(|row| row.invoice_id == invoice_id)
            .max_by_key(|row| (row.updated_at, row.id))
            .cloned())
    }

    async fn complete(
        &self,
        provider_txn_ref: &str,
        expected: PaymentStatus,
        status: PaymentStatus,
        completion: PaymentCompletion,
    ) -> Result<Option<PaymentTransaction>> {
        let mut rows = self.rows.write().await;
        let Some(row) = rows
            .values_mut()
            .find(|row| row.provider_txn_ref == provider_txn_ref)
        else {
            return Ok(None);
        };
        if row.status != expected {
            return Ok(None);
        }

        row.status = status;
        row.provider_transaction_no = completion.provider_transaction_no;
        if completion.bank_code.is_some() {
            row.bank_code = completion.bank_code;
        }
        row.error_code = completion.error_code;
        row.error_message = completion.error_message;
        row.updated_at = Utc::now();
        Ok(Some(row.clone()))
    }

    async fn mark_settlement_published(&self, provider_txn_ref: &str) -> Result<bool> {
        let mut rows = self.rows.write().await;
        match rows
            .values_mut()
            .find(|row| row.provider_txn_ref == provider_txn_ref)
        {
            Some(row) => {
                row.settlement_published = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
