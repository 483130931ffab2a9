use async_trait::async_trait;
use common::{InvoiceId, Money, PaymentTransactionId, UserId};
use sqlx::{PgPool, Row, postgres::PgRow};

use super::{
    NewPaymentTransaction, PaymentCompletion, PaymentStatus, PaymentStore, PaymentTransaction,
};
use crate::error::{DomainError, Result};

const COLUMNS: &str = "id, provider_txn_ref, provider_transaction_no, invoice_id, user_id, \
     amount_cents, status, bank_code, error_code, error_message, settlement_published, \
     created_at, updated_at";

/// PostgreSQL-backed payment store.
#[derive(Clone)]
pub struct PostgresPaymentStore {
    pool: PgPool,
}

impl PostgresPaymentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn row_to_transaction(row: &PgRow) -> Result<PaymentTransaction> {
        let status: String = row.try_get("status")?;
        let status = PaymentStatus::parse(&status).ok_or_else(|| {
            sqlx::Error::Decode(format!("unknown payment status {status}").into())
        })?;
        let user_id: Option<i64> = row.try_get("user_id")?;

        Ok(PaymentTransaction {
            id: PaymentTransactionId::new(row.try_get("id")?),
            provider_txn_ref: row.try_get("provider_txn_ref")?,
            provider_transaction_no: row.try_get("provider_transaction_no")?,
            invoice_id: InvoiceId::new(row.try_get("invoice_id")?),
            user_id: user_id.map(UserId::new),
            amount: Money::from_cents(row.try_get("amount_cents")?),
            status,
            bank_code: row.try_get("bank_code")?,
            error_code: row.try_get("error_code")?,
            error_message: row.try_get("error_message")?,
            settlement_published: row.try_get("settlement_published")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl PaymentStore for PostgresPaymentStore {
    async fn insert(&self, transaction: NewPaymentTransaction) -> Result<PaymentTransaction> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO payment_transactions
                (provider_txn_ref, invoice_id, user_id, amount_cents, status, bank_code, error_message)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {COLUMNS}
            "#
        ))
        .bind(&transaction.provider_txn_ref)
        .bind(transaction.invoice_id.as_i64())
        .bind(transaction.user_id.map(|id| id.as_i64()))
        .bind(transaction.amount.cents())
        .bind(transaction.status.as_str())
        .bind(&transaction.bank_code)
        .bind(&transaction.error_message)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.is_unique_violation()
            {
                return DomainError::Conflict(format!(
                    "transaction reference {} already exists",
                    transaction.provider_txn_ref
                ));
            }
            DomainError::Database(e)
        })?;

        Self::row_to_transaction(&row)
    }

    async fn find_by_ref(&self, provider_txn_ref: &str) -> Result<Option<PaymentTransaction>> {
        let row = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM payment_transactions WHERE provider_txn_ref = $1"
        ))
        .bind(provider_txn_ref)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_transaction).transpose()
    }

    async fn latest_for_invoice(
        &self,
        invoice_id: InvoiceId,
    ) -> Result<Option<PaymentTransaction>> {
        let row = sqlx::query(&format!(
            r#"
            SELECT {COLUMNS} FROM payment_transactions
            WHERE invoice_id = $1
            ORDER BY updated_at DESC, id DESC
            LIMIT 1
            "#
        ))
        .bind(invoice_id.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_transaction).transpose()
    }

    async fn complete(
        &self,
        provider_txn_ref: &str,
        expected: PaymentStatus,
        status: PaymentStatus,
        completion: PaymentCompletion,
    ) -> Result<Option<PaymentTransaction>> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE payment_transactions
            SET status = $3,
                provider_transaction_no = $4,
                bank_code = COALESCE($5, bank_code),
                error_code = $6,
                error_message = $7,
                updated_at = NOW()
            WHERE provider_txn_ref = $1 AND status = $2
            RETURNING {COLUMNS}
            "#
        ))
        .bind(provider_txn_ref)
        .bind(expected.as_str())
        .bind(status.as_str())
        .bind(&completion.provider_transaction_no)
        .bind(&completion.bank_code)
        .bind(&completion.error_code)
        .bind(&completion.error_message)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_transaction).transpose()
    }

    async fn mark_settlement_published(&self, provider_txn_ref: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE payment_transactions SET settlement_published = TRUE WHERE provider_txn_ref = $1",
        )
        .bind(provider_txn_ref)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
