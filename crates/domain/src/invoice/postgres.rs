use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{InvoiceId, InvoiceItemId, Money, ProductId, UserId};
use sqlx::{PgPool, Row, postgres::PgRow};

use super::{Invoice, InvoiceItem, InvoiceStatus, InvoiceStore, NewInvoice};
use crate::error::Result;

const INVOICE_COLUMNS: &str = "id, user_id, ship_address, status, transaction_id, total_cents, \
     customer_email, customer_name, order_date, status_updated_at";

/// PostgreSQL-backed invoice store.
#[derive(Clone)]
pub struct PostgresInvoiceStore {
    pool: PgPool,
}

impl PostgresInvoiceStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn row_to_invoice(row: &PgRow, items: Vec<InvoiceItem>) -> Result<Invoice> {
        let status: String = row.try_get("status")?;
        let status = InvoiceStatus::parse(&status).ok_or_else(|| {
            sqlx::Error::Decode(format!("unknown invoice status {status}").into())
        })?;

        Ok(Invoice {
            id: InvoiceId::new(row.try_get("id")?),
            user_id: UserId::new(row.try_get("user_id")?),
            ship_address: row.try_get("ship_address")?,
            status,
            transaction_id: row.try_get("transaction_id")?,
            total_amount: Money::from_cents(row.try_get("total_cents")?),
            customer_email: row.try_get("customer_email")?,
            customer_name: row.try_get("customer_name")?,
            order_date: row.try_get("order_date")?,
            status_updated_at: row.try_get("status_updated_at")?,
            items,
        })
    }

    fn row_to_item(row: &PgRow) -> Result<InvoiceItem> {
        let quantity: i32 = row.try_get("quantity")?;
        Ok(InvoiceItem {
            id: InvoiceItemId::new(row.try_get("id")?),
            product_id: ProductId::new(row.try_get("product_id")?),
            product_name: row.try_get("product_name")?,
            quantity: quantity.max(0) as u32,
            price: Money::from_cents(row.try_get("price_cents")?),
            subtotal: Money::from_cents(row.try_get("subtotal_cents")?),
        })
    }

    async fn load_items(&self, invoice_id: InvoiceId) -> Result<Vec<InvoiceItem>> {
        let rows = sqlx::query(
            r#"
            SELECT id, product_id, product_name, quantity, price_cents, subtotal_cents
            FROM invoice_items
            WHERE invoice_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(invoice_id.as_i64())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_item).collect()
    }
}

#[async_trait]
impl InvoiceStore for PostgresInvoiceStore {
    async fn insert(&self, invoice: NewInvoice) -> Result<Invoice> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO invoices (user_id, ship_address, status, total_cents, customer_email, customer_name)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {INVOICE_COLUMNS}
            "#
        ))
        .bind(invoice.user_id.as_i64())
        .bind(&invoice.ship_address)
        .bind(InvoiceStatus::Pending.as_str())
        .bind(invoice.total_amount.cents())
        .bind(&invoice.customer_email)
        .bind(&invoice.customer_name)
        .fetch_one(&mut *tx)
        .await?;

        let invoice_id = InvoiceId::new(row.try_get("id")?);

        let mut items = Vec::with_capacity(invoice.items.len());
        for item in &invoice.items {
            let item_row = sqlx::query(
                r#"
                INSERT INTO invoice_items (invoice_id, product_id, product_name, quantity, price_cents, subtotal_cents)
                VALUES ($1, $2, $3, $4, $5, $6)
                RETURNING id, product_id, product_name, quantity, price_cents, subtotal_cents
                "#,
            )
            .bind(invoice_id.as_i64())
            .bind(item.product_id.as_i64())
            .bind(&item.product_name)
            .bind(item.quantity as i32)
            .bind(item.price.cents())
            .bind(item.subtotal().cents())
            .fetch_one(&mut *tx)
            .await?;
            items.push(Self::row_to_item(&item_row)?);
        }

        tx.commit().await?;
        Self::row_to_invoice(&row, items)
    }

    async fn get(&self, invoice_id: InvoiceId) -> Result<Option<Invoice>> {
        let row = sqlx::query(&format!(
            "SELECT {INVOICE_COLUMNS} FROM invoices WHERE id = $1"
        ))
        .bind(invoice_id.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let items = self.load_items(invoice_id).await?;
                Ok(Some(Self::row_to_invoice(&row, items)?))
            }
            None => Ok(None),
        }
    }

    async fn list_by_user(&self, user_id: UserId) -> Result<Vec<Invoice>> {
        let rows = sqlx::query(&format!(
            "SELECT {INVOICE_COLUMNS} FROM invoices WHERE user_id = $1 ORDER BY order_date DESC, id DESC"
        ))
        .bind(user_id.as_i64())
        .fetch_all(&self.pool)
        .await?;

        let mut invoices = Vec::with_capacity(rows.len());
        for row in &rows {
            let id = InvoiceId::new(row.try_get("id")?);
            let items = self.load_items(id).await?;
            invoices.push(Self::row_to_invoice(row, items)?);
        }
        Ok(invoices)
    }

    async fn compare_and_set_status(
        &self,
        invoice_id: InvoiceId,
        expected: InvoiceStatus,
        status: InvoiceStatus,
        transaction_id: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE invoices
            SET status = $3,
                transaction_id = COALESCE($4, transaction_id),
                status_updated_at = $5
            WHERE id = $1 AND status = $2
            "#,
        )
        .bind(invoice_id.as_i64())
        .bind(expected.as_str())
        .bind(status.as_str())
        .bind(transaction_id)
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn update_item(
        &self,
        invoice_id: InvoiceId,
        item_id: InvoiceItemId,
        quantity: u32,
        price: Money,
    ) -> Result<Option<Invoice>> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE invoice_items
            SET quantity = $3, price_cents = $4, subtotal_cents = $5
            WHERE id = $2 AND invoice_id = $1
            "#,
        )
        .bind(invoice_id.as_i64())
        .bind(item_id.as_i64())
        .bind(quantity as i32)
        .bind(price.cents())
        .bind(price.multiply(quantity).cents())
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Ok(None);
        }

        sqlx::query(
            r#"
            UPDATE invoices
            SET total_cents = (SELECT COALESCE(SUM(subtotal_cents), 0) FROM invoice_items WHERE invoice_id = $1)
            WHERE id = $1
            "#,
        )
        .bind(invoice_id.as_i64())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        self.get(invoice_id).await
    }

    async fn delete(&self, invoice_id: InvoiceId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM invoices WHERE id = $1")
            .bind(invoice_id.as_i64())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }
}
