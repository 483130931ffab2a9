use async_trait::async_trait;
use common::{Money, ProductId, Version};
use sqlx::{PgPool, Row, postgres::PgRow};

use super::{InventoryEntry, InventoryLedger, NewProduct};
use crate::error::Result;

/// PostgreSQL-backed ledger. The `version` column guards every write.
#[derive(Clone)]
pub struct PostgresInventoryLedger {
    pool: PgPool,
}

impl PostgresInventoryLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn row_to_entry(row: &PgRow) -> Result<InventoryEntry> {
        Ok(InventoryEntry {
            product_id: ProductId::new(row.try_get("id")?),
            name: row.try_get("name")?,
            price: Money::from_cents(row.try_get("price_cents")?),
            quantity: row.try_get("quantity")?,
            reorder_level: row.try_get("reorder_level")?,
            version: Version::new(row.try_get("version")?),
        })
    }
}

#[async_trait]
impl InventoryLedger for PostgresInventoryLedger {
    async fn get(&self, product_id: ProductId) -> Result<Option<InventoryEntry>> {
        let row = sqlx::query(
            "SELECT id, name, price_cents, quantity, reorder_level, version FROM products WHERE id = $1",
        )
        .bind(product_id.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_entry).transpose()
    }

    async fn compare_and_set(
        &self,
        product_id: ProductId,
        expected: Version,
        quantity: i64,
    ) -> Result<Option<Version>> {
        let version: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE products
            SET quantity = $3, version = version + 1
            WHERE id = $1 AND version = $2
            RETURNING version
            "#,
        )
        .bind(product_id.as_i64())
        .bind(expected.as_i64())
        .bind(quantity)
        .fetch_optional(&self.pool)
        .await?;

        Ok(version.map(Version::new))
    }

    async fn insert(&self, product: NewProduct) -> Result<InventoryEntry> {
        let row = sqlx::query(
            r#"
            INSERT INTO products (name, price_cents, quantity, reorder_level)
            VALUES ($1, $2, $3, $4)
            RETURNING id, name, price_cents, quantity, reorder_level, version
            "#,
        )
        .bind(&product.name)
        .bind(product.price.cents())
        .bind(product.quantity)
        .bind(product.reorder_level)
        .fetch_one(&self.pool)
        .await?;

        Self::row_to_entry(&row)
    }
}
