use async_trait::async_trait;
use common::{CartId, CartLineId, Money, ProductId, UserId};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};

use super::{Cart, CartLine, CartStore, NewCartLine};
use crate::error::{DomainError, Result};

/// PostgreSQL-backed cart store. Line mutations and the total refresh
/// commit together.
#[derive(Clone)]
pub struct PostgresCartStore {
    pool: PgPool,
}

impl PostgresCartStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn row_to_line(row: &PgRow) -> Result<CartLine> {
        let quantity: i32 = row.try_get("quantity")?;
        Ok(CartLine {
            id: CartLineId::new(row.try_get("id")?),
            cart_id: CartId::new(row.try_get("cart_id")?),
            product_id: ProductId::new(row.try_get("product_id")?),
            product_name: row.try_get("product_name")?,
            quantity: quantity.max(0) as u32,
            unit_price: Money::from_cents(row.try_get("unit_price_cents")?),
            total: Money::from_cents(row.try_get("total_cents")?),
        })
    }

    async fn load(&self, row: Option<PgRow>) -> Result<Option<Cart>> {
        let Some(row) = row else {
            return Ok(None);
        };
        let cart_id = CartId::new(row.try_get("id")?);
        let lines = sqlx::query(
            r#"
            SELECT id, cart_id, product_id, product_name, quantity, unit_price_cents, total_cents
            FROM cart_lines
            WHERE cart_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(cart_id.as_i64())
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(Self::row_to_line)
        .collect::<Result<Vec<_>>>()?;

        Ok(Some(Cart {
            id: cart_id,
            user_id: UserId::new(row.try_get("user_id")?),
            lines,
            total: Money::from_cents(row.try_get("total_cents")?),
            updated_at: row.try_get("updated_at")?,
        }))
    }

    async fn refresh_total(tx: &mut Transaction<'_, Postgres>, cart_id: CartId) -> Result<()> {
        let updated = sqlx::query(
            r#"
            UPDATE carts
            SET total_cents = (SELECT COALESCE(SUM(total_cents), 0) FROM cart_lines WHERE cart_id = $1),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(cart_id.as_i64())
        .execute(&mut **tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(DomainError::not_found("Cart", cart_id));
        }
        Ok(())
    }

    async fn require(&self, cart_id: CartId) -> Result<Cart> {
        self.get(cart_id)
            .await?
            .ok_or_else(|| DomainError::not_found("Cart", cart_id))
    }
}

#[async_trait]
impl CartStore for PostgresCartStore {
    async fn find_by_user(&self, user_id: UserId) -> Result<Option<Cart>> {
        let row = sqlx::query("SELECT id, user_id, total_cents, updated_at FROM carts WHERE user_id = $1")
            .bind(user_id.as_i64())
            .fetch_optional(&self.pool)
            .await?;
        self.load(row).await
    }

    async fn get(&self, cart_id: CartId) -> Result<Option<Cart>> {
        let row = sqlx::query("SELECT id, user_id, total_cents, updated_at FROM carts WHERE id = $1")
            .bind(cart_id.as_i64())
            .fetch_optional(&self.pool)
            .await?;
        self.load(row).await
    }

    async fn get_or_create(&self, user_id: UserId) -> Result<(Cart, bool)> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO carts (user_id)
            VALUES ($1)
            ON CONFLICT (user_id) DO NOTHING
            RETURNING id, user_id, total_cents, updated_at
            "#,
        )
        .bind(user_id.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        let created = inserted.is_some();
        let cart = match self.load(inserted).await? {
            Some(cart) => cart,
            None => self
                .find_by_user(user_id)
                .await?
                .ok_or_else(|| DomainError::not_found("Cart", user_id))?,
        };
        Ok((cart, created))
    }

    async fn upsert_line(&self, cart_id: CartId, line: NewCartLine) -> Result<Cart> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO cart_lines (cart_id, product_id, product_name, quantity, unit_price_cents, total_cents)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (cart_id, product_id) DO UPDATE
            SET quantity = EXCLUDED.quantity,
                unit_price_cents = EXCLUDED.unit_price_cents,
                total_cents = EXCLUDED.total_cents,
                product_name = COALESCE(EXCLUDED.product_name, cart_lines.product_name)
            "#,
        )
        .bind(cart_id.as_i64())
        .bind(line.product_id.as_i64())
        .bind(&line.product_name)
        .bind(line.quantity as i32)
        .bind(line.unit_price.cents())
        .bind(line.total().cents())
        .execute(&mut *tx)
        .await?;

        Self::refresh_total(&mut tx, cart_id).await?;
        tx.commit().await?;
        self.require(cart_id).await
    }

    async fn remove_line(&self, cart_id: CartId, product_id: ProductId) -> Result<Cart> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM cart_lines WHERE cart_id = $1 AND product_id = $2")
            .bind(cart_id.as_i64())
            .bind(product_id.as_i64())
            .execute(&mut *tx)
            .await?;
        Self::refresh_total(&mut tx, cart_id).await?;
        tx.commit().await?;
        self.require(cart_id).await
    }

    async fn clear(&self, cart_id: CartId) -> Result<Cart> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM cart_lines WHERE cart_id = $1")
            .bind(cart_id.as_i64())
            .execute(&mut *tx)
            .await?;
        Self::refresh_total(&mut tx, cart_id).await?;
        tx.commit().await?;
        self.require(cart_id).await
    }
}
