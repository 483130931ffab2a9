use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgPool;

use crate::{ProcessedEvents, Result};

/// PostgreSQL-backed processed-event store.
///
/// Claims are rows in `processed_events`; the primary key on
/// `(consumer, event_key)` makes a concurrent second claim a no-op insert.
#[derive(Clone)]
pub struct PostgresProcessedEvents {
    pool: PgPool,
}

impl PostgresProcessedEvents {
    /// Creates a new store over an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl ProcessedEvents for PostgresProcessedEvents {
    async fn try_claim(&self, consumer: &str, key: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO processed_events (consumer, event_key, processed_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (consumer, event_key) DO NOTHING
            "#,
        )
        .bind(consumer)
        .bind(key)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn release(&self, consumer: &str, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM processed_events WHERE consumer = $1 AND event_key = $2")
            .bind(consumer)
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn is_processed(&self, consumer: &str, key: &str) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM processed_events WHERE consumer = $1 AND event_key = $2)",
        )
        .bind(consumer)
        .bind(key)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn set_pending(&self, consumer: &str, key: &str, pending: Option<Value>) -> Result<()> {
        sqlx::query(
            "UPDATE processed_events SET pending = $3 WHERE consumer = $1 AND event_key = $2",
        )
        .bind(consumer)
        .bind(key)
        .bind(pending)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn pending(&self, consumer: &str, key: &str) -> Result<Option<Value>> {
        let pending: Option<Option<Value>> = sqlx::query_scalar(
            "SELECT pending FROM processed_events WHERE consumer = $1 AND event_key = $2",
        )
        .bind(consumer)
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(pending.flatten())
    }
}
