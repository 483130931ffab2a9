//! Schema management for the PostgreSQL stores.

use sqlx::PgPool;

/// Applies the workspace migrations to `pool`.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("../../migrations").run(pool).await?;
    tracing::info!("database migrations applied");
    Ok(())
}
