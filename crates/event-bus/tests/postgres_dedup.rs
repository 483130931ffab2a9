//! PostgreSQL integration tests for the processed-event store.
//!
//! These tests start a PostgreSQL container and are ignored by default.
//! Run with:
//!
//! ```bash
//! cargo test -p event-bus --test postgres_dedup -- --ignored --test-threads=1
//! ```

use std::sync::Arc;

use event_bus::{PostgresProcessedEvents, ProcessedEvents};
use serial_test::serial;
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_commerce_tables.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

async fn get_test_store() -> PostgresProcessedEvents {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE processed_events")
        .execute(&pool)
        .await
        .unwrap();

    PostgresProcessedEvents::new(pool)
}

#[tokio::test]
#[serial]
#[ignore = "requires docker"]
async fn claim_is_recorded_once() {
    let store = get_test_store().await;

    assert!(store.try_claim("inventory", "evt-1").await.unwrap());
    assert!(!store.try_claim("inventory", "evt-1").await.unwrap());
    assert!(store.is_processed("inventory", "evt-1").await.unwrap());
    assert!(!store.is_processed("notifications", "evt-1").await.unwrap());
}

#[tokio::test]
#[serial]
#[ignore = "requires docker"]
async fn release_allows_reprocessing() {
    let store = get_test_store().await;

    assert!(store.try_claim("inventory", "evt-2:7").await.unwrap());
    store.release("inventory", "evt-2:7").await.unwrap();
    assert!(store.try_claim("inventory", "evt-2:7").await.unwrap());
}

#[tokio::test]
#[serial]
#[ignore = "requires docker"]
async fn concurrent_claims_have_one_winner() {
    let store = get_test_store().await;

    let attempts: Vec<_> = (0..6)
        .map(|_| {
            let store = store.clone();
            tokio::spawn(async move { store.try_claim("inventory", "evt-3").await.unwrap() })
        })
        .collect();

    let results = futures_util::future::join_all(attempts).await;
    let winners = results.into_iter().filter(|r| *r.as_ref().unwrap()).count();
    assert_eq!(winners, 1);
}

#[tokio::test]
#[serial]
#[ignore = "requires docker"]
async fn pending_work_is_stored_on_the_claim() {
    let store = get_test_store().await;
    let owed = serde_json::json!({ "productId": 7, "newQuantity": 3 });

    assert!(store.try_claim("inventory", "evt-4:7").await.unwrap());
    assert_eq!(store.pending("inventory", "evt-4:7").await.unwrap(), None);

    store
        .set_pending("inventory", "evt-4:7", Some(owed.clone()))
        .await
        .unwrap();
    assert_eq!(store.pending("inventory", "evt-4:7").await.unwrap(), Some(owed));

    store.set_pending("inventory", "evt-4:7", None).await.unwrap();
    assert_eq!(store.pending("inventory", "evt-4:7").await.unwrap(), None);
    assert_eq!(store.pending("inventory", "evt-5:7").await.unwrap(), None);
}
