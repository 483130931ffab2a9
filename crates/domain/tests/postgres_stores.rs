//! PostgreSQL integration tests for the cart, invoice, inventory and payment
//! stores.
//!
//! These tests start a PostgreSQL container and are ignored by default.
//! Run with:
//!
//! ```bash
//! cargo test -p domain --test postgres_stores -- --ignored --test-threads=1
//! ```

use std::sync::Arc;

use chrono::Utc;
use common::{InvoiceId, InvoiceItemId, Money, ProductId, UserId, Version};
use domain::cart::NewCartLine;
use domain::{
    CartStore, ErrorKind, InventoryLedger, InvoiceStatus, InvoiceStore, NewInvoice,
    NewInvoiceItem, NewPaymentTransaction, NewProduct, PaymentCompletion, PaymentStatus,
    PaymentStore, PostgresCartStore, PostgresInventoryLedger, PostgresInvoiceStore,
    PostgresPaymentStore,
};
use serial_test::serial;
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

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

async fn get_test_pool() -> PgPool {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query(
        "TRUNCATE TABLE cart_lines, carts, invoice_items, invoices, payment_transactions, products RESTART IDENTITY CASCADE",
    )
    .execute(&pool)
    .await
    .unwrap();

    pool
}

fn line(product: i64, quantity: u32, cents: i64) -> NewCartLine {
    NewCartLine {
        product_id: ProductId::new(product),
        product_name: Some(format!("Product {product}")),
        quantity,
        unit_price: Money::from_cents(cents),
    }
}

fn new_invoice(user: i64) -> NewInvoice {
    NewInvoice {
        user_id: UserId::new(user),
        ship_address: "12 Harbour Road".to_string(),
        total_amount: Money::from_cents(5_000),
        customer_email: Some("alice@example.com".to_string()),
        customer_name: Some("Alice".to_string()),
        items: vec![
            NewInvoiceItem {
                product_id: ProductId::new(1),
                product_name: Some("Runner".to_string()),
                quantity: 2,
                price: Money::from_cents(1_500),
            },
            NewInvoiceItem {
                product_id: ProductId::new(2),
                product_name: None,
                quantity: 1,
                price: Money::from_cents(2_000),
            },
        ],
    }
}

fn new_payment(reference: &str, invoice_id: InvoiceId) -> NewPaymentTransaction {
    NewPaymentTransaction {
        provider_txn_ref: reference.to_string(),
        invoice_id,
        user_id: Some(UserId::new(1)),
        amount: Money::from_cents(5_000),
        status: PaymentStatus::Pending,
        bank_code: Some("NCB".to_string()),
        error_message: None,
    }
}

#[tokio::test]
#[serial]
#[ignore = "requires docker"]
async fn cart_lines_upsert_and_clear() {
    let store = PostgresCartStore::new(get_test_pool().await);
    let user = UserId::new(1);

    let (cart, created) = store.get_or_create(user).await.unwrap();
    assert!(created);
    assert!(cart.is_empty());

    let (again, created) = store.get_or_create(user).await.unwrap();
    assert!(!created);
    assert_eq!(again.id, cart.id);

    store.upsert_line(cart.id, line(1, 2, 1_000)).await.unwrap();
    let cart_after = store.upsert_line(cart.id, line(1, 3, 1_000)).await.unwrap();
    assert_eq!(cart_after.lines.len(), 1);
    assert_eq!(cart_after.lines[0].quantity, 3);
    assert_eq!(cart_after.total, Money::from_cents(3_000));

    let cart_after = store.upsert_line(cart.id, line(2, 1, 500)).await.unwrap();
    assert_eq!(cart_after.total, Money::from_cents(3_500));

    let cart_after = store.remove_line(cart.id, ProductId::new(1)).await.unwrap();
    assert_eq!(cart_after.total, Money::from_cents(500));

    let cleared = store.clear(cart.id).await.unwrap();
    assert!(cleared.is_empty());
    assert!(cleared.total.is_zero());
    assert_eq!(store.find_by_user(user).await.unwrap().unwrap().id, cart.id);
}

#[tokio::test]
#[serial]
#[ignore = "requires docker"]
async fn invoice_status_moves_once() {
    let store = PostgresInvoiceStore::new(get_test_pool().await);

    let invoice = store.insert(new_invoice(1)).await.unwrap();
    assert_eq!(invoice.status, InvoiceStatus::Pending);
    assert_eq!(invoice.items.len(), 2);
    assert_eq!(invoice.items_total(), invoice.total_amount);

    let moved = store
        .compare_and_set_status(
            invoice.id,
            InvoiceStatus::Pending,
            InvoiceStatus::Paid,
            Some("12345678"),
            Utc::now(),
        )
        .await
        .unwrap();
    assert!(moved);

    let stale = store
        .compare_and_set_status(
            invoice.id,
            InvoiceStatus::Pending,
            InvoiceStatus::PaymentFailed,
            None,
            Utc::now(),
        )
        .await
        .unwrap();
    assert!(!stale);

    let stored = store.get(invoice.id).await.unwrap().unwrap();
    assert_eq!(stored.status, InvoiceStatus::Paid);
    assert_eq!(stored.transaction_id.as_deref(), Some("12345678"));
}

#[tokio::test]
#[serial]
#[ignore = "requires docker"]
async fn invoice_item_update_recomputes_total() {
    let store = PostgresInvoiceStore::new(get_test_pool().await);
    let invoice = store.insert(new_invoice(1)).await.unwrap();
    let item = invoice.items[0].clone();

    let updated = store
        .update_item(invoice.id, item.id, 1, Money::from_cents(1_500))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.total_amount, Money::from_cents(3_500));

    let missing = store
        .update_item(invoice.id, InvoiceItemId::new(9_999), 1, Money::zero())
        .await
        .unwrap();
    assert!(missing.is_none());

    store.insert(new_invoice(1)).await.unwrap();
    store.insert(new_invoice(2)).await.unwrap();
    assert_eq!(store.list_by_user(UserId::new(1)).await.unwrap().len(), 2);

    assert!(store.delete(invoice.id).await.unwrap());
    assert!(!store.delete(invoice.id).await.unwrap());
    assert!(store.get(invoice.id).await.unwrap().is_none());
}

#[tokio::test]
#[serial]
#[ignore = "requires docker"]
async fn inventory_writes_are_version_checked() {
    let ledger = PostgresInventoryLedger::new(get_test_pool().await);
    let entry = ledger
        .insert(NewProduct {
            name: "Runner".to_string(),
            price: Money::from_cents(2_500),
            quantity: 10,
            reorder_level: 2,
        })
        .await
        .unwrap();
    assert_eq!(entry.version, Version::initial());

    let next = ledger
        .compare_and_set(entry.product_id, entry.version, 8)
        .await
        .unwrap();
    assert_eq!(next, Some(entry.version.next()));

    let stale = ledger
        .compare_and_set(entry.product_id, entry.version, 5)
        .await
        .unwrap();
    assert_eq!(stale, None);

    let stored = ledger.get(entry.product_id).await.unwrap().unwrap();
    assert_eq!(stored.quantity, 8);

    let missing = ledger
        .compare_and_set(ProductId::new(9_999), Version::initial(), 1)
        .await
        .unwrap();
    assert_eq!(missing, None);
}

#[tokio::test]
#[serial]
#[ignore = "requires docker"]
async fn concurrent_inventory_writers_have_one_winner() {
    let ledger = PostgresInventoryLedger::new(get_test_pool().await);
    let entry = ledger
        .insert(NewProduct {
            name: "Runner".to_string(),
            price: Money::from_cents(2_500),
            quantity: 10,
            reorder_level: 0,
        })
        .await
        .unwrap();

    let (product_id, version) = (entry.product_id, entry.version);
    let writers: Vec<_> = (0..6)
        .map(|i| {
            let ledger = ledger.clone();
            tokio::spawn(async move {
                ledger
                    .compare_and_set(product_id, version, 10 - i)
                    .await
                    .unwrap()
            })
        })
        .collect();

    let results = futures_util::future::join_all(writers).await;
    let winners = results
        .into_iter()
        .filter(|r| r.as_ref().unwrap().is_some())
        .count();
    assert_eq!(winners, 1);
}

#[tokio::test]
#[serial]
#[ignore = "requires docker"]
async fn payment_reference_is_unique_and_settles_once() {
    let store = PostgresPaymentStore::new(get_test_pool().await);
    let invoice_id = InvoiceId::new(1);

    store.insert(new_payment("11111111", invoice_id)).await.unwrap();
    let err = store
        .insert(new_payment("11111111", invoice_id))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    let completion = PaymentCompletion {
        provider_transaction_no: Some("14000001".to_string()),
        bank_code: None,
        error_code: Some("00".to_string()),
        error_message: None,
    };
    let settled = store
        .complete(
            "11111111",
            PaymentStatus::Pending,
            PaymentStatus::Paid,
            completion.clone(),
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(settled.status, PaymentStatus::Paid);
    assert_eq!(settled.bank_code.as_deref(), Some("NCB"));
    assert_eq!(settled.provider_transaction_no.as_deref(), Some("14000001"));

    let replay = store
        .complete(
            "11111111",
            PaymentStatus::Pending,
            PaymentStatus::Paid,
            completion,
        )
        .await
        .unwrap();
    assert!(replay.is_none());

    assert!(!settled.settlement_published);
    assert!(store.mark_settlement_published("11111111").await.unwrap());
    let stored = store.find_by_ref("11111111").await.unwrap().unwrap();
    assert!(stored.settlement_published);
    assert!(!store.mark_settlement_published("99999999").await.unwrap());

    store.insert(new_payment("22222222", invoice_id)).await.unwrap();
    let latest = store.latest_for_invoice(invoice_id).await.unwrap().unwrap();
    assert_eq!(latest.provider_txn_ref, "22222222");
    assert!(store.find_by_ref("33333333").await.unwrap().is_none());
}
