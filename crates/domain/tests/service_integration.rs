//! Integration tests for the domain services wired together in memory.
//!
//! These exercise the services through their public API the way the HTTP
//! layer and the consumers do, including the events each step publishes.

use std::sync::Arc;
use std::time::Duration;

use common::{InvoiceId, Money, Principal, ProductId, RetryPolicy, Role, UserId};
use domain::events::{InvoiceEvent, PaymentEvent};
use domain::{
    CartService, CreateInvoiceRequest, DomainError, ErrorKind, InMemoryCartStore,
    InMemoryInventoryLedger, InMemoryInvoiceStore, InventoryGateway, InventoryService,
    InvoiceLineRequest, InvoiceLookup, InvoiceService, InvoiceStatus, NewProduct, ProductCatalog,
};
use event_bus::topology::routing_keys;
use event_bus::{EventPublisher, InMemoryEventBus};

type Invoices = InvoiceService<InMemoryInvoiceStore, InMemoryEventBus>;
type Inventory = InventoryService<InMemoryInventoryLedger, InMemoryEventBus>;

struct World {
    bus: InMemoryEventBus,
    invoices: Arc<Invoices>,
    inventory: Arc<Inventory>,
    carts: CartService<InMemoryCartStore, Arc<Inventory>, InMemoryEventBus>,
}

fn fast() -> RetryPolicy {
    RetryPolicy::builder()
        .max_attempts(3)
        .initial_delay(Duration::from_millis(1))
        .build()
}

async fn world() -> World {
    let bus = InMemoryEventBus::with_standard_topology().await;
    let publisher = EventPublisher::new(bus.clone(), fast());

    let inventory = Arc::new(InventoryService::new(
        InMemoryInventoryLedger::new(),
        publisher.clone(),
        fast(),
    ));
    let invoices = Arc::new(
        InvoiceService::new(InMemoryInvoiceStore::new(), publisher.clone())
            .with_status_retry(fast()),
    );
    let carts = CartService::new(InMemoryCartStore::new(), inventory.clone(), publisher);

    World {
        bus,
        invoices,
        inventory,
        carts,
    }
}

fn customer() -> Principal {
    Principal::new(UserId::new(10), vec![Role::User], "customer-token").with_email("an@example.com")
}

fn shoe(name: &str, cents: i64, quantity: i64) -> NewProduct {
    NewProduct {
        name: name.to_string(),
        price: Money::from_cents(cents),
        quantity,
        reorder_level: 2,
    }
}

mod invoice_lifecycle {
    use super::*;

    #[tokio::test]
    async fn cart_snapshot_becomes_pending_invoice() {
        let w = world().await;
        let runner = w.inventory.create_product(shoe("Runner", 1_000, 10)).await.unwrap();
        let loafer = w.inventory.create_product(shoe("Loafer", 500, 10)).await.unwrap();

        w.carts.add_item(runner.product_id, 2, &customer()).await.unwrap();
        let cart = w.carts.add_item(loafer.product_id, 1, &customer()).await.unwrap();

        let request = CreateInvoiceRequest {
            user_id: cart.user_id,
            ship_address: "1 Dong Khoi".to_string(),
            total_amount: None,
            customer_email: customer().email.clone(),
            customer_name: None,
            items: cart
                .lines
                .iter()
                .map(|line| InvoiceLineRequest {
                    product_id: line.product_id,
                    product_name: line.product_name.clone().unwrap_or_default(),
                    quantity: line.quantity,
                    price: line.unit_price,
                })
                .collect(),
        };
        let invoice = w.invoices.create_from_cart(&request).await.unwrap();

        assert_eq!(invoice.total_amount, Money::from_cents(2_500));
        assert_eq!(invoice.total_amount, cart.total);
        assert_eq!(invoice.status, InvoiceStatus::Pending);

        let created = w
            .bus
            .published_of_type(routing_keys::EMAIL_INVOICE_EVENTS, "INVOICE_CREATED")
            .await;
        assert_eq!(created.len(), 1);
        let InvoiceEvent::InvoiceCreated(data) = created[0].decode().unwrap() else {
            panic!("expected INVOICE_CREATED");
        };
        assert_eq!(data.customer_email.as_deref(), Some("an@example.com"));
        assert_eq!(data.items.len(), 2);
    }

    #[tokio::test]
    async fn lookup_respects_ownership() {
        let w = world().await;
        let request = CreateInvoiceRequest {
            user_id: UserId::new(10),
            ship_address: "1 Dong Khoi".to_string(),
            total_amount: Some(Money::from_cents(900)),
            customer_email: None,
            customer_name: None,
            items: vec![],
        };
        let invoice = w.invoices.create_from_cart(&request).await.unwrap();

        let found = w.invoices.find_invoice(invoice.id, None).await.unwrap();
        assert_eq!(found.unwrap().total_amount, Money::from_cents(900));

        let stranger = Principal::new(UserId::new(11), vec![Role::User], "other");
        let denied = w
            .invoices
            .find_invoice(invoice.id, Some(&stranger))
            .await
            .unwrap_err();
        assert_eq!(denied.kind(), ErrorKind::Forbidden);

        assert!(
            w.invoices
                .find_invoice(InvoiceId::new(999), None)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn admin_delete_removes_invoice() {
        let w = world().await;
        let request = CreateInvoiceRequest {
            user_id: UserId::new(10),
            ship_address: "1 Dong Khoi".to_string(),
            total_amount: None,
            customer_email: None,
            customer_name: None,
            items: vec![],
        };
        let invoice = w.invoices.create_from_cart(&request).await.unwrap();

        w.invoices.delete(invoice.id).await.unwrap();
        assert!(matches!(
            w.invoices.delete(invoice.id).await,
            Err(DomainError::NotFound { .. })
        ));
    }
}

mod inventory_ports {
    use super::*;

    #[tokio::test]
    async fn gateway_adjust_publishes_inventory_change() {
        let w = world().await;
        let product = w.inventory.create_product(shoe("Boot", 2_000, 4)).await.unwrap();

        let change = InventoryGateway::adjust(&*w.inventory, product.product_id, -3, &customer())
            .await
            .unwrap();

        assert_eq!(change.new_quantity, 1);
        assert_eq!(
            w.bus
                .published_of_type(routing_keys::PRODUCT_INVENTORY, "INVENTORY_CHANGED")
                .await
                .len(),
            1
        );
        assert_eq!(
            w.bus
                .published_of_type(routing_keys::PRODUCT_INVENTORY, "LOW_STOCK_ALERT")
                .await
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn catalog_reports_current_price_and_stock() {
        let w = world().await;
        let product = w.inventory.create_product(shoe("Sandal", 750, 6)).await.unwrap();

        let snapshot = w
            .inventory
            .product(product.product_id, &customer())
            .await
            .unwrap();
        assert_eq!(snapshot.price, Money::from_cents(750));
        assert_eq!(snapshot.quantity, 6);

        let missing = w.inventory.product(ProductId::new(77), &customer()).await;
        assert!(matches!(missing, Err(DomainError::NotFound { .. })));
    }

    #[tokio::test]
    async fn payment_event_family_is_distinct_from_invoice_family() {
        let w = world().await;
        let request = CreateInvoiceRequest {
            user_id: UserId::new(10),
            ship_address: "1 Dong Khoi".to_string(),
            total_amount: None,
            customer_email: None,
            customer_name: None,
            items: vec![],
        };
        w.invoices.create_from_cart(&request).await.unwrap();

        let envelope = &w.bus.published(routing_keys::INVOICE_EVENTS).await[0];
        assert!(envelope.decode::<PaymentEvent>().is_err());
        assert!(envelope.decode::<InvoiceEvent>().is_ok());
    }
}
