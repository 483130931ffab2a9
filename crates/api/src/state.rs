//! Shared application state and the wiring between services.

use std::sync::Arc;

use checkout::{CheckoutOrchestrator, HttpPeerClient, PeerClientConfig};
use common::RetryPolicy;
use domain::{
    CartService, CartStore, InMemoryCartStore, InMemoryInventoryLedger, InMemoryInvoiceStore,
    InMemoryPaymentStore, InventoryGateway, InventoryLedger, InventoryService, InvoiceGateway,
    InvoiceLookup, InvoiceService, InvoiceStore, PaymentStore, PostgresCartStore,
    PostgresInventoryLedger, PostgresInvoiceStore, PostgresPaymentStore, ProductCatalog,
};
use event_bus::{
    EventBus, EventPublisher, InMemoryProcessedEvents, PostgresProcessedEvents, ProcessedEvents,
};
use payment::{GatewayConfig, PaymentAdapter};
use sqlx::PgPool;
use url::Url;

use crate::auth::TokenVerifier;
use crate::config::Config;
use crate::error::StartupError;

/// The broker every service publishes to and consumes from.
pub type Bus = Arc<dyn EventBus>;
pub type Invoices = InvoiceService<Arc<dyn InvoiceStore>, Bus>;
pub type Inventory = InventoryService<Arc<dyn InventoryLedger>, Bus>;
pub type Carts = CartService<Arc<dyn CartStore>, Arc<dyn ProductCatalog>, Bus>;
pub type Checkout =
    CheckoutOrchestrator<Arc<dyn CartStore>, Arc<dyn InvoiceGateway>, Arc<dyn InventoryGateway>, Bus>;
pub type Payments = PaymentAdapter<Arc<dyn PaymentStore>, Arc<dyn InvoiceLookup>, Bus>;

/// Publication retries broker failures three times in total.
const PUBLISH_ATTEMPTS: usize = 3;

/// Persistence backends for every service in the process.
#[derive(Clone)]
pub struct Stores {
    pub carts: Arc<dyn CartStore>,
    pub invoices: Arc<dyn InvoiceStore>,
    pub inventory: Arc<dyn InventoryLedger>,
    pub payments: Arc<dyn PaymentStore>,
    pub processed: Arc<dyn ProcessedEvents>,
}

impl Stores {
    pub fn in_memory() -> Self {
        Self {
            carts: Arc::new(InMemoryCartStore::new()),
            invoices: Arc::new(InMemoryInvoiceStore::new()),
            inventory: Arc::new(InMemoryInventoryLedger::new()),
            payments: Arc::new(InMemoryPaymentStore::new()),
            processed: Arc::new(InMemoryProcessedEvents::new()),
        }
    }

    pub fn postgres(pool: PgPool) -> Self {
        Self {
            carts: Arc::new(PostgresCartStore::new(pool.clone())),
            invoices: Arc::new(PostgresInvoiceStore::new(pool.clone())),
            inventory: Arc::new(PostgresInventoryLedger::new(pool.clone())),
            payments: Arc::new(PostgresPaymentStore::new(pool.clone())),
            processed: Arc::new(PostgresProcessedEvents::new(pool)),
        }
    }
}

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub bus: Bus,
    pub carts: Carts,
    pub checkout: Checkout,
    pub invoices: Arc<Invoices>,
    pub inventory: Arc<Inventory>,
    pub payments: Payments,
    pub processed: Arc<dyn ProcessedEvents>,
    pub verifier: Arc<dyn TokenVerifier>,
}

/// The invoice and product owners as seen by checkout, carts and payments.
struct Peers {
    catalog: Arc<dyn ProductCatalog>,
    invoice_gateway: Arc<dyn InvoiceGateway>,
    inventory_gateway: Arc<dyn InventoryGateway>,
    invoice_lookup: Arc<dyn InvoiceLookup>,
}

impl AppState {
    /// Wires the services over `stores` and `bus`.
    ///
    /// With `PEER_BASE_URL` set, carts, checkout and payments reach the
    /// invoice and product owners over HTTP; otherwise they call the local
    /// services directly.
    pub fn build(
        config: &Config,
        bus: Bus,
        stores: Stores,
        verifier: Arc<dyn TokenVerifier>,
    ) -> Result<Arc<Self>, StartupError> {
        let publisher = EventPublisher::new(
            bus.clone(),
            RetryPolicy::builder().max_attempts(PUBLISH_ATTEMPTS).build(),
        );

        let invoices = Arc::new(InvoiceService::new(stores.invoices.clone(), publisher.clone()));
        let inventory = Arc::new(InventoryService::new(
            stores.inventory.clone(),
            publisher.clone(),
            config.inventory_retry(),
        ));

        let peers = match &config.peer.base_url {
            Some(base_url) => remote_peers(config, base_url)?,
            None => Peers {
                catalog: inventory.clone(),
                invoice_gateway: invoices.clone(),
                inventory_gateway: inventory.clone(),
                invoice_lookup: invoices.clone(),
            },
        };

        let gateway = GatewayConfig::new(
            Url::parse(&config.gateway.pay_url)?,
            config.gateway.tmn_code.clone(),
            config.gateway.hash_secret.clone(),
            config.gateway.return_url.clone(),
        );

        Ok(Arc::new(Self {
            carts: CartService::new(stores.carts.clone(), peers.catalog, publisher.clone()),
            checkout: CheckoutOrchestrator::new(
                stores.carts,
                peers.invoice_gateway,
                peers.inventory_gateway,
                publisher.clone(),
            ),
            payments: PaymentAdapter::new(
                stores.payments,
                peers.invoice_lookup,
                publisher,
                gateway,
            )?,
            bus,
            invoices,
            inventory,
            processed: stores.processed,
            verifier,
        }))
    }
}

fn remote_peers(config: &Config, base_url: &str) -> Result<Peers, StartupError> {
    let mut peer_config = PeerClientConfig::new(Url::parse(base_url)?)
        .with_timeouts(config.peer.connect_timeout, config.peer.request_timeout)
        .with_retry(config.peer_retry());
    if let Some(token) = &config.peer.service_token {
        peer_config = peer_config.with_service_token(token.clone());
    }

    let client = Arc::new(
        HttpPeerClient::new(peer_config)
            .map_err(|e| StartupError::Config(format!("peer client: {e}")))?,
    );
    tracing::info!(%base_url, "reaching invoice and product owners over HTTP");

    Ok(Peers {
        catalog: client.clone(),
        invoice_gateway: client.clone(),
        inventory_gateway: client.clone(),
        invoice_lookup: client,
    })
}
