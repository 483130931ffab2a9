//! Cart checkout orchestrator.

use std::time::Instant;

use common::{CartId, InvoiceId, Money, Principal};
use domain::events::{CartEvent, OrderEvent, OrderEventData, OrderLine};
use domain::{
    Cart, CartStore, CreateInvoiceRequest, InventoryGateway, InvoiceGateway, InvoiceLineRequest,
};
use event_bus::topology::{exchanges, routing_keys};
use event_bus::{EventBus, EventPublisher};
use serde::Serialize;

use crate::error::{CheckoutError, Result};
use crate::steps;

/// What the caller gets back from a successful checkout.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutReceipt {
    pub invoice_id: InvoiceId,
    pub total_amount: Money,
    /// Lines whose synchronous inventory decrement failed and were handed
    /// to the reconciler instead.
    pub inventory_resync_lines: usize,
}

/// Drives a cart through checkout.
///
/// The cart store is owned locally; the invoice and inventory owners are
/// peers reached through their ports, always on behalf of the caller's
/// principal.
pub struct CheckoutOrchestrator<S, I, G, B>
where
    S: CartStore,
    I: InvoiceGateway,
    G: InventoryGateway,
    B: EventBus,
{
    carts: S,
    invoices: I,
    inventory: G,
    publisher: EventPublisher<B>,
}

impl<S, I, G, B> CheckoutOrchestrator<S, I, G, B>
where
    S: CartStore,
    I: InvoiceGateway,
    G: InventoryGateway,
    B: EventBus,
{
    pub fn new(carts: S, invoices: I, inventory: G, publisher: EventPublisher<B>) -> Self {
        Self {
            carts,
            invoices,
            inventory,
            publisher,
        }
    }

    /// Checks out `cart_id` for the caller.
    ///
    /// Returns the new invoice id and total. The cart is only touched once
    /// the invoice owner has acknowledged the invoice.
    #[tracing::instrument(skip(self, principal), fields(user_id = %principal.user_id))]
    pub async fn checkout(
        &self,
        cart_id: CartId,
        ship_address: &str,
        principal: &Principal,
    ) -> Result<CheckoutReceipt> {
        metrics::counter!("checkout_started_total").increment(1);
        let started = Instant::now();

        let result = self.run(cart_id, ship_address, principal).await;

        match &result {
            Ok(receipt) => {
                metrics::counter!("checkout_completed_total").increment(1);
                tracing::info!(
                    invoice_id = %receipt.invoice_id,
                    total = %receipt.total_amount,
                    "checkout completed"
                );
            }
            Err(e) => {
                metrics::counter!("checkout_failed_total").increment(1);
                tracing::warn!(error = %e, "checkout failed");
            }
        }
        metrics::histogram!("checkout_duration_seconds").record(started.elapsed().as_secs_f64());

        result
    }

    async fn run(
        &self,
        cart_id: CartId,
        ship_address: &str,
        principal: &Principal,
    ) -> Result<CheckoutReceipt> {
        // 1. Load the cart
        tracing::debug!(step = steps::STEP_LOAD_CART, "checkout step started");
        let cart = self
            .carts
            .get(cart_id)
            .await?
            .ok_or(CheckoutError::CartNotFound(cart_id))?;

        if !principal.can_act_for(cart.user_id) {
            return Err(CheckoutError::Forbidden(cart_id));
        }
        if cart.is_empty() {
            return Err(CheckoutError::EmptyCart(cart_id));
        }

        // 2. Create the invoice. Nothing has changed yet if this fails.
        tracing::info!(step = steps::STEP_CREATE_INVOICE, "checkout step started");
        let request = invoice_request(&cart, ship_address, principal);
        let receipt = self
            .invoices
            .create_from_cart(&request, principal)
            .await
            .map_err(|source| CheckoutError::InvoiceCreation { cart_id, source })?;

        // 3. Decrement inventory, best-effort
        tracing::info!(
            step = steps::STEP_DECREMENT_INVENTORY,
            invoice_id = %receipt.invoice_id,
            "checkout step started"
        );
        let unsettled = self.decrement_inventory(&cart, principal).await;
        if !unsettled.is_empty() {
            metrics::counter!("checkout_inventory_degraded_total").increment(1);
            self.resync_inventory(&cart, receipt.invoice_id, &unsettled)
                .await;
        }

        // 4. Clear the cart
        tracing::info!(step = steps::STEP_CLEAR_CART, "checkout step started");
        if let Err(e) = self.carts.clear(cart_id).await {
            tracing::error!(
                cart_id = %cart_id,
                invoice_id = %receipt.invoice_id,
                error = %e,
                "cart could not be cleared after checkout"
            );
        }

        // 5. Announce with the pre-clear snapshot
        tracing::info!(step = steps::STEP_ANNOUNCE, "checkout step started");
        let event = CartEvent::CartCheckout(cart.to_event_data(Some(receipt.invoice_id)));
        if let Err(e) = self
            .publisher
            .publish(exchanges::CART, &[routing_keys::CART_EVENTS], &event)
            .await
        {
            tracing::error!(cart_id = %cart_id, error = %e, "CART_CHECKOUT not published");
        }

        Ok(CheckoutReceipt {
            invoice_id: receipt.invoice_id,
            total_amount: receipt.total_amount,
            inventory_resync_lines: unsettled.len(),
        })
    }

    /// Applies `-quantity` per line. Returns the lines that failed.
    async fn decrement_inventory(&self, cart: &Cart, principal: &Principal) -> Vec<OrderLine> {
        let mut unsettled = Vec::new();

        for line in &cart.lines {
            let delta = -i64::from(line.quantity);
            match self.inventory.adjust(line.product_id, delta, principal).await {
                Ok(change) => tracing::debug!(
                    product_id = %line.product_id,
                    previous = change.previous_quantity,
                    new = change.new_quantity,
                    "inventory decremented"
                ),
                Err(e) => {
                    tracing::warn!(
                        product_id = %line.product_id,
                        quantity = line.quantity,
                        error = %e,
                        "inventory decrement failed, deferring to reconciler"
                    );
                    unsettled.push(OrderLine::new(line.product_id, i64::from(line.quantity)));
                }
            }
        }

        unsettled
    }

    /// Hands failed decrements to the inventory reconciler as one `ORDER_PLACED`.
    async fn resync_inventory(&self, cart: &Cart, invoice_id: InvoiceId, lines: &[OrderLine]) {
        let event = OrderEvent::OrderPlaced(OrderEventData {
            invoice_id: Some(invoice_id),
            user_id: Some(cart.user_id),
            items: lines.to_vec(),
        });

        match self
            .publisher
            .publish(exchanges::PRODUCT, &[routing_keys::PRODUCT_ORDER], &event)
            .await
        {
            Ok(envelope) => tracing::info!(
                event_id = %envelope.event_id,
                lines = lines.len(),
                "inventory resync requested"
            ),
            Err(e) => tracing::error!(
                invoice_id = %invoice_id,
                lines = lines.len(),
                error = %e,
                "inventory resync could not be published"
            ),
        }
    }
}

/// Snapshot of the cart as the invoice owner expects it. Lines carry the
/// unit prices captured when they were added, and the cart total is sent as
/// the explicit invoice total.
fn invoice_request(cart: &Cart, ship_address: &str, principal: &Principal) -> CreateInvoiceRequest {
    CreateInvoiceRequest {
        user_id: cart.user_id,
        ship_address: ship_address.to_string(),
        total_amount: Some(cart.total),
        customer_email: principal.email.clone(),
        customer_name: None,
        items: cart
            .lines
            .iter()
            .map(|line| InvoiceLineRequest {
                product_id: line.product_id,
                product_name: line
                    .product_name
                    .clone()
                    .unwrap_or_else(|| format!("Product {}", line.product_id)),
                quantity: line.quantity,
                price: line.unit_price,
            })
            .collect(),
    }
}
