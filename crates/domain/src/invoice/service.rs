use async_trait::async_trait;
use chrono::Utc;
use common::{InvoiceId, InvoiceItemId, Money, Principal, RetryPolicy, UserId};
use event_bus::topology::{exchanges, routing_keys};
use event_bus::{EventBus, EventPublisher};

use super::{Invoice, InvoiceStatus, InvoiceStore, NewInvoice, NewInvoiceItem};
use crate::error::{DomainError, Result};
use crate::events::InvoiceEvent;
use crate::inventory::with_optimistic_retry;
use crate::ports::{
    CreateInvoiceRequest, InvoiceGateway, InvoiceLookup, InvoiceReceipt, InvoiceSummary,
};

/// Owns invoices: creation from a cart snapshot and the payment-status
/// state machine.
pub struct InvoiceService<S, B> {
    store: S,
    publisher: EventPublisher<B>,
    status_retry: RetryPolicy,
}

impl<S: InvoiceStore, B: EventBus> InvoiceService<S, B> {
    pub fn new(store: S, publisher: EventPublisher<B>) -> Self {
        Self {
            store,
            publisher,
            status_retry: RetryPolicy::builder().max_attempts(3).build(),
        }
    }

    /// Overrides the policy used when a status write loses a race.
    pub fn with_status_retry(mut self, policy: RetryPolicy) -> Self {
        self.status_retry = policy;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Creates an invoice from a cart snapshot and announces it.
    ///
    /// The total is the caller's explicit total when given, otherwise the
    /// sum of `price * quantity` over the lines. Items are stored in the
    /// same transaction as the invoice.
    #[tracing::instrument(skip(self, request), fields(user_id = %request.user_id))]
    pub async fn create_from_cart(&self, request: &CreateInvoiceRequest) -> Result<Invoice> {
        let new_invoice = validate_request(request)?;
        let invoice = self.store.insert(new_invoice).await?;

        metrics::counter!("invoices_created_total").increment(1);
        tracing::info!(
            invoice_id = %invoice.id,
            total = %invoice.total_amount,
            items = invoice.items.len(),
            "invoice created"
        );

        self.announce(InvoiceEvent::InvoiceCreated(invoice.to_event_data()))
            .await;
        Ok(invoice)
    }

    /// Loads an invoice the principal is allowed to read.
    #[tracing::instrument(skip(self, principal))]
    pub async fn get(&self, invoice_id: InvoiceId, principal: &Principal) -> Result<Invoice> {
        let invoice = self.require(invoice_id).await?;
        authorize(principal, invoice.user_id)?;
        Ok(invoice)
    }

    #[tracing::instrument(skip(self, principal))]
    pub async fn list_for_user(
        &self,
        user_id: UserId,
        principal: &Principal,
    ) -> Result<Vec<Invoice>> {
        authorize(principal, user_id)?;
        self.store.list_by_user(user_id).await
    }

    /// Applies a payment-status transition.
    ///
    /// Re-applying the current status only refreshes the transaction id and
    /// timestamp and emits nothing. A transition the state machine refuses
    /// fails with [`DomainError::InvalidTransition`]. `INVOICE_UPDATED` is
    /// emitted once per actual status change.
    #[tracing::instrument(skip(self))]
    pub async fn update_status(
        &self,
        invoice_id: InvoiceId,
        status: InvoiceStatus,
        transaction_id: Option<&str>,
    ) -> Result<Invoice> {
        let (invoice, changed) = with_optimistic_retry(&self.status_retry, "Invoice", || {
            self.try_transition(invoice_id, status, transaction_id)
        })
        .await?;

        if changed {
            metrics::counter!("invoice_status_updates_total", "status" => status.as_str())
                .increment(1);
            tracing::info!(%invoice_id, %status, "invoice status changed");
            self.announce(InvoiceEvent::InvoiceUpdated(invoice.to_event_data()))
                .await;
        }
        Ok(invoice)
    }

    async fn try_transition(
        &self,
        invoice_id: InvoiceId,
        status: InvoiceStatus,
        transaction_id: Option<&str>,
    ) -> Result<(Invoice, bool)> {
        let current = self.require(invoice_id).await?;

        if !current.status.can_transition_to(status) {
            return Err(DomainError::InvalidTransition {
                invoice_id,
                from: current.status,
                to: status,
            });
        }

        let same_txn =
            transaction_id.is_none_or(|txn| current.transaction_id.as_deref() == Some(txn));
        if current.status == status && same_txn {
            return Ok((current, false));
        }

        let won = self
            .store
            .compare_and_set_status(
                invoice_id,
                current.status,
                status,
                transaction_id,
                Utc::now(),
            )
            .await?;
        if !won {
            return Err(DomainError::concurrent_modification(
                "Invoice",
                invoice_id,
                current.status,
            ));
        }

        let updated = self.require(invoice_id).await?;
        Ok((updated, current.status != status))
    }

    /// Changes an item's quantity and/or price, recomputing the item
    /// subtotal and the invoice total.
    #[tracing::instrument(skip(self))]
    pub async fn update_item(
        &self,
        invoice_id: InvoiceId,
        item_id: InvoiceItemId,
        quantity: Option<u32>,
        price: Option<Money>,
    ) -> Result<Invoice> {
        let invoice = self.require(invoice_id).await?;
        let item = invoice
            .items
            .iter()
            .find(|item| item.id == item_id)
            .ok_or_else(|| DomainError::not_found("InvoiceItem", item_id))?;

        let quantity = quantity.unwrap_or(item.quantity);
        let price = price.unwrap_or(item.price);
        if quantity == 0 {
            return Err(DomainError::Validation(
                "quantity must be positive".to_string(),
            ));
        }
        if price.cents() < 0 {
            return Err(DomainError::Validation("price must not be negative".to_string()));
        }

        self.store
            .update_item(invoice_id, item_id, quantity, price)
            .await?
            .ok_or_else(|| DomainError::not_found("InvoiceItem", item_id))
    }

    /// Deletes an invoice together with its items.
    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, invoice_id: InvoiceId) -> Result<()> {
        if self.store.delete(invoice_id).await? {
            tracing::info!(%invoice_id, "invoice deleted");
            Ok(())
        } else {
            Err(DomainError::not_found("Invoice", invoice_id))
        }
    }

    async fn require(&self, invoice_id: InvoiceId) -> Result<Invoice> {
        self.store
            .get(invoice_id)
            .await?
            .ok_or_else(|| DomainError::not_found("Invoice", invoice_id))
    }

    /// The invoice is already committed; a publication failure is logged
    /// and not surfaced.
    async fn announce(&self, event: InvoiceEvent) {
        if let Err(e) = self
            .publisher
            .publish(exchanges::INVOICE, &routing_keys::INVOICE_FAN_OUT, &event)
            .await
        {
            tracing::error!(
                invoice_id = %event.data().invoice_id,
                error = %e,
                "invoice event lost after commit"
            );
        }
    }
}

fn authorize(principal: &Principal, owner: UserId) -> Result<()> {
    if principal.can_act_for(owner) {
        Ok(())
    } else {
        Err(DomainError::Forbidden(format!(
            "user {} may not access invoices of user {owner}",
            principal.user_id
        )))
    }
}

fn validate_request(request: &CreateInvoiceRequest) -> Result<NewInvoice> {
    if request.user_id.as_i64() <= 0 {
        return Err(DomainError::Validation("userId is required".to_string()));
    }
    let ship_address = request.ship_address.trim();
    if ship_address.is_empty() {
        return Err(DomainError::Validation(
            "shipAddress must not be empty".to_string(),
        ));
    }

    let mut items = Vec::with_capacity(request.items.len());
    for line in &request.items {
        if line.quantity == 0 {
            return Err(DomainError::Validation(format!(
                "quantity for product {} must be positive",
                line.product_id
            )));
        }
        if line.price.cents() < 0 {
            return Err(DomainError::Validation(format!(
                "price for product {} must not be negative",
                line.product_id
            )));
        }
        items.push(NewInvoiceItem {
            product_id: line.product_id,
            product_name: Some(line.product_name.clone()).filter(|name| !name.is_empty()),
            quantity: line.quantity,
            price: line.price,
        });
    }

    let total_amount = request
        .total_amount
        .unwrap_or_else(|| items.iter().map(NewInvoiceItem::subtotal).sum());

    Ok(NewInvoice {
        user_id: request.user_id,
        ship_address: ship_address.to_string(),
        total_amount,
        customer_email: request.customer_email.clone(),
        customer_name: request.customer_name.clone(),
        items,
    })
}

#[async_trait]
impl<S: InvoiceStore, B: EventBus> InvoiceGateway for InvoiceService<S, B> {
    async fn create_from_cart(
        &self,
        request: &CreateInvoiceRequest,
        principal: &Principal,
    ) -> Result<InvoiceReceipt> {
        authorize(principal, request.user_id)?;
        let invoice = InvoiceService::create_from_cart(self, request).await?;
        Ok(InvoiceReceipt {
            invoice_id: invoice.id,
            total_amount: invoice.total_amount,
            status: invoice.status,
        })
    }
}

#[async_trait]
impl<S: InvoiceStore, B: EventBus> InvoiceLookup for InvoiceService<S, B> {
    async fn find_invoice(
        &self,
        invoice_id: InvoiceId,
        principal: Option<&Principal>,
    ) -> Result<Option<InvoiceSummary>> {
        let Some(invoice) = self.store.get(invoice_id).await? else {
            return Ok(None);
        };
        if let Some(principal) = principal {
            authorize(principal, invoice.user_id)?;
        }
        Ok(Some(invoice.summary()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invoice::InMemoryInvoiceStore;
    use crate::ports::InvoiceLineRequest;
    use common::{ProductId, Role};
    use event_bus::{EventEnvelope, InMemoryEventBus};
    use proptest::prelude::*;
    use std::time::Duration;

    type Service = InvoiceService<InMemoryInvoiceStore, InMemoryEventBus>;

    async fn service() -> (Service, InMemoryEventBus) {
        let bus = InMemoryEventBus::with_standard_topology().await;
        let retry = RetryPolicy::builder()
            .max_retries(1)
            .initial_delay(Duration::from_millis(1))
            .build();
        let service = InvoiceService::new(
            InMemoryInvoiceStore::new(),
            EventPublisher::new(bus.clone(), retry),
        );
        (service, bus)
    }

    fn request(total: Option<Money>) -> CreateInvoiceRequest {
        CreateInvoiceRequest {
            user_id: UserId::new(5),
            ship_address: "  7 Nguyen Hue  ".to_string(),
            total_amount: total,
            customer_email: Some("lan@example.com".to_string()),
            customer_name: Some("Lan".to_string()),
            items: vec![
                InvoiceLineRequest {
                    product_id: ProductId::new(1),
                    product_name: "Runner".to_string(),
                    quantity: 2,
                    price: Money::from_cents(1_000),
                },
                InvoiceLineRequest {
                    product_id: ProductId::new(2),
                    product_name: "Loafer".to_string(),
                    quantity: 1,
                    price: Money::from_cents(500),
                },
            ],
        }
    }

    fn decode(envelope: &EventEnvelope) -> InvoiceEvent {
        envelope.decode().unwrap()
    }

    #[tokio::test]
    async fn create_computes_total_and_emits_event() {
        let (service, bus) = service().await;

        let invoice = service.create_from_cart(&request(None)).await.unwrap();

        assert_eq!(invoice.total_amount, Money::from_cents(2_500));
        assert_eq!(invoice.status, InvoiceStatus::Pending);
        assert_eq!(invoice.ship_address, "7 Nguyen Hue");

        for key in routing_keys::INVOICE_FAN_OUT {
            let published = bus.published(key).await;
            assert_eq!(published.len(), 1);
            assert!(matches!(decode(&published[0]), InvoiceEvent::InvoiceCreated(_)));
        }
    }

    #[tokio::test]
    async fn explicit_total_wins() {
        let (service, _) = service().await;
        let invoice = service
            .create_from_cart(&request(Some(Money::from_cents(2_400))))
            .await
            .unwrap();
        assert_eq!(invoice.total_amount, Money::from_cents(2_400));
    }

    #[tokio::test]
    async fn create_rejects_blank_address_and_missing_user() {
        let (service, _) = service().await;

        let mut blank = request(None);
        blank.ship_address = "   ".to_string();
        assert!(matches!(
            service.create_from_cart(&blank).await,
            Err(DomainError::Validation(_))
        ));

        let mut anonymous = request(None);
        anonymous.user_id = UserId::new(0);
        assert!(matches!(
            service.create_from_cart(&anonymous).await,
            Err(DomainError::Validation(_))
        ));
        assert!(service.store().is_empty().await);
    }

    #[tokio::test]
    async fn paid_invoice_ignores_late_failure() {
        let (service, bus) = service().await;
        let invoice = service.create_from_cart(&request(None)).await.unwrap();

        service
            .update_status(invoice.id, InvoiceStatus::Paid, Some("TXN1"))
            .await
            .unwrap();
        let late = service
            .update_status(invoice.id, InvoiceStatus::PaymentFailed, Some("TXN0"))
            .await;

        assert!(matches!(late, Err(DomainError::InvalidTransition { .. })));
        let stored = service.store().get(invoice.id).await.unwrap().unwrap();
        assert_eq!(stored.status, InvoiceStatus::Paid);
        assert_eq!(stored.transaction_id.as_deref(), Some("TXN1"));

        let updates = bus
            .published_of_type(routing_keys::INVOICE_EVENTS, "INVOICE_UPDATED")
            .await;
        assert_eq!(updates.len(), 1);
    }

    #[tokio::test]
    async fn reapplying_status_is_silent() {
        let (service, bus) = service().await;
        let invoice = service.create_from_cart(&request(None)).await.unwrap();

        service
            .update_status(invoice.id, InvoiceStatus::Paid, Some("TXN1"))
            .await
            .unwrap();
        let again = service
            .update_status(invoice.id, InvoiceStatus::Paid, Some("TXN1"))
            .await
            .unwrap();

        assert_eq!(again.status, InvoiceStatus::Paid);
        let updates = bus
            .published_of_type(routing_keys::INVOICE_EVENTS, "INVOICE_UPDATED")
            .await;
        assert_eq!(updates.len(), 1);
    }

    #[tokio::test]
    async fn failed_payment_can_be_followed_by_success() {
        let (service, _) = service().await;
        let invoice = service.create_from_cart(&request(None)).await.unwrap();

        service
            .update_status(invoice.id, InvoiceStatus::PaymentFailed, Some("A"))
            .await
            .unwrap();
        let paid = service
            .update_status(invoice.id, InvoiceStatus::Paid, Some("B"))
            .await
            .unwrap();
        assert_eq!(paid.status, InvoiceStatus::Paid);
        assert_eq!(paid.transaction_id.as_deref(), Some("B"));
    }

    #[tokio::test]
    async fn unknown_invoice_is_not_found() {
        let (service, _) = service().await;
        let result = service
            .update_status(InvoiceId::new(404), InvoiceStatus::Paid, None)
            .await;
        assert!(matches!(result, Err(DomainError::NotFound { .. })));
    }

    #[tokio::test]
    async fn only_owner_or_admin_reads() {
        let (service, _) = service().await;
        let invoice = service.create_from_cart(&request(None)).await.unwrap();

        let owner = Principal::new(UserId::new(5), vec![Role::User], "t1");
        let stranger = Principal::new(UserId::new(6), vec![Role::User], "t2");
        let admin = Principal::new(UserId::new(1), vec![Role::Admin], "t3");

        assert!(service.get(invoice.id, &owner).await.is_ok());
        assert!(service.get(invoice.id, &admin).await.is_ok());
        assert!(matches!(
            service.get(invoice.id, &stranger).await,
            Err(DomainError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn update_item_keeps_total_consistent() {
        let (service, _) = service().await;
        let invoice = service.create_from_cart(&request(None)).await.unwrap();
        let item = invoice.items[1].id;

        let updated = service
            .update_item(invoice.id, item, Some(3), None)
            .await
            .unwrap();
        assert_eq!(updated.total_amount, Money::from_cents(3_500));
        assert_eq!(updated.total_amount, updated.items_total());
    }

    fn cents_of(lines: &[(i64, u32, i64)]) -> i64 {
        lines
            .iter()
            .map(|(_, quantity, cents)| cents * i64::from(*quantity))
            .sum()
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn total_defaults_to_the_sum_of_line_totals(
            lines in prop::collection::vec((1i64..50, 1u32..20, 0i64..100_000), 1..8),
            edit in (any::<prop::sample::Index>(), 1u32..20, 0i64..100_000),
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            runtime.block_on(async {
                let (service, _) = service().await;
                let mut cart = request(None);
                cart.items = lines
                    .iter()
                    .map(|(product, quantity, cents)| InvoiceLineRequest {
                        product_id: ProductId::new(*product),
                        product_name: format!("Product {product}"),
                        quantity: *quantity,
                        price: Money::from_cents(*cents),
                    })
                    .collect();

                let invoice = service.create_from_cart(&cart).await.unwrap();
                assert_eq!(invoice.total_amount, Money::from_cents(cents_of(&lines)));
                assert_eq!(invoice.total_amount, invoice.items_total());

                let (index, quantity, cents) = edit;
                let target = invoice.items[index.index(invoice.items.len())].id;
                let updated = service
                    .update_item(invoice.id, target, Some(quantity), Some(Money::from_cents(cents)))
                    .await
                    .unwrap();

                let expected: Vec<_> = invoice
                    .items
                    .iter()
                    .map(|item| {
                        if item.id == target {
                            (0, quantity, cents)
                        } else {
                            (0, item.quantity, item.price.cents())
                        }
                    })
                    .collect();
                assert_eq!(updated.total_amount, Money::from_cents(cents_of(&expected)));
                assert_eq!(updated.total_amount, updated.items_total());
            });
        }
    }
}
