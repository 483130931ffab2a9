use common::{CartId, Principal, ProductId};
use event_bus::topology::{exchanges, routing_keys};
use event_bus::{EventBus, EventPublisher};

use super::{Cart, CartStore, NewCartLine};
use crate::error::{DomainError, Result};
use crate::events::CartEvent;
use crate::ports::{ProductCatalog, ProductSnapshot};

/// Cart CRUD. Only the owner of a cart, or an admin, may read or change it.
pub struct CartService<S, C, B> {
    store: S,
    catalog: C,
    publisher: EventPublisher<B>,
}

impl<S: CartStore, C: ProductCatalog, B: EventBus> CartService<S, C, B> {
    pub fn new(store: S, catalog: C, publisher: EventPublisher<B>) -> Self {
        Self {
            store,
            catalog,
            publisher,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// The caller's own cart.
    #[tracing::instrument(skip(self, principal), fields(user_id = %principal.user_id))]
    pub async fn my_cart(&self, principal: &Principal) -> Result<Cart> {
        self.store
            .find_by_user(principal.user_id)
            .await?
            .ok_or_else(|| DomainError::not_found("Cart", format!("user {}", principal.user_id)))
    }

    #[tracing::instrument(skip(self, principal))]
    pub async fn get(&self, cart_id: CartId, principal: &Principal) -> Result<Cart> {
        let cart = self
            .store
            .get(cart_id)
            .await?
            .ok_or_else(|| DomainError::not_found("Cart", cart_id))?;
        authorize(principal, &cart)?;
        Ok(cart)
    }

    /// Adds `quantity` of a product to the caller's cart, creating the cart
    /// on first use. An existing line for the product is merged; the unit
    /// price is re-captured from the catalog.
    #[tracing::instrument(skip(self, principal), fields(user_id = %principal.user_id))]
    pub async fn add_item(
        &self,
        product_id: ProductId,
        quantity: u32,
        principal: &Principal,
    ) -> Result<Cart> {
        if quantity == 0 {
            return Err(DomainError::Validation(
                "quantity must be positive".to_string(),
            ));
        }
        let product = self.catalog.product(product_id, principal).await?;

        let (cart, created) = self.store.get_or_create(principal.user_id).await?;
        let merged = cart
            .line(product_id)
            .map_or(quantity, |line| line.quantity.saturating_add(quantity));
        ensure_in_stock(&product, merged)?;

        let cart = self
            .store
            .upsert_line(cart.id, priced_line(&product, merged))
            .await?;

        tracing::info!(cart_id = %cart.id, %product_id, quantity = merged, "cart line saved");
        let event = if created {
            CartEvent::CartCreated(cart.to_event_data(None))
        } else {
            CartEvent::CartUpdated(cart.to_event_data(None))
        };
        self.announce(event).await;
        Ok(cart)
    }

    /// Sets a line's quantity. Zero removes the line.
    #[tracing::instrument(skip(self, principal))]
    pub async fn update_quantity(
        &self,
        cart_id: CartId,
        product_id: ProductId,
        quantity: u32,
        principal: &Principal,
    ) -> Result<Cart> {
        let cart = self.get(cart_id, principal).await?;
        if cart.line(product_id).is_none() {
            return Err(DomainError::not_found(
                "CartLine",
                format!("{cart_id}/{product_id}"),
            ));
        }

        let cart = if quantity == 0 {
            self.store.remove_line(cart_id, product_id).await?
        } else {
            let product = self.catalog.product(product_id, principal).await?;
            ensure_in_stock(&product, quantity)?;
            self.store
                .upsert_line(cart_id, priced_line(&product, quantity))
                .await?
        };

        self.announce(CartEvent::CartUpdated(cart.to_event_data(None)))
            .await;
        Ok(cart)
    }

    #[tracing::instrument(skip(self, principal))]
    pub async fn remove_item(
        &self,
        cart_id: CartId,
        product_id: ProductId,
        principal: &Principal,
    ) -> Result<Cart> {
        self.update_quantity(cart_id, product_id, 0, principal)
            .await
    }

    #[tracing::instrument(skip(self, principal))]
    pub async fn clear(&self, cart_id: CartId, principal: &Principal) -> Result<Cart> {
        self.get(cart_id, principal).await?;
        let cart = self.store.clear(cart_id).await?;
        self.announce(CartEvent::CartCleared(cart.to_event_data(None)))
            .await;
        Ok(cart)
    }

    async fn announce(&self, event: CartEvent) {
        if let Err(e) = self
            .publisher
            .publish(exchanges::CART, &[routing_keys::CART_EVENTS], &event)
            .await
        {
            tracing::error!(cart_id = %event.data().cart_id, error = %e, "cart event lost after commit");
        }
    }
}

/// Rejects access to a cart the principal does not own.
fn authorize(principal: &Principal, cart: &Cart) -> Result<()> {
    if principal.can_act_for(cart.user_id) {
        Ok(())
    } else {
        Err(DomainError::Forbidden(format!(
            "cart {} does not belong to user {}",
            cart.id, principal.user_id
        )))
    }
}

fn ensure_in_stock(product: &ProductSnapshot, quantity: u32) -> Result<()> {
    if i64::from(quantity) > product.quantity {
        return Err(DomainError::Validation(format!(
            "only {} of product {} in stock",
            product.quantity, product.id
        )));
    }
    Ok(())
}

fn priced_line(product: &ProductSnapshot, quantity: u32) -> NewCartLine {
    NewCartLine {
        product_id: product.id,
        product_name: Some(product.name.clone()),
        quantity,
        unit_price: product.price,
    }
}
