use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use common::{CartId, CartLineId, ProductId, UserId};
use tokio::sync::RwLock;

use super::{Cart, CartLine, NewCartLine};
use crate::error::{DomainError, Result};

/// Persistence for carts. Every mutation returns the cart as stored, with
/// its total recomputed from the lines.
#[async_trait]
pub trait CartStore: Send + Sync {
    async fn find_by_user(&self, user_id: UserId) -> Result<Option<Cart>>;

    async fn get(&self, cart_id: CartId) -> Result<Option<Cart>>;

    /// Returns the user's cart, creating an empty one if there is none.
    /// The flag is true when the cart was created by this call.
    async fn get_or_create(&self, user_id: UserId) -> Result<(Cart, bool)>;

    /// Inserts the line, or replaces quantity and price of the existing
    /// line for the same product.
    async fn upsert_line(&self, cart_id: CartId, line: NewCartLine) -> Result<Cart>;

    async fn remove_line(&self, cart_id: CartId, product_id: ProductId) -> Result<Cart>;

    /// Removes every line. The cart itself survives.
    async fn clear(&self, cart_id: CartId) -> Result<Cart>;
}

#[async_trait]
impl<T: CartStore + ?Sized> CartStore for Arc<T> {
    async fn find_by_user(&self, user_id: UserId) -> Result<Option<Cart>> {
        (**self).find_by_user(user_id).await
    }

    async fn get(&self, cart_id: CartId) -> Result<Option<Cart>> {
        (**self).get(cart_id).await
    }

    async fn get_or_create(&self, user_id: UserId) -> Result<(Cart, bool)> {
        (**self).get_or_create(user_id).await
    }

    async fn upsert_line(&self, cart_id: CartId, line: NewCartLine) -> Result<Cart> {
        (**self).upsert_line(cart_id, line).await
    }

    async fn remove_line(&self, cart_id: CartId, product_id: ProductId) -> Result<Cart> {
        (**self).remove_line(cart_id, product_id).await
    }

    async fn clear(&self, cart_id: CartId) -> Result<Cart> {
        (**self).clear(cart_id).await
    }
}

#[derive(Debug, Default)]
struct CartTable {
    next_cart_id: i64,
    next_line_id: i64,
    carts: BTreeMap<CartId, Cart>,
}

impl CartTable {
    fn cart_mut(&mut self, cart_id: CartId) -> Result<&mut Cart> {
        self.carts
            .get_mut(&cart_id)
            .ok_or_else(|| DomainError::not_found("Cart", cart_id))
    }
}

fn touch(cart: &mut Cart) {
    cart.total = cart.lines_total();
    cart.updated_at = Utc::now();
}

/// In-memory cart store for tests and single-process deployments.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCartStore {
    table: Arc<RwLock<CartTable>>,
}

impl InMemoryCartStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CartStore for InMemoryCartStore {
    async fn find_by_user(&self, user_id: UserId) -> Result<Option<Cart>> {
        let table = self.table.read().await;
        Ok(table
            .carts
            .values()
            .find(|cart| cart.user_id == user_id)
            .cloned())
    }

    async fn get(&self, cart_id: CartId) -> Result<Option<Cart>> {
        Ok(self.table.read().await.carts.get(&cart_id).cloned())
    }

    async fn get_or_create(&self, user_id: UserId) -> Result<(Cart, bool)> {
        let mut table = self.table.write().await;
        if let Some(cart) = table.carts.values().find(|cart| cart.user_id == user_id) {
            return Ok((cart.clone(), false));
        }

        table.next_cart_id += 1;
        let cart = Cart {
            id: CartId::new(table.next_cart_id),
            user_id,
            lines: Vec::new(),
            total: Default::default(),
            updated_at: Utc::now(),
        };
        table.carts.insert(cart.id, cart.clone());
        Ok((cart, true))
    }

    async fn upsert_line(&self, cart_id: CartId, line: NewCartLine) -> Result<Cart> {
        let mut table = self.table.write().await;
        table.next_line_id += 1;
        let line_id = CartLineId::new(table.next_line_id);
        let cart = table.cart_mut(cart_id)?;

        let total = line.total();
        match cart
            .lines
            .iter_mut()
            .find(|existing| existing.product_id == line.product_id)
        {
            Some(existing) => {
                existing.quantity = line.quantity;
                existing.unit_price = line.unit_price;
                existing.total = total;
                if line.product_name.is_some() {
                    existing.product_name = line.product_name;
                }
            }
            None => cart.lines.push(CartLine {
                id: line_id,
                cart_id,
                product_id: line.product_id,
                product_name: line.product_name,
                quantity: line.quantity,
                unit_price: line.unit_price,
                total,
            }),
        }
        touch(cart);
        Ok(cart.clone())
    }

    async fn remove_line(&self, cart_id: CartId, product_id: ProductId) -> Result<Cart> {
        let mut table = self.table.write().await;
        let cart = table.cart_mut(cart_id)?;
        cart.lines.retain(|line| line.product_id != product_id);
        touch(cart);
        Ok(cart.clone())
    }

    async fn clear(&self, cart_id: CartId) -> Result<Cart> {
        let mut table = self.table.write().await;
        let cart = table.cart_mut(cart_id)?;
        cart.lines.clear();
        touch(cart);
        Ok(cart.clone())
    }
}
