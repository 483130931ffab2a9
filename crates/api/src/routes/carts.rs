//! Cart endpoints. Every call acts for the authenticated caller.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use common::{CartId, ProductId};
use domain::Cart;
use serde::Deserialize;

use crate::auth::Authenticated;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddItemRequest {
    pub product_id: ProductId,
    pub quantity: u32,
}

#[derive(Debug, Deserialize)]
pub struct UpdateQuantityRequest {
    pub quantity: u32,
}

/// GET /carts/me
pub async fn mine(
    State(state): State<Arc<AppState>>,
    Authenticated(principal): Authenticated,
) -> Result<Json<Cart>, ApiError> {
    Ok(Json(state.carts.my_cart(&principal).await?))
}

/// POST /carts/items: adds to the caller's cart, creating it on first use.
pub async fn add_item(
    State(state): State<Arc<AppState>>,
    Authenticated(principal): Authenticated,
    Json(req): Json<AddItemRequest>,
) -> Result<Json<Cart>, ApiError> {
    let cart = state
        .carts
        .add_item(req.product_id, req.quantity, &principal)
        .await?;
    Ok(Json(cart))
}

/// PUT /carts/{cartId}/items/{productId}: zero removes the line.
pub async fn update_item(
    State(state): State<Arc<AppState>>,
    Authenticated(principal): Authenticated,
    Path((cart_id, product_id)): Path<(CartId, ProductId)>,
    Json(req): Json<UpdateQuantityRequest>,
) -> Result<Json<Cart>, ApiError> {
    let cart = state
        .carts
        .update_quantity(cart_id, product_id, req.quantity, &principal)
        .await?;
    Ok(Json(cart))
}

/// DELETE /carts/{cartId}/items/{productId}
pub async fn remove_item(
    State(state): State<Arc<AppState>>,
    Authenticated(principal): Authenticated,
    Path((cart_id, product_id)): Path<(CartId, ProductId)>,
) -> Result<Json<Cart>, ApiError> {
    let cart = state
        .carts
        .remove_item(cart_id, product_id, &principal)
        .await?;
    Ok(Json(cart))
}

/// DELETE /carts/{cartId}
pub async fn clear(
    State(state): State<Arc<AppState>>,
    Authenticated(principal): Authenticated,
    Path(cart_id): Path<CartId>,
) -> Result<Json<Cart>, ApiError> {
    Ok(Json(state.carts.clear(cart_id, &principal).await?))
}
