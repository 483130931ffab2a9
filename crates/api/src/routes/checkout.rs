//! Checkout endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use checkout::CheckoutReceipt;
use common::CartId;
use serde::Deserialize;

use crate::auth::Authenticated;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    #[serde(default)]
    pub ship_address: String,
}

/// POST /checkout/{cartId}: turns the cart into an invoice.
#[tracing::instrument(skip(state, principal, req), fields(user_id = %principal.user_id))]
pub async fn checkout(
    State(state): State<Arc<AppState>>,
    Authenticated(principal): Authenticated,
    Path(cart_id): Path<CartId>,
    Json(req): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<CheckoutReceipt>), ApiError> {
    let receipt = state
        .checkout
        .checkout(cart_id, &req.ship_address, &principal)
        .await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}
