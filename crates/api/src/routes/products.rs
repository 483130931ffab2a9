//! Product and stock endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::ProductId;
use domain::{InventoryChange, InventoryEntry, NewProduct};
use serde::Deserialize;

use crate::auth::Authenticated;
use crate::error::ApiError;
use crate::state::AppState;

/// Body of `PATCH /products/{id}/inventory`: exactly one of an absolute
/// level or a signed delta.
#[derive(Debug, Deserialize)]
pub struct InventoryUpdateRequest {
    #[serde(default)]
    pub quantity: Option<i64>,
    #[serde(default)]
    pub delta: Option<i64>,
}

/// GET /products/{id}
pub async fn get(
    State(state): State<Arc<AppState>>,
    _caller: Authenticated,
    Path(product_id): Path<ProductId>,
) -> Result<Json<InventoryEntry>, ApiError> {
    Ok(Json(state.inventory.get(product_id).await?))
}

/// POST /products (admin)
pub async fn create(
    State(state): State<Arc<AppState>>,
    caller: Authenticated,
    Json(product): Json<NewProduct>,
) -> Result<(StatusCode, Json<InventoryEntry>), ApiError> {
    caller.require_admin()?;
    let entry = state.inventory.create_product(product).await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

/// PATCH /products/{id}/inventory: sets or shifts stock through the
/// compare-and-swap path; a delta is clamped at zero.
#[tracing::instrument(skip(state, _caller))]
pub async fn update_inventory(
    State(state): State<Arc<AppState>>,
    _caller: Authenticated,
    Path(product_id): Path<ProductId>,
    Json(req): Json<InventoryUpdateRequest>,
) -> Result<Json<InventoryChange>, ApiError> {
    let change = match (req.quantity, req.delta) {
        (Some(quantity), None) => state.inventory.restock(product_id, quantity).await?,
        (None, Some(delta)) => state.inventory.adjust(product_id, delta).await?,
        _ => {
            return Err(ApiError::BadRequest(
                "exactly one of quantity or delta is required".to_string(),
            ));
        }
    };
    Ok(Json(change))
}
