//! Invoice endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::{InvoiceId, InvoiceItemId, Money, UserId};
use domain::{CreateInvoiceRequest, DomainError, Invoice, InvoiceStatus};
use serde::Deserialize;

use crate::auth::Authenticated;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdateRequest {
    pub status: InvoiceStatus,
    #[serde(default)]
    pub transaction_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ItemUpdateRequest {
    #[serde(default)]
    pub quantity: Option<u32>,
    #[serde(default)]
    pub price: Option<Money>,
}

/// POST /invoices/create-from-cart: called by checkout, in process or over
/// HTTP, with the customer's own token.
#[tracing::instrument(skip(state, principal, req), fields(user_id = %req.user_id))]
pub async fn create_from_cart(
    State(state): State<Arc<AppState>>,
    Authenticated(principal): Authenticated,
    Json(req): Json<CreateInvoiceRequest>,
) -> Result<(StatusCode, Json<Invoice>), ApiError> {
    if !principal.can_act_for(req.user_id) {
        return Err(DomainError::Forbidden(format!(
            "user {} cannot create invoices for user {}",
            principal.user_id, req.user_id
        ))
        .into());
    }
    let invoice = state.invoices.create_from_cart(&req).await?;
    Ok((StatusCode::CREATED, Json(invoice)))
}

/// GET /invoices/{id}
pub async fn get(
    State(state): State<Arc<AppState>>,
    Authenticated(principal): Authenticated,
    Path(invoice_id): Path<InvoiceId>,
) -> Result<Json<Invoice>, ApiError> {
    Ok(Json(state.invoices.get(invoice_id, &principal).await?))
}

/// GET /invoices/user/{userId}
pub async fn list_for_user(
    State(state): State<Arc<AppState>>,
    Authenticated(principal): Authenticated,
    Path(user_id): Path<UserId>,
) -> Result<Json<Vec<Invoice>>, ApiError> {
    Ok(Json(state.invoices.list_for_user(user_id, &principal).await?))
}

/// PUT /invoices/{id}/status (admin)
pub async fn update_status(
    State(state): State<Arc<AppState>>,
    caller: Authenticated,
    Path(invoice_id): Path<InvoiceId>,
    Json(req): Json<StatusUpdateRequest>,
) -> Result<Json<Invoice>, ApiError> {
    caller.require_admin()?;
    let invoice = state
        .invoices
        .update_status(invoice_id, req.status, req.transaction_id.as_deref())
        .await?;
    Ok(Json(invoice))
}

/// PATCH /invoices/{id}/items/{itemId} (admin)
pub async fn update_item(
    State(state): State<Arc<AppState>>,
    caller: Authenticated,
    Path((invoice_id, item_id)): Path<(InvoiceId, InvoiceItemId)>,
    Json(req): Json<ItemUpdateRequest>,
) -> Result<Json<Invoice>, ApiError> {
    caller.require_admin()?;
    let invoice = state
        .invoices
        .update_item(invoice_id, item_id, req.quantity, req.price)
        .await?;
    Ok(Json(invoice))
}

/// DELETE /invoices/{id} (admin): the items go with it.
pub async fn delete(
    State(state): State<Arc<AppState>>,
    caller: Authenticated,
    Path(invoice_id): Path<InvoiceId>,
) -> Result<StatusCode, ApiError> {
    caller.require_admin()?;
    state.invoices.delete(invoice_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
