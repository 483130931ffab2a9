//! Payment endpoints: session creation, the gateway callback and status.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use common::InvoiceId;
use payment::{CallbackOutcome, PaymentRequest, PaymentSession, PaymentStatusView};

use crate::auth::Authenticated;
use crate::error::ApiError;
use crate::state::AppState;

const FALLBACK_CLIENT_IP: &str = "127.0.0.1";

/// The originating client address as reported by the proxy in front.
fn client_ip(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .unwrap_or(FALLBACK_CLIENT_IP)
        .to_string()
}

/// POST /payments/create
pub async fn create(
    State(state): State<Arc<AppState>>,
    Authenticated(principal): Authenticated,
    headers: HeaderMap,
    Json(req): Json<PaymentRequest>,
) -> Result<Json<PaymentSession>, ApiError> {
    let session = state
        .payments
        .create_payment_session(&req, &principal, &client_ip(&headers))
        .await?;
    Ok(Json(session))
}

/// GET /payments/callback: the gateway redirect. Unauthenticated; the
/// signature is the credential.
pub async fn callback(
    State(state): State<Arc<AppState>>,
    Query(params): Query<BTreeMap<String, String>>,
) -> Result<Json<CallbackOutcome>, ApiError> {
    Ok(Json(state.payments.handle_callback(&params).await?))
}

/// GET /payments/status/{invoiceId}
pub async fn status(
    State(state): State<Arc<AppState>>,
    Authenticated(principal): Authenticated,
    Path(invoice_id): Path<InvoiceId>,
) -> Result<Json<PaymentStatusView>, ApiError> {
    let view = state
        .payments
        .get_status(invoice_id, Some(&principal))
        .await?;
    Ok(Json(view))
}
