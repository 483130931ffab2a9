//! HTTP surface and process wiring for the order-fulfillment services.
//!
//! Carts, checkout, invoices, payments and products are served from one
//! router; the queue consumers run beside it. Callers authenticate with a
//! bearer token, turned into a [`common::Principal`] that is handed to every
//! service call. Structured logging comes from `tracing`, metrics from the
//! `metrics` facade rendered at `/metrics`.

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;
pub mod state;
pub mod workers;

use std::sync::Arc;

use axum::Router;
use axum::routing::{delete, get, patch, post, put};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use auth::{Authenticated, StaticTokenVerifier, TokenVerifier};
pub use config::Config;
pub use error::{ApiError, StartupError};
pub use state::{AppState, Stores};

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::ops::metrics))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::ops::health))
        // carts
        .route("/carts/me", get(routes::carts::mine))
        .route("/carts/items", post(routes::carts::add_item))
        .route("/carts/{cart_id}", delete(routes::carts::clear))
        .route(
            "/carts/{cart_id}/items/{product_id}",
            put(routes::carts::update_item).delete(routes::carts::remove_item),
        )
        .route("/checkout/{cart_id}", post(routes::checkout::checkout))
        // invoices
        .route(
            "/invoices/create-from-cart",
            post(routes::invoices::create_from_cart),
        )
        .route(
            "/invoices/{invoice_id}",
            get(routes::invoices::get).delete(routes::invoices::delete),
        )
        .route("/invoices/user/{user_id}", get(routes::invoices::list_for_user))
        .route(
            "/invoices/{invoice_id}/status",
            put(routes::invoices::update_status),
        )
        .route(
            "/invoices/{invoice_id}/items/{item_id}",
            patch(routes::invoices::update_item),
        )
        // payments
        .route("/payments/create", post(routes::payments::create))
        .route("/payments/callback", get(routes::payments::callback))
        .route("/payments/status/{invoice_id}", get(routes::payments::status))
        // products
        .route("/products", post(routes::products::create))
        .route("/products/{product_id}", get(routes::products::get))
        .route(
            "/products/{product_id}/inventory",
            patch(routes::products::update_inventory),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
