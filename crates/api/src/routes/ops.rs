//! Liveness and Prometheus scrape endpoints.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;
use event_bus::topology::queues;
use event_bus::{EventBus, dead_letter_queue};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;

use crate::state::AppState;

const CONSUMED_QUEUES: [&str; 5] = [
    queues::PRODUCT_ORDER,
    queues::INVOICE_PAYMENT,
    queues::EMAIL_PAYMENT,
    queues::EMAIL_INVOICE,
    queues::EMAIL_AUTH,
];

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// `degraded` when any consumed queue could not be inspected.
    pub status: &'static str,
    /// Waiting messages per consumed queue.
    pub backlog: BTreeMap<&'static str, usize>,
    /// Dead-lettered messages per consumed queue, when any.
    pub dead_letters: BTreeMap<String, usize>,
}

/// GET /health
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let mut backlog = BTreeMap::new();
    let mut dead_letters = BTreeMap::new();
    let mut status = "ok";
    for queue in CONSUMED_QUEUES {
        match state.bus.queue_stats(queue).await {
            Ok(stats) => {
                backlog.insert(queue, stats.ready);
                if stats.dead_lettered > 0 {
                    dead_letters.insert(dead_letter_queue(queue), stats.dead_lettered);
                }
            }
            Err(e) => {
                tracing::warn!(queue, error = %e, "queue stats unavailable");
                status = "degraded";
            }
        }
    }

    Json(HealthResponse {
        status,
        backlog,
        dead_letters,
    })
}

/// GET /metrics
pub async fn metrics(State(handle): State<PrometheusHandle>) -> impl IntoResponse {
    (
        [(CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        handle.render(),
    )
}
