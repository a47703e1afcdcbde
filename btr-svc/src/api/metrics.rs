//! Metrics snapshot endpoint

use axum::{extract::State, routing::get, Json, Router};

use crate::metrics::MetricsSnapshot;
use crate::AppState;

/// GET /metrics
pub async fn get_metrics(State(state): State<AppState>) -> Json<MetricsSnapshot> {
    Json(state.metrics.snapshot())
}

pub fn metrics_routes() -> Router<AppState> {
    Router::new().route("/metrics", get(get_metrics))
}
