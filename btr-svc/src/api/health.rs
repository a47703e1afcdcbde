//! Health check endpoint with anomaly detection

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::metrics::{evaluate, HealthReport};
use crate::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    #[serde(flatten)]
    pub report: HealthReport,
    /// Module name ("btr-svc")
    pub module: String,
    /// Crate version from Cargo.toml
    pub version: String,
    /// Seconds since service started
    pub uptime_seconds: u64,
}

/// GET /health
///
/// Evaluates alert rules against one consistent metrics read.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let (snapshot, jobs) = state.metrics.snapshot_with_jobs();
    let report = evaluate(&snapshot, &jobs, &state.thresholds);

    let uptime = Utc::now().signed_duration_since(state.startup_time);

    Json(HealthResponse {
        report,
        module: "btr-svc".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: uptime.num_seconds().max(0) as u64,
    })
}

/// Build health check routes
pub fn health_routes() -> Router<crate::AppState> {
    Router::new().route("/health", get(health_check))
}
