//! btr-svc library - drawing diff service
//!
//! Exposes the application state, router and job processing for the binary
//! and for integration tests.

pub mod api;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod queue;
pub mod worker;

pub use crate::error::{ApiError, ApiResult};

use std::sync::Arc;

use axum::Router;
use btr_common::blob::BlobStore;
use btr_common::config::{FailurePolicy, TomlConfig};
use btr_common::DiffEngine;
use chrono::{DateTime, Utc};
use tower_http::trace::TraceLayer;

use crate::metrics::{AnomalyThresholds, JobMetrics};
use crate::queue::JobPublisher;
use crate::worker::JobProcessor;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Job lifecycle metrics
    pub metrics: Arc<JobMetrics>,
    /// JSON blob storage for inputs and results
    pub blobs: Arc<dyn BlobStore>,
    /// Queue used by job submission
    pub publisher: Arc<dyn JobPublisher>,
    /// Diff job runner (push endpoint and queue consumer)
    pub processor: Arc<JobProcessor>,
    pub thresholds: AnomalyThresholds,
    pub failure_policy: FailurePolicy,
    /// Bucket holding `results/{job_id}.json`
    pub bucket: String,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    /// Build state from configuration and the injected collaborators
    pub fn new(
        config: &TomlConfig,
        blobs: Arc<dyn BlobStore>,
        publisher: Arc<dyn JobPublisher>,
    ) -> btr_common::Result<Self> {
        let metrics = Arc::new(JobMetrics::with_limits(
            config.metrics.duration_window,
            config.metrics.max_job_records,
        ));
        let engine = DiffEngine::new().with_nearby_threshold(config.diff.nearby_threshold)?;
        let processor = Arc::new(JobProcessor::new(
            Arc::clone(&blobs),
            Arc::clone(&metrics),
            engine,
            config.storage.bucket.clone(),
        ));

        Ok(Self {
            metrics,
            blobs,
            publisher,
            processor,
            thresholds: AnomalyThresholds::from(&config.anomaly),
            failure_policy: config.worker.failure_policy,
            bucket: config.storage.bucket.clone(),
            startup_time: Utc::now(),
        })
    }
}

/// Build identification captured by the build script
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildInfo {
    pub version: &'static str,
    /// `git describe` output, or `unknown` outside a git checkout
    pub revision: &'static str,
    /// UTC, seconds precision
    pub built_at: &'static str,
    pub profile: &'static str,
}

impl BuildInfo {
    pub const fn current() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION"),
            revision: env!("GIT_HASH"),
            built_at: env!("BUILD_TIMESTAMP"),
            profile: env!("BUILD_PROFILE"),
        }
    }
}

impl std::fmt::Display for BuildInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "v{} [{}] built {} ({})",
            self.version, self.revision, self.built_at, self.profile
        )
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::job_routes())
        .merge(api::changes_routes())
        .merge(api::metrics_routes())
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_info_is_embedded() {
        let info = BuildInfo::current();
        assert_eq!(info.version, env!("CARGO_PKG_VERSION"));
        assert!(!info.revision.is_empty());
        assert!(info.profile == "debug" || info.profile == "release");

        // 2025-03-01T12:00:00Z
        assert_eq!(info.built_at.len(), 20);
        assert!(info.built_at.ends_with('Z'));
        assert!(chrono::NaiveDateTime::parse_from_str(info.built_at, "%Y-%m-%dT%H:%M:%SZ").is_ok());

        assert!(info.to_string().starts_with(&format!("v{} [", info.version)));
    }
}
