//! Job metrics aggregation and health evaluation

pub mod anomaly;
pub mod store;

pub use anomaly::{evaluate, AnomalyThresholds, HealthReport, HealthStatus, MetricsSummary};
pub use store::{percentile, JobMetrics, JobRecord, JobStatus, MetricsSnapshot};
