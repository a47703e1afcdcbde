//! Anomaly evaluation over job metrics
//!
//! Rules, in order, each adding at most one alert (only when jobs exist):
//! 1. Failure rate above `failure_rate_threshold`
//! 2. Share of still-running jobs above `stalled_threshold`
//! 3. Most recent successful job added more than `spike_multiplier` times
//!    the average additions per successful job

use std::collections::HashMap;

use btr_common::config::AnomalyConfig;
use btr_common::time::round_to;
use serde::{Serialize, Serializer};

use super::store::{JobRecord, JobStatus, MetricsSnapshot};

/// Alert thresholds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnomalyThresholds {
    pub failure_rate_threshold: f64,
    pub stalled_threshold: f64,
    pub spike_multiplier: f64,
}

impl Default for AnomalyThresholds {
    fn default() -> Self {
        Self {
            failure_rate_threshold: 0.10,
            stalled_threshold: 0.20,
            spike_multiplier: 10.0,
        }
    }
}

impl From<&AnomalyConfig> for AnomalyThresholds {
    fn from(config: &AnomalyConfig) -> Self {
        Self {
            failure_rate_threshold: config.failure_rate_threshold,
            stalled_threshold: config.stalled_threshold,
            spike_multiplier: config.spike_multiplier,
        }
    }
}

/// Overall service health
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

/// Summary figures reported next to the alerts
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSummary {
    pub total_jobs: usize,
    /// Percentage of successful jobs; serialized as `"{:.1}%"`
    #[serde(serialize_with = "serialize_percent")]
    pub success_rate: f64,
    pub p99_latency_ms: f64,
}

/// Health evaluation result
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub alerts: Vec<String>,
    pub metrics_summary: MetricsSummary,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}

fn serialize_percent<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format!("{:.1}%", value))
}

/// Evaluate alert rules against a snapshot and the job records it came from
pub fn evaluate(
    snapshot: &MetricsSnapshot,
    jobs: &HashMap<String, JobRecord>,
    thresholds: &AnomalyThresholds,
) -> HealthReport {
    let mut alerts = Vec::new();
    let total = snapshot.jobs_total;

    if total > 0 {
        let failure_rate = snapshot.jobs_failed as f64 / total as f64;
        if failure_rate > thresholds.failure_rate_threshold {
            alerts.push(format!("High failure rate: {:.1}%", failure_rate * 100.0));
        }

        let running_rate = snapshot.jobs_running as f64 / total as f64;
        if running_rate > thresholds.stalled_threshold {
            alerts.push(format!("High stalled jobs: {:.1}%", running_rate * 100.0));
        }

        if snapshot.jobs_success > 0 {
            let avg_added = snapshot.total_objects_added as f64 / snapshot.jobs_success as f64;
            if let Some(last) = most_recent_success(jobs) {
                let last_added = last.added_count.unwrap_or(0);
                if avg_added > 0.0 && last_added as f64 > thresholds.spike_multiplier * avg_added {
                    alerts.push(format!(
                        "Spike detected: last job has {} additions vs {:.1} average",
                        last_added, avg_added
                    ));
                }
            }
        }
    }

    let success_rate = if total > 0 {
        snapshot.jobs_success as f64 / total as f64 * 100.0
    } else {
        0.0
    };

    let status = if alerts.is_empty() {
        HealthStatus::Healthy
    } else {
        HealthStatus::Degraded
    };

    HealthReport {
        status,
        alerts,
        metrics_summary: MetricsSummary {
            total_jobs: total,
            success_rate,
            p99_latency_ms: round_to(snapshot.p99 * 1000.0, 2),
        },
    }
}

/// Successful record with the latest end time (ties: greatest job id)
fn most_recent_success(jobs: &HashMap<String, JobRecord>) -> Option<&JobRecord> {
    jobs.iter()
        .filter(|(_, record)| record.status == JobStatus::Success)
        .filter_map(|(job_id, record)| record.end_time.map(|end| (end, job_id, record)))
        .max_by(|(end_a, id_a, _), (end_b, id_b, _)| end_a.cmp(end_b).then_with(|| id_a.cmp(id_b)))
        .map(|(_, _, record)| record)
}
