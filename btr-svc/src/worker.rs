//! Diff job processing
//!
//! For each job: read both drawing versions from the blob store, run the diff
//! engine, write the change report to `results/{job_id}.json`, and report the
//! outcome to the metrics store. Failures are never retried here; the
//! [`FailurePolicy`] decides what the transport is told.

use std::sync::Arc;

use btr_common::blob::{results_uri, BlobStore};
use btr_common::config::FailurePolicy;
use btr_common::{ChangeReport, DiffEngine, DrawingVersion, Result};
use tracing::{debug, error, info};

use crate::metrics::JobMetrics;
use crate::queue::JobMessage;

/// Result of processing one job
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Completed {
        job_id: String,
        results_uri: String,
        report: ChangeReport,
    },
    Failed {
        job_id: String,
        error: String,
    },
}

/// What the queue transport should do with the delivered message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Message handled; do not redeliver
    Ack,
    /// Message should be redelivered
    Redeliver,
}

impl JobOutcome {
    pub fn job_id(&self) -> &str {
        match self {
            JobOutcome::Completed { job_id, .. } | JobOutcome::Failed { job_id, .. } => job_id,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, JobOutcome::Completed { .. })
    }

    /// Delivery decision under `policy`; completed jobs are always acknowledged
    pub fn delivery(&self, policy: FailurePolicy) -> Delivery {
        match (self, policy) {
            (JobOutcome::Completed { .. }, _) => Delivery::Ack,
            (JobOutcome::Failed { .. }, FailurePolicy::Acknowledge) => Delivery::Ack,
            (JobOutcome::Failed { .. }, FailurePolicy::Redeliver) => Delivery::Redeliver,
        }
    }
}

/// Runs diff jobs against a blob store and reports to the metrics store
pub struct JobProcessor {
    blobs: Arc<dyn BlobStore>,
    metrics: Arc<JobMetrics>,
    engine: DiffEngine,
    /// Bucket receiving `results/{job_id}.json`
    bucket: String,
}

impl JobProcessor {
    pub fn new(
        blobs: Arc<dyn BlobStore>,
        metrics: Arc<JobMetrics>,
        engine: DiffEngine,
        bucket: impl Into<String>,
    ) -> Self {
        Self {
            blobs,
            metrics,
            engine,
            bucket: bucket.into(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Process one job and record its outcome
    pub async fn process(&self, message: &JobMessage) -> JobOutcome {
        match self.run(message).await {
            Ok((results_uri, report)) => {
                self.metrics.mark_end(&message.job_id, true, Some(&report));
                info!(
                    job_id = %message.job_id,
                    added = report.added.len(),
                    removed = report.removed.len(),
                    moved = report.moved.len(),
                    "Job completed"
                );
                JobOutcome::Completed {
                    job_id: message.job_id.clone(),
                    results_uri,
                    report,
                }
            }
            Err(e) => {
                self.metrics.mark_end(&message.job_id, false, None);
                error!(job_id = %message.job_id, error = %e, "Job failed");
                JobOutcome::Failed {
                    job_id: message.job_id.clone(),
                    error: e.to_string(),
                }
            }
        }
    }

    /// Record a failure for a delivery that could not be turned into a job
    pub fn record_undecodable(&self, job_id: &str, detail: &str) {
        self.metrics.mark_end(job_id, false, None);
        error!(job_id, detail, "Undecodable job message");
    }

    async fn run(&self, message: &JobMessage) -> Result<(String, ChangeReport)> {
        debug!(job_id = %message.job_id, uri = %message.a, "Reading version A");
        let a = DrawingVersion::from_json(&self.blobs.read(&message.a).await?)?;

        debug!(job_id = %message.job_id, uri = %message.b, "Reading version B");
        let b = DrawingVersion::from_json(&self.blobs.read(&message.b).await?)?;

        let report = self.engine.diff(&a, &b);

        let out_uri = results_uri(&self.bucket, &message.job_id);
        self.blobs.write(&out_uri, &serde_json::to_value(&report)?).await?;
        debug!(job_id = %message.job_id, uri = %out_uri, "Wrote change report");

        Ok((out_uri, report))
    }
}
