//! Job metrics store
//!
//! Tracks the lifecycle of diff jobs (`running` → `success`/`failed`), keeps a
//! bounded window of recent durations for latency percentiles, and aggregates
//! change counts across every retained record.
//!
//! All state sits behind one mutex so each operation, including
//! [`JobMetrics::snapshot_with_jobs`], observes a consistent point in time.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use btr_common::time::{self, round_to, seconds_between};
use btr_common::ChangeReport;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Default number of durations retained for percentiles
pub const DEFAULT_DURATION_WINDOW: usize = 1000;

/// Job lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Running,
    Success,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Running)
    }
}

/// Per-job record
///
/// Counts are present only for successful jobs that reported a result.
/// Records created by `mark_end` for a never-started job carry neither
/// `start_time` nor `duration`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    /// Seconds between start and end
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub added_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub removed_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub moved_count: Option<usize>,
}

impl JobRecord {
    fn running(start_time: DateTime<Utc>) -> Self {
        Self {
            status: JobStatus::Running,
            start_time: Some(start_time),
            end_time: None,
            duration: None,
            added_count: None,
            removed_count: None,
            moved_count: None,
        }
    }

    fn terminal_only(status: JobStatus, end_time: DateTime<Utc>) -> Self {
        Self {
            status,
            start_time: None,
            end_time: Some(end_time),
            duration: None,
            added_count: None,
            removed_count: None,
            moved_count: None,
        }
    }
}

/// Point-in-time aggregate view
///
/// Field names are the `/metrics` wire contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Latency percentiles in seconds, rounded to 2 decimals
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
    pub jobs_total: usize,
    pub jobs_success: usize,
    pub jobs_failed: usize,
    pub jobs_running: usize,
    pub total_objects_added: usize,
    pub total_objects_removed: usize,
    pub total_objects_moved: usize,
}

/// Nearest-rank percentile estimator
///
/// Sorts a copy of `values` and returns the element at
/// `max(0, floor(p/100 * count) - 1)`, clamped to the last element.
/// Returns `0.0` for empty input.
pub fn percentile(p: f64, values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let rank = ((p / 100.0) * sorted.len() as f64).floor() as i64 - 1;
    let index = (rank.max(0) as usize).min(sorted.len() - 1);
    sorted[index]
}

#[derive(Debug, Default)]
struct MetricsState {
    jobs: HashMap<String, JobRecord>,
    /// Job ids in first-insertion order (eviction candidates)
    insertion_order: VecDeque<String>,
    durations: VecDeque<f64>,
    records_evicted: u64,
}

impl MetricsState {
    fn insert(&mut self, job_id: &str, record: JobRecord) {
        if self.jobs.insert(job_id.to_string(), record).is_none() {
            self.insertion_order.push_back(job_id.to_string());
        }
    }

    fn push_duration(&mut self, duration: f64, window_size: usize) {
        self.durations.push_back(duration);
        while self.durations.len() > window_size {
            self.durations.pop_front();
        }
    }

    /// Evict oldest terminal records beyond `max_records`; running jobs stay
    fn enforce_retention(&mut self, max_records: usize) {
        while self.jobs.len() > max_records {
            let position = self.insertion_order.iter().position(|id| {
                self.jobs
                    .get(id)
                    .map(|record| record.status.is_terminal())
                    .unwrap_or(false)
            });
            let Some(position) = position else {
                break;
            };
            if let Some(job_id) = self.insertion_order.remove(position) {
                self.jobs.remove(&job_id);
                self.records_evicted += 1;
                warn!(
                    job_id = %job_id,
                    max_records,
                    "Evicted job record; aggregate counts no longer include it"
                );
            }
        }
    }

    fn snapshot(&self) -> MetricsSnapshot {
        let mut snapshot = MetricsSnapshot {
            p50: 0.0,
            p95: 0.0,
            p99: 0.0,
            jobs_total: self.jobs.len(),
            jobs_success: 0,
            jobs_failed: 0,
            jobs_running: 0,
            total_objects_added: 0,
            total_objects_removed: 0,
            total_objects_moved: 0,
        };

        for record in self.jobs.values() {
            match record.status {
                JobStatus::Success => snapshot.jobs_success += 1,
                JobStatus::Failed => snapshot.jobs_failed += 1,
                JobStatus::Running => snapshot.jobs_running += 1,
            }
            snapshot.total_objects_added += record.added_count.unwrap_or(0);
            snapshot.total_objects_removed += record.removed_count.unwrap_or(0);
            snapshot.total_objects_moved += record.moved_count.unwrap_or(0);
        }

        let (front, back) = self.durations.as_slices();
        let durations = [front, back].concat();
        snapshot.p50 = round_to(percentile(50.0, &durations), 2);
        snapshot.p95 = round_to(percentile(95.0, &durations), 2);
        snapshot.p99 = round_to(percentile(99.0, &durations), 2);
        snapshot
    }
}

/// Shared job metrics aggregator
///
/// Constructed explicitly and shared through `Arc` (see `AppState`).
#[derive(Debug)]
pub struct JobMetrics {
    state: Mutex<MetricsState>,
    window_size: usize,
    /// 0 disables record eviction
    max_job_records: usize,
}

impl Default for JobMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl JobMetrics {
    /// Create store with the default 1000-entry duration window and no record cap
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_DURATION_WINDOW, 0)
    }

    /// Create store with explicit window size and record cap (0 = unbounded)
    pub fn with_limits(window_size: usize, max_job_records: usize) -> Self {
        Self {
            state: Mutex::new(MetricsState::default()),
            window_size: window_size.max(1),
            max_job_records,
        }
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    // A panic while holding the lock leaves the maps intact; keep serving them.
    fn lock(&self) -> MutexGuard<'_, MetricsState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record a job start ("last start wins" for repeated ids)
    pub fn mark_start(&self, job_id: &str) {
        self.mark_start_at(job_id, time::now());
    }

    pub fn mark_start_at(&self, job_id: &str, at: DateTime<Utc>) {
        let mut state = self.lock();
        if state.jobs.contains_key(job_id) {
            debug!(job_id, "Restarting job, previous timing discarded");
        }
        state.insert(job_id, JobRecord::running(at));
        if self.max_job_records > 0 {
            state.enforce_retention(self.max_job_records);
        }
    }

    /// Record a job end
    ///
    /// Unknown job ids (or records without a start time) get a terminal-only
    /// record that contributes no duration.
    pub fn mark_end(&self, job_id: &str, ok: bool, result: Option<&ChangeReport>) {
        self.mark_end_at(job_id, ok, result, time::now());
    }

    pub fn mark_end_at(
        &self,
        job_id: &str,
        ok: bool,
        result: Option<&ChangeReport>,
        at: DateTime<Utc>,
    ) {
        let status = if ok { JobStatus::Success } else { JobStatus::Failed };
        let mut state = self.lock();

        let start_time = state.jobs.get(job_id).and_then(|record| record.start_time);
        match start_time {
            Some(start_time) => {
                let duration = seconds_between(start_time, at);
                state.push_duration(duration, self.window_size);

                if let Some(record) = state.jobs.get_mut(job_id) {
                    record.status = status;
                    record.end_time = Some(at);
                    record.duration = Some(duration);
                    // Counts belong to a successful end with a result only
                    let counts = result
                        .filter(|_| ok)
                        .map(|report| (report.added.len(), report.removed.len(), report.moved.len()));
                    record.added_count = counts.map(|c| c.0);
                    record.removed_count = counts.map(|c| c.1);
                    record.moved_count = counts.map(|c| c.2);
                }
                debug!(job_id, ?status, duration, "Job ended");
            }
            None => {
                debug!(job_id, ?status, "Job ended without recorded start");
                state.insert(job_id, JobRecord::terminal_only(status, at));
            }
        }

        if self.max_job_records > 0 {
            state.enforce_retention(self.max_job_records);
        }
    }

    /// Aggregate view over all retained records
    pub fn snapshot(&self) -> MetricsSnapshot {
        self.lock().snapshot()
    }

    /// Snapshot and job map taken under a single lock acquisition
    pub fn snapshot_with_jobs(&self) -> (MetricsSnapshot, HashMap<String, JobRecord>) {
        let state = self.lock();
        (state.snapshot(), state.jobs.clone())
    }

    /// Copy of all job records
    pub fn jobs(&self) -> HashMap<String, JobRecord> {
        self.lock().jobs.clone()
    }

    pub fn job(&self, job_id: &str) -> Option<JobRecord> {
        self.lock().jobs.get(job_id).cloned()
    }

    /// Duration window contents, oldest first
    pub fn durations(&self) -> Vec<f64> {
        self.lock().durations.iter().copied().collect()
    }

    /// Number of records dropped by the retention cap
    pub fn records_evicted(&self) -> u64 {
        self.lock().records_evicted
    }
}
