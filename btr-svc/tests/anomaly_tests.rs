//! Integration tests for health evaluation
//!
//! Drives a real `JobMetrics` store and evaluates its snapshot.

use btr_common::ChangeReport;
use btr_svc::metrics::{evaluate, AnomalyThresholds, HealthReport, HealthStatus, JobMetrics};
use chrono::{DateTime, Duration, TimeZone, Utc};

fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
}

fn additions(count: usize) -> ChangeReport {
    ChangeReport {
        added: (0..count).map(|i| format!("N{} (column at 0,0)", i)).collect(),
        ..ChangeReport::default()
    }
}

/// Run a successful job ending `offset` seconds after the base time
fn succeed(metrics: &JobMetrics, job_id: &str, offset: i64, added: usize) {
    let start = base_time() + Duration::seconds(offset);
    metrics.mark_start_at(job_id, start);
    metrics.mark_end_at(job_id, true, Some(&additions(added)), start + Duration::milliseconds(100));
}

fn health(metrics: &JobMetrics) -> HealthReport {
    let (snapshot, jobs) = metrics.snapshot_with_jobs();
    evaluate(&snapshot, &jobs, &AnomalyThresholds::default())
}

#[test]
fn test_all_successful_jobs_healthy() {
    let metrics = JobMetrics::new();
    for i in 0..5 {
        succeed(&metrics, &format!("J{}", i), i, 2);
    }

    let report = health(&metrics);
    assert_eq!(report.status, HealthStatus::Healthy);
    assert!(report.alerts.is_empty());
    assert_eq!(report.metrics_summary.total_jobs, 5);
    assert_eq!(report.metrics_summary.success_rate, 100.0);
    assert_eq!(report.metrics_summary.p99_latency_ms, 100.0);
}

#[test]
fn test_high_failure_rate_alert() {
    let metrics = JobMetrics::new();
    for i in 0..8 {
        succeed(&metrics, &format!("J{}", i), i, 1);
    }
    metrics.mark_start("F1");
    metrics.mark_end("F1", false, None);
    metrics.mark_start("F2");
    metrics.mark_end("F2", false, None);

    let report = health(&metrics);
    assert_eq!(report.status, HealthStatus::Degraded);
    assert_eq!(report.alerts, vec!["High failure rate: 20.0%".to_string()]);

    let value = serde_json::to_value(&report).unwrap();
    assert_eq!(value["status"], "degraded");
    assert_eq!(value["metrics_summary"]["success_rate"], "80.0%");
}

#[test]
fn test_stalled_jobs_alert() {
    let metrics = JobMetrics::new();
    for i in 0..3 {
        succeed(&metrics, &format!("J{}", i), i, 1);
    }
    metrics.mark_start("R1");

    let report = health(&metrics);
    assert_eq!(report.alerts, vec!["High stalled jobs: 25.0%".to_string()]);
}

#[test]
fn test_spike_not_triggered_when_last_is_below_threshold() {
    // Nine jobs add 1, the last adds 50: avg 5.9, threshold 59
    let metrics = JobMetrics::new();
    for i in 0..9 {
        succeed(&metrics, &format!("J{:02}", i), i, 1);
    }
    succeed(&metrics, "J09", 9, 50);

    let report = health(&metrics);
    assert!(report.is_healthy(), "unexpected alerts: {:?}", report.alerts);
}

#[test]
fn test_spike_triggered_for_most_recent_job() {
    // Nineteen jobs add 1, the last adds 100: avg 5.95, threshold 59.5
    let metrics = JobMetrics::new();
    for i in 0..19 {
        succeed(&metrics, &format!("J{:02}", i), i, 1);
    }
    succeed(&metrics, "J19", 19, 100);

    let report = health(&metrics);
    assert_eq!(report.status, HealthStatus::Degraded);
    assert_eq!(report.alerts.len(), 1);
    assert!(
        report.alerts[0].starts_with("Spike detected: last job has 100 additions vs"),
        "unexpected alert: {}",
        report.alerts[0]
    );
}

#[test]
fn test_spike_uses_latest_end_time_not_insertion_order() {
    let metrics = JobMetrics::new();
    // Big job started first but ended early
    succeed(&metrics, "BIG", -100, 100);
    for i in 0..19 {
        succeed(&metrics, &format!("J{:02}", i), i, 1);
    }

    let report = health(&metrics);
    assert!(report.is_healthy(), "unexpected alerts: {:?}", report.alerts);
}

#[test]
fn test_multiple_alerts_in_rule_order() {
    let metrics = JobMetrics::new();
    succeed(&metrics, "J1", 0, 1);
    metrics.mark_end("F1", false, None);
    metrics.mark_start("R1");
    metrics.mark_start("R2");

    let report = health(&metrics);
    assert_eq!(report.alerts.len(), 2);
    assert!(report.alerts[0].starts_with("High failure rate"));
    assert!(report.alerts[1].starts_with("High stalled jobs"));
}

#[test]
fn test_custom_thresholds() {
    let metrics = JobMetrics::new();
    succeed(&metrics, "J1", 0, 1);
    metrics.mark_end("F1", false, None);

    let (snapshot, jobs) = metrics.snapshot_with_jobs();
    let lenient = AnomalyThresholds {
        failure_rate_threshold: 0.6,
        ..AnomalyThresholds::default()
    };
    assert!(evaluate(&snapshot, &jobs, &lenient).is_healthy());
    assert!(!evaluate(&snapshot, &jobs, &AnomalyThresholds::default()).is_healthy());
}

/// Nineteen 1-addition jobs, then two jobs sharing one end time
fn tied_finish(first_added: usize, second_added: usize) -> JobMetrics {
    let metrics = JobMetrics::new();
    for i in 0..19 {
        succeed(&metrics, &format!("J{:02}", i), i, 1);
    }
    succeed(&metrics, "A", 19, first_added);
    succeed(&metrics, "Z", 19, second_added);
    metrics
}

#[test]
fn test_spike_tie_on_end_time_picks_greatest_job_id() {
    // avg 120/21 = 5.7, threshold 57.1 either way
    let report = health(&tied_finish(1, 100));
    assert_eq!(report.alerts.len(), 1, "alerts: {:?}", report.alerts);
    assert!(report.alerts[0].starts_with("Spike detected: last job has 100 additions"));

    let report = health(&tied_finish(100, 1));
    assert!(report.is_healthy(), "unexpected alerts: {:?}", report.alerts);
}

#[test]
fn test_job_failed_after_success_no_longer_spikes() {
    let metrics = JobMetrics::new();
    for i in 0..19 {
        succeed(&metrics, &format!("J{:02}", i), i, 1);
    }
    succeed(&metrics, "J19", 19, 100);
    assert!(!health(&metrics).is_healthy());

    // Redelivered, this time failing
    metrics.mark_end_at("J19", false, None, base_time() + Duration::seconds(30));

    let report = health(&metrics);
    assert!(report.is_healthy(), "unexpected alerts: {:?}", report.alerts);
    assert_eq!(report.metrics_summary.total_jobs, 20);
    assert!((report.metrics_summary.success_rate - 95.0).abs() < 1e-9);

    let (snapshot, _) = metrics.snapshot_with_jobs();
    assert_eq!(snapshot.total_objects_added, 19);
    assert_eq!(snapshot.jobs_failed, 1);
}
