//! Integration tests for job processing and the in-process queue

use std::sync::Arc;
use std::time::Duration;

use btr_common::blob::{BlobStore, FsBlobStore, MemoryBlobStore};
use btr_common::config::FailurePolicy;
use btr_common::DiffEngine;
use btr_svc::metrics::{JobMetrics, JobStatus};
use btr_svc::queue::{self, JobMessage, JobPublisher};
use btr_svc::worker::{Delivery, JobOutcome, JobProcessor};
use serde_json::json;
use tempfile::TempDir;

const BUCKET: &str = "gs://test-bucket";

async fn seed_pair(blobs: &dyn BlobStore) {
    blobs
        .write(
            "gs://test-bucket/v1.json",
            &json!([
                {"id": "W1", "type": "wall", "x": 0, "y": 0, "width": 10, "height": 1},
                {"id": "D1", "type": "door", "x": 5, "y": 5, "width": 1, "height": 2}
            ]),
        )
        .await
        .unwrap();
    blobs
        .write(
            "gs://test-bucket/v2.json",
            &json!([
                {"id": "W1", "type": "wall", "x": 3, "y": 4, "width": 10, "height": 1},
                {"id": "C1", "type": "column", "x": 20, "y": 20, "width": 1, "height": 1}
            ]),
        )
        .await
        .unwrap();
}

fn processor(blobs: Arc<dyn BlobStore>, metrics: Arc<JobMetrics>) -> JobProcessor {
    JobProcessor::new(blobs, metrics, DiffEngine::new(), BUCKET)
}

#[tokio::test]
async fn test_process_writes_results_and_counts() {
    let blobs = Arc::new(MemoryBlobStore::new());
    seed_pair(blobs.as_ref()).await;
    let metrics = Arc::new(JobMetrics::new());
    let worker = processor(blobs.clone(), metrics.clone());

    metrics.mark_start("J1");
    let outcome = worker
        .process(&JobMessage::new("J1", "gs://test-bucket/v1.json", "gs://test-bucket/v2.json"))
        .await;

    let JobOutcome::Completed { results_uri, report, .. } = outcome else {
        panic!("expected completed outcome, got {:?}", outcome);
    };
    assert_eq!(results_uri, "gs://test-bucket/results/J1.json");
    assert_eq!(report.added, vec!["C1 (column at 20,20)".to_string()]);
    assert_eq!(report.removed, vec!["D1 (door at 5,5)".to_string()]);
    assert_eq!(report.moved, vec!["W1 moved 5.0 units northeast".to_string()]);
    assert_eq!(
        report.summary,
        "W1 moved 5.0 units northeast; C1 (column at 20,20) added; D1 (door at 5,5) removed."
    );

    let stored = blobs.read(&results_uri).await.unwrap();
    assert_eq!(stored["summary"], report.summary);
    assert_eq!(stored["moved"][0], "W1 moved 5.0 units northeast");

    let record = metrics.job("J1").unwrap();
    assert_eq!(record.status, JobStatus::Success);
    assert_eq!(record.added_count, Some(1));
    assert_eq!(record.removed_count, Some(1));
    assert_eq!(record.moved_count, Some(1));
    assert_eq!(metrics.durations().len(), 1);
}

#[tokio::test]
async fn test_missing_blob_marks_failure() {
    let blobs = Arc::new(MemoryBlobStore::new());
    let metrics = Arc::new(JobMetrics::new());
    let worker = processor(blobs.clone(), metrics.clone());

    metrics.mark_start("J2");
    let outcome = worker
        .process(&JobMessage::new("J2", "gs://test-bucket/nope.json", "gs://test-bucket/v2.json"))
        .await;

    assert!(!outcome.is_success());
    assert_eq!(outcome.job_id(), "J2");
    assert_eq!(outcome.delivery(FailurePolicy::Acknowledge), Delivery::Ack);
    assert_eq!(outcome.delivery(FailurePolicy::Redeliver), Delivery::Redeliver);

    let record = metrics.job("J2").unwrap();
    assert_eq!(record.status, JobStatus::Failed);
    assert!(record.added_count.is_none());
    assert!(blobs.read("gs://test-bucket/results/J2.json").await.is_err());
}

#[tokio::test]
async fn test_malformed_version_marks_failure() {
    let blobs = Arc::new(MemoryBlobStore::new());
    blobs
        .write("gs://test-bucket/bad.json", &json!({"not": "an array"}))
        .await
        .unwrap();
    let metrics = Arc::new(JobMetrics::new());
    let worker = processor(blobs.clone(), metrics.clone());

    let outcome = worker
        .process(&JobMessage::new("J3", "gs://test-bucket/bad.json", "gs://test-bucket/bad.json"))
        .await;

    let JobOutcome::Failed { error, .. } = outcome else {
        panic!("expected failure");
    };
    assert!(error.contains("Malformed"), "unexpected error: {}", error);
    assert_eq!(metrics.job("J3").unwrap().status, JobStatus::Failed);
}

#[tokio::test]
async fn test_filesystem_store_end_to_end() {
    let temp_dir = TempDir::new().unwrap();
    let blobs = Arc::new(FsBlobStore::new(temp_dir.path()));
    seed_pair(blobs.as_ref()).await;
    let metrics = Arc::new(JobMetrics::new());
    let worker = processor(blobs.clone(), metrics.clone());

    let outcome = worker
        .process(&JobMessage::new("J4", "gs://test-bucket/v1.json", "gs://test-bucket/v2.json"))
        .await;

    assert!(outcome.is_success());
    assert!(temp_dir.path().join("test-bucket/results/J4.json").exists());
}

#[tokio::test]
async fn test_channel_consumer_processes_published_jobs() {
    let blobs = Arc::new(MemoryBlobStore::new());
    seed_pair(blobs.as_ref()).await;
    let metrics = Arc::new(JobMetrics::new());
    let worker = Arc::new(processor(blobs.clone(), metrics.clone()));

    let (publisher, receiver) = queue::channel(8);
    let consumer = queue::spawn_consumer(receiver, worker, FailurePolicy::Redeliver);

    for id in ["Q1", "Q2"] {
        metrics.mark_start(id);
        publisher
            .publish(JobMessage::new(id, "gs://test-bucket/v1.json", "gs://test-bucket/v2.json"))
            .await
            .unwrap();
    }
    metrics.mark_start("Q3");
    publisher
        .publish(JobMessage::new("Q3", "gs://test-bucket/missing.json", "gs://test-bucket/v2.json"))
        .await
        .unwrap();

    // Closing the queue lets the consumer drain and stop
    drop(publisher);
    tokio::time::timeout(Duration::from_secs(5), consumer)
        .await
        .expect("consumer should stop once the queue closes")
        .unwrap();

    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.jobs_success, 2);
    assert_eq!(snapshot.jobs_failed, 1);
    assert_eq!(snapshot.jobs_running, 0);
    assert_eq!(snapshot.total_objects_moved, 2);
    assert!(blobs.read("gs://test-bucket/results/Q2.json").await.is_ok());
}
