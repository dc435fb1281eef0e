// /////////////////////////////////////////////////////////////////////////////
// Snapstream
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Job manager lifecycle tests over the in-memory store: dispatch,
//! progress persistence, terminal states, cancellation semantics and
//! shutdown.

mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use snapstream::application::{JobContext, JobHandler, JobManager};
use snapstream::infrastructure::config::JobsConfig;
use snapstream_domain::repositories::JobStore;
use snapstream_domain::{Job, JobId, JobOutcome, JobStatus, ReplicationError, TransferProgress};

use common::InMemoryJobStore;

fn progress_record(bytes: u64) -> TransferProgress {
    TransferProgress {
        bytes_transferred: bytes,
        bytes_total: Some(1024),
        percentage: Some((bytes as f64 / 1024.0) * 100.0),
        rate_bytes_per_second: 100,
        eta_seconds: Some(1),
        elapsed_seconds: 1,
    }
}

/// Reports two progress records and succeeds.
struct SucceedingHandler;

#[async_trait]
impl JobHandler for SucceedingHandler {
    async fn run(&self, _job: &Job, ctx: JobContext) -> Result<JobOutcome, ReplicationError> {
        let _ = ctx.progress.send(progress_record(512)).await;
        let _ = ctx.progress.send(progress_record(1024)).await;
        Ok(JobOutcome::success(3))
    }
}

struct FailingHandler;

#[async_trait]
impl JobHandler for FailingHandler {
    async fn run(&self, _job: &Job, _ctx: JobContext) -> Result<JobOutcome, ReplicationError> {
        Err(ReplicationError::NoCommonSnapshot(
            "tank/src and tank/dst share no snapshot".to_string(),
        ))
    }
}

/// Runs until cancelled, then reports the SIGTERM outcome the real
/// pipeline handler would.
struct CancellableHandler;

#[async_trait]
impl JobHandler for CancellableHandler {
    async fn run(&self, _job: &Job, ctx: JobContext) -> Result<JobOutcome, ReplicationError> {
        for _ in 0..200 {
            if ctx.cancel.is_requested() {
                return Ok(JobOutcome::cancelled(-15, 1));
            }
            let _ = ctx.progress.send(progress_record(256)).await;
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        Ok(JobOutcome::success(5))
    }
}

fn manager_config() -> JobsConfig {
    JobsConfig {
        workers: 2,
        queue_pop_timeout_secs: 1,
    }
}

async fn build_manager(handler: Arc<dyn JobHandler>) -> (Arc<JobManager>, Arc<InMemoryJobStore>) {
    let store = Arc::new(InMemoryJobStore::new());
    let job_store: Arc<dyn JobStore> = store.clone();
    let mut manager = JobManager::new(job_store, manager_config());
    manager.register_handler("replication", handler);
    let manager = Arc::new(manager);
    manager.start().await;
    (manager, store)
}

async fn wait_for_status(manager: &JobManager, id: &JobId, wanted: JobStatus) -> Job {
    for _ in 0..200 {
        if let Some(job) = manager.get_job(id).await.unwrap() {
            if job.status == wanted {
                return job;
            }
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("job {} never reached {}", id, wanted);
}

#[tokio::test]
async fn test_job_runs_to_completion() {
    let (manager, _store) = build_manager(Arc::new(SucceedingHandler)).await;

    let id = manager
        .create_job("replication", serde_json::json!({"source": "tank/src", "destination": "tank/dst"}))
        .await
        .unwrap();

    let job = wait_for_status(&manager, &id, JobStatus::Completed).await;
    assert!(job.started_at.is_some());
    assert!(job.completed_at.is_some());
    let outcome = job.result.expect("completed job carries a result");
    assert_eq!(outcome.return_code, 0);
    assert!(!outcome.cancelled);
    // The last progress record survives into the terminal state.
    assert_eq!(job.progress.expect("progress persisted").bytes_transferred, 1024);

    manager.stop().await;
}

#[tokio::test]
async fn test_failing_job_records_error() {
    let (manager, _store) = build_manager(Arc::new(FailingHandler)).await;

    let id = manager
        .create_job("replication", serde_json::json!({}))
        .await
        .unwrap();

    let job = wait_for_status(&manager, &id, JobStatus::Failed).await;
    assert!(job.result.is_none());
    let error = job.error.expect("failed job carries an error");
    assert!(error.contains("share no snapshot"));

    manager.stop().await;
}

#[tokio::test]
async fn test_unregistered_job_type_rejected() {
    let (manager, _store) = build_manager(Arc::new(SucceedingHandler)).await;
    let err = manager
        .create_job("defragmentation", serde_json::json!({}))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "invalid_request");
    manager.stop().await;
}

#[tokio::test]
async fn test_cancel_running_job_is_idempotent() {
    let (manager, _store) = build_manager(Arc::new(CancellableHandler)).await;

    let id = manager
        .create_job("replication", serde_json::json!({}))
        .await
        .unwrap();
    wait_for_status(&manager, &id, JobStatus::Running).await;

    assert!(manager.cancel_job(&id).await.unwrap());
    let job = wait_for_status(&manager, &id, JobStatus::Cancelled).await;
    let outcome = job.result.expect("cancelled job carries the marker");
    assert!(outcome.cancelled);
    assert_eq!(outcome.return_code, -15);

    // Second cancel right after completion still reports success: the
    // user's intent was satisfied.
    assert!(manager.cancel_job(&id).await.unwrap());

    manager.stop().await;
}

#[tokio::test]
async fn test_cancel_unknown_job_is_not_found() {
    let (manager, _store) = build_manager(Arc::new(SucceedingHandler)).await;
    let err = manager.cancel_job(&JobId::new()).await.unwrap_err();
    assert_eq!(err.kind(), "not_found");
    manager.stop().await;
}

#[tokio::test]
async fn test_cancel_completed_job_returns_false() {
    let (manager, _store) = build_manager(Arc::new(SucceedingHandler)).await;
    let id = manager
        .create_job("replication", serde_json::json!({}))
        .await
        .unwrap();
    wait_for_status(&manager, &id, JobStatus::Completed).await;

    // Completed without the cancellation marker: nothing to honour.
    assert!(!manager.cancel_job(&id).await.unwrap());
    manager.stop().await;
}

#[tokio::test]
async fn test_status_listing_filters() {
    let (manager, _store) = build_manager(Arc::new(SucceedingHandler)).await;
    let id = manager
        .create_job("replication", serde_json::json!({}))
        .await
        .unwrap();
    wait_for_status(&manager, &id, JobStatus::Completed).await;

    let completed = manager.list_jobs(Some(JobStatus::Completed), 10).await.unwrap();
    assert!(completed.iter().any(|job| job.id == id));
    let failed = manager.list_jobs(Some(JobStatus::Failed), 10).await.unwrap();
    assert!(failed.is_empty());

    manager.stop().await;
}

#[tokio::test]
async fn test_stop_terminates_workers() {
    let (manager, store) = build_manager(Arc::new(SucceedingHandler)).await;
    manager.stop().await;

    // After stop, newly enqueued work is not picked up.
    let job = Job::new("replication", serde_json::json!({}));
    let id = job.id;
    store.persist(&job).await.unwrap();
    store.enqueue(&id).await.unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    let job = manager.get_job(&id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Pending);
}
