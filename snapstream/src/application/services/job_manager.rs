// /////////////////////////////////////////////////////////////////////////////
// Snapstream
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Job Manager
//!
//! The queue-and-worker system that owns long-running jobs end-to-end:
//! creation, dispatch, progress persistence, cancellation and shutdown.
//!
//! ## Lifecycle
//!
//! - creation persists the record as `pending` and pushes the id onto the
//!   shared queue;
//! - a bounded worker pool (default four) blocks on the queue with a
//!   one-second timeout so workers stay responsive to shutdown;
//! - the dispatching worker transitions the job to `running`, looks up the
//!   registered handler for its type, and runs it with a progress channel
//!   whose consumer atomically replaces the record's progress field;
//! - the handler's return decides the terminal state: an outcome with the
//!   cancellation marker → `cancelled`, a plain outcome → `completed`, an
//!   error → `failed`.
//!
//! ## Cancellation
//!
//! Cancel is idempotent and only meaningful for a running job. The worker
//! owning the job holds the pipeline's cancellation slot; cancel requests
//! route through it into the subprocess group. A job that finished on the
//! cancellation path within the last five seconds still reports a
//! successful cancel, because the user's intent was satisfied before the
//! signal landed.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use snapstream_bootstrap::{ShutdownController, ShutdownToken};
use snapstream_domain::repositories::JobStore;
use snapstream_domain::{Job, JobId, JobOutcome, JobStatus, ReplicationError, TransferProgress};

use crate::infrastructure::config::JobsConfig;
use crate::infrastructure::process::CancellationSlot;

/// Grace window in which a just-finished cancellation still counts.
const CANCEL_GRACE_SECONDS: i64 = 5;

/// Depth of the per-job progress channel; progress is best effort, so a
/// full channel drops the oldest pending update rather than stalling the
/// meter pump.
const PROGRESS_CHANNEL_DEPTH: usize = 64;

/// What a handler receives alongside the job record.
pub struct JobContext {
    pub job_id: JobId,
    /// Producer side of the progress channel; the manager persists every
    /// record it consumes.
    pub progress: mpsc::Sender<TransferProgress>,
    /// Cancellation rendezvous shared with the control API.
    pub cancel: CancellationSlot,
}

/// One job type's executor.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn run(&self, job: &Job, ctx: JobContext) -> Result<JobOutcome, ReplicationError>;
}

pub struct JobManager {
    store: Arc<dyn JobStore>,
    handlers: HashMap<String, Arc<dyn JobHandler>>,
    running: Arc<Mutex<HashMap<JobId, CancellationSlot>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    shutdown: ShutdownController,
    config: JobsConfig,
}

impl JobManager {
    pub fn new(store: Arc<dyn JobStore>, config: JobsConfig) -> Self {
        JobManager {
            store,
            handlers: HashMap::new(),
            running: Arc::new(Mutex::new(HashMap::new())),
            workers: Mutex::new(Vec::new()),
            shutdown: ShutdownController::new(),
            config,
        }
    }

    /// Registers the handler for one job type. Call before [`start`].
    ///
    /// [`start`]: JobManager::start
    pub fn register_handler(&mut self, job_type: impl Into<String>, handler: Arc<dyn JobHandler>) {
        self.handlers.insert(job_type.into(), handler);
    }

    /// Persists a fresh pending job and enqueues it.
    pub async fn create_job(
        self: &Arc<Self>,
        job_type: &str,
        params: serde_json::Value,
    ) -> Result<JobId, ReplicationError> {
        if !self.handlers.contains_key(job_type) {
            return Err(ReplicationError::invalid_request(format!(
                "no handler registered for job type '{}'",
                job_type
            )));
        }
        let job = Job::new(job_type, params);
        let id = job.id;
        self.store.persist(&job).await?;
        self.store.enqueue(&id).await?;
        info!(job = %id, job_type, "created job");
        Ok(id)
    }

    pub async fn get_job(&self, id: &JobId) -> Result<Option<Job>, ReplicationError> {
        self.store.load(id).await
    }

    pub async fn list_jobs(&self, status: Option<JobStatus>, limit: usize) -> Result<Vec<Job>, ReplicationError> {
        self.store.list(status, limit).await
    }

    /// Requests cancellation of a job. Returns whether the request was
    /// honoured (idempotently so for repeated calls).
    pub async fn cancel_job(&self, id: &JobId) -> Result<bool, ReplicationError> {
        let job = self
            .store
            .load(id)
            .await?
            .ok_or_else(|| ReplicationError::not_found(format!("job {}", id)))?;

        let slot = self.running.lock().await.get(id).cloned();
        if let Some(slot) = slot {
            info!(job = %id, "cancelling running job");
            slot.cancel().await;
            return Ok(true);
        }

        // The pipeline may have just died to an earlier cancel; honour the
        // intent if the record says so.
        if job.recently_cancelled(Utc::now(), CANCEL_GRACE_SECONDS) {
            return Ok(true);
        }
        Ok(false)
    }

    /// Spawns the worker pool.
    pub async fn start(self: &Arc<Self>) {
        let mut workers = self.workers.lock().await;
        if !workers.is_empty() {
            return;
        }
        info!(workers = self.config.workers, "starting job manager");
        for worker_id in 0..self.config.workers {
            let manager = Arc::clone(self);
            let token = self.shutdown.token();
            workers.push(tokio::spawn(async move {
                manager.worker_loop(worker_id, token).await;
            }));
        }
    }

    /// Stops the workers: signal, gather, then tear down any pipelines
    /// still running.
    pub async fn stop(&self) {
        info!("stopping job manager");
        self.shutdown.shutdown();

        let workers: Vec<JoinHandle<()>> = self.workers.lock().await.drain(..).collect();
        for worker in workers {
            if let Err(err) = worker.await {
                warn!(error = %err, "worker join failed");
            }
        }

        let lingering: Vec<(JobId, CancellationSlot)> = self.running.lock().await.drain().collect();
        for (id, slot) in lingering {
            warn!(job = %id, "terminating pipeline left over at shutdown");
            slot.cancel().await;
        }
    }

    async fn worker_loop(&self, worker_id: usize, token: ShutdownToken) {
        info!(worker = worker_id, "worker started");
        loop {
            let popped = tokio::select! {
                _ = token.cancelled() => break,
                popped = self.store.dequeue(self.config.queue_pop_timeout()) => popped,
            };
            match popped {
                Ok(Some(id)) => {
                    info!(worker = worker_id, job = %id, "picked up job");
                    self.process_job(id).await;
                }
                Ok(None) => continue,
                Err(err) if err.is_transient() => {
                    warn!(worker = worker_id, error = %err, "queue pop failed, retrying");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
                Err(err) => {
                    error!(worker = worker_id, error = %err, "queue pop failed permanently");
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
            }
        }
        info!(worker = worker_id, "worker stopped");
    }

    async fn process_job(&self, id: JobId) {
        let mut job = match self.store.load(&id).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                warn!(job = %id, "dequeued job not found");
                return;
            }
            Err(err) => {
                error!(job = %id, error = %err, "cannot load dequeued job");
                return;
            }
        };
        if job.status != JobStatus::Pending {
            warn!(job = %id, status = %job.status, "dequeued job is not pending");
            return;
        }

        let Some(handler) = self.handlers.get(&job.job_type).cloned() else {
            job.error = Some(format!("no handler registered for job type '{}'", job.job_type));
            let _ = job.transition(JobStatus::Running);
            let _ = job.transition(JobStatus::Failed);
            self.persist_terminal(&job).await;
            return;
        };

        if job.transition(JobStatus::Running).is_err() {
            return;
        }
        if let Err(err) = self.store.persist(&job).await {
            error!(job = %id, error = %err, "cannot persist running state");
            return;
        }

        let cancel = CancellationSlot::new();
        self.running.lock().await.insert(id, cancel.clone());

        let (progress_tx, progress_rx) = mpsc::channel(PROGRESS_CHANNEL_DEPTH);
        let writer = tokio::spawn(progress_writer(Arc::clone(&self.store), id, progress_rx));

        let ctx = JobContext {
            job_id: id,
            progress: progress_tx,
            cancel: cancel.clone(),
        };
        let result = handler.run(&job, ctx).await;

        self.running.lock().await.remove(&id);
        // The handler dropped its sender with the context; drain the tail
        // so the final progress lands before the terminal persist.
        let last_progress = writer.await.ok().flatten();
        if let Some(progress) = last_progress {
            job.progress = Some(progress);
        }

        match result {
            Ok(outcome) if outcome.cancelled => {
                info!(job = %id, "job cancelled");
                job.result = Some(outcome);
                let _ = job.transition(JobStatus::Cancelled);
            }
            Ok(outcome) => {
                info!(job = %id, elapsed = outcome.elapsed_seconds, "job completed");
                job.result = Some(outcome);
                let _ = job.transition(JobStatus::Completed);
            }
            Err(ReplicationError::Cancelled(reason)) => {
                info!(job = %id, reason = %reason, "job cancelled");
                job.result = Some(JobOutcome::cancelled(
                    snapstream_bootstrap::platform::SIGTERM_EXIT_CODE,
                    0,
                ));
                let _ = job.transition(JobStatus::Cancelled);
            }
            Err(err) => {
                error!(job = %id, error = %err, "job failed");
                job.error = Some(err.to_string());
                let _ = job.transition(JobStatus::Failed);
            }
        }
        self.persist_terminal(&job).await;
    }

    /// Terminal states must not be lost; retry the persist on top of the
    /// store's own envelope before giving up.
    async fn persist_terminal(&self, job: &Job) {
        for _ in 0..3 {
            match self.store.persist(job).await {
                Ok(()) => return,
                Err(err) if err.is_transient() => {
                    warn!(job = %job.id, error = %err, "terminal persist failed, retrying");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
                Err(err) => {
                    error!(job = %job.id, error = %err, "terminal persist failed permanently");
                    return;
                }
            }
        }
        error!(job = %job.id, "terminal persist abandoned after retries");
    }
}

/// Consumes the job's progress channel, persisting each record as it
/// arrives; returns the last one so the terminal record carries it.
async fn progress_writer(
    store: Arc<dyn JobStore>,
    id: JobId,
    mut rx: mpsc::Receiver<TransferProgress>,
) -> Option<TransferProgress> {
    let mut last = None;
    while let Some(record) = rx.recv().await {
        if let Err(err) = store.set_progress(&id, &record).await {
            // Best effort by contract; the terminal state is what counts.
            warn!(job = %id, error = %err, "progress write failed");
        }
        last = Some(record);
    }
    last
}
