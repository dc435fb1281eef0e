// /////////////////////////////////////////////////////////////////////////////
// Snapstream
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Job Store Port
//!
//! Persistence and queueing contract for background jobs. Records are
//! stored field-wise so concurrent observers read consistent snapshots;
//! the queue is first-in-first-out among workers with no ordering across
//! job ids.

use std::time::Duration;

use async_trait::async_trait;

use crate::entities::{Job, JobStatus};
use crate::error::ReplicationError;
use crate::value_objects::{JobId, TransferProgress};

/// Background job persistence plus the dispatch queue.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Writes the whole record (field-wise) and refreshes its TTL.
    async fn persist(&self, job: &Job) -> Result<(), ReplicationError>;

    /// Loads a record; `None` when unknown or expired.
    async fn load(&self, id: &JobId) -> Result<Option<Job>, ReplicationError>;

    /// Atomically replaces the progress field only. Best effort: losing a
    /// single update is acceptable, losing a terminal state is not, so
    /// terminal writes go through [`Self::persist`].
    async fn set_progress(&self, id: &JobId, progress: &TransferProgress) -> Result<(), ReplicationError>;

    /// Known jobs, newest first, optionally filtered by status.
    async fn list(&self, status: Option<JobStatus>, limit: usize) -> Result<Vec<Job>, ReplicationError>;

    /// Pushes a job id onto the dispatch queue.
    async fn enqueue(&self, id: &JobId) -> Result<(), ReplicationError>;

    /// Pops the next job id, waiting at most `timeout`. `None` on timeout
    /// so workers stay responsive to shutdown.
    async fn dequeue(&self, timeout: Duration) -> Result<Option<JobId>, ReplicationError>;
}
