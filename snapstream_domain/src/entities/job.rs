// /////////////////////////////////////////////////////////////////////////////
// Snapstream
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Background Job
//!
//! A job owns one long-running operation end-to-end: its parameters, its
//! monotonically advancing status, the last progress record, and the
//! terminal result or error. Jobs are persisted as field-wise hash records
//! with a seven-day TTL after reaching a terminal state.
//!
//! ## Status machine
//!
//! ```text
//! pending ──► running ──┬──► completed
//!                       ├──► failed
//!                       └──► cancelled
//! ```
//!
//! Transitions never regress; [`Job::transition`] enforces the machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ReplicationError;
use crate::value_objects::{JobId, TransferProgress};

/// Job type key for replication jobs, used to look up the handler.
pub const JOB_TYPE_REPLICATION: &str = "replication";

/// Lifecycle state of a background job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Result<Self, ReplicationError> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            "cancelled" => Ok(JobStatus::Cancelled),
            other => Err(ReplicationError::invalid_request(format!(
                "'{}' is not a job status",
                other
            ))),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled)
    }

    /// Whether the status machine permits `self → next`.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Running)
                | (JobStatus::Running, JobStatus::Completed)
                | (JobStatus::Running, JobStatus::Failed)
                | (JobStatus::Running, JobStatus::Cancelled)
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal result of a successfully finished (or cancelled) job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobOutcome {
    /// Return code of the pipeline; signal exits encoded negative.
    pub return_code: i32,
    pub elapsed_seconds: u64,
    /// Set when the pipeline was torn down by a cancellation request.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub cancelled: bool,
}

impl JobOutcome {
    pub fn success(elapsed_seconds: u64) -> Self {
        JobOutcome {
            return_code: 0,
            elapsed_seconds,
            cancelled: false,
        }
    }

    pub fn cancelled(return_code: i32, elapsed_seconds: u64) -> Self {
        JobOutcome {
            return_code,
            elapsed_seconds,
            cancelled: true,
        }
    }
}

/// The user-supplied request behind a replication job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplicationRequest {
    /// Source dataset, optionally pinned to a snapshot
    /// (`pool/data` or `pool/data@snap`).
    pub source: String,
    /// Destination dataset path.
    pub destination: String,
    /// Secure-shell peer. Applies to the destination unless `pull` is set.
    #[serde(default)]
    pub remote: Option<String>,
    /// When set with `remote`, the source is remote and the destination is
    /// local.
    #[serde(default)]
    pub pull: bool,
    /// Bandwidth cap for the meter, in MB/s.
    #[serde(default)]
    pub limit_mbps: Option<u32>,
    /// Explicit external compression algorithm name; absent means probe.
    #[serde(default)]
    pub compression: Option<String>,
    #[serde(default)]
    pub recursive: bool,
    /// Keep the transferred snapshot pinned with sync holds on both sides.
    #[serde(default = "default_true")]
    pub sync: bool,
    /// Permit a full send when no common base exists.
    #[serde(default = "default_true")]
    pub allow_full: bool,
    /// Create a `migrate-*` snapshot when the source has no suitable one.
    #[serde(default = "default_true")]
    pub take_snapshot: bool,
}

fn default_true() -> bool {
    true
}

/// A background job record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    /// Job type key; currently always [`JOB_TYPE_REPLICATION`].
    #[serde(rename = "type")]
    pub job_type: String,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    pub params: serde_json::Value,
    /// Last reported progress; meaningful while running or just after.
    #[serde(default)]
    pub progress: Option<TransferProgress>,
    #[serde(default)]
    pub result: Option<JobOutcome>,
    #[serde(default)]
    pub error: Option<String>,
}

impl Job {
    /// Creates a fresh pending job.
    pub fn new(job_type: impl Into<String>, params: serde_json::Value) -> Self {
        Job {
            id: JobId::new(),
            job_type: job_type.into(),
            status: JobStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            params,
            progress: None,
            result: None,
            error: None,
        }
    }

    /// Advances the status machine, stamping `started_at`/`completed_at`.
    ///
    /// Returns `InvalidRequest` for a regressing or repeated transition, so
    /// a second worker can never take over a running job.
    pub fn transition(&mut self, next: JobStatus) -> Result<(), ReplicationError> {
        if !self.status.can_transition_to(next) {
            return Err(ReplicationError::invalid_request(format!(
                "job {} cannot move {} -> {}",
                self.id, self.status, next
            )));
        }
        match next {
            JobStatus::Running => self.started_at = Some(Utc::now()),
            status if status.is_terminal() => self.completed_at = Some(Utc::now()),
            _ => {}
        }
        self.status = next;
        Ok(())
    }

    /// Whether a cancellation request arriving now should be treated as
    /// satisfied: the job finished on the cancellation path within the
    /// grace window.
    pub fn recently_cancelled(&self, now: DateTime<Utc>, grace_seconds: i64) -> bool {
        if self.status != JobStatus::Completed && self.status != JobStatus::Cancelled {
            return false;
        }
        let cancelled = self.result.as_ref().map(|r| r.cancelled).unwrap_or(false) || self.status == JobStatus::Cancelled;
        match (cancelled, self.completed_at) {
            (true, Some(at)) => (now - at).num_seconds() < grace_seconds,
            _ => false,
        }
    }

    /// Parses the typed replication request out of the params payload.
    pub fn replication_request(&self) -> Result<ReplicationRequest, ReplicationError> {
        serde_json::from_value(self.params.clone())
            .map_err(|e| ReplicationError::invalid_request(format!("bad replication params: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_status_machine_forward_only() {
        assert!(JobStatus::Pending.can_transition_to(JobStatus::Running));
        assert!(JobStatus::Running.can_transition_to(JobStatus::Completed));
        assert!(JobStatus::Running.can_transition_to(JobStatus::Failed));
        assert!(JobStatus::Running.can_transition_to(JobStatus::Cancelled));

        assert!(!JobStatus::Pending.can_transition_to(JobStatus::Completed));
        assert!(!JobStatus::Running.can_transition_to(JobStatus::Pending));
        assert!(!JobStatus::Completed.can_transition_to(JobStatus::Running));
        assert!(!JobStatus::Cancelled.can_transition_to(JobStatus::Running));
    }

    #[test]
    fn test_transition_stamps_timestamps() {
        let mut job = Job::new(JOB_TYPE_REPLICATION, serde_json::json!({}));
        assert!(job.started_at.is_none());

        job.transition(JobStatus::Running).unwrap();
        assert!(job.started_at.is_some());
        assert!(job.completed_at.is_none());

        job.transition(JobStatus::Completed).unwrap();
        assert!(job.completed_at.is_some());

        assert!(job.transition(JobStatus::Running).is_err());
    }

    #[test]
    fn test_recently_cancelled_window() {
        let mut job = Job::new(JOB_TYPE_REPLICATION, serde_json::json!({}));
        job.transition(JobStatus::Running).unwrap();
        job.result = Some(JobOutcome::cancelled(-15, 3));
        job.transition(JobStatus::Completed).unwrap();

        let now = Utc::now();
        assert!(job.recently_cancelled(now, 5));
        assert!(!job.recently_cancelled(now + Duration::seconds(10), 5));
    }

    #[test]
    fn test_replication_request_defaults() {
        let request: ReplicationRequest = serde_json::from_value(serde_json::json!({
            "source": "tank/src",
            "destination": "tank/dst",
        }))
        .unwrap();
        assert!(request.sync);
        assert!(request.allow_full);
        assert!(request.take_snapshot);
        assert!(!request.recursive);
        assert!(!request.pull);
        assert_eq!(request.remote, None);
    }

    #[test]
    fn test_outcome_serde_skips_false_cancelled() {
        let ok = JobOutcome::success(12);
        let json = serde_json::to_string(&ok).unwrap();
        assert!(!json.contains("cancelled"));

        let cancelled = JobOutcome::cancelled(-15, 2);
        let json = serde_json::to_string(&cancelled).unwrap();
        assert!(json.contains("\"cancelled\":true"));
    }
}
