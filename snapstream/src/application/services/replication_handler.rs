// /////////////////////////////////////////////////////////////////////////////
// Snapstream
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Replication Job Handler
//!
//! Bridges the job manager and the replication engine: parses the job's
//! request, resolves endpoints, runs the transfer with the job's progress
//! channel and cancellation slot, and folds the engine's report into the
//! job outcome. A pipeline torn down by SIGTERM (-15) is a cancellation,
//! not a failure.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

use snapstream_domain::{Job, JobOutcome, ReplicationError};

use super::job_manager::{JobContext, JobHandler};
use super::replication_engine::{ReplicationContext, ReplicationEngine};

pub struct ReplicationJobHandler {
    engine: Arc<ReplicationEngine>,
}

impl ReplicationJobHandler {
    pub fn new(engine: Arc<ReplicationEngine>) -> Self {
        ReplicationJobHandler { engine }
    }
}

#[async_trait]
impl JobHandler for ReplicationJobHandler {
    async fn run(&self, job: &Job, ctx: JobContext) -> Result<JobOutcome, ReplicationError> {
        let request = job.replication_request()?;
        let replication = ReplicationContext::from_request(request)?;

        let started = Instant::now();
        let report = self
            .engine
            .replicate(&replication, ctx.progress, &ctx.cancel)
            .await?;
        let elapsed = started.elapsed().as_secs();

        if report.cancelled {
            return Ok(JobOutcome::cancelled(report.return_code, elapsed));
        }
        Ok(JobOutcome {
            return_code: report.return_code,
            elapsed_seconds: elapsed,
            cancelled: false,
        })
    }
}
