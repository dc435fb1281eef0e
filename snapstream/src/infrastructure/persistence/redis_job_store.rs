// /////////////////////////////////////////////////////////////////////////////
// Snapstream
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Redis Job Store
//!
//! Background jobs persisted field-wise as hashes so concurrent observers
//! read consistent snapshots:
//!
//! ```text
//! job:<id>      hash {id, type, status, created_at, started_at,
//!               completed_at, params, progress, result, error}
//! jobs:queue    list; ids pushed right, popped left
//! ```
//!
//! Records live seven days past their last write. Progress updates touch
//! only the `progress` field; terminal states go through a full persist so
//! they are never lost to a racing progress write.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use snapstream_domain::repositories::JobStore;
use snapstream_domain::{Job, JobId, JobStatus, ReplicationError, TransferProgress};

use super::redis_store::RedisStore;

/// Job records expire seven days after their last update.
const JOB_RECORD_TTL: Duration = Duration::from_secs(7 * 24 * 3600);

const QUEUE_KEY: &str = "jobs:queue";

pub struct RedisJobStore {
    store: RedisStore,
}

impl RedisJobStore {
    pub fn new(store: RedisStore) -> Self {
        RedisJobStore { store }
    }

    fn job_key(id: &JobId) -> String {
        format!("job:{}", id)
    }

    fn encode(job: &Job) -> Result<Vec<(String, String)>, ReplicationError> {
        let mut fields = vec![
            ("id".to_string(), job.id.to_string()),
            ("type".to_string(), job.job_type.clone()),
            ("status".to_string(), job.status.as_str().to_string()),
            ("created_at".to_string(), job.created_at.to_rfc3339()),
            ("params".to_string(), serde_json::to_string(&job.params)?),
        ];
        if let Some(at) = job.started_at {
            fields.push(("started_at".to_string(), at.to_rfc3339()));
        }
        if let Some(at) = job.completed_at {
            fields.push(("completed_at".to_string(), at.to_rfc3339()));
        }
        if let Some(progress) = &job.progress {
            fields.push(("progress".to_string(), serde_json::to_string(progress)?));
        }
        if let Some(result) = &job.result {
            fields.push(("result".to_string(), serde_json::to_string(result)?));
        }
        if let Some(error) = &job.error {
            fields.push(("error".to_string(), error.clone()));
        }
        Ok(fields)
    }

    fn decode(fields: &std::collections::HashMap<String, String>) -> Result<Job, ReplicationError> {
        let corrupt = |what: &str| ReplicationError::PersistencePermanent(format!("corrupt job record: {}", what));

        let id: JobId = fields.get("id").ok_or_else(|| corrupt("missing id"))?.parse()?;
        let job_type = fields.get("type").ok_or_else(|| corrupt("missing type"))?.clone();
        let status = JobStatus::parse(fields.get("status").ok_or_else(|| corrupt("missing status"))?)?;
        let created_at = parse_timestamp(fields.get("created_at").ok_or_else(|| corrupt("missing created_at"))?)?;

        let started_at = fields.get("started_at").map(|raw| parse_timestamp(raw)).transpose()?;
        let completed_at = fields.get("completed_at").map(|raw| parse_timestamp(raw)).transpose()?;
        let params = fields
            .get("params")
            .map(|raw| serde_json::from_str(raw))
            .transpose()?
            .unwrap_or(serde_json::Value::Null);
        let progress: Option<TransferProgress> = fields
            .get("progress")
            .map(|raw| serde_json::from_str(raw))
            .transpose()?;
        let result = fields.get("result").map(|raw| serde_json::from_str(raw)).transpose()?;

        Ok(Job {
            id,
            job_type,
            status,
            created_at,
            started_at,
            completed_at,
            params,
            progress,
            result,
            error: fields.get("error").cloned(),
        })
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, ReplicationError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| ReplicationError::PersistencePermanent(format!("corrupt job timestamp '{}': {}", raw, e)))
}

#[async_trait]
impl JobStore for RedisJobStore {
    async fn persist(&self, job: &Job) -> Result<(), ReplicationError> {
        let key = Self::job_key(&job.id);
        let fields = Self::encode(job)?;
        self.store.hset_multiple(&key, &fields).await?;
        self.store.expire(&key, JOB_RECORD_TTL).await?;
        Ok(())
    }

    async fn load(&self, id: &JobId) -> Result<Option<Job>, ReplicationError> {
        let fields = self.store.hgetall(&Self::job_key(id)).await?;
        if fields.is_empty() {
            return Ok(None);
        }
        Self::decode(&fields).map(Some)
    }

    async fn set_progress(&self, id: &JobId, progress: &TransferProgress) -> Result<(), ReplicationError> {
        let encoded = serde_json::to_string(progress)?;
        self.store.hset(&Self::job_key(id), "progress", &encoded).await
    }

    async fn list(&self, status: Option<JobStatus>, limit: usize) -> Result<Vec<Job>, ReplicationError> {
        let mut jobs = Vec::new();
        for key in self.store.keys("job:*").await? {
            let fields = self.store.hgetall(&key).await?;
            if fields.is_empty() {
                continue;
            }
            // Skip records another writer corrupted rather than failing
            // the whole listing.
            if let Ok(job) = Self::decode(&fields) {
                if status.map(|wanted| job.status == wanted).unwrap_or(true) {
                    jobs.push(job);
                }
            }
        }
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        jobs.truncate(limit);
        Ok(jobs)
    }

    async fn enqueue(&self, id: &JobId) -> Result<(), ReplicationError> {
        self.store.rpush(QUEUE_KEY, &id.to_string()).await?;
        Ok(())
    }

    async fn dequeue(&self, timeout: Duration) -> Result<Option<JobId>, ReplicationError> {
        match self.store.blpop(QUEUE_KEY, timeout).await? {
            Some((_queue, id)) => Ok(Some(id.parse()?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use snapstream_domain::entities::JOB_TYPE_REPLICATION;

    #[test]
    fn test_encode_decode_roundtrip() {
        let mut job = Job::new(JOB_TYPE_REPLICATION, serde_json::json!({"source": "tank/a"}));
        job.transition(JobStatus::Running).unwrap();
        job.progress = Some(TransferProgress::zero());
        job.transition(JobStatus::Completed).unwrap();
        job.result = Some(snapstream_domain::JobOutcome::success(42));

        let fields: std::collections::HashMap<String, String> =
            RedisJobStore::encode(&job).unwrap().into_iter().collect();
        let decoded = RedisJobStore::decode(&fields).unwrap();
        assert_eq!(decoded, job);
    }

    #[test]
    fn test_decode_minimal_record() {
        let job = Job::new(JOB_TYPE_REPLICATION, serde_json::Value::Null);
        let fields: std::collections::HashMap<String, String> =
            RedisJobStore::encode(&job).unwrap().into_iter().collect();
        let decoded = RedisJobStore::decode(&fields).unwrap();
        assert_eq!(decoded.status, JobStatus::Pending);
        assert!(decoded.started_at.is_none());
        assert!(decoded.progress.is_none());
    }

    #[test]
    fn test_decode_rejects_missing_fields() {
        let fields = std::collections::HashMap::new();
        assert!(RedisJobStore::decode(&fields).is_err());
    }
}
