// /////////////////////////////////////////////////////////////////////////////
// Snapstream
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Shared test support: in-memory implementations of the persistence
//! ports, so the job manager and stream servers can be exercised without
//! a Redis instance or the filesystem tools.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use snapstream_domain::repositories::{JobStore, TokenIssueRequest, TokenStats, TokenStore};
use snapstream_domain::{
    CapabilityToken, Job, JobId, JobStatus, ReplicationError, TokenId, TransferProgress,
};

/// Token store over a mutex-guarded map. `mark_used` is atomic under the
/// lock, so the single-use race resolves exactly as the contract demands.
pub struct InMemoryTokenStore {
    single_use: bool,
    tokens: Mutex<HashMap<String, CapabilityToken>>,
    validation: Mutex<HashMap<String, u64>>,
}

impl InMemoryTokenStore {
    pub fn new(single_use: bool) -> Self {
        InMemoryTokenStore {
            single_use,
            tokens: Mutex::new(HashMap::new()),
            validation: Mutex::new(HashMap::new()),
        }
    }

    /// Inserts a pre-built token, for expiry and edge-case tests.
    pub fn insert(&self, token: CapabilityToken) {
        self.tokens.lock().unwrap().insert(token.id.to_string(), token);
    }

    pub fn validation_count(&self, outcome: &str) -> u64 {
        *self.validation.lock().unwrap().get(outcome).unwrap_or(&0)
    }

    fn bump(&self, outcome: &str) {
        *self.validation.lock().unwrap().entry(outcome.to_string()).or_insert(0) += 1;
    }
}

#[async_trait]
impl TokenStore for InMemoryTokenStore {
    async fn issue(&self, request: TokenIssueRequest) -> Result<CapabilityToken, ReplicationError> {
        let now = Utc::now();
        let token = CapabilityToken {
            id: TokenId::generate(),
            operation: request.operation,
            dataset: request.dataset,
            snapshot: request.snapshot,
            from_snapshot: request.from_snapshot,
            parameters: request.parameters,
            owner_id: request.owner_id,
            bound_peer: request.bound_peer,
            created_at: now,
            expires_at: now
                + chrono::Duration::from_std(request.ttl)
                    .map_err(|e| ReplicationError::internal(e.to_string()))?,
            used: false,
            use_count: 0,
            last_used_at: None,
            last_used_peer: None,
            integrity_tag: "test-tag".to_string(),
        };
        self.insert(token.clone());
        Ok(token)
    }

    async fn validate(&self, id: &str, peer: Option<&str>) -> Result<Option<CapabilityToken>, ReplicationError> {
        let token = self.tokens.lock().unwrap().get(id).cloned();
        match token {
            None => {
                self.bump("not_found");
                Ok(None)
            }
            Some(token) if token.is_expired(Utc::now()) => {
                self.bump("expired");
                Ok(None)
            }
            Some(token) if !token.peer_allowed(peer) => {
                self.bump("peer_mismatch");
                Ok(None)
            }
            Some(token) => {
                self.bump("success");
                Ok(Some(token))
            }
        }
    }

    async fn mark_used(&self, id: &str, peer: Option<&str>) -> Result<bool, ReplicationError> {
        let mut tokens = self.tokens.lock().unwrap();
        let Some(token) = tokens.get_mut(id) else {
            return Ok(false);
        };
        if self.single_use && token.used && token.use_count >= 1 {
            drop(tokens);
            self.bump("already_used");
            return Ok(false);
        }
        token.used = true;
        token.use_count += 1;
        token.last_used_at = Some(Utc::now());
        token.last_used_peer = peer.map(str::to_string);
        Ok(true)
    }

    async fn revoke(&self, id: &str) -> Result<bool, ReplicationError> {
        Ok(self.tokens.lock().unwrap().remove(id).is_some())
    }

    async fn list(&self, owner_id: &str) -> Result<Vec<CapabilityToken>, ReplicationError> {
        Ok(self
            .tokens
            .lock()
            .unwrap()
            .values()
            .filter(|token| token.owner_id == owner_id)
            .cloned()
            .collect())
    }

    async fn stats(&self) -> Result<TokenStats, ReplicationError> {
        Ok(TokenStats {
            validation: self.validation.lock().unwrap().clone(),
            ..Default::default()
        })
    }
}

/// Job store over mutex-guarded map plus queue; dequeue polls so the
/// timeout contract matches the Redis implementation.
pub struct InMemoryJobStore {
    jobs: Mutex<HashMap<JobId, Job>>,
    queue: Mutex<VecDeque<JobId>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        InMemoryJobStore {
            jobs: Mutex::new(HashMap::new()),
            queue: Mutex::new(VecDeque::new()),
        }
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn persist(&self, job: &Job) -> Result<(), ReplicationError> {
        self.jobs.lock().unwrap().insert(job.id, job.clone());
        Ok(())
    }

    async fn load(&self, id: &JobId) -> Result<Option<Job>, ReplicationError> {
        Ok(self.jobs.lock().unwrap().get(id).cloned())
    }

    async fn set_progress(&self, id: &JobId, progress: &TransferProgress) -> Result<(), ReplicationError> {
        if let Some(job) = self.jobs.lock().unwrap().get_mut(id) {
            job.progress = Some(progress.clone());
        }
        Ok(())
    }

    async fn list(&self, status: Option<JobStatus>, limit: usize) -> Result<Vec<Job>, ReplicationError> {
        let mut jobs: Vec<Job> = self
            .jobs
            .lock()
            .unwrap()
            .values()
            .filter(|job| status.map(|wanted| job.status == wanted).unwrap_or(true))
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        jobs.truncate(limit);
        Ok(jobs)
    }

    async fn enqueue(&self, id: &JobId) -> Result<(), ReplicationError> {
        self.queue.lock().unwrap().push_back(*id);
        Ok(())
    }

    async fn dequeue(&self, timeout: Duration) -> Result<Option<JobId>, ReplicationError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(id) = self.queue.lock().unwrap().pop_front() {
                return Ok(Some(id));
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}
