// /////////////////////////////////////////////////////////////////////////////
// Snapstream
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Redis Token Store
//!
//! Capability tokens persisted as JSON records under TTL'd keys:
//!
//! ```text
//! <prefix>:token:<id>          the record; TTL = token lifetime
//! <prefix>:token:uses:<id>     atomic use counter behind mark_used
//! <prefix>:token:stats:<id>    per-token counters hash
//! <prefix>:owner:<owner_id>    set of the owner's ids; TTL = max + 60 s
//! <prefix>:stats:*             global counters hashes
//! ```
//!
//! The store's TTL is the source of truth for expiry; `expires_at` on the
//! record is a second line of defence checked during validation. The
//! single-use latch is an `INCR` on the side counter, so two racing
//! connections can never both win `mark_used` even though validate and
//! mark_used are separate calls.
//!
//! Validation failures (unknown, expired, integrity, peer) are deliberately
//! indistinguishable to the caller; only the stats counters record which
//! path fired.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{info, warn};

use snapstream_domain::repositories::{TokenIssueRequest, TokenStats, TokenStore};
use snapstream_domain::{CapabilityToken, ReplicationError, StreamOperation, TokenId};

use crate::infrastructure::config::TokenConfig;

use super::redis_store::RedisStore;
use super::token_signer::TokenSigner;

/// Extra life on the owner index past the longest token TTL.
const OWNER_INDEX_SLACK: Duration = Duration::from_secs(60);

pub struct RedisTokenStore {
    store: RedisStore,
    signer: TokenSigner,
    policy: TokenConfig,
    prefix: String,
}

impl RedisTokenStore {
    pub fn new(store: RedisStore, policy: TokenConfig, prefix: impl Into<String>) -> Self {
        let signer = TokenSigner::new(&policy.mac_secret);
        RedisTokenStore {
            store,
            signer,
            policy,
            prefix: prefix.into(),
        }
    }

    fn token_key(&self, id: &str) -> String {
        format!("{}:token:{}", self.prefix, id)
    }

    fn uses_key(&self, id: &str) -> String {
        format!("{}:token:uses:{}", self.prefix, id)
    }

    fn token_stats_key(&self, id: &str) -> String {
        format!("{}:token:stats:{}", self.prefix, id)
    }

    fn owner_key(&self, owner_id: &str) -> String {
        format!("{}:owner:{}", self.prefix, owner_id)
    }

    fn stats_key(&self, name: &str) -> String {
        format!("{}:stats:{}", self.prefix, name)
    }

    async fn bump_validation(&self, outcome: &'static str) {
        // Counter loss must never mask the validation result.
        if let Err(err) = self.store.hincr(&self.stats_key("validation"), outcome, 1).await {
            warn!(outcome, error = %err, "failed to bump validation counter");
        }
    }

    /// Live token count for an owner, pruning ids whose records expired.
    async fn live_owner_tokens(&self, owner_id: &str) -> Result<Vec<String>, ReplicationError> {
        let owner_key = self.owner_key(owner_id);
        let mut live = Vec::new();
        for id in self.store.smembers(&owner_key).await? {
            if self.store.exists(&self.token_key(&id)).await? {
                live.push(id);
            } else {
                self.store.srem(&owner_key, &id).await?;
            }
        }
        Ok(live)
    }

    fn decode(&self, raw: &str) -> Option<CapabilityToken> {
        serde_json::from_str(raw).ok()
    }
}

#[async_trait]
impl TokenStore for RedisTokenStore {
    async fn issue(&self, request: TokenIssueRequest) -> Result<CapabilityToken, ReplicationError> {
        if request.operation == StreamOperation::Send && request.snapshot.is_none() {
            return Err(ReplicationError::invalid_request("send tokens require a snapshot"));
        }
        if request.ttl.is_zero() {
            return Err(ReplicationError::invalid_request("token ttl must be positive"));
        }
        if request.ttl > self.policy.max_ttl() {
            return Err(ReplicationError::invalid_request(format!(
                "token ttl {}s exceeds the configured maximum {}s",
                request.ttl.as_secs(),
                self.policy.max_ttl().as_secs()
            )));
        }

        let live = self.live_owner_tokens(&request.owner_id).await?;
        if live.len() >= self.policy.max_tokens_per_owner {
            return Err(ReplicationError::QuotaExceeded(format!(
                "owner '{}' already holds {} tokens",
                request.owner_id,
                live.len()
            )));
        }

        let id = TokenId::generate();
        let now = Utc::now();
        let expires_at = now + chrono::Duration::from_std(request.ttl).map_err(|e| ReplicationError::internal(e.to_string()))?;
        let integrity_tag = self.signer.sign(&CapabilityToken::mac_input_for(
            &id,
            request.operation,
            &request.dataset,
            &request.owner_id,
        ));

        let token = CapabilityToken {
            id: id.clone(),
            operation: request.operation,
            dataset: request.dataset,
            snapshot: request.snapshot,
            from_snapshot: request.from_snapshot,
            parameters: request.parameters,
            owner_id: request.owner_id,
            bound_peer: request.bound_peer,
            created_at: now,
            expires_at,
            used: false,
            use_count: 0,
            last_used_at: None,
            last_used_peer: None,
            integrity_tag,
        };

        let record = serde_json::to_string(&token)?;
        self.store.set_ex(&self.token_key(id.as_str()), &record, request.ttl).await?;

        let owner_key = self.owner_key(&token.owner_id);
        self.store.sadd(&owner_key, id.as_str()).await?;
        self.store
            .expire(&owner_key, self.policy.max_ttl() + OWNER_INDEX_SLACK)
            .await?;

        let created = self.stats_key("tokens_created");
        self.store.hincr(&created, token.operation.as_str(), 1).await?;
        self.store.hincr(&created, "total", 1).await?;

        info!(
            token = id.preview(),
            operation = token.operation.as_str(),
            dataset = %token.dataset,
            owner = %token.owner_id,
            ttl_secs = request.ttl.as_secs(),
            "issued stream token"
        );
        Ok(token)
    }

    async fn validate(&self, id: &str, peer: Option<&str>) -> Result<Option<CapabilityToken>, ReplicationError> {
        let raw = match self.store.get(&self.token_key(id)).await? {
            Some(raw) => raw,
            None => {
                self.bump_validation("not_found").await;
                return Ok(None);
            }
        };

        let token = match self.decode(&raw) {
            Some(token) => token,
            None => {
                self.bump_validation("invalid_data").await;
                return Ok(None);
            }
        };

        // The key TTL is authoritative; this guards against clock drift
        // and records that outlived a TTL hiccup.
        if token.is_expired(Utc::now()) {
            self.bump_validation("expired").await;
            return Ok(None);
        }

        if !self.signer.verify(&token.mac_input(), &token.integrity_tag) {
            warn!(token = id.get(..8).unwrap_or(id), "token integrity tag mismatch");
            self.bump_validation("integrity_fail").await;
            return Ok(None);
        }

        if self.policy.enforce_peer_binding && !token.peer_allowed(peer) {
            self.bump_validation("peer_mismatch").await;
            return Ok(None);
        }

        self.bump_validation("success").await;
        Ok(Some(token))
    }

    async fn mark_used(&self, id: &str, peer: Option<&str>) -> Result<bool, ReplicationError> {
        let token_key = self.token_key(id);
        let raw = match self.store.get(&token_key).await? {
            Some(raw) => raw,
            None => return Ok(false),
        };
        let mut token = match self.decode(&raw) {
            Some(token) => token,
            None => return Ok(false),
        };

        let remaining = self.store.ttl(&token_key).await?;
        if remaining <= 0 {
            return Ok(false);
        }
        let remaining = Duration::from_secs(remaining as u64);

        // The INCR is the single-use gate: with two racing connections,
        // exactly one observes 1 here.
        let uses_key = self.uses_key(id);
        let uses = self.store.incr(&uses_key).await?;
        self.store.expire(&uses_key, remaining + OWNER_INDEX_SLACK).await?;

        if self.policy.single_use && uses > 1 {
            self.bump_validation("already_used").await;
            info!(token = token.id.preview(), uses, "rejected reuse of single-use token");
            return Ok(false);
        }

        token.used = true;
        token.use_count = uses.max(0) as u64;
        token.last_used_at = Some(Utc::now());
        token.last_used_peer = peer.map(|p| p.to_string());

        let record = serde_json::to_string(&token)?;
        self.store.set_ex(&token_key, &record, remaining).await?;
        self.store
            .hincr(&self.token_stats_key(id), "uses", 1)
            .await?;
        self.store
            .hincr(&self.stats_key("tokens_used"), token.operation.as_str(), 1)
            .await?;
        Ok(true)
    }

    async fn revoke(&self, id: &str) -> Result<bool, ReplicationError> {
        let token_key = self.token_key(id);
        let raw = self.store.get(&token_key).await?;

        let Some(raw) = raw else {
            // Idempotent: revoking an unknown or already-revoked token is
            // a no-op.
            return Ok(false);
        };

        if let Some(token) = self.decode(&raw) {
            self.store.srem(&self.owner_key(&token.owner_id), id).await?;
            self.store
                .hincr(&self.stats_key("tokens_revoked"), token.operation.as_str(), 1)
                .await?;
        }
        self.store
            .del(&[token_key, self.uses_key(id), self.token_stats_key(id)])
            .await?;
        info!(token = id.get(..8).unwrap_or(id), "revoked stream token");
        Ok(true)
    }

    async fn list(&self, owner_id: &str) -> Result<Vec<CapabilityToken>, ReplicationError> {
        let mut tokens = Vec::new();
        for id in self.live_owner_tokens(owner_id).await? {
            if let Some(raw) = self.store.get(&self.token_key(&id)).await? {
                if let Some(token) = self.decode(&raw) {
                    tokens.push(token);
                }
            }
        }
        tokens.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(tokens)
    }

    async fn stats(&self) -> Result<TokenStats, ReplicationError> {
        let to_counts = |raw: std::collections::HashMap<String, String>| {
            raw.into_iter()
                .filter_map(|(key, value)| value.parse::<u64>().ok().map(|count| (key, count)))
                .collect()
        };
        Ok(TokenStats {
            created: to_counts(self.store.hgetall(&self.stats_key("tokens_created")).await?),
            revoked: to_counts(self.store.hgetall(&self.stats_key("tokens_revoked")).await?),
            validation: to_counts(self.store.hgetall(&self.stats_key("validation")).await?),
        })
    }
}
