// /////////////////////////////////////////////////////////////////////////////
// Snapstream
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Token Store Port
//!
//! Persistence contract for capability tokens. The store's own TTL is the
//! source of truth for expiry; the `expires_at` field on the record is a
//! defence in depth checked during validation. All operations fail closed:
//! a store failure means no token is minted, validated or marked used.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::entities::{CapabilityToken, StreamOperation, TransferParameters};
use crate::error::ReplicationError;
use crate::value_objects::DatasetName;

/// Everything needed to mint a token.
#[derive(Debug, Clone)]
pub struct TokenIssueRequest {
    pub operation: StreamOperation,
    pub dataset: DatasetName,
    /// Required for send tokens.
    pub snapshot: Option<String>,
    /// Base snapshot for an incremental send.
    pub from_snapshot: Option<String>,
    pub parameters: TransferParameters,
    /// Authenticated identity of the requesting caller.
    pub owner_id: String,
    /// When set, the connecting peer must present exactly this address.
    pub bound_peer: Option<String>,
    pub ttl: Duration,
}

/// Counter snapshot for the token subsystem.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenStats {
    /// Issue counters, keyed by operation name plus `total`.
    pub created: HashMap<String, u64>,
    /// Revocation counters, keyed by operation name.
    pub revoked: HashMap<String, u64>,
    /// Validation outcome counters: `success`, `not_found`, `expired`,
    /// `integrity_fail`, `peer_mismatch`, `already_used`, `invalid_data`.
    pub validation: HashMap<String, u64>,
}

/// Capability token persistence and validation.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Mints and persists a fresh token.
    ///
    /// Fails with [`ReplicationError::QuotaExceeded`] when the owner already
    /// holds the configured maximum of concurrent tokens, and with
    /// [`ReplicationError::InvalidRequest`] when the request is malformed
    /// (a send token without a snapshot, a TTL past the configured cap).
    async fn issue(&self, request: TokenIssueRequest) -> Result<CapabilityToken, ReplicationError>;

    /// Fetches and checks a token without mutating it.
    ///
    /// Returns `None` for unknown, expired, integrity-failed or
    /// peer-mismatched tokens; the reasons are deliberately
    /// indistinguishable to the caller.
    async fn validate(&self, id: &str, peer: Option<&str>) -> Result<Option<CapabilityToken>, ReplicationError>;

    /// Latches the token as used.
    ///
    /// Under the single-use policy, at most one concurrent caller gets
    /// `true`; every later call returns `false` and the connection must be
    /// rejected.
    async fn mark_used(&self, id: &str, peer: Option<&str>) -> Result<bool, ReplicationError>;

    /// Removes the token and its owner-index entry. Idempotent: revoking a
    /// missing token returns `false`.
    async fn revoke(&self, id: &str) -> Result<bool, ReplicationError>;

    /// Live tokens held by one owner.
    async fn list(&self, owner_id: &str) -> Result<Vec<CapabilityToken>, ReplicationError>;

    /// Counter snapshot.
    async fn stats(&self) -> Result<TokenStats, ReplicationError>;
}
