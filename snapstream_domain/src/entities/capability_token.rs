// /////////////////////////////////////////////////////////////////////////////
// Snapstream
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Capability Token
//!
//! The authorization artifact for exactly one streaming operation. A token
//! is minted by the control API on the owner's request, validated by the
//! streaming socket on connect, latched as used before any bytes flow, and
//! removed by TTL expiry or explicit revocation.
//!
//! ## Invariants
//!
//! - the id is globally unique (128 random bits);
//! - past `expires_at` the token is invalid regardless of other fields;
//! - revocation is terminal;
//! - an integrity-tag mismatch is treated as if the token did not exist.
//!
//! The integrity tag is a keyed MAC over `(id, operation, dataset,
//! owner_id)`; the key is process-global and owned by the store
//! implementation, so this entity only assembles the MAC input and carries
//! the encoded tag.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ReplicationError;
use crate::value_objects::{DatasetName, TokenId};

/// The streaming operation a token authorizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamOperation {
    Send,
    Receive,
}

impl StreamOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamOperation::Send => "send",
            StreamOperation::Receive => "receive",
        }
    }
}

impl fmt::Display for StreamOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StreamOperation {
    type Err = ReplicationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "send" => Ok(StreamOperation::Send),
            "receive" => Ok(StreamOperation::Receive),
            other => Err(ReplicationError::invalid_request(format!(
                "'{}' is not a stream operation",
                other
            ))),
        }
    }
}

/// The transfer knobs a token carries into the spawned pipeline.
///
/// `raw` and `compressed` are tri-state: `None` means the side building the
/// pipeline derives them from the dataset's encryption and compression
/// properties.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferParameters {
    /// Encrypted-stream passthrough (`-w`). `None` = derive from the
    /// dataset's encryption property.
    #[serde(default)]
    pub raw: Option<bool>,
    /// Block-level compressed stream (`-c`). `None` = derive from the
    /// dataset's compression property.
    #[serde(default)]
    pub compressed: Option<bool>,
    /// Replicate child datasets.
    #[serde(default)]
    pub recursive: bool,
    /// On receive, keep partial state for later resume (`-s`).
    #[serde(default)]
    pub resumable: bool,
    /// On receive, roll back the destination as needed (`-F`).
    #[serde(default = "default_force")]
    pub force: bool,
}

fn default_force() -> bool {
    true
}

impl Default for TransferParameters {
    fn default() -> Self {
        TransferParameters {
            raw: None,
            compressed: None,
            recursive: false,
            resumable: false,
            force: true,
        }
    }
}

/// A single-use capability for one streaming operation on one dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityToken {
    pub id: TokenId,
    pub operation: StreamOperation,
    pub dataset: DatasetName,
    /// Snapshot to send; required for send tokens, absent for receive.
    #[serde(default)]
    pub snapshot: Option<String>,
    /// Base snapshot for an incremental send.
    #[serde(default)]
    pub from_snapshot: Option<String>,
    pub parameters: TransferParameters,
    /// Authenticated identity of the caller who minted the token.
    pub owner_id: String,
    /// When set, the connecting peer must present exactly this address.
    #[serde(default)]
    pub bound_peer: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Latched by the first successful `mark_used`.
    #[serde(default)]
    pub used: bool,
    /// Monotonically increasing use counter.
    #[serde(default)]
    pub use_count: u64,
    #[serde(default)]
    pub last_used_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_used_peer: Option<String>,
    /// Hex-encoded keyed MAC over [`Self::mac_input`].
    pub integrity_tag: String,
}

impl CapabilityToken {
    /// The canonical byte string the integrity tag signs.
    pub fn mac_input(&self) -> String {
        Self::mac_input_for(&self.id, self.operation, &self.dataset, &self.owner_id)
    }

    /// MAC input assembled from parts, for signing before the entity
    /// exists.
    pub fn mac_input_for(id: &TokenId, operation: StreamOperation, dataset: &DatasetName, owner_id: &str) -> String {
        format!("{}:{}:{}:{}", id, operation, dataset, owner_id)
    }

    /// Defence-in-depth expiry check; the persistence layer's own TTL is
    /// the source of truth.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Whether a connecting peer satisfies the binding, if any.
    pub fn peer_allowed(&self, peer: Option<&str>) -> bool {
        match (&self.bound_peer, peer) {
            (None, _) => true,
            (Some(bound), Some(peer)) => bound == peer,
            (Some(_), None) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn token() -> CapabilityToken {
        let now = Utc::now();
        CapabilityToken {
            id: TokenId::generate(),
            operation: StreamOperation::Send,
            dataset: DatasetName::new("tank/data").unwrap(),
            snapshot: Some("s1".to_string()),
            from_snapshot: None,
            parameters: TransferParameters::default(),
            owner_id: "alice".to_string(),
            bound_peer: None,
            created_at: now,
            expires_at: now + Duration::seconds(300),
            used: false,
            use_count: 0,
            last_used_at: None,
            last_used_peer: None,
            integrity_tag: String::new(),
        }
    }

    #[test]
    fn test_mac_input_covers_identity_fields() {
        let token = token();
        let input = token.mac_input();
        assert!(input.contains(token.id.as_str()));
        assert!(input.contains("send"));
        assert!(input.contains("tank/data"));
        assert!(input.contains("alice"));
    }

    #[test]
    fn test_expiry_is_strict() {
        let token = token();
        assert!(!token.is_expired(token.created_at));
        assert!(!token.is_expired(token.expires_at));
        assert!(token.is_expired(token.expires_at + Duration::seconds(1)));
    }

    #[test]
    fn test_peer_binding() {
        let mut token = token();
        assert!(token.peer_allowed(Some("10.0.0.1")));
        assert!(token.peer_allowed(None));

        token.bound_peer = Some("10.0.0.1".to_string());
        assert!(token.peer_allowed(Some("10.0.0.1")));
        assert!(!token.peer_allowed(Some("10.0.0.2")));
        assert!(!token.peer_allowed(None));
    }

    #[test]
    fn test_parameters_default_force() {
        let params: TransferParameters = serde_json::from_str("{}").unwrap();
        assert!(params.force);
        assert!(!params.recursive);
        assert_eq!(params.raw, None);
    }

    #[test]
    fn test_token_record_roundtrip() {
        let token = token();
        let json = serde_json::to_string(&token).unwrap();
        let back: CapabilityToken = serde_json::from_str(&json).unwrap();
        assert_eq!(token, back);
    }
}
