// /////////////////////////////////////////////////////////////////////////////
// Snapstream
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Domain Error System
//!
//! This module provides the error taxonomy for the replication domain. Every
//! failure the service can surface maps onto exactly one variant, so the
//! calling layer can decide disposition (return to caller, close the
//! connection, retry, fail the job) from the variant alone.
//!
//! ## Error Categories
//!
//! ### Caller Errors
//! - **InvalidRequest**: malformed or contradictory parameters
//! - **NotFound**: dataset, snapshot, token or job does not exist
//! - **Unauthorized**: token validation failed or the caller may not act
//! - **TokenReused**: a single-use token presented a second time
//! - **QuotaExceeded**: the owner holds too many concurrent tokens
//!
//! ### Planning and Transfer Errors
//! - **NoCommonSnapshot**: incremental negotiation found no shared base
//! - **RemoteUnreachable**: the secure-shell peer could not be queried
//! - **ResumeMismatch**: a resume-token send was rejected by the peer
//!
//! ### Subprocess Errors
//! - **Spawn**: the executable could not be started (missing binary)
//! - **Pipeline**: one or more pipeline children exited non-zero; carries
//!   every non-zero return code and the captured stderr
//!
//! ### Persistence Errors
//! - **PersistenceTransient**: retryable store failure (connection, timeout)
//! - **PersistencePermanent**: non-retryable store failure; callers fail
//!   closed
//!
//! ### System Errors
//! - **Io**, **Serialization**, **Timeout**, **Cancelled**, **Internal**
//!
//! ## Recovery Policy
//!
//! Transient persistence errors are retried with bounded exponential backoff
//! by the store wrapper; after exhaustion they are surfaced unchanged and
//! every caller fails closed (no token minted or accepted, no job state
//! advanced). Cancellation is not a failure: jobs finishing on the
//! cancellation path report success with the cancellation marker set.

use thiserror::Error;

/// Domain-specific errors for the replication service.
///
/// Each variant includes a descriptive message. Variants are chosen so
/// every disposition decision is a `match`, never string inspection.
#[derive(Error, Debug, Clone)]
pub enum ReplicationError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Token already used: {0}")]
    TokenReused(String),

    #[error("Token quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("No common snapshot: {0}")]
    NoCommonSnapshot(String),

    #[error("Remote unreachable: {0}")]
    RemoteUnreachable(String),

    #[error("Spawn failed: {0}")]
    Spawn(String),

    #[error("Pipeline failed (rc={return_codes:?}): {stderr}")]
    Pipeline {
        /// Every non-zero return code in the pipeline, in stage order.
        /// Signal exits are encoded negative (SIGTERM is -15).
        return_codes: Vec<i32>,
        /// Captured stderr of the failing stages, newest last.
        stderr: String,
    },

    #[error("Resume mismatch: {0}")]
    ResumeMismatch(String),

    #[error("Persistence error (transient): {0}")]
    PersistenceTransient(String),

    #[error("Persistence error: {0}")]
    PersistencePermanent(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ReplicationError {
    /// Convenience constructor for invalid-request errors.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        ReplicationError::InvalidRequest(message.into())
    }

    /// Convenience constructor for not-found errors.
    pub fn not_found(message: impl Into<String>) -> Self {
        ReplicationError::NotFound(message.into())
    }

    /// Convenience constructor for internal errors.
    pub fn internal(message: impl Into<String>) -> Self {
        ReplicationError::Internal(message.into())
    }

    /// Convenience constructor for cancellation.
    pub fn cancelled() -> Self {
        ReplicationError::Cancelled("operation cancelled".to_string())
    }

    /// Whether the failure is worth retrying with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ReplicationError::PersistenceTransient(_) | ReplicationError::Timeout(_)
        )
    }

    /// Stable machine-readable kind, used by the control API error mapping.
    pub fn kind(&self) -> &'static str {
        match self {
            ReplicationError::InvalidRequest(_) => "invalid_request",
            ReplicationError::NotFound(_) => "not_found",
            ReplicationError::Unauthorized(_) => "unauthorized",
            ReplicationError::TokenReused(_) => "token_reused",
            ReplicationError::QuotaExceeded(_) => "quota_exceeded",
            ReplicationError::NoCommonSnapshot(_) => "no_common_snapshot",
            ReplicationError::RemoteUnreachable(_) => "remote_unreachable",
            ReplicationError::Spawn(_) => "spawn_error",
            ReplicationError::Pipeline { .. } => "pipeline_error",
            ReplicationError::ResumeMismatch(_) => "resume_mismatch",
            ReplicationError::PersistenceTransient(_) => "persistence_transient",
            ReplicationError::PersistencePermanent(_) => "persistence_permanent",
            ReplicationError::Serialization(_) => "serialization_error",
            ReplicationError::Io(_) => "io_error",
            ReplicationError::Timeout(_) => "timeout",
            ReplicationError::Cancelled(_) => "cancelled",
            ReplicationError::Internal(_) => "internal_error",
        }
    }
}

impl From<std::io::Error> for ReplicationError {
    fn from(err: std::io::Error) -> Self {
        ReplicationError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for ReplicationError {
    fn from(err: serde_json::Error) -> Self {
        ReplicationError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(ReplicationError::PersistenceTransient("lost connection".into()).is_transient());
        assert!(ReplicationError::Timeout("pop".into()).is_transient());
        assert!(!ReplicationError::PersistencePermanent("bad record".into()).is_transient());
        assert!(!ReplicationError::NotFound("job".into()).is_transient());
    }

    #[test]
    fn test_pipeline_error_display() {
        let err = ReplicationError::Pipeline {
            return_codes: vec![1, -15],
            stderr: "cannot receive: dataset is busy".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("1"));
        assert!(text.contains("-15"));
        assert!(text.contains("dataset is busy"));
    }

    #[test]
    fn test_kind_is_stable() {
        assert_eq!(ReplicationError::invalid_request("x").kind(), "invalid_request");
        assert_eq!(ReplicationError::cancelled().kind(), "cancelled");
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let err: ReplicationError = io.into();
        assert_eq!(err.kind(), "io_error");
    }
}
