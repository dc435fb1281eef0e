// /////////////////////////////////////////////////////////////////////////////
// Snapstream
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Capability token identifier.

use std::fmt;

use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::error::ReplicationError;

/// Number of random bytes behind a token id (128 bits).
const TOKEN_ID_BYTES: usize = 16;

/// Maximum accepted length of a token id on the wire.
pub const MAX_TOKEN_ID_LEN: usize = 128;

/// Identifier of a capability token.
///
/// 128 bits of operating-system randomness, hex-encoded so the id is
/// URL-safe and fits the wire protocol's 128-byte ceiling with room to
/// spare. The id is the only secret a streaming client ever presents.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenId(String);

impl TokenId {
    /// Generates a fresh random id.
    pub fn generate() -> Self {
        let mut bytes = [0u8; TOKEN_ID_BYTES];
        rand::rng().fill_bytes(&mut bytes);
        TokenId(hex::encode(bytes))
    }

    /// Validates an id received from a client.
    ///
    /// Rejects empty ids, ids past the wire ceiling, and anything that is
    /// not lowercase hex; all three are refused before any store lookup.
    pub fn parse(id: &str) -> Result<Self, ReplicationError> {
        if id.is_empty() {
            return Err(ReplicationError::Unauthorized("empty token id".to_string()));
        }
        if id.len() > MAX_TOKEN_ID_LEN {
            return Err(ReplicationError::Unauthorized("token id too long".to_string()));
        }
        if !id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()) {
            return Err(ReplicationError::Unauthorized("malformed token id".to_string()));
        }
        Ok(TokenId(id.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First eight characters, for log lines that must not leak the id.
    pub fn preview(&self) -> &str {
        &self.0[..self.0.len().min(8)]
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_unique_and_hex() {
        let a = TokenId::generate();
        let b = TokenId::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), TOKEN_ID_BYTES * 2);
        assert!(TokenId::parse(a.as_str()).is_ok());
    }

    #[test]
    fn test_parse_rejects_empty() {
        assert!(TokenId::parse("").is_err());
    }

    #[test]
    fn test_parse_rejects_oversized() {
        let long = "a".repeat(MAX_TOKEN_ID_LEN + 1);
        assert!(TokenId::parse(&long).is_err());
    }

    #[test]
    fn test_parse_rejects_non_hex() {
        assert!(TokenId::parse("xyz!").is_err());
        assert!(TokenId::parse("DEADBEEF").is_err());
    }

    #[test]
    fn test_preview_is_short() {
        let id = TokenId::generate();
        assert_eq!(id.preview().len(), 8);
    }
}
