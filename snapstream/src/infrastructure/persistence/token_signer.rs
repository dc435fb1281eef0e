// /////////////////////////////////////////////////////////////////////////////
// Snapstream
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Token Integrity Signer
//!
//! Keyed MAC (HMAC-SHA256) over a token's identity fields. The key is
//! derived from the process-global secret loaded at startup; changing the
//! secret (a configuration reload) invalidates every tag signed under the
//! old one, which is the intended rotation story.
//!
//! The secret itself lives in [`MacSecret`], which scrubs its memory on
//! drop and never prints its value through `Debug`.

use std::fmt;

use ring::hmac;
use serde::{Deserialize, Deserializer};
use zeroize::Zeroizing;

/// The MAC secret: zeroized on drop, redacted in debug output.
#[derive(Clone, Default)]
pub struct MacSecret(Zeroizing<String>);

impl MacSecret {
    pub fn new(secret: impl Into<String>) -> Self {
        MacSecret(Zeroizing::new(secret.into()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The raw secret bytes, for key derivation only.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for MacSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MacSecret(redacted)")
    }
}

impl<'de> Deserialize<'de> for MacSecret {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        String::deserialize(deserializer).map(MacSecret::new)
    }
}

/// Signs and verifies token integrity tags.
pub struct TokenSigner {
    key: hmac::Key,
}

impl TokenSigner {
    pub fn new(secret: &MacSecret) -> Self {
        TokenSigner {
            key: hmac::Key::new(hmac::HMAC_SHA256, secret.expose().as_bytes()),
        }
    }

    /// Hex tag over the canonical MAC input.
    pub fn sign(&self, input: &str) -> String {
        hex::encode(hmac::sign(&self.key, input.as_bytes()).as_ref())
    }

    /// Constant-time verification; a malformed tag is simply invalid.
    pub fn verify(&self, input: &str, tag: &str) -> bool {
        match hex::decode(tag) {
            Ok(raw) => hmac::verify(&self.key, input.as_bytes(), &raw).is_ok(),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer(secret: &str) -> TokenSigner {
        TokenSigner::new(&MacSecret::new(secret))
    }

    #[test]
    fn test_sign_verify_roundtrip() {
        let signer = signer("secret");
        let tag = signer.sign("id:send:tank/data:alice");
        assert!(signer.verify("id:send:tank/data:alice", &tag));
    }

    #[test]
    fn test_tampered_input_rejected() {
        let signer = signer("secret");
        let tag = signer.sign("id:send:tank/data:alice");
        assert!(!signer.verify("id:send:tank/other:alice", &tag));
        assert!(!signer.verify("id:send:tank/data:mallory", &tag));
    }

    #[test]
    fn test_rotated_secret_invalidates_tags() {
        let old = signer("old-secret");
        let new = signer("new-secret");
        let tag = old.sign("input");
        assert!(!new.verify("input", &tag));
    }

    #[test]
    fn test_malformed_tag_rejected() {
        let signer = signer("secret");
        assert!(!signer.verify("input", "not-hex!"));
        assert!(!signer.verify("input", ""));
    }

    #[test]
    fn test_secret_is_redacted_in_debug() {
        let secret = MacSecret::new("super-secret-value");
        let printed = format!("{:?}", secret);
        assert!(!printed.contains("super-secret-value"));
        assert!(!secret.is_empty());
        assert!(MacSecret::default().is_empty());
    }
}
