// /////////////////////////////////////////////////////////////////////////////
// Snapstream
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Filesystem tool version, as reported by `--version` output.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Major/minor version of the filesystem tooling on an endpoint.
///
/// Native block-level stream compression requires tooling at or past 2.0 on
/// both sides of a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ToolVersion {
    pub major: u32,
    pub minor: u32,
}

impl ToolVersion {
    pub fn new(major: u32, minor: u32) -> Self {
        ToolVersion { major, minor }
    }

    /// Extracts the first `major.minor` pair from version output such as
    /// `zfs-2.1.5-1` or `zfs-kmod-0.8.3`.
    pub fn parse(output: &str) -> Option<Self> {
        for token in output.split(|c: char| !(c.is_ascii_digit() || c == '.')) {
            let mut parts = token.split('.');
            if let (Some(major), Some(minor)) = (parts.next(), parts.next()) {
                if let (Ok(major), Ok(minor)) = (major.parse(), minor.parse()) {
                    return Some(ToolVersion { major, minor });
                }
            }
        }
        None
    }

    /// Whether this version can produce and consume compressed send streams.
    pub fn supports_native_compression(&self) -> bool {
        *self >= ToolVersion::new(2, 0)
    }
}

impl fmt::Display for ToolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_common_forms() {
        assert_eq!(ToolVersion::parse("zfs-2.1.5-1"), Some(ToolVersion::new(2, 1)));
        assert_eq!(ToolVersion::parse("zfs-0.8.3"), Some(ToolVersion::new(0, 8)));
        assert_eq!(
            ToolVersion::parse("zfs-2.2.0\nzfs-kmod-2.2.0"),
            Some(ToolVersion::new(2, 2))
        );
        assert_eq!(ToolVersion::parse("no digits here"), None);
    }

    #[test]
    fn test_native_compression_cutoff() {
        assert!(ToolVersion::new(2, 0).supports_native_compression());
        assert!(ToolVersion::new(2, 3).supports_native_compression());
        assert!(!ToolVersion::new(0, 8).supports_native_compression());
        assert!(!ToolVersion::new(1, 9).supports_native_compression());
    }
}
