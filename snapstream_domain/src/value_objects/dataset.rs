// /////////////////////////////////////////////////////////////////////////////
// Snapstream
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Dataset Names and Snapshot References
//!
//! Validated names for the objects the underlying filesystem tools operate
//! on. A dataset name is a hierarchical path (`pool/a/b`), a snapshot
//! reference is `dataset@name`, and a remote host is the `user@host` string
//! handed to the secure shell. The names are opaque to the service beyond
//! the character set the tools accept; validation here exists to refuse
//! strings that would be parsed as flags or split into multiple arguments.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ReplicationError;

/// Characters the filesystem tools accept inside dataset path components.
fn is_component_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | ':' | '%')
}

/// Characters accepted inside snapshot names.
fn is_snapshot_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | ':' | '%')
}

/// A hierarchical dataset path, e.g. `tank/backups/home`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DatasetName(String);

impl DatasetName {
    /// Validates and wraps a dataset path.
    ///
    /// Rejects empty names, leading `/` or `-`, empty path components, and
    /// any character outside the tool's accepted set. `@` and `#` are
    /// rejected here; use [`SnapshotRef`] for snapshot references.
    pub fn new(name: impl Into<String>) -> Result<Self, ReplicationError> {
        let name = name.into();
        if name.is_empty() {
            return Err(ReplicationError::invalid_request("dataset name is empty"));
        }
        if name.starts_with('/') || name.starts_with('-') {
            return Err(ReplicationError::invalid_request(format!(
                "dataset name '{}' must not start with '/' or '-'",
                name
            )));
        }
        for component in name.split('/') {
            if component.is_empty() {
                return Err(ReplicationError::invalid_request(format!(
                    "dataset name '{}' contains an empty path component",
                    name
                )));
            }
            if let Some(bad) = component.chars().find(|c| !is_component_char(*c)) {
                return Err(ReplicationError::invalid_request(format!(
                    "dataset name '{}' contains invalid character '{}'",
                    name, bad
                )));
            }
        }
        Ok(DatasetName(name))
    }

    /// The pool component (everything before the first `/`).
    pub fn pool(&self) -> &str {
        self.0.split('/').next().unwrap_or(&self.0)
    }

    /// Builds a snapshot reference on this dataset.
    pub fn snapshot(&self, name: impl Into<String>) -> Result<SnapshotRef, ReplicationError> {
        SnapshotRef::new(self.clone(), name)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DatasetName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for DatasetName {
    type Err = ReplicationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DatasetName::new(s)
    }
}

/// A snapshot reference, `dataset@snapshot`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SnapshotRef {
    dataset: DatasetName,
    snapshot: String,
}

impl SnapshotRef {
    pub fn new(dataset: DatasetName, snapshot: impl Into<String>) -> Result<Self, ReplicationError> {
        let snapshot = snapshot.into();
        if snapshot.is_empty() {
            return Err(ReplicationError::invalid_request("snapshot name is empty"));
        }
        if let Some(bad) = snapshot.chars().find(|c| !is_snapshot_char(*c)) {
            return Err(ReplicationError::invalid_request(format!(
                "snapshot name '{}' contains invalid character '{}'",
                snapshot, bad
            )));
        }
        Ok(SnapshotRef { dataset, snapshot })
    }

    /// Parses a `dataset@snapshot` string.
    pub fn parse(reference: &str) -> Result<Self, ReplicationError> {
        let (dataset, snapshot) = reference.split_once('@').ok_or_else(|| {
            ReplicationError::invalid_request(format!("'{}' is not a dataset@snapshot reference", reference))
        })?;
        SnapshotRef::new(DatasetName::new(dataset)?, snapshot)
    }

    pub fn dataset(&self) -> &DatasetName {
        &self.dataset
    }

    pub fn name(&self) -> &str {
        &self.snapshot
    }
}

impl fmt::Display for SnapshotRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.dataset, self.snapshot)
    }
}

/// The peer host for remote operations, as handed to the secure shell
/// (`host` or `user@host`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteHost(String);

impl RemoteHost {
    pub fn new(host: impl Into<String>) -> Result<Self, ReplicationError> {
        let host = host.into();
        if host.is_empty() {
            return Err(ReplicationError::invalid_request("remote host is empty"));
        }
        if host.starts_with('-') || host.chars().any(|c| c.is_whitespace()) {
            return Err(ReplicationError::invalid_request(format!(
                "remote host '{}' is not a valid ssh destination",
                host
            )));
        }
        Ok(RemoteHost(host))
    }

    /// The bare host name, with any `user@` prefix stripped. Used for hold
    /// tags and peer identification.
    pub fn host_name(&self) -> &str {
        self.0.rsplit('@').next().unwrap_or(&self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RemoteHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dataset_name_accepts_hierarchy() {
        let name = DatasetName::new("tank/backups/home").unwrap();
        assert_eq!(name.pool(), "tank");
        assert_eq!(name.as_str(), "tank/backups/home");
    }

    #[test]
    fn test_dataset_name_rejects_empty_and_flags() {
        assert!(DatasetName::new("").is_err());
        assert!(DatasetName::new("-R").is_err());
        assert!(DatasetName::new("/tank").is_err());
        assert!(DatasetName::new("tank//child").is_err());
    }

    #[test]
    fn test_dataset_name_rejects_snapshot_separators() {
        assert!(DatasetName::new("tank@snap").is_err());
        assert!(DatasetName::new("tank#mark").is_err());
        assert!(DatasetName::new("tank/a b").is_err());
    }

    #[test]
    fn test_snapshot_ref_roundtrip() {
        let snap = SnapshotRef::parse("tank/data@daily_2025-07-01-00-00").unwrap();
        assert_eq!(snap.dataset().as_str(), "tank/data");
        assert_eq!(snap.name(), "daily_2025-07-01-00-00");
        assert_eq!(snap.to_string(), "tank/data@daily_2025-07-01-00-00");
    }

    #[test]
    fn test_snapshot_ref_rejects_bare_dataset() {
        assert!(SnapshotRef::parse("tank/data").is_err());
        assert!(SnapshotRef::parse("tank/data@").is_err());
    }

    #[test]
    fn test_remote_host() {
        let host = RemoteHost::new("backup@10.0.0.2").unwrap();
        assert_eq!(host.host_name(), "10.0.0.2");
        assert!(RemoteHost::new("").is_err());
        assert!(RemoteHost::new("-oProxyCommand=x").is_err());
        assert!(RemoteHost::new("host name").is_err());
    }
}
