// /////////////////////////////////////////////////////////////////////////////
// Snapstream
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Dataset Endpoint Port
//!
//! The async port through which the replication engine inspects and
//! mutates one side of a transfer. The service crate provides a local
//! implementation (direct tool execution) and a remote one (the same
//! commands behind the secure shell); the planner treats both uniformly.

use async_trait::async_trait;

use crate::error::ReplicationError;
use crate::value_objects::{CommandTarget, DatasetName, SnapshotRef, ToolVersion};

/// One side of a transfer: a host that can answer questions about its
/// datasets and take snapshots/holds on them.
#[async_trait]
pub trait DatasetEndpoint: Send + Sync {
    /// Where pipeline stages for this endpoint run. The executor uses this
    /// to wrap argument vectors for the secure shell.
    fn target(&self) -> CommandTarget;

    async fn dataset_exists(&self, dataset: &DatasetName) -> Result<bool, ReplicationError>;

    /// Snapshot names on `dataset`, oldest first, as the listing tool
    /// reports them.
    async fn snapshots(&self, dataset: &DatasetName) -> Result<Vec<String>, ReplicationError>;

    /// A single property value; `None` when the tool reports `-`.
    async fn property(&self, dataset: &DatasetName, property: &str) -> Result<Option<String>, ReplicationError>;

    /// The receive resume token, when a partial receive left one behind.
    async fn resume_token(&self, dataset: &DatasetName) -> Result<Option<String>, ReplicationError>;

    async fn create_snapshot(&self, snapshot: &SnapshotRef, recursive: bool) -> Result<(), ReplicationError>;

    async fn hold(&self, snapshot: &SnapshotRef, tag: &str, recursive: bool) -> Result<(), ReplicationError>;

    async fn release(&self, snapshot: &SnapshotRef, tag: &str, recursive: bool) -> Result<(), ReplicationError>;

    /// Hold tags on one snapshot.
    async fn holds(&self, snapshot: &SnapshotRef) -> Result<Vec<String>, ReplicationError>;

    /// Filesystem tooling version, `None` when it cannot be determined.
    async fn tool_version(&self) -> Result<Option<ToolVersion>, ReplicationError>;

    /// Whether `program` is on the endpoint's search path.
    async fn probe_program(&self, program: &str) -> Result<bool, ReplicationError>;
}
