// /////////////////////////////////////////////////////////////////////////////
// Snapstream
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Dataset Endpoint Adapters
//!
//! [`DatasetEndpoint`] implementations over the command builder and
//! executor: [`ZfsEndpoint::local`] runs the tools directly,
//! [`ZfsEndpoint::remote`] runs the identical argument vectors behind the
//! secure shell. The planner sees both through the same port.
//!
//! The secure shell reports its own connection failures as exit code 255;
//! those surface as [`ReplicationError::RemoteUnreachable`] rather than a
//! tool failure.

use std::time::Duration;

use async_trait::async_trait;

use snapstream_domain::services::command_builder;
use snapstream_domain::services::DatasetEndpoint;
use snapstream_domain::{CommandTarget, DatasetName, RemoteHost, ReplicationError, SnapshotRef, ToolVersion};

use crate::infrastructure::process::{self, CommandOutput};

/// Exit code the secure shell uses for its own failures.
const SSH_FAILURE_CODE: i32 = 255;

/// Ceiling on probe commands so an unresponsive peer cannot stall
/// planning.
const PROBE_TIMEOUT: Duration = Duration::from_secs(30);

/// One host's view of its datasets, local or behind the secure shell.
pub struct ZfsEndpoint {
    target: CommandTarget,
}

impl ZfsEndpoint {
    pub fn local() -> Self {
        ZfsEndpoint {
            target: CommandTarget::Local,
        }
    }

    pub fn remote(host: RemoteHost) -> Self {
        ZfsEndpoint {
            target: CommandTarget::Remote(host),
        }
    }

    /// Wraps an argument vector for this endpoint's host.
    pub fn wrap(&self, argv: Vec<String>) -> Vec<String> {
        match &self.target {
            CommandTarget::Local => argv,
            CommandTarget::Remote(host) => command_builder::remote_command(host, &argv),
        }
    }

    async fn run(&self, argv: Vec<String>) -> Result<CommandOutput, ReplicationError> {
        let wrapped = self.wrap(argv);
        let output = process::run_with_timeout(&wrapped, PROBE_TIMEOUT).await?;
        if self.target.is_remote() && output.status == SSH_FAILURE_CODE {
            return Err(ReplicationError::RemoteUnreachable(format!(
                "{}: {}",
                self.target.peer_label(),
                output.stderr.trim()
            )));
        }
        Ok(output)
    }

    fn tool_failure(what: &str, output: &CommandOutput) -> ReplicationError {
        if output.stderr.contains("does not exist") {
            ReplicationError::not_found(format!("{}: {}", what, output.stderr.trim()))
        } else {
            ReplicationError::Pipeline {
                return_codes: vec![output.status],
                stderr: format!("{}: {}", what, output.stderr.trim()),
            }
        }
    }
}

#[async_trait]
impl DatasetEndpoint for ZfsEndpoint {
    fn target(&self) -> CommandTarget {
        self.target.clone()
    }

    async fn dataset_exists(&self, dataset: &DatasetName) -> Result<bool, ReplicationError> {
        let output = self.run(command_builder::dataset_exists(dataset)).await?;
        Ok(output.success())
    }

    async fn snapshots(&self, dataset: &DatasetName) -> Result<Vec<String>, ReplicationError> {
        let output = self.run(command_builder::snapshot_list()).await?;
        if !output.success() {
            return Err(Self::tool_failure("snapshot listing", &output));
        }
        let mut snapshots = Vec::new();
        for line in output.stdout.lines() {
            if let Some((listed_dataset, snapshot)) = line.trim().split_once('@') {
                if listed_dataset == dataset.as_str() {
                    snapshots.push(snapshot.to_string());
                }
            }
        }
        Ok(snapshots)
    }

    async fn property(&self, dataset: &DatasetName, property: &str) -> Result<Option<String>, ReplicationError> {
        let output = self
            .run(command_builder::dataset_get_properties(dataset, property))
            .await?;
        if !output.success() {
            return Err(Self::tool_failure(
                &format!("reading {} of {}", property, dataset),
                &output,
            ));
        }
        // `zfs get -H` prints: name <TAB> property <TAB> value <TAB> source
        let value = output
            .stdout
            .lines()
            .next()
            .and_then(|line| line.split('\t').nth(2))
            .map(str::trim)
            .filter(|value| !value.is_empty() && *value != "-")
            .map(str::to_string);
        Ok(value)
    }

    async fn resume_token(&self, dataset: &DatasetName) -> Result<Option<String>, ReplicationError> {
        self.property(dataset, "receive_resume_token").await
    }

    async fn create_snapshot(&self, snapshot: &SnapshotRef, recursive: bool) -> Result<(), ReplicationError> {
        let output = self.run(command_builder::snapshot_create(snapshot, recursive)).await?;
        output.require_success(&format!("snapshot {}", snapshot))
    }

    async fn hold(&self, snapshot: &SnapshotRef, tag: &str, recursive: bool) -> Result<(), ReplicationError> {
        let output = self
            .run(command_builder::snapshot_hold(snapshot, tag, recursive))
            .await?;
        output.require_success(&format!("hold {} on {}", tag, snapshot))
    }

    async fn release(&self, snapshot: &SnapshotRef, tag: &str, recursive: bool) -> Result<(), ReplicationError> {
        let output = self
            .run(command_builder::snapshot_release(snapshot, tag, recursive))
            .await?;
        output.require_success(&format!("release {} on {}", tag, snapshot))
    }

    async fn holds(&self, snapshot: &SnapshotRef) -> Result<Vec<String>, ReplicationError> {
        let output = self.run(command_builder::snapshot_holds(snapshot, false)).await?;
        if !output.success() {
            return Err(Self::tool_failure(&format!("holds on {}", snapshot), &output));
        }
        // `zfs holds -H` prints: name <TAB> tag <TAB> timestamp
        let mut tags = Vec::new();
        for line in output.stdout.lines() {
            if let Some(tag) = line.split('\t').nth(1) {
                let tag = tag.trim();
                if !tag.is_empty() {
                    tags.push(tag.to_string());
                }
            }
        }
        Ok(tags)
    }

    async fn tool_version(&self) -> Result<Option<ToolVersion>, ReplicationError> {
        // Pre-2.0 tooling has no --version; treat any failure as unknown.
        match self.run(command_builder::tool_version()).await {
            Ok(output) if output.success() => Ok(ToolVersion::parse(&output.stdout)),
            Ok(_) => Ok(None),
            Err(err @ ReplicationError::RemoteUnreachable(_)) => Err(err),
            Err(_) => Ok(None),
        }
    }

    async fn probe_program(&self, program: &str) -> Result<bool, ReplicationError> {
        let output = self.run(command_builder::probe_program(program)).await?;
        Ok(output.success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_wrap_is_identity() {
        let endpoint = ZfsEndpoint::local();
        let argv = vec!["zfs".to_string(), "list".to_string()];
        assert_eq!(endpoint.wrap(argv.clone()), argv);
        assert_eq!(endpoint.target(), CommandTarget::Local);
    }

    #[test]
    fn test_remote_wrap_prefixes_ssh() {
        let endpoint = ZfsEndpoint::remote(RemoteHost::new("root@peer").unwrap());
        let wrapped = endpoint.wrap(vec!["zfs".to_string(), "list".to_string()]);
        assert_eq!(wrapped[..4], ["ssh", "-o", "BatchMode=yes", "root@peer"]);
        assert_eq!(&wrapped[4..], ["zfs", "list"]);
        assert!(endpoint.target().is_remote());
    }

    #[tokio::test]
    async fn test_probe_program_against_real_path() {
        let endpoint = ZfsEndpoint::local();
        assert!(endpoint.probe_program("sh").await.unwrap());
        assert!(!endpoint.probe_program("snapstream-missing-compressor").await.unwrap());
    }
}
