// /////////////////////////////////////////////////////////////////////////////
// Snapstream
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Dataset Administration
//!
//! The pass-through half of the control surface: dataset, snapshot, pool,
//! bookmark, clone and volume management as thin marshalling over the
//! command builder and executor. Every method builds its argument vector
//! through the domain builder, runs it locally, and parses the tool's
//! tab-separated output into structured results.

use std::collections::BTreeMap;

use chrono::Utc;

use snapstream_domain::services::command_builder::{self, ImportNaming, SendOptions};
use snapstream_domain::services::transfer_planner::{self, SnapshotDiff};
use snapstream_domain::value_objects::{format_bytes, parse_size_suffix};
use snapstream_domain::{DatasetName, ReplicationError, SnapshotRef};

use crate::infrastructure::process::{self, CommandOutput};

/// Space accounting for one dataset, from `zfs list -Hpo space`.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct SpaceUsage {
    pub name: String,
    pub available: u64,
    pub used: u64,
    pub used_by_snapshots: u64,
    pub used_by_dataset: u64,
    pub used_by_refreservation: u64,
    pub used_by_children: u64,
}

/// Local administrative operations over the filesystem tools.
pub struct DatasetAdmin;

impl DatasetAdmin {
    pub fn new() -> Self {
        DatasetAdmin
    }

    async fn run(&self, argv: Vec<String>) -> Result<CommandOutput, ReplicationError> {
        process::run(&argv).await
    }

    async fn run_checked(&self, argv: Vec<String>, what: &str) -> Result<(), ReplicationError> {
        let output = self.run(argv).await?;
        output.require_success(what)
    }

    // ==================== DATASETS ====================

    pub async fn dataset_create(
        &self,
        dataset: &DatasetName,
        properties: &BTreeMap<String, String>,
    ) -> Result<(), ReplicationError> {
        self.run_checked(
            command_builder::dataset_create(dataset, properties),
            &format!("create {}", dataset),
        )
        .await
    }

    pub async fn dataset_destroy(&self, dataset: &DatasetName, recursive: bool) -> Result<(), ReplicationError> {
        self.run_checked(
            command_builder::dataset_destroy(dataset, recursive),
            &format!("destroy {}", dataset),
        )
        .await
    }

    pub async fn dataset_list(&self, root: Option<&DatasetName>) -> Result<Vec<String>, ReplicationError> {
        let output = self.run(command_builder::dataset_list(root)).await?;
        output.require_success("list datasets")?;
        Ok(first_columns(&output.stdout))
    }

    pub async fn dataset_properties(
        &self,
        dataset: &DatasetName,
        property: &str,
    ) -> Result<BTreeMap<String, String>, ReplicationError> {
        let output = self
            .run(command_builder::dataset_get_properties(dataset, property))
            .await?;
        output.require_success(&format!("get properties of {}", dataset))?;
        // name <TAB> property <TAB> value <TAB> source
        let mut properties = BTreeMap::new();
        for line in output.stdout.lines() {
            let fields: Vec<&str> = line.split('\t').collect();
            if fields.len() >= 3 && fields[2] != "-" {
                properties.insert(fields[1].to_string(), fields[2].to_string());
            }
        }
        Ok(properties)
    }

    pub async fn dataset_set_property(
        &self,
        dataset: &DatasetName,
        property: &str,
        value: &str,
    ) -> Result<(), ReplicationError> {
        self.run_checked(
            command_builder::dataset_set_property(dataset, property, value),
            &format!("set {} on {}", property, dataset),
        )
        .await
    }

    pub async fn dataset_space(&self, dataset: &DatasetName) -> Result<SpaceUsage, ReplicationError> {
        let output = self.run(command_builder::dataset_get_space(dataset)).await?;
        output.require_success(&format!("space of {}", dataset))?;
        parse_space(&output.stdout)
    }

    pub async fn dataset_mount(&self, dataset: &DatasetName) -> Result<(), ReplicationError> {
        self.run_checked(command_builder::dataset_mount(dataset), &format!("mount {}", dataset))
            .await
    }

    pub async fn dataset_rename(&self, from: &DatasetName, to: &DatasetName) -> Result<(), ReplicationError> {
        self.run_checked(
            command_builder::dataset_rename(from, to),
            &format!("rename {} to {}", from, to),
        )
        .await
    }

    pub async fn dataset_promote(&self, dataset: &DatasetName) -> Result<(), ReplicationError> {
        self.run_checked(
            command_builder::dataset_promote(dataset),
            &format!("promote {}", dataset),
        )
        .await
    }

    pub async fn dataset_share(&self, dataset: &DatasetName) -> Result<(), ReplicationError> {
        self.run_checked(command_builder::dataset_share(dataset), &format!("share {}", dataset))
            .await
    }

    pub async fn dataset_unshare(&self, dataset: &DatasetName) -> Result<(), ReplicationError> {
        self.run_checked(
            command_builder::dataset_unshare(dataset),
            &format!("unshare {}", dataset),
        )
        .await
    }

    // ==================== SNAPSHOTS ====================

    pub async fn snapshot_create(&self, snapshot: &SnapshotRef, recursive: bool) -> Result<(), ReplicationError> {
        self.run_checked(
            command_builder::snapshot_create(snapshot, recursive),
            &format!("snapshot {}", snapshot),
        )
        .await
    }

    /// Auto-named snapshot: `tag[_tag1]_YYYY-MM-DD-HH-MM`.
    pub async fn snapshot_create_auto(
        &self,
        dataset: &DatasetName,
        tag: &str,
        tag1: Option<&str>,
        recursive: bool,
    ) -> Result<String, ReplicationError> {
        let mut name = tag.to_string();
        if let Some(tag1) = tag1 {
            name.push('_');
            name.push_str(tag1);
        }
        name.push('_');
        name.push_str(&Utc::now().format("%Y-%m-%d-%H-%M").to_string());

        let snapshot = dataset.snapshot(&name)?;
        self.snapshot_create(&snapshot, recursive).await?;
        Ok(name)
    }

    pub async fn snapshot_list(&self, dataset: &DatasetName) -> Result<Vec<String>, ReplicationError> {
        let output = self.run(command_builder::snapshot_list()).await?;
        output.require_success("list snapshots")?;
        Ok(output
            .stdout
            .lines()
            .filter_map(|line| line.trim().split_once('@'))
            .filter(|(listed, _)| *listed == dataset.as_str())
            .map(|(_, snapshot)| snapshot.to_string())
            .collect())
    }

    pub async fn snapshot_destroy(&self, snapshot: &SnapshotRef, recursive: bool) -> Result<(), ReplicationError> {
        self.run_checked(
            command_builder::snapshot_destroy(snapshot, recursive),
            &format!("destroy {}", snapshot),
        )
        .await
    }

    /// Destroys all but the newest `keep` snapshots, optionally filtered
    /// by a tag substring. Returns the destroyed names.
    pub async fn snapshot_autoremove(
        &self,
        dataset: &DatasetName,
        keep: usize,
        tag: Option<&str>,
        recursive: bool,
    ) -> Result<Vec<String>, ReplicationError> {
        let snapshots = self.snapshot_list(dataset).await?;
        let victims = transfer_planner::retention_victims(&snapshots, keep, tag);
        let mut removed = Vec::new();
        for name in victims {
            let snapshot = dataset.snapshot(&name)?;
            // A held snapshot refuses destruction; skip it and keep going.
            match self.snapshot_destroy(&snapshot, recursive).await {
                Ok(()) => removed.push(name),
                Err(err) => tracing::warn!(snapshot = %snapshot, error = %err, "autoremove skipped snapshot"),
            }
        }
        Ok(removed)
    }

    pub async fn snapshot_rollback(&self, snapshot: &SnapshotRef) -> Result<(), ReplicationError> {
        self.run_checked(
            command_builder::snapshot_rollback(snapshot),
            &format!("rollback to {}", snapshot),
        )
        .await
    }

    pub async fn snapshot_hold(&self, snapshot: &SnapshotRef, tag: &str, recursive: bool) -> Result<(), ReplicationError> {
        self.run_checked(
            command_builder::snapshot_hold(snapshot, tag, recursive),
            &format!("hold {} on {}", tag, snapshot),
        )
        .await
    }

    pub async fn snapshot_release(
        &self,
        snapshot: &SnapshotRef,
        tag: &str,
        recursive: bool,
    ) -> Result<(), ReplicationError> {
        self.run_checked(
            command_builder::snapshot_release(snapshot, tag, recursive),
            &format!("release {} on {}", tag, snapshot),
        )
        .await
    }

    pub async fn snapshot_holds(&self, snapshot: &SnapshotRef) -> Result<Vec<String>, ReplicationError> {
        let output = self.run(command_builder::snapshot_holds(snapshot, false)).await?;
        output.require_success(&format!("holds on {}", snapshot))?;
        Ok(output
            .stdout
            .lines()
            .filter_map(|line| line.split('\t').nth(1))
            .map(|tag| tag.trim().to_string())
            .filter(|tag| !tag.is_empty())
            .collect())
    }

    pub async fn snapshot_diff(
        &self,
        snapshot: &SnapshotRef,
        other: Option<&SnapshotRef>,
    ) -> Result<SnapshotDiff, ReplicationError> {
        let output = self.run(command_builder::snapshot_diff(snapshot, other)).await?;
        output.require_success(&format!("diff {}", snapshot))?;
        Ok(transfer_planner::parse_snapshot_diff(&output.stdout))
    }

    // ==================== SEND ESTIMATE ====================

    /// Dry-run size estimate for a send, in bytes plus human form.
    pub async fn send_estimate(
        &self,
        snapshot: &SnapshotRef,
        options: &SendOptions,
    ) -> Result<(u64, String), ReplicationError> {
        let output = self.run(command_builder::send_estimate(snapshot, options)?).await?;
        output.require_success(&format!("estimate send of {}", snapshot))?;
        let estimate = last_size_token(&output.stdout)
            .or_else(|| last_size_token(&output.stderr))
            .ok_or_else(|| {
                ReplicationError::internal(format!("no size in estimate output for {}", snapshot))
            })?;
        Ok((estimate, format_bytes(estimate)))
    }

    // ==================== POOLS ====================

    pub async fn pool_list(&self) -> Result<Vec<String>, ReplicationError> {
        let output = self.run(command_builder::pool_list()).await?;
        output.require_success("list pools")?;
        Ok(first_columns(&output.stdout))
    }

    pub async fn pool_properties(&self, pool: &str, property: &str) -> Result<BTreeMap<String, String>, ReplicationError> {
        let output = self.run(command_builder::pool_get_properties(pool, property)).await?;
        output.require_success(&format!("get properties of pool {}", pool))?;
        let mut properties = BTreeMap::new();
        for line in output.stdout.lines() {
            let fields: Vec<&str> = line.split('\t').collect();
            if fields.len() >= 3 && fields[2] != "-" {
                properties.insert(fields[1].to_string(), fields[2].to_string());
            }
        }
        Ok(properties)
    }

    pub async fn pool_set_property(&self, pool: &str, property: &str, value: &str) -> Result<(), ReplicationError> {
        self.run_checked(
            command_builder::pool_set_property(pool, property, value),
            &format!("set {} on pool {}", property, pool),
        )
        .await
    }

    pub async fn pool_scrub_start(&self, pool: &str) -> Result<(), ReplicationError> {
        self.run_checked(command_builder::pool_scrub_start(pool), &format!("scrub {}", pool))
            .await
    }

    pub async fn pool_scrub_stop(&self, pool: &str) -> Result<(), ReplicationError> {
        self.run_checked(command_builder::pool_scrub_stop(pool), &format!("stop scrub of {}", pool))
            .await
    }

    pub async fn pool_status(&self, pool: &str) -> Result<String, ReplicationError> {
        let output = self.run(command_builder::pool_status(pool, true)).await?;
        output.require_success(&format!("status of pool {}", pool))?;
        Ok(output.stdout)
    }

    pub async fn pool_import(&self, pool: Option<&str>, force: bool, mount: bool) -> Result<(), ReplicationError> {
        self.run_checked(
            command_builder::pool_import(pool, force, mount, &ImportNaming::ById),
            "import pool",
        )
        .await
    }

    pub async fn pool_export(&self, pool: &str, force: bool) -> Result<(), ReplicationError> {
        self.run_checked(command_builder::pool_export(pool, force), &format!("export {}", pool))
            .await
    }

    // ==================== BOOKMARKS / CLONES / VOLUMES ====================

    pub async fn bookmark_create(&self, snapshot: &SnapshotRef, bookmark: &str) -> Result<(), ReplicationError> {
        self.run_checked(
            command_builder::bookmark_create(snapshot, bookmark),
            &format!("bookmark {} as {}", snapshot, bookmark),
        )
        .await
    }

    pub async fn bookmark_list(&self, dataset: &DatasetName) -> Result<Vec<String>, ReplicationError> {
        let output = self.run(command_builder::bookmark_list(dataset)).await?;
        output.require_success(&format!("list bookmarks of {}", dataset))?;
        Ok(first_columns(&output.stdout))
    }

    pub async fn bookmark_destroy(&self, bookmark: &str) -> Result<(), ReplicationError> {
        if !bookmark.contains('#') {
            return Err(ReplicationError::invalid_request(format!(
                "'{}' is not a dataset#bookmark reference",
                bookmark
            )));
        }
        self.run_checked(
            command_builder::bookmark_destroy(bookmark),
            &format!("destroy bookmark {}", bookmark),
        )
        .await
    }

    pub async fn clone_create(
        &self,
        snapshot: &SnapshotRef,
        target: &DatasetName,
        properties: &BTreeMap<String, String>,
    ) -> Result<(), ReplicationError> {
        self.run_checked(
            command_builder::clone_create(snapshot, target, properties),
            &format!("clone {} to {}", snapshot, target),
        )
        .await
    }

    pub async fn volume_create(
        &self,
        dataset: &DatasetName,
        size_bytes: u64,
        compression: &str,
        volblocksize: &str,
        sparse: bool,
    ) -> Result<(), ReplicationError> {
        self.run_checked(
            command_builder::volume_create(dataset, size_bytes, compression, volblocksize, sparse)?,
            &format!("create volume {}", dataset),
        )
        .await
    }

    pub async fn volume_list(&self) -> Result<Vec<String>, ReplicationError> {
        let output = self.run(command_builder::volume_list()).await?;
        output.require_success("list volumes")?;
        Ok(first_columns(&output.stdout))
    }

    pub async fn volume_destroy(&self, dataset: &DatasetName) -> Result<(), ReplicationError> {
        self.run_checked(
            command_builder::volume_destroy(dataset),
            &format!("destroy volume {}", dataset),
        )
        .await
    }
}

impl Default for DatasetAdmin {
    fn default() -> Self {
        Self::new()
    }
}

fn first_columns(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| line.split('\t').next())
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

fn last_size_token(output: &str) -> Option<u64> {
    let line = output.lines().rev().find(|line| !line.trim().is_empty())?;
    parse_size_suffix(line.split_whitespace().last()?).ok()
}

fn parse_space(output: &str) -> Result<SpaceUsage, ReplicationError> {
    // name <TAB> avail <TAB> used <TAB> usedsnap <TAB> usedds
    //      <TAB> usedrefreserv <TAB> usedchild
    let fields: Vec<&str> = output.trim().split('\t').collect();
    if fields.len() < 7 {
        return Err(ReplicationError::internal(format!(
            "unexpected space output: '{}'",
            output.trim()
        )));
    }
    let parse = |index: usize| -> Result<u64, ReplicationError> {
        fields[index]
            .trim()
            .parse()
            .map_err(|_| ReplicationError::internal(format!("bad space column {}: '{}'", index, fields[index])))
    };
    Ok(SpaceUsage {
        name: fields[0].to_string(),
        available: parse(1)?,
        used: parse(2)?,
        used_by_snapshots: parse(3)?,
        used_by_dataset: parse(4)?,
        used_by_refreservation: parse(5)?,
        used_by_children: parse(6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_columns() {
        let output = "tank\t100\t200\ntank/a\t50\t60\n\n";
        assert_eq!(first_columns(output), vec!["tank", "tank/a"]);
    }

    #[test]
    fn test_parse_space() {
        let output = "tank/data\t1000\t500\t100\t300\t0\t100\n";
        let space = parse_space(output).unwrap();
        assert_eq!(space.name, "tank/data");
        assert_eq!(space.available, 1000);
        assert_eq!(space.used, 500);
        assert_eq!(space.used_by_snapshots, 100);
        assert_eq!(space.used_by_children, 100);
    }

    #[test]
    fn test_parse_space_rejects_short_rows() {
        assert!(parse_space("tank\t1\t2").is_err());
    }

    #[test]
    fn test_last_size_token() {
        assert_eq!(last_size_token("send from @ to x\nsize\t1.5K"), Some(1536));
        assert_eq!(last_size_token(""), None);
    }
}
