// /////////////////////////////////////////////////////////////////////////////
// Snapstream
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Command Builder
//!
//! Pure construction of filesystem-tool argument vectors. Every `zfs` and
//! `zpool` invocation in the service flows through this module; there is
//! exactly one builder per supported operation and no execution logic here.
//!
//! ## Flag derivation for send/receive
//!
//! - `raw` (`-w`): encrypted-stream passthrough, decided by the caller
//!   (explicit or derived from the dataset's encryption property);
//! - `compressed` (`-c`): block-level compressed stream, decided the same
//!   way from the compression property;
//! - `recursive` (`-R`): passes through;
//! - `resumable` (`-s`): applies to receive; on send a resume token (`-t`)
//!   replaces all other stream selection;
//! - incremental sends emit `-I base target` (all intermediates) or
//!   `-i base target`.
//!
//! Nonsensical combinations (a resume token plus explicit snapshots) are
//! rejected at construction time, before anything is spawned.
//!
//! ## Remote execution
//!
//! [`remote_command`] wraps an argument vector behind
//! `ssh -o BatchMode=yes <host>`; [`remote_pipeline`] joins several stage
//! vectors with a literal `|` token. The peer's login shell interprets that
//! pipe; no shell is involved on this host and arguments are never joined
//! into strings locally.

use std::collections::BTreeMap;

use crate::error::ReplicationError;
use crate::value_objects::{DatasetName, RemoteHost, SnapshotRef};

/// Options for building a send command.
#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    /// Incremental base; mutually exclusive with `resume_token`.
    pub from_snapshot: Option<SnapshotRef>,
    /// `-I` (all intermediate snapshots) instead of `-i`.
    pub intermediates: bool,
    pub recursive: bool,
    pub raw: bool,
    pub compressed: bool,
    /// Continue an interrupted receive; replaces all stream selection.
    pub resume_token: Option<String>,
}

/// Options for building a receive command.
#[derive(Debug, Clone)]
pub struct ReceiveOptions {
    /// Roll back the destination as needed (`-F`).
    pub force: bool,
    /// Keep partial receive state for later resume (`-s`).
    pub resumable: bool,
}

impl Default for ReceiveOptions {
    fn default() -> Self {
        ReceiveOptions {
            force: true,
            resumable: false,
        }
    }
}

fn strings(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

// ==================== DATASET OPERATIONS ====================

pub fn dataset_create(dataset: &DatasetName, properties: &BTreeMap<String, String>) -> Vec<String> {
    let mut cmd = strings(&["zfs", "create"]);
    for (key, value) in properties {
        cmd.push("-o".to_string());
        cmd.push(format!("{}={}", key, value));
    }
    cmd.push(dataset.to_string());
    cmd
}

pub fn dataset_destroy(dataset: &DatasetName, recursive: bool) -> Vec<String> {
    let mut cmd = strings(&["zfs", "destroy"]);
    if recursive {
        cmd.push("-R".to_string());
    }
    cmd.push(dataset.to_string());
    cmd
}

pub fn dataset_list(dataset: Option<&DatasetName>) -> Vec<String> {
    let mut cmd = strings(&["zfs", "list", "-H"]);
    if let Some(dataset) = dataset {
        cmd.push("-r".to_string());
        cmd.push(dataset.to_string());
    }
    cmd
}

pub fn dataset_get_properties(dataset: &DatasetName, property: &str) -> Vec<String> {
    vec![
        "zfs".to_string(),
        "get".to_string(),
        "-H".to_string(),
        property.to_string(),
        dataset.to_string(),
    ]
}

/// Numeric (`-p`) single-property read; value is in column three.
pub fn dataset_get_property_raw(dataset: &DatasetName, property: &str) -> Vec<String> {
    vec![
        "zfs".to_string(),
        "get".to_string(),
        "-H".to_string(),
        "-p".to_string(),
        property.to_string(),
        dataset.to_string(),
    ]
}

pub fn dataset_set_property(dataset: &DatasetName, property: &str, value: &str) -> Vec<String> {
    vec![
        "zfs".to_string(),
        "set".to_string(),
        format!("{}={}", property, value),
        dataset.to_string(),
    ]
}

pub fn dataset_get_space(dataset: &DatasetName) -> Vec<String> {
    let mut cmd = strings(&["zfs", "list", "-H", "-p", "-o", "space"]);
    cmd.push(dataset.to_string());
    cmd
}

pub fn dataset_mount(dataset: &DatasetName) -> Vec<String> {
    vec!["zfs".to_string(), "mount".to_string(), dataset.to_string()]
}

pub fn dataset_rename(old_name: &DatasetName, new_name: &DatasetName) -> Vec<String> {
    vec![
        "zfs".to_string(),
        "rename".to_string(),
        old_name.to_string(),
        new_name.to_string(),
    ]
}

pub fn dataset_promote(dataset: &DatasetName) -> Vec<String> {
    vec!["zfs".to_string(), "promote".to_string(), dataset.to_string()]
}

pub fn dataset_share(dataset: &DatasetName) -> Vec<String> {
    vec!["zfs".to_string(), "share".to_string(), dataset.to_string()]
}

pub fn dataset_unshare(dataset: &DatasetName) -> Vec<String> {
    vec!["zfs".to_string(), "unshare".to_string(), dataset.to_string()]
}

pub fn dataset_exists(dataset: &DatasetName) -> Vec<String> {
    let mut cmd = strings(&["zfs", "list", "-H", "-p"]);
    cmd.push(dataset.to_string());
    cmd
}

// ==================== SNAPSHOT OPERATIONS ====================

pub fn snapshot_create(snapshot: &SnapshotRef, recursive: bool) -> Vec<String> {
    let mut cmd = strings(&["zfs", "snapshot"]);
    if recursive {
        cmd.push("-r".to_string());
    }
    cmd.push(snapshot.to_string());
    cmd
}

/// Lists every snapshot by name; callers filter to their dataset.
pub fn snapshot_list() -> Vec<String> {
    strings(&["zfs", "list", "-t", "snapshot", "-H", "-o", "name"])
}

pub fn snapshot_destroy(snapshot: &SnapshotRef, recursive: bool) -> Vec<String> {
    let mut cmd = strings(&["zfs", "destroy"]);
    if recursive {
        cmd.push("-R".to_string());
    }
    cmd.push(snapshot.to_string());
    cmd
}

pub fn snapshot_rollback(snapshot: &SnapshotRef) -> Vec<String> {
    vec![
        "zfs".to_string(),
        "rollback".to_string(),
        "-r".to_string(),
        snapshot.to_string(),
    ]
}

pub fn snapshot_hold(snapshot: &SnapshotRef, tag: &str, recursive: bool) -> Vec<String> {
    let mut cmd = strings(&["zfs", "hold"]);
    if recursive {
        cmd.push("-r".to_string());
    }
    cmd.push(tag.to_string());
    cmd.push(snapshot.to_string());
    cmd
}

pub fn snapshot_release(snapshot: &SnapshotRef, tag: &str, recursive: bool) -> Vec<String> {
    let mut cmd = strings(&["zfs", "release"]);
    if recursive {
        cmd.push("-r".to_string());
    }
    cmd.push(tag.to_string());
    cmd.push(snapshot.to_string());
    cmd
}

pub fn snapshot_holds(snapshot: &SnapshotRef, recursive: bool) -> Vec<String> {
    let mut cmd = strings(&["zfs", "holds", "-H"]);
    if recursive {
        cmd.push("-r".to_string());
    }
    cmd.push(snapshot.to_string());
    cmd
}

pub fn snapshot_diff(snapshot: &SnapshotRef, other: Option<&SnapshotRef>) -> Vec<String> {
    let mut cmd = strings(&["zfs", "diff", "-HF"]);
    cmd.push(snapshot.to_string());
    if let Some(other) = other {
        cmd.push(other.to_string());
    }
    cmd
}

pub fn snapshot_exists(snapshot: &SnapshotRef) -> Vec<String> {
    let mut cmd = strings(&["zfs", "list", "-t", "snapshot", "-H"]);
    cmd.push(snapshot.to_string());
    cmd
}

// ==================== SEND/RECEIVE OPERATIONS ====================

/// Builds a `zfs send` argument vector.
///
/// A resume token replaces every other stream selector; supplying one
/// together with an incremental base is rejected.
pub fn send(snapshot: &SnapshotRef, options: &SendOptions) -> Result<Vec<String>, ReplicationError> {
    build_send(Some(snapshot), options, false)
}

/// Builds the dry-run size-estimate form (`-nv`) of a send.
pub fn send_estimate(snapshot: &SnapshotRef, options: &SendOptions) -> Result<Vec<String>, ReplicationError> {
    build_send(Some(snapshot), options, true)
}

/// Builds a resume-token send (`zfs send -t <token>`).
pub fn send_resume(token: &str, estimate: bool) -> Result<Vec<String>, ReplicationError> {
    if token.is_empty() || token == "-" {
        return Err(ReplicationError::invalid_request("empty resume token"));
    }
    let mut cmd = strings(&["zfs", "send", "-t"]);
    cmd.push(token.to_string());
    if estimate {
        cmd.push("-nv".to_string());
    }
    Ok(cmd)
}

fn build_send(
    snapshot: Option<&SnapshotRef>,
    options: &SendOptions,
    estimate: bool,
) -> Result<Vec<String>, ReplicationError> {
    if let Some(token) = &options.resume_token {
        if options.from_snapshot.is_some() || snapshot.is_some() {
            return Err(ReplicationError::invalid_request(
                "resume token and explicit snapshots are mutually exclusive",
            ));
        }
        return send_resume(token, estimate);
    }

    let snapshot = snapshot.ok_or_else(|| ReplicationError::invalid_request("send requires a snapshot"))?;

    if let Some(base) = &options.from_snapshot {
        if base.dataset() != snapshot.dataset() {
            return Err(ReplicationError::invalid_request(format!(
                "incremental base {} is not on dataset {}",
                base,
                snapshot.dataset()
            )));
        }
        if base == snapshot {
            return Err(ReplicationError::invalid_request(format!(
                "incremental base and target are both {}",
                base
            )));
        }
    }

    let mut cmd = strings(&["zfs", "send"]);
    if options.raw {
        cmd.push("-w".to_string());
    }
    if options.compressed {
        cmd.push("-c".to_string());
    }
    if options.recursive {
        cmd.push("-R".to_string());
    }
    if estimate {
        cmd.push("-nv".to_string());
    }
    if let Some(base) = &options.from_snapshot {
        cmd.push(if options.intermediates { "-I" } else { "-i" }.to_string());
        cmd.push(base.to_string());
    }
    cmd.push(snapshot.to_string());
    Ok(cmd)
}

pub fn receive(dataset: &DatasetName, options: &ReceiveOptions) -> Vec<String> {
    let mut cmd = strings(&["zfs", "receive"]);
    if options.force {
        cmd.push("-F".to_string());
    }
    if options.resumable {
        cmd.push("-s".to_string());
    }
    cmd.push(dataset.to_string());
    cmd
}

// ==================== POOL OPERATIONS ====================

pub fn pool_list() -> Vec<String> {
    strings(&["zpool", "list", "-H", "-o", "name"])
}

pub fn pool_get_properties(pool: &str, property: &str) -> Vec<String> {
    vec![
        "zpool".to_string(),
        "get".to_string(),
        "-H".to_string(),
        "-p".to_string(),
        property.to_string(),
        pool.to_string(),
    ]
}

pub fn pool_set_property(pool: &str, property: &str, value: &str) -> Vec<String> {
    vec![
        "zpool".to_string(),
        "set".to_string(),
        format!("{}={}", property, value),
        pool.to_string(),
    ]
}

pub fn pool_scrub_start(pool: &str) -> Vec<String> {
    vec!["zpool".to_string(), "scrub".to_string(), pool.to_string()]
}

pub fn pool_scrub_stop(pool: &str) -> Vec<String> {
    vec!["zpool".to_string(), "scrub".to_string(), "-s".to_string(), pool.to_string()]
}

pub fn pool_status(pool: &str, verbose: bool) -> Vec<String> {
    let mut cmd = strings(&["zpool", "status"]);
    if verbose {
        cmd.push("-v".to_string());
    }
    cmd.push(pool.to_string());
    cmd
}

/// Persistent device naming policy for pool import.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ImportNaming {
    #[default]
    ById,
    ByPath,
    Directory(String),
}

pub fn pool_import(pool: Option<&str>, force: bool, mount: bool, naming: &ImportNaming) -> Vec<String> {
    let mut cmd = strings(&["zpool", "import"]);
    match pool {
        Some(pool) => cmd.push(pool.to_string()),
        None => cmd.push("-a".to_string()),
    }
    if force {
        cmd.push("-f".to_string());
    }
    if !mount {
        cmd.push("-N".to_string());
    }
    cmd.push("-d".to_string());
    cmd.push(match naming {
        ImportNaming::ById => "/dev/disk/by-id".to_string(),
        ImportNaming::ByPath => "/dev/disk/by-path".to_string(),
        ImportNaming::Directory(dir) => dir.clone(),
    });
    cmd
}

pub fn pool_export(pool: &str, force: bool) -> Vec<String> {
    let mut cmd = strings(&["zpool", "export"]);
    if force {
        cmd.push("-f".to_string());
    }
    cmd.push(pool.to_string());
    cmd
}

// ==================== BOOKMARK / CLONE / VOLUME OPERATIONS ====================

pub fn bookmark_create(snapshot: &SnapshotRef, bookmark: &str) -> Vec<String> {
    vec![
        "zfs".to_string(),
        "bookmark".to_string(),
        snapshot.to_string(),
        format!("{}#{}", snapshot.dataset(), bookmark),
    ]
}

pub fn bookmark_list(dataset: &DatasetName) -> Vec<String> {
    let mut cmd = strings(&["zfs", "list", "-t", "bookmark", "-H", "-r"]);
    cmd.push(dataset.to_string());
    cmd
}

pub fn bookmark_destroy(bookmark: &str) -> Vec<String> {
    vec!["zfs".to_string(), "destroy".to_string(), bookmark.to_string()]
}

pub fn clone_create(
    snapshot: &SnapshotRef,
    target: &DatasetName,
    properties: &BTreeMap<String, String>,
) -> Vec<String> {
    let mut cmd = strings(&["zfs", "clone"]);
    for (key, value) in properties {
        cmd.push("-o".to_string());
        cmd.push(format!("{}={}", key, value));
    }
    cmd.push(snapshot.to_string());
    cmd.push(target.to_string());
    cmd
}

/// Builds a volume (zvol) create command. Sizes are in bytes.
pub fn volume_create(
    dataset: &DatasetName,
    size_bytes: u64,
    compression: &str,
    volblocksize: &str,
    sparse: bool,
) -> Result<Vec<String>, ReplicationError> {
    if size_bytes == 0 {
        return Err(ReplicationError::invalid_request("volume size must be non-zero"));
    }
    let mut cmd = strings(&["zfs", "create", "-o"]);
    cmd.push(format!("compression={}", compression));
    cmd.push("-b".to_string());
    cmd.push(volblocksize.to_string());
    if sparse {
        cmd.push("-s".to_string());
    }
    cmd.push("-V".to_string());
    cmd.push(size_bytes.to_string());
    cmd.push(dataset.to_string());
    Ok(cmd)
}

pub fn volume_list() -> Vec<String> {
    strings(&["zfs", "list", "-t", "volume", "-H"])
}

pub fn volume_destroy(dataset: &DatasetName) -> Vec<String> {
    vec!["zfs".to_string(), "destroy".to_string(), dataset.to_string()]
}

// ==================== DIAGNOSTIC OPERATIONS ====================

pub fn tool_version() -> Vec<String> {
    strings(&["zfs", "--version"])
}

pub fn probe_program(program: &str) -> Vec<String> {
    vec!["which".to_string(), program.to_string()]
}

// ==================== REMOTE EXECUTION ====================

/// Wraps an argument vector for execution on the secure-shell peer.
pub fn remote_command(host: &RemoteHost, command: &[String]) -> Vec<String> {
    let mut cmd = strings(&["ssh", "-o", "BatchMode=yes"]);
    cmd.push(host.to_string());
    cmd.extend(command.iter().cloned());
    cmd
}

/// Wraps several stages as one remote pipeline: stage vectors joined with a
/// literal `|` the peer's login shell interprets.
pub fn remote_pipeline(host: &RemoteHost, stages: &[Vec<String>]) -> Vec<String> {
    let mut cmd = strings(&["ssh", "-o", "BatchMode=yes"]);
    cmd.push(host.to_string());
    for (index, stage) in stages.iter().enumerate() {
        if index > 0 {
            cmd.push("|".to_string());
        }
        cmd.extend(stage.iter().cloned());
    }
    cmd
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset(name: &str) -> DatasetName {
        DatasetName::new(name).unwrap()
    }

    fn snap(reference: &str) -> SnapshotRef {
        SnapshotRef::parse(reference).unwrap()
    }

    #[test]
    fn test_dataset_create_with_properties() {
        let mut props = BTreeMap::new();
        props.insert("compression".to_string(), "lz4".to_string());
        props.insert("atime".to_string(), "off".to_string());
        let cmd = dataset_create(&dataset("tank/new"), &props);
        assert_eq!(
            cmd,
            vec!["zfs", "create", "-o", "atime=off", "-o", "compression=lz4", "tank/new"]
        );
    }

    #[test]
    fn test_dataset_destroy_recursive() {
        assert_eq!(dataset_destroy(&dataset("tank/old"), false), vec!["zfs", "destroy", "tank/old"]);
        assert_eq!(
            dataset_destroy(&dataset("tank/old"), true),
            vec!["zfs", "destroy", "-R", "tank/old"]
        );
    }

    #[test]
    fn test_dataset_share_unshare() {
        assert_eq!(dataset_share(&dataset("tank/exports")), vec!["zfs", "share", "tank/exports"]);
        assert_eq!(dataset_unshare(&dataset("tank/exports")), vec!["zfs", "unshare", "tank/exports"]);
    }

    #[test]
    fn test_snapshot_commands() {
        assert_eq!(
            snapshot_create(&snap("tank/a@s1"), true),
            vec!["zfs", "snapshot", "-r", "tank/a@s1"]
        );
        assert_eq!(snapshot_list(), vec!["zfs", "list", "-t", "snapshot", "-H", "-o", "name"]);
        assert_eq!(
            snapshot_hold(&snap("tank/a@s1"), "sync_1_peer", false),
            vec!["zfs", "hold", "sync_1_peer", "tank/a@s1"]
        );
        assert_eq!(
            snapshot_release(&snap("tank/a@s1"), "sync_1_peer", true),
            vec!["zfs", "release", "-r", "sync_1_peer", "tank/a@s1"]
        );
        assert_eq!(
            snapshot_diff(&snap("tank/a@s1"), Some(&snap("tank/a@s2"))),
            vec!["zfs", "diff", "-HF", "tank/a@s1", "tank/a@s2"]
        );
    }

    #[test]
    fn test_full_send() {
        let cmd = send(
            &snap("tank/a@s1"),
            &SendOptions {
                recursive: true,
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(cmd, vec!["zfs", "send", "-R", "tank/a@s1"]);
    }

    #[test]
    fn test_send_flag_order_and_derived_flags() {
        let cmd = send(
            &snap("tank/a@s1"),
            &SendOptions {
                raw: true,
                compressed: true,
                recursive: true,
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(cmd, vec!["zfs", "send", "-w", "-c", "-R", "tank/a@s1"]);
    }

    #[test]
    fn test_incremental_send_forms() {
        let all = send(
            &snap("tank/a@s2"),
            &SendOptions {
                from_snapshot: Some(snap("tank/a@s1")),
                intermediates: true,
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(all, vec!["zfs", "send", "-I", "tank/a@s1", "tank/a@s2"]);

        let single = send(
            &snap("tank/a@s2"),
            &SendOptions {
                from_snapshot: Some(snap("tank/a@s1")),
                intermediates: false,
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(single, vec!["zfs", "send", "-i", "tank/a@s1", "tank/a@s2"]);
    }

    #[test]
    fn test_incremental_send_rejects_cross_dataset_base() {
        let result = send(
            &snap("tank/a@s2"),
            &SendOptions {
                from_snapshot: Some(snap("tank/b@s1")),
                ..Default::default()
            },
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_resume_send_excludes_other_selectors() {
        let cmd = send_resume("1-abc-def", false).unwrap();
        assert_eq!(cmd, vec!["zfs", "send", "-t", "1-abc-def"]);

        let conflicting = build_send(
            Some(&snap("tank/a@s1")),
            &SendOptions {
                resume_token: Some("1-abc".to_string()),
                ..Default::default()
            },
            false,
        );
        assert!(conflicting.is_err());

        assert!(send_resume("", false).is_err());
        assert!(send_resume("-", false).is_err());
    }

    #[test]
    fn test_send_estimate_is_dry_run() {
        let cmd = send_estimate(
            &snap("tank/a@s2"),
            &SendOptions {
                from_snapshot: Some(snap("tank/a@s1")),
                intermediates: true,
                recursive: true,
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(cmd, vec!["zfs", "send", "-R", "-nv", "-I", "tank/a@s1", "tank/a@s2"]);
    }

    #[test]
    fn test_receive_flags() {
        assert_eq!(
            receive(&dataset("tank/dst"), &ReceiveOptions::default()),
            vec!["zfs", "receive", "-F", "tank/dst"]
        );
        assert_eq!(
            receive(
                &dataset("tank/dst"),
                &ReceiveOptions {
                    force: false,
                    resumable: true,
                }
            ),
            vec!["zfs", "receive", "-s", "tank/dst"]
        );
    }

    #[test]
    fn test_pool_commands() {
        assert_eq!(pool_list(), vec!["zpool", "list", "-H", "-o", "name"]);
        assert_eq!(pool_scrub_stop("tank"), vec!["zpool", "scrub", "-s", "tank"]);
        assert_eq!(
            pool_import(Some("tank"), true, false, &ImportNaming::ById),
            vec!["zpool", "import", "tank", "-f", "-N", "-d", "/dev/disk/by-id"]
        );
        assert_eq!(
            pool_import(None, false, true, &ImportNaming::ByPath),
            vec!["zpool", "import", "-a", "-d", "/dev/disk/by-path"]
        );
    }

    #[test]
    fn test_bookmark_and_clone() {
        assert_eq!(
            bookmark_create(&snap("tank/a@s1"), "keep"),
            vec!["zfs", "bookmark", "tank/a@s1", "tank/a#keep"]
        );
        let cmd = clone_create(&snap("tank/a@s1"), &dataset("tank/clone"), &BTreeMap::new());
        assert_eq!(cmd, vec!["zfs", "clone", "tank/a@s1", "tank/clone"]);
    }

    #[test]
    fn test_volume_create() {
        let cmd = volume_create(&dataset("tank/vol"), 8 * 1024 * 1024 * 1024, "lz4", "8K", true).unwrap();
        assert_eq!(
            cmd,
            vec![
                "zfs",
                "create",
                "-o",
                "compression=lz4",
                "-b",
                "8K",
                "-s",
                "-V",
                "8589934592",
                "tank/vol"
            ]
        );
        assert!(volume_create(&dataset("tank/vol"), 0, "lz4", "8K", true).is_err());
    }

    #[test]
    fn test_remote_wrapping() {
        let host = RemoteHost::new("root@peer").unwrap();
        let inner = receive(&dataset("tank/dst"), &ReceiveOptions::default());
        let cmd = remote_command(&host, &inner);
        assert_eq!(
            cmd,
            vec!["ssh", "-o", "BatchMode=yes", "root@peer", "zfs", "receive", "-F", "tank/dst"]
        );

        let stages = vec![vec!["zstd".to_string(), "-dc".to_string()], inner];
        let piped = remote_pipeline(&host, &stages);
        assert_eq!(
            piped,
            vec![
                "ssh",
                "-o",
                "BatchMode=yes",
                "root@peer",
                "zstd",
                "-dc",
                "|",
                "zfs",
                "receive",
                "-F",
                "tank/dst"
            ]
        );
    }
}
