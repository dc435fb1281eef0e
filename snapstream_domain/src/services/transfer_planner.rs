// /////////////////////////////////////////////////////////////////////////////
// Snapstream
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Transfer Negotiation
//!
//! The pure half of replication planning: given the snapshot inventories
//! and properties the engine has already collected from both endpoints,
//! decide what to send and how to treat the bytes on the wire. No I/O
//! happens here; the engine owns the endpoint queries and the ordering of
//! planning steps (resume check first, then negotiation, then compression).

use crate::value_objects::{CompressionAlgorithm, CompressionChoice, ToolVersion};

/// Result of incremental negotiation between two snapshot inventories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NegotiationOutcome {
    /// The newest common snapshot equals the source's newest: nothing to do.
    UpToDate { snapshot: String },
    /// Send the delta `base → target`.
    Incremental { base: String, target: String },
    /// No common snapshot; a full send of the source's newest is required.
    NoCommonBase { target: String },
    /// The source has no snapshots at all.
    NoSourceSnapshot,
}

/// Negotiates the incremental base between source and destination.
///
/// Inventories are ordered oldest to newest, as the listing tool reports
/// them. The base is the newest source snapshot also present on the
/// destination. Matching is case-sensitive first; when
/// `case_insensitive_fallback` is set and the exact pass finds nothing, a
/// case-insensitive pass runs as a fallback.
///
/// A destination snapshot the source lacks does not matter: the target is
/// up to date iff the newest common snapshot equals the source's newest.
pub fn negotiate(
    source_snapshots: &[String],
    destination_snapshots: &[String],
    case_insensitive_fallback: bool,
) -> NegotiationOutcome {
    let target = match source_snapshots.last() {
        Some(target) => target.clone(),
        None => return NegotiationOutcome::NoSourceSnapshot,
    };

    let mut base = source_snapshots
        .iter()
        .rev()
        .find(|snapshot| destination_snapshots.iter().any(|other| other == *snapshot))
        .cloned();

    if base.is_none() && case_insensitive_fallback {
        base = source_snapshots
            .iter()
            .rev()
            .find(|snapshot| {
                destination_snapshots
                    .iter()
                    .any(|other| other.eq_ignore_ascii_case(snapshot))
            })
            .cloned();
    }

    match base {
        Some(base) if base == target => NegotiationOutcome::UpToDate { snapshot: target },
        Some(base) => NegotiationOutcome::Incremental { base, target },
        None => NegotiationOutcome::NoCommonBase { target },
    }
}

/// Inputs to the compression decision, collected by the engine.
#[derive(Debug, Clone, Default)]
pub struct CompressionInputs {
    pub source_version: Option<ToolVersion>,
    pub destination_version: Option<ToolVersion>,
    /// The source dataset's `compression` property value.
    pub source_compression: Option<String>,
    /// Explicitly requested external algorithm, if any.
    pub requested: Option<CompressionAlgorithm>,
    /// External compressors available on both sides, probed in preference
    /// order (`zstd` before `lz4`).
    pub available: Vec<CompressionAlgorithm>,
}

/// Selects native vs external stream compression.
///
/// Native wins when both endpoints run tooling at or past 2.0 and the
/// source dataset compresses its blocks (native passthrough then costs
/// nothing and the external compressor is disabled). Otherwise the explicit
/// algorithm is used when given, falling back to the best probed one, then
/// to no compression.
pub fn choose_compression(inputs: &CompressionInputs) -> CompressionChoice {
    let both_modern = matches!(
        (inputs.source_version, inputs.destination_version),
        (Some(source), Some(destination))
            if source.supports_native_compression() && destination.supports_native_compression()
    );
    let source_compresses = inputs
        .source_compression
        .as_deref()
        .map(|value| value != "off" && !value.is_empty() && value != "-")
        .unwrap_or(false);

    if both_modern && source_compresses {
        return CompressionChoice::Native;
    }
    if let Some(algorithm) = inputs.requested {
        return CompressionChoice::External(algorithm);
    }
    match inputs.available.first() {
        Some(algorithm) => CompressionChoice::External(*algorithm),
        None => CompressionChoice::None,
    }
}

/// Classification of the raw diff lines `zfs diff -HF` emits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotDiff {
    /// `(path, kind)` pairs for created entries.
    pub created: Vec<(String, String)>,
    pub modified: Vec<(String, String)>,
    pub deleted: Vec<(String, String)>,
    /// `(old_path, new_path, kind)` for renames.
    pub renamed: Vec<(String, String, String)>,
}

/// Parses `zfs diff -HF` output into per-change buckets.
pub fn parse_snapshot_diff(output: &str) -> SnapshotDiff {
    let mut diff = SnapshotDiff::default();
    for line in output.lines() {
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 3 {
            continue;
        }
        let kind = fields[1].to_string();
        match fields[0] {
            "+" => diff.created.push((fields[2].to_string(), kind)),
            "-" => diff.deleted.push((fields[2].to_string(), kind)),
            "M" => diff.modified.push((fields[2].to_string(), kind)),
            "R" if fields.len() >= 4 => diff.renamed.push((fields[2].to_string(), fields[3].to_string(), kind)),
            _ => {}
        }
    }
    diff
}

/// Snapshots to destroy under a keep-newest retention policy, optionally
/// filtered to names containing `tag`. Inventory is ordered oldest to
/// newest; the newest `keep` matching snapshots survive.
pub fn retention_victims(snapshots: &[String], keep: usize, tag: Option<&str>) -> Vec<String> {
    let matching: Vec<&String> = snapshots
        .iter()
        .filter(|name| tag.map(|tag| name.contains(tag)).unwrap_or(true))
        .collect();
    if matching.len() <= keep {
        return Vec::new();
    }
    matching[..matching.len() - keep].iter().map(|s| (*s).clone()).collect()
}
