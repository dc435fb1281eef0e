// /////////////////////////////////////////////////////////////////////////////
// Snapstream
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Transfer Plans
//!
//! The tagged variants the replication planner produces and the executor
//! consumes. A plan pins down exactly what will be sent (full, incremental
//! or resumed), how the bytes are treated on the wire (native compressed
//! stream, an external compressor pair, or nothing), and where each end of
//! the pipeline runs (locally or behind the secure shell).
//!
//! Endpoint polymorphism is expressed as data: the planner is a switch over
//! these variants, never dispatch over endpoint objects.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::dataset::{RemoteHost, SnapshotRef};

/// Where a command runs: on this host, or on the secure-shell peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandTarget {
    Local,
    Remote(RemoteHost),
}

impl CommandTarget {
    pub fn is_remote(&self) -> bool {
        matches!(self, CommandTarget::Remote(_))
    }

    /// Peer identity used in sync hold tags: the remote host name, or
    /// `local`.
    pub fn peer_label(&self) -> String {
        match self {
            CommandTarget::Local => "local".to_string(),
            CommandTarget::Remote(host) => host.host_name().to_string(),
        }
    }
}

/// External stream compressors the pipeline can interpose.
///
/// Candidates mirror what the tooling ships alongside: `gzip`, `bzip2`,
/// `xz`, `lz4` (via the `lz4c` entry point) and `zstd`. Auto-detection
/// probes `zstd` first, then `lz4c`, on both sides of the transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionAlgorithm {
    Gzip,
    Bzip2,
    Xz,
    Lz4,
    Zstd,
}

impl CompressionAlgorithm {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "gzip" => Some(CompressionAlgorithm::Gzip),
            "bzip2" => Some(CompressionAlgorithm::Bzip2),
            "xz" => Some(CompressionAlgorithm::Xz),
            "lz4" => Some(CompressionAlgorithm::Lz4),
            "zstd" => Some(CompressionAlgorithm::Zstd),
            _ => None,
        }
    }

    /// The executable probed for availability.
    pub fn program(&self) -> &'static str {
        match self {
            CompressionAlgorithm::Gzip => "gzip",
            CompressionAlgorithm::Bzip2 => "bzip2",
            CompressionAlgorithm::Xz => "xz",
            CompressionAlgorithm::Lz4 => "lz4c",
            CompressionAlgorithm::Zstd => "zstd",
        }
    }

    /// Argument vector for the compressing side of the pipe.
    pub fn compress_argv(&self) -> Vec<String> {
        let argv: &[&str] = match self {
            CompressionAlgorithm::Gzip => &["gzip", "-c"],
            CompressionAlgorithm::Bzip2 => &["bzip2", "-c"],
            CompressionAlgorithm::Xz => &["xz", "-c"],
            CompressionAlgorithm::Lz4 => &["lz4c", "-c"],
            CompressionAlgorithm::Zstd => &["zstd", "-c", "-3"],
        };
        argv.iter().map(|s| s.to_string()).collect()
    }

    /// Argument vector for the decompressing side of the pipe.
    pub fn decompress_argv(&self) -> Vec<String> {
        let argv: &[&str] = match self {
            CompressionAlgorithm::Gzip => &["gzip", "-dc"],
            CompressionAlgorithm::Bzip2 => &["bzip2", "-dc"],
            CompressionAlgorithm::Xz => &["xz", "-dc"],
            CompressionAlgorithm::Lz4 => &["lz4c", "-d", "-c"],
            CompressionAlgorithm::Zstd => &["zstd", "-dc"],
        };
        argv.iter().map(|s| s.to_string()).collect()
    }
}

impl fmt::Display for CompressionAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CompressionAlgorithm::Gzip => "gzip",
            CompressionAlgorithm::Bzip2 => "bzip2",
            CompressionAlgorithm::Xz => "xz",
            CompressionAlgorithm::Lz4 => "lz4",
            CompressionAlgorithm::Zstd => "zstd",
        };
        f.write_str(name)
    }
}

/// How stream bytes are treated between send and receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionChoice {
    /// Plain stream.
    None,
    /// The sender emits already-compressed blocks (`-c`); no external
    /// processes are interposed.
    Native,
    /// An external compressor/decompressor pair wraps the wire.
    External(CompressionAlgorithm),
}

impl CompressionChoice {
    pub fn is_native(&self) -> bool {
        matches!(self, CompressionChoice::Native)
    }
}

/// What the send side will produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamSpec {
    /// Complete stream of one snapshot.
    Full { snapshot: SnapshotRef },
    /// Delta between a shared base and a newer target. `intermediates`
    /// selects the `-I` form (every snapshot in between) over `-i`.
    Incremental {
        base: SnapshotRef,
        target: SnapshotRef,
        intermediates: bool,
    },
    /// Continuation of a previously interrupted receive.
    Resume { token: String },
}

impl StreamSpec {
    /// The snapshot that will exist on the destination after the
    /// transfer, when the stream names one (resume streams do not).
    pub fn terminal_snapshot(&self) -> Option<&SnapshotRef> {
        match self {
            StreamSpec::Full { snapshot } => Some(snapshot),
            StreamSpec::Incremental { target, .. } => Some(target),
            StreamSpec::Resume { .. } => None,
        }
    }
}

/// A fully determined transfer: stream shape, wire treatment, endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferPlan {
    pub stream: StreamSpec,
    pub compression: CompressionChoice,
    /// Replicate child datasets (`-R` on send).
    pub recursive: bool,
    /// Pass encrypted datasets through without decrypting (`-w` on send).
    pub raw: bool,
    /// Where the send side runs.
    pub source: CommandTarget,
    /// Where the receive side runs.
    pub destination: CommandTarget,
}

/// Result of planning one replication invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanOutcome {
    /// The destination already holds the source's newest snapshot; nothing
    /// is spawned and the invocation reports success with zero bytes.
    UpToDate { snapshot: SnapshotRef },
    /// A transfer is required.
    Transfer(TransferPlan),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(reference: &str) -> SnapshotRef {
        SnapshotRef::parse(reference).unwrap()
    }

    #[test]
    fn test_compression_algorithm_names() {
        assert_eq!(CompressionAlgorithm::from_name("ZSTD"), Some(CompressionAlgorithm::Zstd));
        assert_eq!(CompressionAlgorithm::from_name("lzma"), None);
        assert_eq!(CompressionAlgorithm::Lz4.program(), "lz4c");
        assert_eq!(CompressionAlgorithm::Zstd.to_string(), "zstd");
    }

    #[test]
    fn test_compressor_argv_pairs() {
        for algorithm in [
            CompressionAlgorithm::Gzip,
            CompressionAlgorithm::Bzip2,
            CompressionAlgorithm::Xz,
            CompressionAlgorithm::Lz4,
            CompressionAlgorithm::Zstd,
        ] {
            let compress = algorithm.compress_argv();
            let decompress = algorithm.decompress_argv();
            assert_eq!(compress[0], algorithm.program());
            assert_eq!(decompress[0], algorithm.program());
            assert_ne!(compress, decompress);
        }
    }

    #[test]
    fn test_terminal_snapshot() {
        let full = StreamSpec::Full {
            snapshot: snap("tank/a@s1"),
        };
        assert_eq!(full.terminal_snapshot().unwrap().name(), "s1");

        let incremental = StreamSpec::Incremental {
            base: snap("tank/a@s1"),
            target: snap("tank/a@s2"),
            intermediates: true,
        };
        assert_eq!(incremental.terminal_snapshot().unwrap().name(), "s2");

        let resume = StreamSpec::Resume {
            token: "1-abcdef".to_string(),
        };
        assert!(resume.terminal_snapshot().is_none());
    }

    #[test]
    fn test_peer_label() {
        assert_eq!(CommandTarget::Local.peer_label(), "local");
        let remote = CommandTarget::Remote(crate::value_objects::RemoteHost::new("root@peer1").unwrap());
        assert_eq!(remote.peer_label(), "peer1");
    }
}
