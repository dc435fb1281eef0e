// /////////////////////////////////////////////////////////////////////////////
// Snapstream
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Daemon Command Line
//!
//! Argument surface for the service binary. Everything here is an override
//! of the configuration file; the file (or its defaults) is the source of
//! truth.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable single-line output.
    Text,
    /// JSON lines for log shippers.
    Json,
}

/// snapstream - snapshot replication control and data plane
#[derive(Debug, Parser)]
#[command(name = "snapstream", version, about)]
pub struct DaemonArgs {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log filter (overrides SNAPSTREAM_LOG), e.g. "info" or
    /// "snapstream=debug,redis=warn".
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log output format.
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Override the streaming TCP bind address, e.g. "0.0.0.0:9999".
    #[arg(long)]
    pub stream_tcp_bind: Option<String>,

    /// Override the streaming Unix socket path.
    #[arg(long)]
    pub stream_unix_path: Option<PathBuf>,

    /// Override the background worker pool size.
    #[arg(long)]
    pub workers: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = DaemonArgs::parse_from(["snapstream"]);
        assert!(args.config.is_none());
        assert_eq!(args.log_format, LogFormat::Text);
        assert!(args.workers.is_none());
    }

    #[test]
    fn test_overrides() {
        let args = DaemonArgs::parse_from([
            "snapstream",
            "--config",
            "/etc/snapstream.toml",
            "--log-format",
            "json",
            "--workers",
            "8",
            "--stream-tcp-bind",
            "127.0.0.1:9000",
        ]);
        assert_eq!(args.config, Some(PathBuf::from("/etc/snapstream.toml")));
        assert_eq!(args.log_format, LogFormat::Json);
        assert_eq!(args.workers, Some(8));
        assert_eq!(args.stream_tcp_bind.as_deref(), Some("127.0.0.1:9000"));
    }
}
