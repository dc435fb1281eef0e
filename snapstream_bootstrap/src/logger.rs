// /////////////////////////////////////////////////////////////////////////////
// Snapstream
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Logger Initialisation
//!
//! Structured logging setup for the daemon. The filter comes from, in
//! order: the explicit CLI override, the `SNAPSTREAM_LOG` environment
//! variable, then a default of `info`.

use tracing_subscriber::EnvFilter;

use crate::cli::LogFormat;

/// Environment variable consulted for the log filter.
pub const LOG_ENV: &str = "SNAPSTREAM_LOG";

/// Installs the global tracing subscriber. Call once, early.
pub fn init(filter_override: Option<&str>, format: LogFormat) {
    let filter = match filter_override {
        Some(filter) => EnvFilter::new(filter),
        None => EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info")),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.compact().init(),
    }
}
