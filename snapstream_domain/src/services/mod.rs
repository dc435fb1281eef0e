// /////////////////////////////////////////////////////////////////////////////
// Snapstream
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Domain Services
//!
//! Sync, CPU-only services (command construction, progress parsing,
//! transfer negotiation) plus the async endpoint port the engine plans
//! against. The sync services operate on already-available data and never
//! suspend.

pub mod command_builder;
mod dataset_endpoint;
mod progress_parser;
pub mod transfer_planner;

pub use dataset_endpoint::DatasetEndpoint;
pub use progress_parser::{ProgressEvent, ProgressParser};
pub use transfer_planner::{
    choose_compression, negotiate, parse_snapshot_diff, retention_victims, CompressionInputs, NegotiationOutcome,
    SnapshotDiff,
};
