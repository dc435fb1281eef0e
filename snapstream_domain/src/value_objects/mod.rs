// /////////////////////////////////////////////////////////////////////////////
// Snapstream
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Value Objects
//!
//! Immutable domain values: validated names and references, identifiers,
//! byte-size parsing, progress records and transfer plans. Value objects
//! are compared by value, carry their own validation, and never perform
//! I/O.

mod byte_size;
mod dataset;
mod job_id;
mod token_id;
mod tool_version;
mod transfer_plan;
mod transfer_progress;

pub use byte_size::{format_bytes, parse_size_suffix, parse_unit};
pub use dataset::{DatasetName, RemoteHost, SnapshotRef};
pub use job_id::JobId;
pub use token_id::{TokenId, MAX_TOKEN_ID_LEN};
pub use tool_version::ToolVersion;
pub use transfer_plan::{
    CommandTarget, CompressionAlgorithm, CompressionChoice, PlanOutcome, StreamSpec, TransferPlan,
};
pub use transfer_progress::TransferProgress;
