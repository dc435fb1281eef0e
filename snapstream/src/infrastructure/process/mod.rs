// /////////////////////////////////////////////////////////////////////////////
// Snapstream
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Process Infrastructure
//!
//! Subprocess execution: captured one-shot commands and streaming
//! pipelines with process-group lifecycle management.

pub mod executor;
pub mod pipeline;

pub use executor::{exit_code, run, run_with_timeout, CommandOutput};
pub use pipeline::{
    CancelHandle, CancellationSlot, Pipeline, PipelineBuilder, PipelineStatus, StdinSpec, StdoutSpec,
    DEFAULT_TERMINATION_GRACE,
};
