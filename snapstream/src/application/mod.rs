// /////////////////////////////////////////////////////////////////////////////
// Snapstream
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Application Layer
//!
//! Coordinates the domain services and infrastructure into the use cases
//! the presentation layer exposes.

pub mod services;

pub use services::{
    DatasetAdmin, FileTransferOptions, JobContext, JobHandler, JobManager, ReplicationContext, ReplicationEngine,
    ReplicationJobHandler, TransferReport,
};
