// /////////////////////////////////////////////////////////////////////////////
// Snapstream
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Application Services
//!
//! The use-case layer: the replication engine, the background job
//! manager with its replication handler, and the administrative
//! pass-through service.

mod dataset_admin;
mod job_manager;
mod replication_engine;
mod replication_handler;

pub use dataset_admin::{DatasetAdmin, SpaceUsage};
pub use job_manager::{JobContext, JobHandler, JobManager};
pub use replication_engine::{FileTransferOptions, ReplicationContext, ReplicationEngine, TransferReport};
pub use replication_handler::ReplicationJobHandler;
