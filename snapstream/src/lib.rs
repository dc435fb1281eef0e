// /////////////////////////////////////////////////////////////////////////////
// Snapstream
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Snapstream
//!
//! Network-accessible control and data plane for a host's copy-on-write
//! filesystem snapshot replication primitives. Three surfaces share one
//! service:
//!
//! - a request/response control API for dataset, snapshot, pool, bookmark,
//!   clone, volume and migration management;
//! - token-authenticated streaming sockets (TCP and Unix) carrying raw
//!   send/receive byte streams between clients and the host's tools;
//! - a background job runner executing replications asynchronously with
//!   progress reporting and cancellation.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Presentation Layer                         │
//! │  (Control API surface, streaming socket listeners)          │
//! └─────────────────────────────────────────────────────────────┘
//!                                │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Application Layer                          │
//! │  (Replication engine, job manager, dataset administration)  │
//! └─────────────────────────────────────────────────────────────┘
//!                                │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Domain Layer                             │
//! │  (snapstream-domain: types, pure services, ports)           │
//! └─────────────────────────────────────────────────────────────┘
//!                                │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                Infrastructure Layer                         │
//! │  (Subprocess pipelines, Redis stores, tool adapters)        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The domain crate holds everything that needs no operating system; this
//! crate implements its ports and wires the layers together in `main`.

pub mod application;
pub mod infrastructure;
pub mod presentation;

// Tests are organized as:
// - Unit tests: #[cfg(test)] modules within each source file
// - Integration tests: separate files in the tests/ directory

// Re-export domain types for convenient access
pub use snapstream_domain::{
    CapabilityToken, DatasetName, Job, JobId, JobOutcome, JobStatus, ReplicationError, ReplicationRequest,
    SnapshotRef, StreamOperation, TransferProgress,
};
