// /////////////////////////////////////////////////////////////////////////////
// Snapstream
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Snapstream Domain
//!
//! Pure domain layer for the snapstream replication service: the
//! network-accessible control and data plane for a host's copy-on-write
//! filesystem snapshot replication primitives.
//!
//! ## Overview
//!
//! This crate contains everything the service knows about replication that
//! does not require an operating system: the vocabulary (dataset names,
//! snapshot references, capability tokens, jobs, transfer plans), the pure
//! domain services (command construction, progress-line parsing, transfer
//! negotiation), and the asynchronous ports the infrastructure layer
//! implements (token store, job store, dataset endpoints).
//!
//! ## Layering
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Service crate (snapstream)               │
//! │  (process pipelines, Redis persistence, sockets, wiring)    │
//! └──────────────────────────────┬──────────────────────────────┘
//!                                │ implements ports, consumes types
//! ┌──────────────────────────────┴──────────────────────────────┐
//! │                    Domain crate (this)                      │
//! │  (errors, value objects, entities, sync services, ports)    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//!
//! - **Pure sync services**: command building, progress parsing, and plan
//!   negotiation never suspend; they operate on already-available data.
//! - **Async ports only at the seams**: persistence and dataset inspection
//!   are I/O and stay behind `async_trait` ports.
//! - **Explicit errors**: every failure mode is a [`ReplicationError`]
//!   variant; callers decide disposition from the variant, not the message.

pub mod entities;
pub mod error;
pub mod repositories;
pub mod services;
pub mod value_objects;

// Tests are organized as:
// - Unit tests: #[cfg(test)] modules within each source file
// - Integration tests: separate files in the service crate's tests/ directory

// Re-export the everyday types for convenient access
pub use entities::{CapabilityToken, Job, JobOutcome, JobStatus, ReplicationRequest, StreamOperation, TransferParameters};
pub use error::ReplicationError;
pub use repositories::{JobStore, TokenIssueRequest, TokenStats, TokenStore};
pub use services::{DatasetEndpoint, ProgressEvent, ProgressParser};
pub use value_objects::{
    CommandTarget, CompressionAlgorithm, CompressionChoice, DatasetName, JobId, PlanOutcome, RemoteHost, SnapshotRef,
    StreamSpec, TokenId, ToolVersion, TransferPlan, TransferProgress,
};
