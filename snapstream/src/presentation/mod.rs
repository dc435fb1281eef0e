// /////////////////////////////////////////////////////////////////////////////
// Snapstream
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Presentation Layer
//!
//! The two externally visible surfaces: the control API methods and the
//! token-authenticated streaming sockets.

pub mod api;
pub mod stream;

pub use api::{Caller, ControlApi};
