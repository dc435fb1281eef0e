// /////////////////////////////////////////////////////////////////////////////
// Snapstream
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Token-Authenticated Streaming Sockets
//!
//! Raw send/receive byte streams over TCP and Unix sockets, gated by
//! single-use capability tokens.

pub mod connection;
pub mod frames;
pub mod server;

pub use connection::{handle_connection, EngineStreamOpener, StreamOpener, StreamServerContext};
pub use server::{serve_tcp, serve_unix, StreamEndpoints};
