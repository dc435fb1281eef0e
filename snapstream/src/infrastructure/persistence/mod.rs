// /////////////////////////////////////////////////////////////////////////////
// Snapstream
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Persistence Infrastructure
//!
//! The shared Redis client with its retry envelope, and the token/job
//! store implementations over it.

mod redis_job_store;
mod redis_store;
mod redis_token_store;
mod token_signer;

pub use redis_job_store::RedisJobStore;
pub use redis_store::RedisStore;
pub use redis_token_store::RedisTokenStore;
pub use token_signer::{MacSecret, TokenSigner};
