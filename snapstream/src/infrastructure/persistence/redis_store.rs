// /////////////////////////////////////////////////////////////////////////////
// Snapstream
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Reliable Redis Client
//!
//! A thin wrapper over the shared connection manager that gives every
//! caller the same failure envelope: a per-operation socket timeout,
//! bounded exponential-backoff retry for transient errors (initial one
//! second, capped at ten, configurable attempts), and a clean
//! transient/permanent split in the surfaced error. After the retry
//! budget is exhausted callers fail closed.
//!
//! The connection manager multiplexes and reconnects internally and is
//! cheap to clone, so one store instance is shared across every task.

use std::collections::HashMap;
use std::time::Duration;

use redis::aio::ConnectionManager;
use redis::FromRedisValue;
use tracing::warn;

use snapstream_domain::ReplicationError;

use crate::infrastructure::config::RedisConfig;

/// Shared persistence client.
#[derive(Clone)]
pub struct RedisStore {
    manager: ConnectionManager,
    operation_timeout: Duration,
    retry_initial: Duration,
    retry_cap: Duration,
    retry_attempts: u32,
}

fn is_transient(err: &redis::RedisError) -> bool {
    err.is_io_error() || err.is_timeout() || err.is_connection_refusal() || err.is_connection_dropped()
}

impl RedisStore {
    /// Connects and verifies the server answers a PING.
    pub async fn connect(config: &RedisConfig) -> Result<Self, ReplicationError> {
        let client = redis::Client::open(config.url.as_str())
            .map_err(|e| ReplicationError::PersistencePermanent(format!("bad redis url: {}", e)))?;
        let manager = client
            .get_connection_manager()
            .await
            .map_err(|e| ReplicationError::PersistenceTransient(format!("redis connect failed: {}", e)))?;

        let store = RedisStore {
            manager,
            operation_timeout: config.operation_timeout(),
            retry_initial: config.retry_initial(),
            retry_cap: config.retry_cap(),
            retry_attempts: config.retry_attempts,
        };
        store.query::<String>("PING", &redis::cmd("PING")).await?;
        Ok(store)
    }

    /// Runs one command under the timeout/retry envelope.
    async fn query<T: FromRedisValue>(&self, op: &'static str, cmd: &redis::Cmd) -> Result<T, ReplicationError> {
        let mut delay = self.retry_initial;
        let mut last_error = String::new();

        for attempt in 1..=self.retry_attempts {
            let mut conn = self.manager.clone();
            match tokio::time::timeout(self.operation_timeout, cmd.query_async::<T>(&mut conn)).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(err)) if !is_transient(&err) => {
                    return Err(ReplicationError::PersistencePermanent(format!("{}: {}", op, err)));
                }
                Ok(Err(err)) => last_error = err.to_string(),
                Err(_) => last_error = format!("timed out after {:?}", self.operation_timeout),
            }
            if attempt < self.retry_attempts {
                warn!(op, attempt, error = %last_error, "persistence operation failed, backing off");
                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(self.retry_cap);
            }
        }
        Err(ReplicationError::PersistenceTransient(format!(
            "{} failed after {} attempts: {}",
            op, self.retry_attempts, last_error
        )))
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>, ReplicationError> {
        let mut cmd = redis::cmd("GET");
        cmd.arg(key);
        self.query("GET", &cmd).await
    }

    /// SET with a TTL.
    pub async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), ReplicationError> {
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value).arg("EX").arg(ttl.as_secs().max(1));
        self.query::<()>("SET", &cmd).await
    }

    pub async fn del(&self, keys: &[String]) -> Result<u64, ReplicationError> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut cmd = redis::cmd("DEL");
        for key in keys {
            cmd.arg(key);
        }
        self.query("DEL", &cmd).await
    }

    pub async fn exists(&self, key: &str) -> Result<bool, ReplicationError> {
        let mut cmd = redis::cmd("EXISTS");
        cmd.arg(key);
        self.query("EXISTS", &cmd).await
    }

    /// Remaining TTL in seconds; negative when missing or persistent.
    pub async fn ttl(&self, key: &str) -> Result<i64, ReplicationError> {
        let mut cmd = redis::cmd("TTL");
        cmd.arg(key);
        self.query("TTL", &cmd).await
    }

    pub async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, ReplicationError> {
        let mut cmd = redis::cmd("EXPIRE");
        cmd.arg(key).arg(ttl.as_secs().max(1));
        self.query("EXPIRE", &cmd).await
    }

    pub async fn incr(&self, key: &str) -> Result<i64, ReplicationError> {
        let mut cmd = redis::cmd("INCR");
        cmd.arg(key);
        self.query("INCR", &cmd).await
    }

    pub async fn sadd(&self, key: &str, member: &str) -> Result<(), ReplicationError> {
        let mut cmd = redis::cmd("SADD");
        cmd.arg(key).arg(member);
        self.query::<()>("SADD", &cmd).await
    }

    pub async fn srem(&self, key: &str, member: &str) -> Result<(), ReplicationError> {
        let mut cmd = redis::cmd("SREM");
        cmd.arg(key).arg(member);
        self.query::<()>("SREM", &cmd).await
    }

    pub async fn smembers(&self, key: &str) -> Result<Vec<String>, ReplicationError> {
        let mut cmd = redis::cmd("SMEMBERS");
        cmd.arg(key);
        self.query("SMEMBERS", &cmd).await
    }

    pub async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), ReplicationError> {
        let mut cmd = redis::cmd("HSET");
        cmd.arg(key).arg(field).arg(value);
        self.query::<()>("HSET", &cmd).await
    }

    pub async fn hset_multiple(&self, key: &str, fields: &[(String, String)]) -> Result<(), ReplicationError> {
        if fields.is_empty() {
            return Ok(());
        }
        let mut cmd = redis::cmd("HSET");
        cmd.arg(key);
        for (field, value) in fields {
            cmd.arg(field).arg(value);
        }
        self.query::<()>("HSET", &cmd).await
    }

    pub async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, ReplicationError> {
        let mut cmd = redis::cmd("HGETALL");
        cmd.arg(key);
        self.query("HGETALL", &cmd).await
    }

    pub async fn hincr(&self, key: &str, field: &str, by: i64) -> Result<i64, ReplicationError> {
        let mut cmd = redis::cmd("HINCRBY");
        cmd.arg(key).arg(field).arg(by);
        self.query("HINCRBY", &cmd).await
    }

    pub async fn rpush(&self, key: &str, value: &str) -> Result<i64, ReplicationError> {
        let mut cmd = redis::cmd("RPUSH");
        cmd.arg(key).arg(value);
        self.query("RPUSH", &cmd).await
    }

    /// Blocking left pop. The block timeout is the point, so this one runs
    /// without the retry envelope; its socket ceiling is the block timeout
    /// plus the usual margin.
    pub async fn blpop(&self, key: &str, block: Duration) -> Result<Option<(String, String)>, ReplicationError> {
        let mut cmd = redis::cmd("BLPOP");
        cmd.arg(key).arg(block.as_secs_f64());
        let mut conn = self.manager.clone();
        let ceiling = block + self.operation_timeout;
        match tokio::time::timeout(ceiling, cmd.query_async::<Option<(String, String)>>(&mut conn)).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) if is_transient(&err) => {
                Err(ReplicationError::PersistenceTransient(format!("BLPOP: {}", err)))
            }
            Ok(Err(err)) => Err(ReplicationError::PersistencePermanent(format!("BLPOP: {}", err))),
            Err(_) => Err(ReplicationError::PersistenceTransient(format!(
                "BLPOP timed out after {:?}",
                ceiling
            ))),
        }
    }

    pub async fn keys(&self, pattern: &str) -> Result<Vec<String>, ReplicationError> {
        let mut cmd = redis::cmd("KEYS");
        cmd.arg(pattern);
        self.query("KEYS", &cmd).await
    }
}
