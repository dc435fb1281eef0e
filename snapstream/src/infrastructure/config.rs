// /////////////////////////////////////////////////////////////////////////////
// Snapstream
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Service Configuration
//!
//! The daemon's configuration: a TOML file with serde defaults for every
//! field, plus a handful of environment overrides for the values that vary
//! between deployments (`SNAPSTREAM_REDIS_URL`, `SNAPSTREAM_MAC_SECRET`).
//! Configuration is loaded once at startup and shared read-only; the MAC
//! secret rotates by restarting with a new value, which invalidates every
//! token signed under the old one.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use snapstream_domain::ReplicationError;

use crate::infrastructure::persistence::MacSecret;

/// Environment override for the persistence URL.
pub const REDIS_URL_ENV: &str = "SNAPSTREAM_REDIS_URL";
/// Environment override for the token MAC secret.
pub const MAC_SECRET_ENV: &str = "SNAPSTREAM_MAC_SECRET";

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub tokens: TokenConfig,
    #[serde(default)]
    pub jobs: JobsConfig,
    #[serde(default)]
    pub engine: EngineConfig,
}

/// Streaming socket endpoints.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    #[serde(default = "default_tcp_bind")]
    pub stream_tcp_bind: String,
    #[serde(default = "default_unix_path")]
    pub stream_unix_path: PathBuf,
}

fn default_tcp_bind() -> String {
    "0.0.0.0:9999".to_string()
}

fn default_unix_path() -> PathBuf {
    PathBuf::from("/run/snapstream/stream.sock")
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            stream_tcp_bind: default_tcp_bind(),
            stream_unix_path: default_unix_path(),
        }
    }
}

/// Persistence client settings, including the retry envelope.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RedisConfig {
    #[serde(default = "default_redis_url")]
    pub url: String,
    /// Prefix for every token-subsystem key.
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    /// Per-operation socket timeout, seconds.
    #[serde(default = "default_operation_timeout")]
    pub operation_timeout_secs: u64,
    /// First backoff delay, seconds.
    #[serde(default = "default_retry_initial")]
    pub retry_initial_secs: u64,
    /// Backoff cap, seconds.
    #[serde(default = "default_retry_cap")]
    pub retry_cap_secs: u64,
    /// Attempts before failing closed.
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

fn default_key_prefix() -> String {
    "snapstream".to_string()
}

fn default_operation_timeout() -> u64 {
    5
}

fn default_retry_initial() -> u64 {
    1
}

fn default_retry_cap() -> u64 {
    10
}

fn default_retry_attempts() -> u32 {
    5
}

impl Default for RedisConfig {
    fn default() -> Self {
        RedisConfig {
            url: default_redis_url(),
            key_prefix: default_key_prefix(),
            operation_timeout_secs: default_operation_timeout(),
            retry_initial_secs: default_retry_initial(),
            retry_cap_secs: default_retry_cap(),
            retry_attempts: default_retry_attempts(),
        }
    }
}

impl RedisConfig {
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }

    pub fn retry_initial(&self) -> Duration {
        Duration::from_secs(self.retry_initial_secs)
    }

    pub fn retry_cap(&self) -> Duration {
        Duration::from_secs(self.retry_cap_secs)
    }
}

/// Capability token policy.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TokenConfig {
    /// Secret behind the integrity MAC, zeroized on drop. Empty means:
    /// generate a random one at startup (tokens then do not survive a
    /// restart).
    #[serde(default)]
    pub mac_secret: MacSecret,
    #[serde(default = "default_token_ttl")]
    pub default_ttl_secs: u64,
    /// Hard ceiling a caller-supplied TTL may not exceed.
    #[serde(default = "default_token_max_ttl")]
    pub max_ttl_secs: u64,
    /// Concurrent live tokens per owner.
    #[serde(default = "default_max_tokens_per_owner")]
    pub max_tokens_per_owner: usize,
    /// Reject the second use of a token.
    #[serde(default = "default_true")]
    pub single_use: bool,
    /// Enforce the token's peer binding on connect.
    #[serde(default = "default_true")]
    pub enforce_peer_binding: bool,
}

fn default_token_ttl() -> u64 {
    300
}

fn default_token_max_ttl() -> u64 {
    86_400
}

fn default_max_tokens_per_owner() -> usize {
    16
}

fn default_true() -> bool {
    true
}

impl Default for TokenConfig {
    fn default() -> Self {
        TokenConfig {
            mac_secret: MacSecret::default(),
            default_ttl_secs: default_token_ttl(),
            max_ttl_secs: default_token_max_ttl(),
            max_tokens_per_owner: default_max_tokens_per_owner(),
            single_use: true,
            enforce_peer_binding: true,
        }
    }
}

impl TokenConfig {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }

    pub fn max_ttl(&self) -> Duration {
        Duration::from_secs(self.max_ttl_secs)
    }
}

/// Background job manager settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobsConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Queue-pop timeout, seconds; workers loop on it so shutdown stays
    /// responsive.
    #[serde(default = "default_pop_timeout")]
    pub queue_pop_timeout_secs: u64,
}

fn default_workers() -> usize {
    4
}

fn default_pop_timeout() -> u64 {
    1
}

impl Default for JobsConfig {
    fn default() -> Self {
        JobsConfig {
            workers: default_workers(),
            queue_pop_timeout_secs: default_pop_timeout(),
        }
    }
}

impl JobsConfig {
    pub fn queue_pop_timeout(&self) -> Duration {
        Duration::from_secs(self.queue_pop_timeout_secs)
    }
}

/// Replication engine policy knobs.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Fall back to case-insensitive snapshot matching when the exact pass
    /// finds no common base. Off by default; only sensible against
    /// case-insensitive peers.
    #[serde(default)]
    pub case_insensitive_fallback: bool,
    /// Retry a failed resume send once as a renegotiated incremental.
    #[serde(default = "default_true")]
    pub resume_fallback: bool,
    /// Seconds of grace between SIGTERM and SIGKILL on cancellation.
    #[serde(default = "default_grace")]
    pub termination_grace_secs: u64,
}

fn default_grace() -> u64 {
    5
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            case_insensitive_fallback: false,
            resume_fallback: true,
            termination_grace_secs: default_grace(),
        }
    }
}

impl EngineConfig {
    pub fn termination_grace(&self) -> Duration {
        Duration::from_secs(self.termination_grace_secs)
    }
}

impl AppConfig {
    /// Loads configuration from `path` (or pure defaults when `None`),
    /// then applies environment overrides. A missing explicit file is an
    /// error; a missing secret gets a random replacement.
    pub fn load(path: Option<&Path>) -> Result<AppConfig, ReplicationError> {
        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|e| {
                    ReplicationError::invalid_request(format!("cannot read config {}: {}", path.display(), e))
                })?;
                toml::from_str(&text)
                    .map_err(|e| ReplicationError::invalid_request(format!("bad config {}: {}", path.display(), e)))?
            }
            None => AppConfig::default(),
        };

        if let Ok(url) = std::env::var(REDIS_URL_ENV) {
            if !url.is_empty() {
                config.redis.url = url;
            }
        }
        if let Ok(secret) = std::env::var(MAC_SECRET_ENV) {
            if !secret.is_empty() {
                config.tokens.mac_secret = MacSecret::new(secret);
            }
        }
        if config.tokens.mac_secret.is_empty() {
            tracing::warn!("no token MAC secret configured; generating one (tokens will not survive restart)");
            config.tokens.mac_secret = generate_secret();
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ReplicationError> {
        if self.jobs.workers == 0 {
            return Err(ReplicationError::invalid_request("jobs.workers must be at least 1"));
        }
        if self.tokens.max_ttl_secs == 0 || self.tokens.default_ttl_secs > self.tokens.max_ttl_secs {
            return Err(ReplicationError::invalid_request(
                "tokens.default_ttl_secs must not exceed tokens.max_ttl_secs",
            ));
        }
        if self.redis.retry_attempts == 0 {
            return Err(ReplicationError::invalid_request("redis.retry_attempts must be at least 1"));
        }
        Ok(())
    }
}

fn generate_secret() -> MacSecret {
    use rand::RngCore;
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    MacSecret::new(hex::encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.server.stream_tcp_bind, "0.0.0.0:9999");
        assert_eq!(config.jobs.workers, 4);
        assert_eq!(config.redis.operation_timeout(), Duration::from_secs(5));
        assert_eq!(config.redis.retry_initial(), Duration::from_secs(1));
        assert_eq!(config.redis.retry_cap(), Duration::from_secs(10));
        assert!(config.tokens.single_use);
        assert!(!config.engine.case_insensitive_fallback);
        assert!(config.engine.resume_fallback);
    }

    #[test]
    fn test_parse_partial_file() {
        let config: AppConfig = toml::from_str(
            r#"
            [server]
            stream_tcp_bind = "127.0.0.1:9001"

            [tokens]
            mac_secret = "sekrit"
            default_ttl_secs = 60

            [engine]
            case_insensitive_fallback = true
            "#,
        )
        .unwrap();
        assert_eq!(config.server.stream_tcp_bind, "127.0.0.1:9001");
        assert!(!config.tokens.mac_secret.is_empty());
        assert_eq!(config.tokens.default_ttl_secs, 60);
        assert!(config.engine.case_insensitive_fallback);
        // Untouched sections keep their defaults
        assert_eq!(config.jobs.workers, 4);
    }

    #[test]
    fn test_unknown_keys_rejected() {
        let result: Result<AppConfig, _> = toml::from_str("[server]\nstream_tcp_host = \"oops\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_validation() {
        let mut config = AppConfig::default();
        config.jobs.workers = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.tokens.default_ttl_secs = 100;
        config.tokens.max_ttl_secs = 50;
        assert!(config.validate().is_err());
    }
}
