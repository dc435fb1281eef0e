// /////////////////////////////////////////////////////////////////////////////
// Snapstream
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Command Executor
//!
//! Capture-style subprocess execution for the short-lived tool invocations
//! behind listings, property reads and snapshot management. Argument
//! vectors come exclusively from the domain command builder; no shell is
//! ever involved on this host.
//!
//! Streaming pipelines live in the sibling [`pipeline`](super::pipeline)
//! module; this one is for commands whose whole output fits in memory.

use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

use snapstream_domain::ReplicationError;

/// Result of one captured command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Exit code; signal exits encoded negative.
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == 0
    }

    /// Promotes a failure to the pipeline error carrying stderr.
    pub fn require_success(&self, what: &str) -> Result<(), ReplicationError> {
        if self.success() {
            Ok(())
        } else {
            Err(ReplicationError::Pipeline {
                return_codes: vec![self.status],
                stderr: format!("{}: {}", what, self.stderr.trim()),
            })
        }
    }
}

/// Encodes an exit status the way job results expect: the code when the
/// child exited, minus the signal number when it was killed (SIGTERM is
/// -15).
pub fn exit_code(status: &std::process::ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return -signal;
        }
    }
    -1
}

pub(crate) fn classify_spawn_error(program: &str, err: &std::io::Error) -> ReplicationError {
    if err.kind() == std::io::ErrorKind::NotFound {
        ReplicationError::Spawn(format!("executable '{}' not found", program))
    } else {
        ReplicationError::Spawn(format!("failed to spawn '{}': {}", program, err))
    }
}

/// Runs a command to completion, capturing stdout and stderr.
pub async fn run(argv: &[String]) -> Result<CommandOutput, ReplicationError> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| ReplicationError::invalid_request("empty argument vector"))?;

    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| classify_spawn_error(program, &e))?;

    Ok(CommandOutput {
        status: exit_code(&output.status),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Runs a command with a wall-clock ceiling; the child is killed on
/// timeout. Used for probes that may hang on an unresponsive peer.
pub async fn run_with_timeout(argv: &[String], timeout: Duration) -> Result<CommandOutput, ReplicationError> {
    match tokio::time::timeout(timeout, run(argv)).await {
        Ok(result) => result,
        Err(_) => Err(ReplicationError::Timeout(format!(
            "'{}' did not finish within {:?}",
            argv.first().map(String::as_str).unwrap_or(""),
            timeout
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_run_captures_stdout() {
        let output = run(&argv(&["echo", "hello"])).await.unwrap();
        assert!(output.success());
        assert_eq!(output.stdout.trim(), "hello");
        assert!(output.stderr.is_empty());
    }

    #[tokio::test]
    async fn test_run_reports_exit_code() {
        let output = run(&argv(&["false"])).await.unwrap();
        assert!(!output.success());
        assert_eq!(output.status, 1);
        assert!(output.require_success("probe").is_err());
    }

    #[tokio::test]
    async fn test_missing_executable_is_spawn_error() {
        let err = run(&argv(&["snapstream-no-such-binary"])).await.unwrap_err();
        assert_eq!(err.kind(), "spawn_error");
        assert!(err.to_string().contains("not found"));
    }

    #[tokio::test]
    async fn test_empty_argv_rejected() {
        let err = run(&[]).await.unwrap_err();
        assert_eq!(err.kind(), "invalid_request");
    }

    #[tokio::test]
    async fn test_timeout_kills_slow_command() {
        let err = run_with_timeout(&argv(&["sleep", "5"]), Duration::from_millis(100))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "timeout");
    }
}
