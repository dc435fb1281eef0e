// /////////////////////////////////////////////////////////////////////////////
// Snapstream
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Platform Layer
//!
//! The small set of operating-system facilities the service needs beyond
//! what the runtime provides: signalling whole process groups (the unit a
//! subprocess pipeline lives in) and waiting for the process's own
//! termination signals.

use std::io;

/// Signals the service sends to subprocess pipelines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessSignal {
    /// Graceful stop (SIGTERM).
    Terminate,
    /// Forceful kill (SIGKILL), after the grace period.
    Kill,
}

/// Job results encode a SIGTERM death as this return code.
pub const SIGTERM_EXIT_CODE: i32 = -15;

/// Sends `signal` to every process in `pgid`'s group.
///
/// A group that no longer exists is not an error; termination paths call
/// this after natural completion all the time.
#[cfg(unix)]
pub fn signal_process_group(pgid: i32, signal: ProcessSignal) -> io::Result<()> {
    let signum = match signal {
        ProcessSignal::Terminate => libc::SIGTERM,
        ProcessSignal::Kill => libc::SIGKILL,
    };
    let rc = unsafe { libc::killpg(pgid as libc::pid_t, signum) };
    if rc == 0 {
        return Ok(());
    }
    let err = io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::ESRCH) {
        // Already gone.
        return Ok(());
    }
    Err(err)
}

#[cfg(not(unix))]
pub fn signal_process_group(_pgid: i32, _signal: ProcessSignal) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "process groups require a unix platform",
    ))
}

/// Resolves when the process receives SIGINT or SIGTERM.
#[cfg(unix)]
pub async fn wait_for_termination() -> io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        _ = interrupt.recv() => tracing::info!("received SIGINT"),
        _ = terminate.recv() => tracing::info!("received SIGTERM"),
    }
    Ok(())
}

#[cfg(not(unix))]
pub async fn wait_for_termination() -> io::Result<()> {
    tokio::signal::ctrl_c().await
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_signalling_missing_group_is_ok() {
        // A pgid nothing can own anymore; ESRCH is swallowed.
        assert!(signal_process_group(999_999_9, ProcessSignal::Terminate).is_ok());
    }

    #[tokio::test]
    async fn test_signal_process_group_terminates_children() {
        use std::process::Stdio;
        use tokio::process::Command;

        let mut cmd = Command::new("sleep");
        cmd.arg("30").stdin(Stdio::null()).stdout(Stdio::null());
        unsafe {
            cmd.pre_exec(|| {
                unsafe { libc::setpgid(0, 0) };
                Ok(())
            });
        }
        let mut child = cmd.spawn().expect("spawn sleep");
        let pgid = child.id().expect("child pid") as i32;

        signal_process_group(pgid, ProcessSignal::Terminate).expect("signal group");
        let status = child.wait().await.expect("wait child");

        use std::os::unix::process::ExitStatusExt;
        assert_eq!(status.signal(), Some(libc::SIGTERM));
    }
}
