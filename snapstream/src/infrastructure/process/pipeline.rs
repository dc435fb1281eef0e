// /////////////////////////////////////////////////////////////////////////////
// Snapstream
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Subprocess Pipelines
//!
//! Spawns the chains of programs that produce or consume snapshot streams
//! (`send → meter → compressor → sink`) and owns their lifecycle.
//!
//! ## Guarantees
//!
//! - all children of one pipeline share a process group (the leader calls
//!   `setpgid(0, 0)`, followers join its group), so a single signal reaps
//!   the whole chain;
//! - stderr is captured per stage with a bound; the designated meter
//!   stage's stderr is instead handed to the caller raw, for the progress
//!   parser;
//! - the parent closes its copies of every inter-stage pipe end as wiring
//!   proceeds, so children observe EOF and broken pipes instead of
//!   stalling on this process;
//! - when any child exits non-zero, the remaining siblings are signalled
//!   so the pipeline shares fate;
//! - termination is graceful first (SIGTERM), forceful after the grace
//!   period (SIGKILL); both are idempotent and safe after natural
//!   completion.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::task::JoinHandle;

use snapstream_bootstrap::platform::{signal_process_group, ProcessSignal};
use snapstream_domain::ReplicationError;

use super::executor::{classify_spawn_error, exit_code};

/// Cap on captured stderr per stage.
const STDERR_CAP: usize = 64 * 1024;

/// Default grace before escalating SIGTERM to SIGKILL.
pub const DEFAULT_TERMINATION_GRACE: Duration = Duration::from_secs(5);

/// Where the first stage reads from.
pub enum StdinSpec {
    Null,
    /// Parent writes into the pipeline ([`Pipeline::take_stdin`]).
    Piped,
    /// Stream from a file on disk.
    File(PathBuf),
}

/// Where the last stage writes to.
pub enum StdoutSpec {
    Null,
    /// Parent reads from the pipeline ([`Pipeline::take_stdout`]).
    Piped,
    /// Stream into a file on disk (created or truncated).
    File(PathBuf),
}

struct CancelShared {
    pgid: AtomicI32,
    finished: AtomicBool,
    requested: AtomicBool,
    grace: Duration,
}

/// Handle through which the cancellation path tears down a pipeline's
/// process group. Clones share state; every method is idempotent and safe
/// to call after the pipeline finished on its own.
#[derive(Clone)]
pub struct CancelHandle {
    shared: Arc<CancelShared>,
}

impl CancelHandle {
    /// SIGTERM the group, wait out the grace period, SIGKILL stragglers.
    pub async fn terminate(&self) {
        self.shared.requested.store(true, Ordering::SeqCst);
        let pgid = self.shared.pgid.load(Ordering::SeqCst);
        if pgid <= 0 || self.shared.finished.load(Ordering::SeqCst) {
            return;
        }
        let _ = signal_process_group(pgid, ProcessSignal::Terminate);

        let deadline = tokio::time::Instant::now() + self.shared.grace;
        while tokio::time::Instant::now() < deadline {
            if self.shared.finished.load(Ordering::SeqCst) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        if !self.shared.finished.load(Ordering::SeqCst) {
            let _ = signal_process_group(pgid, ProcessSignal::Kill);
        }
    }

    /// Whether termination was ever requested through this handle.
    pub fn was_requested(&self) -> bool {
        self.shared.requested.load(Ordering::SeqCst)
    }
}

/// One job's cancellation rendezvous: the worker registers the pipeline
/// handle once spawned; the control API requests termination from the
/// other side. A request that arrives before registration terminates the
/// pipeline the moment it registers.
#[derive(Clone, Default)]
pub struct CancellationSlot {
    inner: Arc<SlotInner>,
}

#[derive(Default)]
struct SlotInner {
    requested: AtomicBool,
    handle: tokio::sync::Mutex<Option<CancelHandle>>,
}

impl CancellationSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes the live pipeline's handle. If cancellation was already
    /// requested, the pipeline is torn down immediately.
    pub async fn register(&self, handle: CancelHandle) {
        {
            let mut slot = self.inner.handle.lock().await;
            *slot = Some(handle.clone());
        }
        if self.inner.requested.load(Ordering::SeqCst) {
            handle.terminate().await;
        }
    }

    /// Requests cancellation, tearing down the registered pipeline if any.
    pub async fn cancel(&self) {
        self.inner.requested.store(true, Ordering::SeqCst);
        let handle = self.inner.handle.lock().await.clone();
        if let Some(handle) = handle {
            handle.terminate().await;
        }
    }

    pub fn is_requested(&self) -> bool {
        self.inner.requested.load(Ordering::SeqCst)
    }
}

/// Terminal state of a finished pipeline.
#[derive(Debug, Clone)]
pub struct PipelineStatus {
    /// Exit code of every stage, in stage order; signal exits negative.
    pub return_codes: Vec<i32>,
    /// Bounded stderr of the non-meter stages, labelled by program.
    pub stderr: String,
    /// Whether termination was requested through the cancel handle.
    pub cancelled: bool,
}

impl PipelineStatus {
    pub fn success(&self) -> bool {
        self.return_codes.iter().all(|code| *code == 0)
    }

    /// Every non-zero code, in stage order.
    pub fn failing_codes(&self) -> Vec<i32> {
        self.return_codes.iter().copied().filter(|code| *code != 0).collect()
    }

    pub fn primary_code(&self) -> i32 {
        self.return_codes.iter().copied().find(|code| *code != 0).unwrap_or(0)
    }

    pub fn to_error(&self) -> ReplicationError {
        ReplicationError::Pipeline {
            return_codes: self.failing_codes(),
            stderr: self.stderr.clone(),
        }
    }
}

/// Declarative construction of a pipeline.
pub struct PipelineBuilder {
    stages: Vec<Vec<String>>,
    stdin: StdinSpec,
    stdout: StdoutSpec,
    meter_stage: Option<usize>,
    grace: Duration,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        PipelineBuilder {
            stages: Vec::new(),
            stdin: StdinSpec::Null,
            stdout: StdoutSpec::Null,
            meter_stage: None,
            grace: DEFAULT_TERMINATION_GRACE,
        }
    }

    pub fn stage(mut self, argv: Vec<String>) -> Self {
        self.stages.push(argv);
        self
    }

    pub fn stdin(mut self, spec: StdinSpec) -> Self {
        self.stdin = spec;
        self
    }

    pub fn stdout(mut self, spec: StdoutSpec) -> Self {
        self.stdout = spec;
        self
    }

    /// Marks the stage whose stderr carries machine-readable progress; it
    /// is handed to the caller instead of the bounded collector.
    pub fn meter_stage(mut self, index: usize) -> Self {
        self.meter_stage = Some(index);
        self
    }

    pub fn termination_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Spawns every stage and wires the pipes.
    pub async fn spawn(self) -> Result<Pipeline, ReplicationError> {
        if self.stages.is_empty() {
            return Err(ReplicationError::invalid_request("pipeline has no stages"));
        }

        let shared = Arc::new(CancelShared {
            pgid: AtomicI32::new(0),
            finished: AtomicBool::new(false),
            requested: AtomicBool::new(false),
            grace: self.grace,
        });

        let mut pending_stdin = Some(match &self.stdin {
            StdinSpec::Null => Stdio::null(),
            StdinSpec::Piped => Stdio::piped(),
            StdinSpec::File(path) => {
                let file = tokio::fs::File::open(path).await?;
                Stdio::from(file.into_std().await)
            }
        });

        let mut final_stdout = Some(match &self.stdout {
            StdoutSpec::Null => Stdio::null(),
            StdoutSpec::Piped => Stdio::piped(),
            StdoutSpec::File(path) => {
                let file = tokio::fs::File::create(path).await?;
                Stdio::from(file.into_std().await)
            }
        });

        let last = self.stages.len() - 1;
        let mut pgid: i32 = 0;
        let mut children: Vec<(Vec<String>, Child)> = Vec::with_capacity(self.stages.len());
        let mut stderr_tasks: Vec<JoinHandle<(String, String)>> = Vec::new();
        let mut meter_stderr = None;
        let mut stdin = None;
        let mut stdout = None;

        for (index, argv) in self.stages.iter().enumerate() {
            let (program, args) = argv
                .split_first()
                .ok_or_else(|| ReplicationError::invalid_request("pipeline stage has no program"))?;

            let mut cmd = Command::new(program);
            cmd.args(args);
            cmd.kill_on_drop(true);
            cmd.stderr(Stdio::piped());
            cmd.stdin(
                pending_stdin
                    .take()
                    .ok_or_else(|| ReplicationError::internal("pipeline stdin already consumed"))?,
            );
            if index == last {
                cmd.stdout(
                    final_stdout
                        .take()
                        .ok_or_else(|| ReplicationError::internal("pipeline stdout already consumed"))?,
                );
            } else {
                cmd.stdout(Stdio::piped());
            }

            #[cfg(unix)]
            {
                // Leader creates the group, followers join it. A failed
                // setpgid leaves the child in the parent's group, which only
                // matters once the leader is already gone.
                let group: libc::pid_t = pgid;
                unsafe {
                    cmd.pre_exec(move || {
                        unsafe { libc::setpgid(0, group) };
                        Ok(())
                    });
                }
            }

            let mut child = cmd.spawn().map_err(|e| classify_spawn_error(program, &e))?;

            if index == 0 {
                pgid = child.id().map(|id| id as i32).unwrap_or(0);
                shared.pgid.store(pgid, Ordering::SeqCst);
                if matches!(self.stdin, StdinSpec::Piped) {
                    stdin = child.stdin.take();
                }
            }
            if index == last && matches!(self.stdout, StdoutSpec::Piped) {
                stdout = child.stdout.take();
            }

            match child.stderr.take() {
                Some(stderr) if self.meter_stage == Some(index) => meter_stderr = Some(stderr),
                Some(stderr) => {
                    let label = program.clone();
                    stderr_tasks.push(tokio::spawn(collect_stderr(label, stderr)));
                }
                None => {}
            }

            if index != last {
                let child_stdout = child
                    .stdout
                    .take()
                    .ok_or_else(|| ReplicationError::internal("pipeline stage stdout missing"))?;
                // Transferring the fd to the next stage drops the parent's
                // copy once that stage is spawned.
                let stdio: Stdio = child_stdout
                    .try_into()
                    .map_err(|e: std::io::Error| ReplicationError::Io(e.to_string()))?;
                pending_stdin = Some(stdio);
            }

            children.push((argv.clone(), child));
        }

        Ok(Pipeline {
            children,
            cancel: CancelHandle { shared },
            stdin,
            stdout,
            meter_stderr,
            stderr_tasks,
        })
    }
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A live pipeline.
pub struct Pipeline {
    children: Vec<(Vec<String>, Child)>,
    cancel: CancelHandle,
    stdin: Option<ChildStdin>,
    stdout: Option<ChildStdout>,
    meter_stderr: Option<ChildStderr>,
    stderr_tasks: Vec<JoinHandle<(String, String)>>,
}

impl Pipeline {
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// The write end into the first stage, when built with
    /// [`StdinSpec::Piped`]. Closing it signals end-of-stream.
    pub fn take_stdin(&mut self) -> Option<ChildStdin> {
        self.stdin.take()
    }

    /// The read end of the last stage, when built with
    /// [`StdoutSpec::Piped`].
    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.stdout.take()
    }

    /// The meter stage's raw stderr, for the progress parser.
    pub fn take_meter_stderr(&mut self) -> Option<ChildStderr> {
        self.meter_stderr.take()
    }

    /// Waits for every stage, enforcing shared fate: the first non-zero
    /// exit signals the rest of the group.
    pub async fn wait(mut self) -> Result<PipelineStatus, ReplicationError> {
        // Drop any pipe ends the caller never took so children see EOF.
        self.stdin = None;
        self.stdout = None;
        self.meter_stderr = None;

        let shared = self.cancel.shared.clone();
        let pgid = shared.pgid.load(Ordering::SeqCst);
        let count = self.children.len();

        let mut waits = FuturesUnordered::new();
        for (index, (argv, mut child)) in self.children.drain(..).enumerate() {
            waits.push(async move {
                let result = child.wait().await;
                (index, argv, result)
            });
        }

        let mut return_codes = vec![0i32; count];
        let mut fate_signalled = false;
        while let Some((index, argv, result)) = waits.next().await {
            let status = result.map_err(|e| {
                shared.finished.store(true, Ordering::SeqCst);
                ReplicationError::Io(format!("wait on '{}' failed: {}", argv.join(" "), e))
            })?;
            let code = exit_code(&status);
            return_codes[index] = code;
            if code != 0 && !fate_signalled {
                fate_signalled = true;
                if pgid > 0 {
                    let _ = signal_process_group(pgid, ProcessSignal::Terminate);
                }
            }
        }
        shared.finished.store(true, Ordering::SeqCst);

        let mut stderr = String::new();
        for task in self.stderr_tasks.drain(..) {
            if let Ok((label, text)) = task.await {
                if !text.is_empty() {
                    if !stderr.is_empty() {
                        stderr.push('\n');
                    }
                    stderr.push_str(&format!("{}: {}", label, text));
                }
            }
        }

        Ok(PipelineStatus {
            return_codes,
            stderr,
            cancelled: self.cancel.was_requested(),
        })
    }
}

async fn collect_stderr(label: String, mut stderr: ChildStderr) -> (String, String) {
    let mut captured = Vec::new();
    let mut chunk = [0u8; 8192];
    loop {
        match stderr.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                if captured.len() < STDERR_CAP {
                    let take = (STDERR_CAP - captured.len()).min(n);
                    captured.extend_from_slice(&chunk[..take]);
                }
            }
        }
    }
    (label, String::from_utf8_lossy(&captured).trim().to_string())
}
