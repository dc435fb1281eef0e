// /////////////////////////////////////////////////////////////////////////////
// Snapstream
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Replication Engine
//!
//! Plans and executes snapshot transfers between endpoints. Planning runs
//! in a fixed order: resume check, incremental negotiation, up-to-date
//! short-circuit, full-send policy, automatic snapshot creation, then the
//! native-vs-external compression decision. Execution wires the
//! `send → meter [→ compressor] → sink` pipeline, feeds the meter's
//! stderr through the progress parser, and publishes records to the
//! caller's channel.
//!
//! ## Transfer matrix
//!
//! | Source → Dest | Local dataset | Remote dataset | Local file |
//! |---------------|---------------|----------------|------------|
//! | Local dataset | supported     | supported      | supported  |
//! | Remote dataset| supported     | rejected       | supported  |
//! | Local file    | supported     | rejected       | n/a        |
//!
//! ## Failure semantics
//!
//! - a receive that dies complaining the dataset is busy is diagnosed and
//!   surfaced; the partial receive is never aborted automatically;
//! - a failed resume send is retried once as a renegotiated incremental
//!   (policy knob), a second failure is fatal;
//! - any other non-zero exit is fatal with the captured stderr attached;
//! - cancellation tears down the pipeline's process group and reports a
//!   non-fatal outcome with the cancellation marker set.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use snapstream_bootstrap::platform::SIGTERM_EXIT_CODE;
use snapstream_domain::services::command_builder::{self, ReceiveOptions, SendOptions};
use snapstream_domain::services::transfer_planner::{self, CompressionInputs, NegotiationOutcome};
use snapstream_domain::services::DatasetEndpoint;
use snapstream_domain::value_objects::parse_size_suffix;
use snapstream_domain::{
    CapabilityToken, CommandTarget, CompressionAlgorithm, CompressionChoice, DatasetName, PlanOutcome,
    ProgressEvent, ProgressParser, RemoteHost, ReplicationError, ReplicationRequest, SnapshotRef, StreamSpec,
    TransferPlan, TransferProgress,
};

use crate::infrastructure::config::EngineConfig;
use crate::infrastructure::process::{
    self, CancellationSlot, Pipeline, PipelineBuilder, PipelineStatus, StdinSpec, StdoutSpec,
};
use crate::infrastructure::zfs::ZfsEndpoint;

/// Ceiling on the size-estimate dry run.
const ESTIMATE_TIMEOUT: Duration = Duration::from_secs(120);

/// Terminal report of one replication invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferReport {
    /// Pipeline return code (0 on success, -15 when cancelled).
    pub return_code: i32,
    pub bytes_transferred: u64,
    /// The destination already held the source's newest snapshot; nothing
    /// was spawned.
    pub up_to_date: bool,
    pub cancelled: bool,
}

impl TransferReport {
    fn up_to_date() -> Self {
        TransferReport {
            return_code: 0,
            bytes_transferred: 0,
            up_to_date: true,
            cancelled: false,
        }
    }
}

/// A resolved replication: endpoints plus the parsed request.
pub struct ReplicationContext {
    pub source: Arc<dyn DatasetEndpoint>,
    pub destination: Arc<dyn DatasetEndpoint>,
    pub source_dataset: DatasetName,
    /// Snapshot pinned by a `dataset@snapshot` source; `None` means the
    /// newest.
    pub pinned_snapshot: Option<String>,
    pub destination_dataset: DatasetName,
    pub request: ReplicationRequest,
}

impl ReplicationContext {
    /// Builds endpoints from the request: both local, or one behind the
    /// secure shell depending on the pull flag.
    pub fn from_request(request: ReplicationRequest) -> Result<Self, ReplicationError> {
        let (source_dataset, pinned_snapshot) = match request.source.split_once('@') {
            Some((dataset, snapshot)) => (DatasetName::new(dataset)?, Some(snapshot.to_string())),
            None => (DatasetName::new(request.source.as_str())?, None),
        };
        let destination_dataset = DatasetName::new(request.destination.as_str())?;

        let (source, destination): (Arc<dyn DatasetEndpoint>, Arc<dyn DatasetEndpoint>) = match &request.remote {
            None => (Arc::new(ZfsEndpoint::local()), Arc::new(ZfsEndpoint::local())),
            Some(host) => {
                let host = RemoteHost::new(host.as_str())?;
                if request.pull {
                    (Arc::new(ZfsEndpoint::remote(host)), Arc::new(ZfsEndpoint::local()))
                } else {
                    (Arc::new(ZfsEndpoint::local()), Arc::new(ZfsEndpoint::remote(host)))
                }
            }
        };

        Ok(ReplicationContext {
            source,
            destination,
            source_dataset,
            pinned_snapshot,
            destination_dataset,
            request,
        })
    }
}

/// Options for the file-image operations.
#[derive(Debug, Clone, Default)]
pub struct FileTransferOptions {
    pub recursive: bool,
    /// `None` derives from the dataset's encryption property.
    pub raw: Option<bool>,
    /// `None` derives from the dataset's compression property.
    pub native_compressed: Option<bool>,
    /// External compressor wrapped around the file image.
    pub compression: Option<CompressionAlgorithm>,
    pub limit_mbps: Option<u32>,
}

pub struct ReplicationEngine {
    config: EngineConfig,
}

impl ReplicationEngine {
    pub fn new(config: EngineConfig) -> Self {
        ReplicationEngine { config }
    }

    // ==================== PLANNING ====================

    /// Produces the transfer plan for one invocation. `skip_resume` is set
    /// on the renegotiated retry after a failed resume send.
    pub async fn plan(&self, ctx: &ReplicationContext, skip_resume: bool) -> Result<PlanOutcome, ReplicationError> {
        if ctx.source.target().is_remote() && ctx.destination.target().is_remote() {
            return Err(ReplicationError::invalid_request(
                "remote-to-remote transfers are not supported",
            ));
        }

        if !ctx.source.dataset_exists(&ctx.source_dataset).await? {
            return Err(ReplicationError::not_found(format!(
                "source dataset {} does not exist",
                ctx.source_dataset
            )));
        }
        let destination_exists = ctx.destination.dataset_exists(&ctx.destination_dataset).await?;

        let raw = self.derive_raw(ctx).await?;
        let recursive = ctx.request.recursive;

        // 1. Resume check: a pending receive token on the destination wins
        //    over all snapshot negotiation.
        if !skip_resume && destination_exists {
            if let Some(token) = ctx.destination.resume_token(&ctx.destination_dataset).await? {
                info!(destination = %ctx.destination_dataset, "resume token present, continuing interrupted receive");
                let compression = self.wire_compression(ctx, false).await?;
                return Ok(PlanOutcome::Transfer(TransferPlan {
                    stream: StreamSpec::Resume { token },
                    compression,
                    recursive,
                    raw,
                    source: ctx.source.target(),
                    destination: ctx.destination.target(),
                }));
            }
        }

        // 2./4. Inventory, optionally creating the terminal snapshot.
        let mut source_snapshots = ctx.source.snapshots(&ctx.source_dataset).await?;
        if let Some(pinned) = &ctx.pinned_snapshot {
            match source_snapshots.iter().position(|name| name == pinned) {
                Some(index) => source_snapshots.truncate(index + 1),
                None => {
                    return Err(ReplicationError::not_found(format!(
                        "snapshot {}@{} does not exist",
                        ctx.source_dataset, pinned
                    )));
                }
            }
        }
        if source_snapshots.is_empty() {
            if ctx.request.take_snapshot && ctx.pinned_snapshot.is_none() {
                let name = format!("migrate-{}", Utc::now().format("%y%m%d-%H-%M%S"));
                let snapshot = ctx.source_dataset.snapshot(&name)?;
                info!(snapshot = %snapshot, "source has no snapshots, creating one");
                ctx.source.create_snapshot(&snapshot, recursive).await?;
                source_snapshots.push(name);
            } else {
                return Err(ReplicationError::NoCommonSnapshot(format!(
                    "source dataset {} has no snapshots to send",
                    ctx.source_dataset
                )));
            }
        }

        let destination_snapshots = if destination_exists {
            ctx.destination.snapshots(&ctx.destination_dataset).await?
        } else {
            Vec::new()
        };

        // 2./3. Negotiation and the full-send policy.
        let outcome = transfer_planner::negotiate(
            &source_snapshots,
            &destination_snapshots,
            self.config.case_insensitive_fallback,
        );
        let stream = match outcome {
            NegotiationOutcome::UpToDate { snapshot } => {
                return Ok(PlanOutcome::UpToDate {
                    snapshot: ctx.source_dataset.snapshot(snapshot)?,
                });
            }
            NegotiationOutcome::Incremental { base, target } => StreamSpec::Incremental {
                base: ctx.source_dataset.snapshot(base)?,
                target: ctx.source_dataset.snapshot(target)?,
                intermediates: true,
            },
            NegotiationOutcome::NoCommonBase { target } => {
                if !ctx.request.allow_full {
                    return Err(ReplicationError::NoCommonSnapshot(format!(
                        "{} and {} share no snapshot and full sends are not permitted",
                        ctx.source_dataset, ctx.destination_dataset
                    )));
                }
                StreamSpec::Full {
                    snapshot: ctx.source_dataset.snapshot(target)?,
                }
            }
            NegotiationOutcome::NoSourceSnapshot => {
                return Err(ReplicationError::internal("negotiation after snapshot creation"));
            }
        };

        // 5. Compression.
        let compression = self.wire_compression(ctx, true).await?;

        Ok(PlanOutcome::Transfer(TransferPlan {
            stream,
            compression,
            recursive,
            raw,
            source: ctx.source.target(),
            destination: ctx.destination.target(),
        }))
    }

    async fn derive_raw(&self, ctx: &ReplicationContext) -> Result<bool, ReplicationError> {
        let encryption = ctx.source.property(&ctx.source_dataset, "encryption").await?;
        Ok(matches!(encryption.as_deref(), Some(value) if value != "off"))
    }

    /// Native vs external stream compression. `native_allowed` is false
    /// for resume streams, whose shape is fixed by the resume token.
    async fn wire_compression(
        &self,
        ctx: &ReplicationContext,
        native_allowed: bool,
    ) -> Result<CompressionChoice, ReplicationError> {
        let requested = match &ctx.request.compression {
            Some(name) => Some(CompressionAlgorithm::from_name(name).ok_or_else(|| {
                ReplicationError::invalid_request(format!("unknown compression algorithm '{}'", name))
            })?),
            None => None,
        };

        let mut inputs = CompressionInputs {
            source_version: if native_allowed {
                ctx.source.tool_version().await?
            } else {
                None
            },
            destination_version: ctx.destination.tool_version().await?,
            source_compression: ctx.source.property(&ctx.source_dataset, "compression").await?,
            requested,
            available: Vec::new(),
        };

        // Probing is only worth the round trips when the stream crosses
        // hosts and no explicit algorithm was named.
        let crosses_hosts = ctx.source.target().is_remote() || ctx.destination.target().is_remote();
        if requested.is_none() && crosses_hosts {
            for algorithm in [CompressionAlgorithm::Zstd, CompressionAlgorithm::Lz4] {
                if ctx.source.probe_program(algorithm.program()).await?
                    && ctx.destination.probe_program(algorithm.program()).await?
                {
                    inputs.available.push(algorithm);
                    break;
                }
            }
        }

        Ok(transfer_planner::choose_compression(&inputs))
    }

    // ==================== EXECUTION ====================

    /// Plans and executes one replication, including the resume fallback
    /// and post-transfer sync holds.
    pub async fn replicate(
        &self,
        ctx: &ReplicationContext,
        progress: mpsc::Sender<TransferProgress>,
        cancel: &CancellationSlot,
    ) -> Result<TransferReport, ReplicationError> {
        let outcome = self.plan(ctx, false).await?;
        let plan = match outcome {
            PlanOutcome::UpToDate { snapshot } => {
                info!(snapshot = %snapshot, "destination is up to date, nothing to send");
                let _ = progress.send(TransferProgress::zero()).await;
                return Ok(TransferReport::up_to_date());
            }
            PlanOutcome::Transfer(plan) => plan,
        };

        let is_resume = matches!(plan.stream, StreamSpec::Resume { .. });
        match self.execute(ctx, &plan, progress.clone(), cancel).await {
            Ok(report) => {
                if report.return_code == 0 && !report.cancelled && ctx.request.sync {
                    self.place_sync_holds(ctx, &plan).await;
                }
                Ok(report)
            }
            Err(err) if is_resume && !cancel.is_requested() => {
                if !self.config.resume_fallback {
                    return Err(ReplicationError::ResumeMismatch(format!(
                        "resume send rejected and fallback is disabled: {}",
                        err
                    )));
                }
                warn!(error = %err, "resume send failed, renegotiating as incremental");
                let outcome = self.plan(ctx, true).await?;
                let plan = match outcome {
                    PlanOutcome::UpToDate { snapshot } => {
                        info!(snapshot = %snapshot, "destination is up to date after renegotiation");
                        let _ = progress.send(TransferProgress::zero()).await;
                        return Ok(TransferReport::up_to_date());
                    }
                    PlanOutcome::Transfer(plan) => plan,
                };
                let report = self.execute(ctx, &plan, progress, cancel).await?;
                if report.return_code == 0 && !report.cancelled && ctx.request.sync {
                    self.place_sync_holds(ctx, &plan).await;
                }
                Ok(report)
            }
            Err(err) => Err(err),
        }
    }

    /// Executes an already-planned transfer.
    pub async fn execute(
        &self,
        ctx: &ReplicationContext,
        plan: &TransferPlan,
        progress: mpsc::Sender<TransferProgress>,
        cancel: &CancellationSlot,
    ) -> Result<TransferReport, ReplicationError> {
        if cancel.is_requested() {
            return Err(ReplicationError::cancelled());
        }

        let mut parser = ProgressParser::new();
        if let Some(estimate) = self.estimate_size(ctx, plan).await {
            let header = format!("Starting send with size estimate: {} bytes", estimate);
            info!(source = %ctx.source_dataset, "{}", header);
            let _ = parser.push_line(&header);
        }

        let send_argv = self.send_argv(plan)?;
        let receive_argv = command_builder::receive(
            &ctx.destination_dataset,
            &ReceiveOptions {
                force: true,
                resumable: true,
            },
        );
        let stages = assemble_stages(
            plan,
            send_argv,
            meter_argv(ctx.request.limit_mbps),
            receive_argv,
        )?;

        let (status, parser) = self
            .run_metered(stages, 1, StdinSpec::Null, StdoutSpec::Null, parser, progress, cancel)
            .await?;
        self.classify(ctx, status, parser)
    }

    fn send_argv(&self, plan: &TransferPlan) -> Result<Vec<String>, ReplicationError> {
        match &plan.stream {
            StreamSpec::Resume { token } => command_builder::send_resume(token, false),
            StreamSpec::Full { snapshot } => command_builder::send(
                snapshot,
                &SendOptions {
                    recursive: plan.recursive,
                    raw: plan.raw,
                    compressed: plan.compression.is_native(),
                    ..Default::default()
                },
            ),
            StreamSpec::Incremental {
                base,
                target,
                intermediates,
            } => command_builder::send(
                target,
                &SendOptions {
                    from_snapshot: Some(base.clone()),
                    intermediates: *intermediates,
                    recursive: plan.recursive,
                    raw: plan.raw,
                    compressed: plan.compression.is_native(),
                    ..Default::default()
                },
            ),
        }
    }

    /// Spawns the pipeline, registers it for cancellation, and pumps the
    /// meter's stderr through the progress parser until both finish.
    async fn run_metered(
        &self,
        stages: Vec<Vec<String>>,
        meter_index: usize,
        stdin: StdinSpec,
        stdout: StdoutSpec,
        parser: ProgressParser,
        progress: mpsc::Sender<TransferProgress>,
        cancel: &CancellationSlot,
    ) -> Result<(PipelineStatus, ProgressParser), ReplicationError> {
        let mut builder = PipelineBuilder::new()
            .stdin(stdin)
            .stdout(stdout)
            .meter_stage(meter_index)
            .termination_grace(self.config.termination_grace());
        for stage in stages {
            builder = builder.stage(stage);
        }

        let mut pipeline = builder.spawn().await?;
        cancel.register(pipeline.cancel_handle()).await;

        let meter_stderr = pipeline.take_meter_stderr();
        let pump = tokio::spawn(pump_meter(meter_stderr, parser, progress));

        let status = pipeline.wait().await?;
        let parser = pump
            .await
            .map_err(|e| ReplicationError::internal(format!("meter pump failed: {}", e)))?;
        Ok((status, parser))
    }

    fn classify(
        &self,
        ctx: &ReplicationContext,
        status: PipelineStatus,
        parser: ProgressParser,
    ) -> Result<TransferReport, ReplicationError> {
        let bytes_transferred = parser
            .last_progress()
            .map(|record| record.bytes_transferred)
            .unwrap_or(0);

        if status.success() {
            return Ok(TransferReport {
                return_code: 0,
                bytes_transferred,
                up_to_date: false,
                cancelled: false,
            });
        }

        if status.cancelled {
            info!(destination = %ctx.destination_dataset, "transfer cancelled");
            return Ok(TransferReport {
                return_code: SIGTERM_EXIT_CODE,
                bytes_transferred,
                up_to_date: false,
                cancelled: true,
            });
        }

        if status.stderr.contains("dataset is busy") {
            // Diagnose only. The partial receive stays for the operator (or
            // a resume) to deal with; aborting it here could destroy data.
            warn!(
                destination = %ctx.destination_dataset,
                stderr = %status.stderr,
                "receive reports the dataset is busy; leaving partial state untouched"
            );
        }
        Err(status.to_error())
    }

    async fn estimate_size(&self, ctx: &ReplicationContext, plan: &TransferPlan) -> Option<u64> {
        let argv = match &plan.stream {
            StreamSpec::Resume { token } => command_builder::send_resume(token, true).ok()?,
            StreamSpec::Full { snapshot } => command_builder::send_estimate(
                snapshot,
                &SendOptions {
                    recursive: plan.recursive,
                    raw: plan.raw,
                    compressed: plan.compression.is_native(),
                    ..Default::default()
                },
            )
            .ok()?,
            StreamSpec::Incremental {
                base,
                target,
                intermediates,
            } => command_builder::send_estimate(
                target,
                &SendOptions {
                    from_snapshot: Some(base.clone()),
                    intermediates: *intermediates,
                    recursive: plan.recursive,
                    raw: plan.raw,
                    compressed: plan.compression.is_native(),
                    ..Default::default()
                },
            )
            .ok()?,
        };
        let argv = match &plan.source {
            CommandTarget::Local => argv,
            CommandTarget::Remote(host) => command_builder::remote_command(host, &argv),
        };

        let output = process::run_with_timeout(&argv, ESTIMATE_TIMEOUT).await.ok()?;
        if !output.success() {
            debug!(stderr = %output.stderr.trim(), "size estimate unavailable");
            return None;
        }
        parse_estimate(&output.stdout).or_else(|| parse_estimate(&output.stderr))
    }

    // ==================== SYNC HOLDS ====================

    /// Pins the transferred snapshot on both sides and releases older sync
    /// holds for the same peer. Best effort: a hold failure never fails a
    /// finished transfer.
    async fn place_sync_holds(&self, ctx: &ReplicationContext, plan: &TransferPlan) {
        let Some(terminal) = plan.stream.terminal_snapshot() else {
            return;
        };
        let peer = match (&plan.source, &plan.destination) {
            (CommandTarget::Remote(host), _) | (_, CommandTarget::Remote(host)) => host.host_name().to_string(),
            _ => "local".to_string(),
        };
        let tag = format!("sync_{}_{}", Utc::now().timestamp(), peer);

        let destination_snapshot = match ctx.destination_dataset.snapshot(terminal.name()) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!(error = %err, "cannot form destination snapshot for sync hold");
                return;
            }
        };

        for (endpoint, snapshot) in [
            (&ctx.source, terminal),
            (&ctx.destination, &destination_snapshot),
        ] {
            if let Err(err) = endpoint.hold(snapshot, &tag, plan.recursive).await {
                warn!(snapshot = %snapshot, tag = %tag, error = %err, "failed to place sync hold");
            }
        }

        self.release_older_sync_holds(ctx.source.as_ref(), &ctx.source_dataset, &peer, &tag, plan.recursive)
            .await;
        self.release_older_sync_holds(
            ctx.destination.as_ref(),
            &ctx.destination_dataset,
            &peer,
            &tag,
            plan.recursive,
        )
        .await;
    }

    async fn release_older_sync_holds(
        &self,
        endpoint: &dyn DatasetEndpoint,
        dataset: &DatasetName,
        peer: &str,
        current_tag: &str,
        recursive: bool,
    ) {
        let snapshots = match endpoint.snapshots(dataset).await {
            Ok(snapshots) => snapshots,
            Err(err) => {
                warn!(dataset = %dataset, error = %err, "cannot enumerate snapshots for sync hold cleanup");
                return;
            }
        };
        let suffix = format!("_{}", peer);
        for name in snapshots {
            let Ok(snapshot) = dataset.snapshot(&name) else {
                continue;
            };
            let Ok(tags) = endpoint.holds(&snapshot).await else {
                continue;
            };
            for tag in tags {
                if tag.starts_with("sync_") && tag.ends_with(&suffix) && tag != current_tag {
                    if let Err(err) = endpoint.release(&snapshot, &tag, recursive).await {
                        warn!(snapshot = %snapshot, tag = %tag, error = %err, "failed to release stale sync hold");
                    }
                }
            }
        }
    }

    // ==================== STREAM SOCKET SUPPORT ====================

    /// Spawns the send pipeline behind an authenticated socket stream.
    /// `raw` and `compressed` are derived from dataset properties when the
    /// token leaves them unset.
    pub async fn open_send_stream(
        &self,
        token: &CapabilityToken,
        endpoint: &dyn DatasetEndpoint,
    ) -> Result<(Vec<String>, Pipeline), ReplicationError> {
        let snapshot_name = token
            .snapshot
            .as_ref()
            .ok_or_else(|| ReplicationError::invalid_request("send token carries no snapshot"))?;
        let snapshot = token.dataset.snapshot(snapshot_name)?;

        let raw = match token.parameters.raw {
            Some(raw) => raw,
            None => {
                let encryption = endpoint.property(&token.dataset, "encryption").await?;
                matches!(encryption.as_deref(), Some(value) if value != "off")
            }
        };
        let compressed = match token.parameters.compressed {
            Some(compressed) => compressed,
            None => {
                let compression = endpoint.property(&token.dataset, "compression").await?;
                matches!(compression.as_deref(), Some(value) if value != "off")
            }
        };

        let from_snapshot = token
            .from_snapshot
            .as_ref()
            .map(|name| token.dataset.snapshot(name))
            .transpose()?;

        let argv = command_builder::send(
            &snapshot,
            &SendOptions {
                from_snapshot,
                intermediates: false,
                recursive: token.parameters.recursive,
                raw,
                compressed,
                resume_token: None,
            },
        )?;

        let pipeline = PipelineBuilder::new()
            .stage(argv.clone())
            .stdout(StdoutSpec::Piped)
            .termination_grace(self.config.termination_grace())
            .spawn()
            .await?;
        Ok((argv, pipeline))
    }

    /// Spawns the receive pipeline behind an authenticated socket stream.
    pub async fn open_receive_stream(
        &self,
        token: &CapabilityToken,
    ) -> Result<(Vec<String>, Pipeline), ReplicationError> {
        let argv = command_builder::receive(
            &token.dataset,
            &ReceiveOptions {
                force: token.parameters.force,
                resumable: token.parameters.resumable,
            },
        );
        let pipeline = PipelineBuilder::new()
            .stage(argv.clone())
            .stdin(StdinSpec::Piped)
            .termination_grace(self.config.termination_grace())
            .spawn()
            .await?;
        Ok((argv, pipeline))
    }

    // ==================== FILE ENDPOINTS ====================

    /// Writes a snapshot stream into a file image.
    pub async fn send_to_file(
        &self,
        snapshot: &SnapshotRef,
        path: &Path,
        options: &FileTransferOptions,
        progress: mpsc::Sender<TransferProgress>,
        cancel: &CancellationSlot,
    ) -> Result<TransferReport, ReplicationError> {
        let endpoint = ZfsEndpoint::local();
        let raw = match options.raw {
            Some(raw) => raw,
            None => {
                let encryption = endpoint.property(snapshot.dataset(), "encryption").await?;
                matches!(encryption.as_deref(), Some(value) if value != "off")
            }
        };
        let compressed = match options.native_compressed {
            Some(compressed) => compressed,
            None => {
                let compression = endpoint.property(snapshot.dataset(), "compression").await?;
                matches!(compression.as_deref(), Some(value) if value != "off")
            }
        };

        let send_options = SendOptions {
            recursive: options.recursive,
            raw,
            compressed,
            ..Default::default()
        };

        let mut parser = ProgressParser::new();
        if let Ok(estimate_argv) = command_builder::send_estimate(snapshot, &send_options) {
            if let Ok(output) = process::run_with_timeout(&estimate_argv, ESTIMATE_TIMEOUT).await {
                if output.success() {
                    if let Some(estimate) = parse_estimate(&output.stdout).or_else(|| parse_estimate(&output.stderr)) {
                        let _ = parser.push_line(&format!("Starting send with size estimate: {} bytes", estimate));
                    }
                }
            }
        }

        let mut stages = vec![
            command_builder::send(snapshot, &send_options)?,
            meter_argv(options.limit_mbps),
        ];
        if let Some(algorithm) = options.compression {
            stages.push(algorithm.compress_argv());
        }

        let (status, parser) = self
            .run_metered(
                stages,
                1,
                StdinSpec::Null,
                StdoutSpec::File(path.to_path_buf()),
                parser,
                progress,
                cancel,
            )
            .await?;

        let bytes = parser.last_progress().map(|r| r.bytes_transferred).unwrap_or(0);
        if status.success() {
            Ok(TransferReport {
                return_code: 0,
                bytes_transferred: bytes,
                up_to_date: false,
                cancelled: false,
            })
        } else if status.cancelled {
            Ok(TransferReport {
                return_code: SIGTERM_EXIT_CODE,
                bytes_transferred: bytes,
                up_to_date: false,
                cancelled: true,
            })
        } else {
            Err(status.to_error())
        }
    }

    /// Replays a file image into a receive.
    pub async fn receive_from_file(
        &self,
        dataset: &DatasetName,
        path: &Path,
        decompress: Option<CompressionAlgorithm>,
        progress: mpsc::Sender<TransferProgress>,
        cancel: &CancellationSlot,
    ) -> Result<TransferReport, ReplicationError> {
        let mut stages = vec![meter_argv(None)];
        if let Some(algorithm) = decompress {
            stages.push(algorithm.decompress_argv());
        }
        stages.push(command_builder::receive(
            dataset,
            &ReceiveOptions {
                force: true,
                resumable: true,
            },
        ));

        let (status, parser) = self
            .run_metered(
                stages,
                0,
                StdinSpec::File(path.to_path_buf()),
                StdoutSpec::Null,
                ProgressParser::new(),
                progress,
                cancel,
            )
            .await?;

        let bytes = parser.last_progress().map(|r| r.bytes_transferred).unwrap_or(0);
        if status.success() {
            Ok(TransferReport {
                return_code: 0,
                bytes_transferred: bytes,
                up_to_date: false,
                cancelled: false,
            })
        } else if status.cancelled {
            Ok(TransferReport {
                return_code: SIGTERM_EXIT_CODE,
                bytes_transferred: bytes,
                up_to_date: false,
                cancelled: true,
            })
        } else {
            Err(status.to_error())
        }
    }
}

/// The meter stage: `pv` with machine-readable in-place progress, plus an
/// optional rate cap.
fn meter_argv(limit_mbps: Option<u32>) -> Vec<String> {
    let mut argv = vec!["pv".to_string(), "-f".to_string()];
    if let Some(limit) = limit_mbps {
        argv.push("-L".to_string());
        argv.push(format!("{}m", limit));
    }
    argv
}

/// Orders the pipeline stages for a dataset-to-dataset plan. The meter is
/// always stage 1, directly after the local half of the send.
fn assemble_stages(
    plan: &TransferPlan,
    send_argv: Vec<String>,
    meter: Vec<String>,
    receive_argv: Vec<String>,
) -> Result<Vec<Vec<String>>, ReplicationError> {
    let mut stages = Vec::new();
    match (&plan.source, &plan.destination) {
        (CommandTarget::Local, CommandTarget::Local) => {
            stages.push(send_argv);
            stages.push(meter);
            if let CompressionChoice::External(algorithm) = plan.compression {
                stages.push(algorithm.compress_argv());
                stages.push(algorithm.decompress_argv());
            }
            stages.push(receive_argv);
        }
        (CommandTarget::Local, CommandTarget::Remote(host)) => {
            stages.push(send_argv);
            stages.push(meter);
            let remote_stages = if let CompressionChoice::External(algorithm) = plan.compression {
                stages.push(algorithm.compress_argv());
                vec![algorithm.decompress_argv(), receive_argv]
            } else {
                vec![receive_argv]
            };
            stages.push(command_builder::remote_pipeline(host, &remote_stages));
        }
        (CommandTarget::Remote(host), CommandTarget::Local) => {
            let remote_stages = if let CompressionChoice::External(algorithm) = plan.compression {
                vec![send_argv, algorithm.compress_argv()]
            } else {
                vec![send_argv]
            };
            stages.push(command_builder::remote_pipeline(host, &remote_stages));
            stages.push(meter);
            if let CompressionChoice::External(algorithm) = plan.compression {
                stages.push(algorithm.decompress_argv());
            }
            stages.push(receive_argv);
        }
        (CommandTarget::Remote(_), CommandTarget::Remote(_)) => {
            return Err(ReplicationError::invalid_request(
                "remote-to-remote transfers are not supported",
            ));
        }
    }
    Ok(stages)
}

/// Pulls the last size token out of the estimate dry-run output.
fn parse_estimate(output: &str) -> Option<u64> {
    let line = output.lines().rev().find(|line| !line.trim().is_empty())?;
    let token = line.split_whitespace().last()?;
    parse_size_suffix(token).ok()
}

async fn pump_meter(
    meter_stderr: Option<tokio::process::ChildStderr>,
    mut parser: ProgressParser,
    progress: mpsc::Sender<TransferProgress>,
) -> ProgressParser {
    let handle_event = |event: ProgressEvent, out: &mut Vec<TransferProgress>| match event {
        ProgressEvent::Progress(record) => out.push(record),
        ProgressEvent::Log(line) => debug!(target: "snapstream::meter", "{}", line),
    };

    if let Some(mut stderr) = meter_stderr {
        let mut chunk = [0u8; 8192];
        loop {
            match stderr.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    let mut records = Vec::new();
                    for event in parser.feed(&chunk[..n]) {
                        handle_event(event, &mut records);
                    }
                    for record in records {
                        let _ = progress.send(record).await;
                    }
                }
            }
        }
    }
    if let Some(event) = parser.finish() {
        let mut records = Vec::new();
        handle_event(event, &mut records);
        for record in records {
            let _ = progress.send(record).await;
        }
    }
    parser
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(reference: &str) -> SnapshotRef {
        SnapshotRef::parse(reference).unwrap()
    }

    fn local_plan(stream: StreamSpec, compression: CompressionChoice) -> TransferPlan {
        TransferPlan {
            stream,
            compression,
            recursive: false,
            raw: false,
            source: CommandTarget::Local,
            destination: CommandTarget::Local,
        }
    }

    #[test]
    fn test_meter_argv_with_limit() {
        assert_eq!(meter_argv(None), vec!["pv", "-f"]);
        assert_eq!(meter_argv(Some(1)), vec!["pv", "-f", "-L", "1m"]);
    }

    #[test]
    fn test_parse_estimate() {
        assert_eq!(parse_estimate("send from @ to tank/a@s1\nsize\t1K\n"), Some(1024));
        assert_eq!(
            parse_estimate("total estimated size is 1,5K\n"),
            Some(1536)
        );
        assert_eq!(parse_estimate(""), None);
        assert_eq!(parse_estimate("no size here"), None);
    }

    #[test]
    fn test_assemble_local_stages() {
        let plan = local_plan(
            StreamSpec::Full {
                snapshot: snap("tank/a@s1"),
            },
            CompressionChoice::None,
        );
        let stages = assemble_stages(
            &plan,
            vec!["zfs".into(), "send".into(), "tank/a@s1".into()],
            vec!["pv".into(), "-f".into()],
            vec!["zfs".into(), "receive".into(), "-F".into(), "tank/b".into()],
        )
        .unwrap();
        assert_eq!(stages.len(), 3);
        assert_eq!(stages[0][1], "send");
        assert_eq!(stages[1][0], "pv");
        assert_eq!(stages[2][1], "receive");
    }

    #[test]
    fn test_assemble_push_stages_with_compression() {
        let host = RemoteHost::new("root@peer").unwrap();
        let plan = TransferPlan {
            stream: StreamSpec::Full {
                snapshot: snap("tank/a@s1"),
            },
            compression: CompressionChoice::External(CompressionAlgorithm::Zstd),
            recursive: false,
            raw: false,
            source: CommandTarget::Local,
            destination: CommandTarget::Remote(host),
        };
        let stages = assemble_stages(
            &plan,
            vec!["zfs".into(), "send".into(), "tank/a@s1".into()],
            vec!["pv".into(), "-f".into()],
            vec!["zfs".into(), "receive".into(), "-F".into(), "tank/b".into()],
        )
        .unwrap();
        // send | pv | zstd -c | ssh peer "zstd -dc | zfs receive"
        assert_eq!(stages.len(), 4);
        assert_eq!(stages[2][0], "zstd");
        assert_eq!(stages[3][0], "ssh");
        assert!(stages[3].contains(&"|".to_string()));
        assert!(stages[3].contains(&"-dc".to_string()));
    }

    #[test]
    fn test_assemble_pull_stages() {
        let host = RemoteHost::new("peer").unwrap();
        let plan = TransferPlan {
            stream: StreamSpec::Resume {
                token: "1-abc".to_string(),
            },
            compression: CompressionChoice::None,
            recursive: false,
            raw: false,
            source: CommandTarget::Remote(host),
            destination: CommandTarget::Local,
        };
        let stages = assemble_stages(
            &plan,
            vec!["zfs".into(), "send".into(), "-t".into(), "1-abc".into()],
            vec!["pv".into(), "-f".into()],
            vec!["zfs".into(), "receive".into(), "-s".into(), "tank/b".into()],
        )
        .unwrap();
        assert_eq!(stages.len(), 3);
        assert_eq!(stages[0][0], "ssh");
        assert_eq!(stages[1][0], "pv");
        assert_eq!(stages[2][1], "receive");
    }

    #[test]
    fn test_assemble_rejects_remote_to_remote() {
        let plan = TransferPlan {
            stream: StreamSpec::Full {
                snapshot: snap("tank/a@s1"),
            },
            compression: CompressionChoice::None,
            recursive: false,
            raw: false,
            source: CommandTarget::Remote(RemoteHost::new("a").unwrap()),
            destination: CommandTarget::Remote(RemoteHost::new("b").unwrap()),
        };
        let result = assemble_stages(&plan, vec![], vec![], vec![]);
        assert!(result.is_err());
    }

    #[test]
    fn test_context_from_request_parses_pinned_snapshot() {
        let request: ReplicationRequest = serde_json::from_value(serde_json::json!({
            "source": "tank/src@s1",
            "destination": "tank/dst",
        }))
        .unwrap();
        let ctx = ReplicationContext::from_request(request).unwrap();
        assert_eq!(ctx.source_dataset.as_str(), "tank/src");
        assert_eq!(ctx.pinned_snapshot.as_deref(), Some("s1"));
        assert_eq!(ctx.destination_dataset.as_str(), "tank/dst");
        assert!(!ctx.source.target().is_remote());
        assert!(!ctx.destination.target().is_remote());
    }

    #[test]
    fn test_context_from_request_pull_direction() {
        let request: ReplicationRequest = serde_json::from_value(serde_json::json!({
            "source": "tank/src",
            "destination": "tank/dst",
            "remote": "root@peer",
            "pull": true,
        }))
        .unwrap();
        let ctx = ReplicationContext::from_request(request).unwrap();
        assert!(ctx.source.target().is_remote());
        assert!(!ctx.destination.target().is_remote());
    }
}
