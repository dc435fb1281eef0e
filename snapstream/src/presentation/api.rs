// /////////////////////////////////////////////////////////////////////////////
// Snapstream
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Control API Surface
//!
//! The request/response methods over the job manager, token store and
//! administrative service. Transport framing and caller authentication
//! live outside this layer: callers arrive here as a resolved
//! [`Caller`] identity, and [`ControlApi::dispatch`] is the explicit
//! middleware seam - one function from (caller, method, params) to a
//! response, with identity bound before any method logic runs.
//!
//! Errors map onto the domain taxonomy; the serialized failure carries the
//! stable `kind` string plus the display message.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::{json, Value};

use snapstream_domain::repositories::TokenIssueRequest;
use snapstream_domain::services::command_builder::SendOptions;
use snapstream_domain::{
    CompressionAlgorithm, DatasetName, JobId, JobStatus, ReplicationError, ReplicationRequest, SnapshotRef,
    StreamOperation, TokenStore, TransferParameters,
};

use crate::application::{DatasetAdmin, FileTransferOptions, JobManager, ReplicationContext, ReplicationEngine};
use crate::infrastructure::config::TokenConfig;
use crate::infrastructure::process::CancellationSlot;
use crate::presentation::stream::StreamEndpoints;

use snapstream_domain::entities::JOB_TYPE_REPLICATION;

/// The authenticated caller, resolved before dispatch.
#[derive(Debug, Clone)]
pub struct Caller {
    /// Stable identity string (user name or API key subject).
    pub id: String,
    /// Network address the request arrived from, when known.
    pub peer: Option<String>,
}

pub struct ControlApi {
    jobs: Arc<JobManager>,
    tokens: Arc<dyn TokenStore>,
    admin: Arc<DatasetAdmin>,
    engine: Arc<ReplicationEngine>,
    endpoints: StreamEndpoints,
    token_config: TokenConfig,
}

// ==================== REQUEST SHAPES ====================

#[derive(Debug, Deserialize)]
struct JobIdParams {
    job_id: JobId,
}

#[derive(Debug, Deserialize)]
struct MigrationListParams {
    #[serde(default)]
    status: Option<String>,
    #[serde(default = "default_list_limit")]
    limit: usize,
}

fn default_list_limit() -> usize {
    100
}

#[derive(Debug, Deserialize)]
struct TokenCreateSendParams {
    dataset: String,
    snapshot: String,
    #[serde(default)]
    from_snapshot: Option<String>,
    #[serde(default)]
    raw: Option<bool>,
    #[serde(default)]
    compressed: Option<bool>,
    #[serde(default)]
    recursive: bool,
    #[serde(default)]
    bound_peer: Option<String>,
    #[serde(default)]
    ttl: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct TokenCreateReceiveParams {
    dataset: String,
    #[serde(default = "default_true")]
    force: bool,
    #[serde(default)]
    resumable: bool,
    #[serde(default)]
    bound_peer: Option<String>,
    #[serde(default)]
    ttl: Option<u64>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct TokenRevokeParams {
    token_id: String,
}

#[derive(Debug, Deserialize)]
struct DatasetParams {
    dataset: String,
    #[serde(default)]
    recursive: bool,
    #[serde(default)]
    properties: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct DatasetPropertyParams {
    dataset: String,
    #[serde(default = "default_all")]
    property: String,
    #[serde(default)]
    value: Option<String>,
}

fn default_all() -> String {
    "all".to_string()
}

#[derive(Debug, Deserialize)]
struct RenameParams {
    dataset: String,
    new_name: String,
}

#[derive(Debug, Deserialize)]
struct SnapshotParams {
    dataset: String,
    snapshot: String,
    #[serde(default)]
    recursive: bool,
}

#[derive(Debug, Deserialize)]
struct SnapshotAutoParams {
    dataset: String,
    tag: String,
    #[serde(default)]
    tag1: Option<String>,
    #[serde(default)]
    recursive: bool,
}

#[derive(Debug, Deserialize)]
struct SnapshotRetentionParams {
    dataset: String,
    keep: usize,
    #[serde(default)]
    tag: Option<String>,
    #[serde(default)]
    recursive: bool,
}

#[derive(Debug, Deserialize)]
struct HoldParams {
    dataset: String,
    snapshot: String,
    tag: String,
    #[serde(default)]
    recursive: bool,
}

#[derive(Debug, Deserialize)]
struct DiffParams {
    snapshot: String,
    #[serde(default)]
    other: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SendEstimateParams {
    dataset: String,
    snapshot: String,
    #[serde(default)]
    from_snapshot: Option<String>,
    #[serde(default)]
    recursive: bool,
    #[serde(default)]
    raw: bool,
    #[serde(default)]
    compressed: bool,
}

#[derive(Debug, Deserialize)]
struct PoolParams {
    pool: String,
    #[serde(default = "default_all")]
    property: String,
    #[serde(default)]
    value: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BookmarkParams {
    #[serde(default)]
    snapshot: Option<String>,
    #[serde(default)]
    bookmark: Option<String>,
    #[serde(default)]
    dataset: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CloneParams {
    snapshot: String,
    target: String,
    #[serde(default)]
    properties: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct VolumeCreateParams {
    dataset: String,
    size_bytes: u64,
    #[serde(default = "default_volume_compression")]
    compression: String,
    #[serde(default = "default_volblocksize")]
    volblocksize: String,
    #[serde(default = "default_true")]
    sparse: bool,
}

fn default_volume_compression() -> String {
    "lz4".to_string()
}

fn default_volblocksize() -> String {
    "8K".to_string()
}

impl ControlApi {
    pub fn new(
        jobs: Arc<JobManager>,
        tokens: Arc<dyn TokenStore>,
        admin: Arc<DatasetAdmin>,
        engine: Arc<ReplicationEngine>,
        endpoints: StreamEndpoints,
        token_config: TokenConfig,
    ) -> Self {
        ControlApi {
            jobs,
            tokens,
            admin,
            engine,
            endpoints,
            token_config,
        }
    }

    /// The middleware seam: identity is already resolved, every method
    /// routes through here, and failures serialize uniformly.
    pub async fn dispatch(&self, caller: &Caller, method: &str, params: Value) -> Result<Value, ReplicationError> {
        match method {
            "migration_create" => self.migration_create(caller, params).await,
            "migration_get" => self.migration_get(params).await,
            "migration_list" => self.migration_list(params).await,
            "migration_cancel" => self.migration_cancel(params).await,
            "migration_progress" => self.migration_progress(params).await,
            "send_to_file" => self.send_to_file(params).await,
            "receive_from_file" => self.receive_from_file(params).await,
            "token_create_send" => self.token_create_send(caller, params).await,
            "token_create_receive" => self.token_create_receive(caller, params).await,
            "token_list" => self.token_list(caller).await,
            "token_revoke" => self.token_revoke(caller, params).await,
            "token_stats" => self.token_stats().await,
            "stream_endpoints" => Ok(serde_json::to_value(&self.endpoints)?),

            "dataset_create" => {
                let p: DatasetParams = parse(params)?;
                self.admin.dataset_create(&DatasetName::new(p.dataset)?, &p.properties).await?;
                Ok(json!({ "created": true }))
            }
            "dataset_destroy" => {
                let p: DatasetParams = parse(params)?;
                self.admin.dataset_destroy(&DatasetName::new(p.dataset)?, p.recursive).await?;
                Ok(json!({ "destroyed": true }))
            }
            "dataset_list" => {
                #[derive(Deserialize)]
                struct P {
                    #[serde(default)]
                    dataset: Option<String>,
                }
                let p: P = parse(params)?;
                let root = p.dataset.map(DatasetName::new).transpose()?;
                Ok(json!({ "datasets": self.admin.dataset_list(root.as_ref()).await? }))
            }
            "dataset_get_properties" => {
                let p: DatasetPropertyParams = parse(params)?;
                let properties = self
                    .admin
                    .dataset_properties(&DatasetName::new(p.dataset)?, &p.property)
                    .await?;
                Ok(json!({ "properties": properties }))
            }
            "dataset_set_property" => {
                let p: DatasetPropertyParams = parse(params)?;
                let value = p
                    .value
                    .ok_or_else(|| ReplicationError::invalid_request("missing property value"))?;
                self.admin
                    .dataset_set_property(&DatasetName::new(p.dataset)?, &p.property, &value)
                    .await?;
                Ok(json!({ "set": true }))
            }
            "dataset_get_space" => {
                let p: DatasetPropertyParams = parse(params)?;
                Ok(serde_json::to_value(self.admin.dataset_space(&DatasetName::new(p.dataset)?).await?)?)
            }
            "dataset_mount" => {
                let p: DatasetPropertyParams = parse(params)?;
                self.admin.dataset_mount(&DatasetName::new(p.dataset)?).await?;
                Ok(json!({ "mounted": true }))
            }
            "dataset_rename" => {
                let p: RenameParams = parse(params)?;
                self.admin
                    .dataset_rename(&DatasetName::new(p.dataset)?, &DatasetName::new(p.new_name)?)
                    .await?;
                Ok(json!({ "renamed": true }))
            }
            "dataset_promote" => {
                let p: DatasetPropertyParams = parse(params)?;
                self.admin.dataset_promote(&DatasetName::new(p.dataset)?).await?;
                Ok(json!({ "promoted": true }))
            }
            "dataset_share" => {
                let p: DatasetPropertyParams = parse(params)?;
                self.admin.dataset_share(&DatasetName::new(p.dataset)?).await?;
                Ok(json!({ "shared": true }))
            }
            "dataset_unshare" => {
                let p: DatasetPropertyParams = parse(params)?;
                self.admin.dataset_unshare(&DatasetName::new(p.dataset)?).await?;
                Ok(json!({ "unshared": true }))
            }

            "snapshot_create" => {
                let p: SnapshotParams = parse(params)?;
                let snapshot = DatasetName::new(p.dataset)?.snapshot(p.snapshot)?;
                self.admin.snapshot_create(&snapshot, p.recursive).await?;
                Ok(json!({ "created": true, "snapshot": snapshot.to_string() }))
            }
            "snapshot_create_auto" => {
                let p: SnapshotAutoParams = parse(params)?;
                let name = self
                    .admin
                    .snapshot_create_auto(&DatasetName::new(p.dataset)?, &p.tag, p.tag1.as_deref(), p.recursive)
                    .await?;
                Ok(json!({ "created": true, "snapshot": name }))
            }
            "snapshot_list" => {
                let p: DatasetPropertyParams = parse(params)?;
                Ok(json!({ "snapshots": self.admin.snapshot_list(&DatasetName::new(p.dataset)?).await? }))
            }
            "snapshot_destroy" => {
                let p: SnapshotParams = parse(params)?;
                let snapshot = DatasetName::new(p.dataset)?.snapshot(p.snapshot)?;
                self.admin.snapshot_destroy(&snapshot, p.recursive).await?;
                Ok(json!({ "destroyed": true }))
            }
            "snapshot_autoremove" => {
                let p: SnapshotRetentionParams = parse(params)?;
                let removed = self
                    .admin
                    .snapshot_autoremove(&DatasetName::new(p.dataset)?, p.keep, p.tag.as_deref(), p.recursive)
                    .await?;
                Ok(json!({ "removed": removed }))
            }
            "snapshot_rollback" => {
                let p: SnapshotParams = parse(params)?;
                let snapshot = DatasetName::new(p.dataset)?.snapshot(p.snapshot)?;
                self.admin.snapshot_rollback(&snapshot).await?;
                Ok(json!({ "rolled_back": true }))
            }
            "snapshot_hold" => {
                let p: HoldParams = parse(params)?;
                let snapshot = DatasetName::new(p.dataset)?.snapshot(p.snapshot)?;
                self.admin.snapshot_hold(&snapshot, &p.tag, p.recursive).await?;
                Ok(json!({ "held": true }))
            }
            "snapshot_release" => {
                let p: HoldParams = parse(params)?;
                let snapshot = DatasetName::new(p.dataset)?.snapshot(p.snapshot)?;
                self.admin.snapshot_release(&snapshot, &p.tag, p.recursive).await?;
                Ok(json!({ "released": true }))
            }
            "snapshot_holds" => {
                let p: SnapshotParams = parse(params)?;
                let snapshot = DatasetName::new(p.dataset)?.snapshot(p.snapshot)?;
                Ok(json!({ "holds": self.admin.snapshot_holds(&snapshot).await? }))
            }
            "snapshot_diff" => {
                let p: DiffParams = parse(params)?;
                let snapshot = SnapshotRef::parse(&p.snapshot)?;
                let other = p.other.as_deref().map(SnapshotRef::parse).transpose()?;
                let diff = self.admin.snapshot_diff(&snapshot, other.as_ref()).await?;
                Ok(json!({
                    "created": diff.created,
                    "modified": diff.modified,
                    "deleted": diff.deleted,
                    "renamed": diff.renamed,
                }))
            }
            "send_estimate" => {
                let p: SendEstimateParams = parse(params)?;
                let dataset = DatasetName::new(p.dataset)?;
                let snapshot = dataset.snapshot(p.snapshot)?;
                let from_snapshot = p.from_snapshot.map(|name| dataset.snapshot(name)).transpose()?;
                let (bytes, human) = self
                    .admin
                    .send_estimate(
                        &snapshot,
                        &SendOptions {
                            from_snapshot,
                            intermediates: true,
                            recursive: p.recursive,
                            raw: p.raw,
                            compressed: p.compressed,
                            resume_token: None,
                        },
                    )
                    .await?;
                Ok(json!({ "size_bytes": bytes, "size_human": human }))
            }

            "pool_list" => Ok(json!({ "pools": self.admin.pool_list().await? })),
            "pool_get_properties" => {
                let p: PoolParams = parse(params)?;
                Ok(json!({ "properties": self.admin.pool_properties(&p.pool, &p.property).await? }))
            }
            "pool_set_property" => {
                let p: PoolParams = parse(params)?;
                let value = p
                    .value
                    .ok_or_else(|| ReplicationError::invalid_request("missing property value"))?;
                self.admin.pool_set_property(&p.pool, &p.property, &value).await?;
                Ok(json!({ "set": true }))
            }
            "pool_scrub_start" => {
                let p: PoolParams = parse(params)?;
                self.admin.pool_scrub_start(&p.pool).await?;
                Ok(json!({ "scrubbing": true }))
            }
            "pool_scrub_stop" => {
                let p: PoolParams = parse(params)?;
                self.admin.pool_scrub_stop(&p.pool).await?;
                Ok(json!({ "stopped": true }))
            }
            "pool_status" => {
                let p: PoolParams = parse(params)?;
                Ok(json!({ "status": self.admin.pool_status(&p.pool).await? }))
            }

            "bookmark_create" => {
                let p: BookmarkParams = parse(params)?;
                let snapshot = p
                    .snapshot
                    .ok_or_else(|| ReplicationError::invalid_request("missing snapshot"))?;
                let bookmark = p
                    .bookmark
                    .ok_or_else(|| ReplicationError::invalid_request("missing bookmark"))?;
                self.admin.bookmark_create(&SnapshotRef::parse(&snapshot)?, &bookmark).await?;
                Ok(json!({ "created": true }))
            }
            "bookmark_list" => {
                let p: BookmarkParams = parse(params)?;
                let dataset = p
                    .dataset
                    .ok_or_else(|| ReplicationError::invalid_request("missing dataset"))?;
                Ok(json!({ "bookmarks": self.admin.bookmark_list(&DatasetName::new(dataset)?).await? }))
            }
            "bookmark_destroy" => {
                let p: BookmarkParams = parse(params)?;
                let bookmark = p
                    .bookmark
                    .ok_or_else(|| ReplicationError::invalid_request("missing bookmark"))?;
                self.admin.bookmark_destroy(&bookmark).await?;
                Ok(json!({ "destroyed": true }))
            }
            "clone_create" => {
                let p: CloneParams = parse(params)?;
                self.admin
                    .clone_create(&SnapshotRef::parse(&p.snapshot)?, &DatasetName::new(p.target)?, &p.properties)
                    .await?;
                Ok(json!({ "created": true }))
            }
            "volume_create" => {
                let p: VolumeCreateParams = parse(params)?;
                self.admin
                    .volume_create(&DatasetName::new(p.dataset)?, p.size_bytes, &p.compression, &p.volblocksize, p.sparse)
                    .await?;
                Ok(json!({ "created": true }))
            }
            "volume_list" => Ok(json!({ "volumes": self.admin.volume_list().await? })),
            "volume_destroy" => {
                let p: DatasetPropertyParams = parse(params)?;
                self.admin.volume_destroy(&DatasetName::new(p.dataset)?).await?;
                Ok(json!({ "destroyed": true }))
            }

            other => Err(ReplicationError::invalid_request(format!("unknown method '{}'", other))),
        }
    }

    /// Serializes an error the way transports return it.
    pub fn error_body(err: &ReplicationError) -> Value {
        json!({ "error": { "kind": err.kind(), "message": err.to_string() } })
    }

    // ==================== MIGRATIONS ====================

    async fn migration_create(&self, _caller: &Caller, params: Value) -> Result<Value, ReplicationError> {
        let request: ReplicationRequest = parse(params)?;
        // Surface bad names and unsupported endpoint pairs to the caller
        // instead of the job log.
        ReplicationContext::from_request(request.clone())?;
        let job_id = self
            .jobs
            .create_job(JOB_TYPE_REPLICATION, serde_json::to_value(&request)?)
            .await?;
        Ok(json!({ "job_id": job_id, "status": "created", "params": request }))
    }

    async fn migration_get(&self, params: Value) -> Result<Value, ReplicationError> {
        let p: JobIdParams = parse(params)?;
        let job = self
            .jobs
            .get_job(&p.job_id)
            .await?
            .ok_or_else(|| ReplicationError::not_found(format!("job {}", p.job_id)))?;
        Ok(serde_json::to_value(job)?)
    }

    async fn migration_list(&self, params: Value) -> Result<Value, ReplicationError> {
        let p: MigrationListParams = parse(params)?;
        let status = p.status.as_deref().map(JobStatus::parse).transpose()?;
        let jobs = self.jobs.list_jobs(status, p.limit).await?;
        Ok(json!({ "count": jobs.len(), "jobs": jobs }))
    }

    async fn migration_cancel(&self, params: Value) -> Result<Value, ReplicationError> {
        let p: JobIdParams = parse(params)?;
        let cancelled = self.jobs.cancel_job(&p.job_id).await?;
        Ok(json!({ "cancelled": cancelled }))
    }

    async fn migration_progress(&self, params: Value) -> Result<Value, ReplicationError> {
        let p: JobIdParams = parse(params)?;
        let job = self
            .jobs
            .get_job(&p.job_id)
            .await?
            .ok_or_else(|| ReplicationError::not_found(format!("job {}", p.job_id)))?;
        Ok(json!({ "job_id": p.job_id, "status": job.status, "progress": job.progress }))
    }

    // ==================== FILE ENDPOINTS ====================

    async fn send_to_file(&self, params: Value) -> Result<Value, ReplicationError> {
        let p: SendToFileParams = parse(params)?;
        let snapshot = DatasetName::new(p.dataset)?.snapshot(p.snapshot)?;
        let compression = p
            .compression
            .as_deref()
            .map(|name| {
                CompressionAlgorithm::from_name(name)
                    .ok_or_else(|| ReplicationError::invalid_request(format!("unknown compression '{}'", name)))
            })
            .transpose()?;

        let (progress, drain) = drained_progress_channel();
        let report = self
            .engine
            .send_to_file(
                &snapshot,
                std::path::Path::new(&p.output_file),
                &FileTransferOptions {
                    recursive: p.recursive,
                    raw: p.raw,
                    native_compressed: p.compressed,
                    compression,
                    limit_mbps: p.limit_mbps,
                },
                progress,
                &CancellationSlot::new(),
            )
            .await?;
        drain.await.map_err(|e| ReplicationError::internal(e.to_string()))?;
        Ok(json!({
            "output_file": p.output_file,
            "bytes_transferred": report.bytes_transferred,
            "return_code": report.return_code,
        }))
    }

    async fn receive_from_file(&self, params: Value) -> Result<Value, ReplicationError> {
        let p: ReceiveFromFileParams = parse(params)?;
        let dataset = DatasetName::new(p.dataset)?;
        let compression = p
            .compression
            .as_deref()
            .map(|name| {
                CompressionAlgorithm::from_name(name)
                    .ok_or_else(|| ReplicationError::invalid_request(format!("unknown compression '{}'", name)))
            })
            .transpose()?;

        let (progress, drain) = drained_progress_channel();
        let report = self
            .engine
            .receive_from_file(
                &dataset,
                std::path::Path::new(&p.input_file),
                compression,
                progress,
                &CancellationSlot::new(),
            )
            .await?;
        drain.await.map_err(|e| ReplicationError::internal(e.to_string()))?;
        Ok(json!({
            "dataset": dataset.to_string(),
            "bytes_transferred": report.bytes_transferred,
            "return_code": report.return_code,
        }))
    }

    // ==================== TOKENS ====================

    fn token_ttl(&self, requested: Option<u64>) -> Duration {
        requested.map(Duration::from_secs).unwrap_or_else(|| self.token_config.default_ttl())
    }

    async fn token_create_send(&self, caller: &Caller, params: Value) -> Result<Value, ReplicationError> {
        let p: TokenCreateSendParams = parse(params)?;
        let ttl = self.token_ttl(p.ttl);
        let token = self
            .tokens
            .issue(TokenIssueRequest {
                operation: StreamOperation::Send,
                dataset: DatasetName::new(p.dataset)?,
                snapshot: Some(p.snapshot),
                from_snapshot: p.from_snapshot,
                parameters: TransferParameters {
                    raw: p.raw,
                    compressed: p.compressed,
                    recursive: p.recursive,
                    resumable: false,
                    force: true,
                },
                owner_id: caller.id.clone(),
                bound_peer: p.bound_peer,
                ttl,
            })
            .await?;
        Ok(self.token_reply(&token, ttl))
    }

    async fn token_create_receive(&self, caller: &Caller, params: Value) -> Result<Value, ReplicationError> {
        let p: TokenCreateReceiveParams = parse(params)?;
        let ttl = self.token_ttl(p.ttl);
        let token = self
            .tokens
            .issue(TokenIssueRequest {
                operation: StreamOperation::Receive,
                dataset: DatasetName::new(p.dataset)?,
                snapshot: None,
                from_snapshot: None,
                parameters: TransferParameters {
                    raw: None,
                    compressed: None,
                    recursive: false,
                    resumable: p.resumable,
                    force: p.force,
                },
                owner_id: caller.id.clone(),
                bound_peer: p.bound_peer,
                ttl,
            })
            .await?;
        Ok(self.token_reply(&token, ttl))
    }

    fn token_reply(&self, token: &snapstream_domain::CapabilityToken, ttl: Duration) -> Value {
        json!({
            "token": token.id.as_str(),
            "operation": token.operation.as_str(),
            "dataset": token.dataset.to_string(),
            "snapshot": token.snapshot.clone(),
            "expires_in": ttl.as_secs(),
            "socket_tcp": self.endpoints.tcp_address.clone(),
            "socket_unix": self.endpoints.local_path.clone(),
        })
    }

    async fn token_list(&self, caller: &Caller) -> Result<Value, ReplicationError> {
        let tokens = self.tokens.list(&caller.id).await?;
        let redacted: Vec<Value> = tokens
            .iter()
            .map(|token| {
                json!({
                    "token_id": format!("{}...", token.id.preview()),
                    "operation": token.operation.as_str(),
                    "dataset": token.dataset.to_string(),
                    "created_at": token.created_at,
                    "expires_at": token.expires_at,
                    "used": token.used,
                    "use_count": token.use_count,
                })
            })
            .collect();
        Ok(json!({ "tokens": redacted }))
    }

    async fn token_revoke(&self, caller: &Caller, params: Value) -> Result<Value, ReplicationError> {
        let p: TokenRevokeParams = parse(params)?;
        // Owner binding: a caller may only revoke their own live tokens.
        let owned = self
            .tokens
            .list(&caller.id)
            .await?
            .iter()
            .any(|token| token.id.as_str() == p.token_id);
        if !owned {
            return Err(ReplicationError::not_found("token not found or already revoked".to_string()));
        }
        let revoked = self.tokens.revoke(&p.token_id).await?;
        Ok(json!({ "revoked": revoked }))
    }

    async fn token_stats(&self) -> Result<Value, ReplicationError> {
        Ok(serde_json::to_value(self.tokens.stats().await?)?)
    }
}

#[derive(Debug, Deserialize)]
struct SendToFileParams {
    dataset: String,
    snapshot: String,
    output_file: String,
    #[serde(default)]
    recursive: bool,
    #[serde(default)]
    raw: Option<bool>,
    #[serde(default)]
    compressed: Option<bool>,
    #[serde(default)]
    compression: Option<String>,
    #[serde(default)]
    limit_mbps: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ReceiveFromFileParams {
    dataset: String,
    input_file: String,
    #[serde(default)]
    compression: Option<String>,
}

/// A progress channel whose records are consumed and dropped; file
/// transfers run inline, so nothing persists them.
fn drained_progress_channel() -> (
    tokio::sync::mpsc::Sender<snapstream_domain::TransferProgress>,
    tokio::task::JoinHandle<()>,
) {
    let (sender, mut receiver) = tokio::sync::mpsc::channel(16);
    let drain = tokio::spawn(async move { while receiver.recv().await.is_some() {} });
    (sender, drain)
}

fn parse<T: serde::de::DeserializeOwned>(params: Value) -> Result<T, ReplicationError> {
    // Absent parameters arrive as null; treat them as an empty bag so
    // defaulted shapes still deserialize.
    let params = if params.is_null() {
        Value::Object(serde_json::Map::new())
    } else {
        params
    };
    serde_json::from_value(params).map_err(|e| ReplicationError::invalid_request(format!("bad parameters: {}", e)))
}
