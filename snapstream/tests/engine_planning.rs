// /////////////////////////////////////////////////////////////////////////////
// Snapstream
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Planner tests over scripted fake endpoints: resume precedence,
//! incremental negotiation, the up-to-date short-circuit, the full-send
//! policy, automatic snapshot creation, raw derivation and the
//! compression decision - all without touching real pools.

mod common;

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use snapstream::application::{ReplicationContext, ReplicationEngine};
use snapstream::infrastructure::config::EngineConfig;
use snapstream_domain::services::DatasetEndpoint;
use snapstream_domain::{
    CommandTarget, CompressionAlgorithm, CompressionChoice, DatasetName, PlanOutcome, RemoteHost, ReplicationError,
    ReplicationRequest, SnapshotRef, StreamSpec, ToolVersion,
};

/// Scripted endpoint: answers from fixed tables, records snapshot
/// creations.
#[derive(Default)]
struct FakeEndpoint {
    remote: Option<&'static str>,
    snapshots: Mutex<HashMap<String, Vec<String>>>,
    properties: HashMap<(String, String), String>,
    resume_tokens: HashMap<String, String>,
    version: Option<ToolVersion>,
    programs: HashSet<String>,
}

impl FakeEndpoint {
    fn with_snapshots(mut self, dataset: &str, snapshots: &[&str]) -> Self {
        self.snapshots
            .get_mut()
            .unwrap()
            .insert(dataset.to_string(), snapshots.iter().map(|s| s.to_string()).collect());
        self
    }

    fn with_property(mut self, dataset: &str, property: &str, value: &str) -> Self {
        self.properties
            .insert((dataset.to_string(), property.to_string()), value.to_string());
        self
    }

    fn with_resume_token(mut self, dataset: &str, token: &str) -> Self {
        self.resume_tokens.insert(dataset.to_string(), token.to_string());
        self
    }

    fn with_version(mut self, major: u32, minor: u32) -> Self {
        self.version = Some(ToolVersion::new(major, minor));
        self
    }

    fn with_program(mut self, program: &str) -> Self {
        self.programs.insert(program.to_string());
        self
    }

}

#[async_trait]
impl DatasetEndpoint for FakeEndpoint {
    fn target(&self) -> CommandTarget {
        match self.remote {
            Some(host) => CommandTarget::Remote(RemoteHost::new(host).unwrap()),
            None => CommandTarget::Local,
        }
    }

    async fn dataset_exists(&self, dataset: &DatasetName) -> Result<bool, ReplicationError> {
        Ok(self.snapshots.lock().unwrap().contains_key(dataset.as_str()))
    }

    async fn snapshots(&self, dataset: &DatasetName) -> Result<Vec<String>, ReplicationError> {
        Ok(self
            .snapshots
            .lock()
            .unwrap()
            .get(dataset.as_str())
            .cloned()
            .unwrap_or_default())
    }

    async fn property(&self, dataset: &DatasetName, property: &str) -> Result<Option<String>, ReplicationError> {
        Ok(self
            .properties
            .get(&(dataset.to_string(), property.to_string()))
            .cloned())
    }

    async fn resume_token(&self, dataset: &DatasetName) -> Result<Option<String>, ReplicationError> {
        Ok(self.resume_tokens.get(dataset.as_str()).cloned())
    }

    async fn create_snapshot(&self, snapshot: &SnapshotRef, _recursive: bool) -> Result<(), ReplicationError> {
        self.snapshots
            .lock()
            .unwrap()
            .entry(snapshot.dataset().to_string())
            .or_default()
            .push(snapshot.name().to_string());
        Ok(())
    }

    async fn hold(&self, _snapshot: &SnapshotRef, _tag: &str, _recursive: bool) -> Result<(), ReplicationError> {
        Ok(())
    }

    async fn release(&self, _snapshot: &SnapshotRef, _tag: &str, _recursive: bool) -> Result<(), ReplicationError> {
        Ok(())
    }

    async fn holds(&self, _snapshot: &SnapshotRef) -> Result<Vec<String>, ReplicationError> {
        Ok(Vec::new())
    }

    async fn tool_version(&self) -> Result<Option<ToolVersion>, ReplicationError> {
        Ok(self.version)
    }

    async fn probe_program(&self, program: &str) -> Result<bool, ReplicationError> {
        Ok(self.programs.contains(program))
    }
}

fn request(value: serde_json::Value) -> ReplicationRequest {
    serde_json::from_value(value).unwrap()
}

fn context(source: FakeEndpoint, destination: FakeEndpoint, req: ReplicationRequest) -> ReplicationContext {
    let (source_dataset, pinned_snapshot) = match req.source.split_once('@') {
        Some((dataset, snapshot)) => (DatasetName::new(dataset).unwrap(), Some(snapshot.to_string())),
        None => (DatasetName::new(req.source.as_str()).unwrap(), None),
    };
    ReplicationContext {
        source: Arc::new(source),
        destination: Arc::new(destination),
        source_dataset,
        pinned_snapshot,
        destination_dataset: DatasetName::new(req.destination.as_str()).unwrap(),
        request: req,
    }
}

fn engine() -> ReplicationEngine {
    ReplicationEngine::new(EngineConfig::default())
}

fn transfer(outcome: PlanOutcome) -> snapstream_domain::TransferPlan {
    match outcome {
        PlanOutcome::Transfer(plan) => plan,
        PlanOutcome::UpToDate { snapshot } => panic!("unexpected up-to-date for {}", snapshot),
    }
}

#[tokio::test]
async fn test_up_to_date_short_circuit() {
    let ctx = context(
        FakeEndpoint::default().with_snapshots("tank/src", &["s1", "s2"]),
        FakeEndpoint::default().with_snapshots("tank/dst", &["s1", "s2"]),
        request(serde_json::json!({"source": "tank/src", "destination": "tank/dst"})),
    );
    let outcome = engine().plan(&ctx, false).await.unwrap();
    assert_eq!(
        outcome,
        PlanOutcome::UpToDate {
            snapshot: SnapshotRef::parse("tank/src@s2").unwrap()
        }
    );
}

#[tokio::test]
async fn test_destination_extra_snapshot_still_up_to_date() {
    // Destination newer than source: reported up to date because the
    // newest common snapshot equals the source's newest.
    let ctx = context(
        FakeEndpoint::default().with_snapshots("tank/src", &["s1", "s2"]),
        FakeEndpoint::default().with_snapshots("tank/dst", &["s1", "s2", "x9"]),
        request(serde_json::json!({"source": "tank/src", "destination": "tank/dst"})),
    );
    let outcome = engine().plan(&ctx, false).await.unwrap();
    assert!(matches!(outcome, PlanOutcome::UpToDate { .. }));
}

#[tokio::test]
async fn test_incremental_negotiation() {
    let ctx = context(
        FakeEndpoint::default().with_snapshots("tank/src", &["s1", "s2", "s3"]),
        FakeEndpoint::default().with_snapshots("tank/dst", &["s1", "s2"]),
        request(serde_json::json!({"source": "tank/src", "destination": "tank/dst"})),
    );
    let plan = transfer(engine().plan(&ctx, false).await.unwrap());
    match plan.stream {
        StreamSpec::Incremental {
            base,
            target,
            intermediates,
        } => {
            assert_eq!(base.to_string(), "tank/src@s2");
            assert_eq!(target.to_string(), "tank/src@s3");
            assert!(intermediates);
        }
        other => panic!("expected incremental, got {:?}", other),
    }
}

#[tokio::test]
async fn test_resume_token_wins_over_negotiation() {
    let ctx = context(
        FakeEndpoint::default().with_snapshots("tank/src", &["s1", "s2", "s3"]),
        FakeEndpoint::default()
            .with_snapshots("tank/dst", &["s1"])
            .with_resume_token("tank/dst", "1-deadbeef-cafe"),
        request(serde_json::json!({"source": "tank/src", "destination": "tank/dst"})),
    );
    let plan = transfer(engine().plan(&ctx, false).await.unwrap());
    assert_eq!(
        plan.stream,
        StreamSpec::Resume {
            token: "1-deadbeef-cafe".to_string()
        }
    );

    // The renegotiated retry skips the resume check.
    let plan = transfer(engine().plan(&ctx, true).await.unwrap());
    assert!(matches!(plan.stream, StreamSpec::Incremental { .. }));
}

#[tokio::test]
async fn test_missing_destination_full_send() {
    let ctx = context(
        FakeEndpoint::default().with_snapshots("tank/src", &["s1"]),
        FakeEndpoint::default(),
        request(serde_json::json!({"source": "tank/src", "destination": "tank/dst"})),
    );
    let plan = transfer(engine().plan(&ctx, false).await.unwrap());
    assert_eq!(
        plan.stream,
        StreamSpec::Full {
            snapshot: SnapshotRef::parse("tank/src@s1").unwrap()
        }
    );
}

#[tokio::test]
async fn test_full_send_needs_permission() {
    let ctx = context(
        FakeEndpoint::default().with_snapshots("tank/src", &["s3"]),
        FakeEndpoint::default().with_snapshots("tank/dst", &["s1", "s2"]),
        request(serde_json::json!({
            "source": "tank/src",
            "destination": "tank/dst",
            "allow_full": false,
        })),
    );
    let err = engine().plan(&ctx, false).await.unwrap_err();
    assert_eq!(err.kind(), "no_common_snapshot");
}

#[tokio::test]
async fn test_snapshot_created_when_source_has_none() {
    let ctx = context(
        FakeEndpoint::default().with_snapshots("tank/src", &[]),
        FakeEndpoint::default(),
        request(serde_json::json!({"source": "tank/src", "destination": "tank/dst"})),
    );
    let engine = engine();
    let plan = transfer(engine.plan(&ctx, false).await.unwrap());

    let source = &ctx.source;
    let created = match plan.stream {
        StreamSpec::Full { snapshot } => snapshot,
        other => panic!("expected full send, got {:?}", other),
    };
    assert!(created.name().starts_with("migrate-"));
    // The fake actually recorded the creation.
    let names = source.snapshots(&ctx.source_dataset).await.unwrap();
    assert_eq!(names.len(), 1);
    assert!(names[0].starts_with("migrate-"));
}

#[tokio::test]
async fn test_no_snapshot_and_no_creation_fails() {
    let ctx = context(
        FakeEndpoint::default().with_snapshots("tank/src", &[]),
        FakeEndpoint::default(),
        request(serde_json::json!({
            "source": "tank/src",
            "destination": "tank/dst",
            "take_snapshot": false,
        })),
    );
    let err = engine().plan(&ctx, false).await.unwrap_err();
    assert_eq!(err.kind(), "no_common_snapshot");
}

#[tokio::test]
async fn test_pinned_snapshot_bounds_negotiation() {
    let ctx = context(
        FakeEndpoint::default().with_snapshots("tank/src", &["s1", "s2", "s3"]),
        FakeEndpoint::default().with_snapshots("tank/dst", &["s1"]),
        request(serde_json::json!({"source": "tank/src@s2", "destination": "tank/dst"})),
    );
    let plan = transfer(engine().plan(&ctx, false).await.unwrap());
    match plan.stream {
        StreamSpec::Incremental { base, target, .. } => {
            assert_eq!(base.name(), "s1");
            assert_eq!(target.name(), "s2");
        }
        other => panic!("expected incremental, got {:?}", other),
    }
}

#[tokio::test]
async fn test_missing_pinned_snapshot_is_not_found() {
    let ctx = context(
        FakeEndpoint::default().with_snapshots("tank/src", &["s1"]),
        FakeEndpoint::default(),
        request(serde_json::json!({"source": "tank/src@nope", "destination": "tank/dst"})),
    );
    let err = engine().plan(&ctx, false).await.unwrap_err();
    assert_eq!(err.kind(), "not_found");
}

#[tokio::test]
async fn test_raw_derived_from_encryption_property() {
    let ctx = context(
        FakeEndpoint::default()
            .with_snapshots("tank/src", &["s1"])
            .with_property("tank/src", "encryption", "aes-256-gcm"),
        FakeEndpoint::default(),
        request(serde_json::json!({"source": "tank/src", "destination": "tank/dst"})),
    );
    let plan = transfer(engine().plan(&ctx, false).await.unwrap());
    assert!(plan.raw);
}

#[tokio::test]
async fn test_native_compression_selected_on_modern_pair() {
    let ctx = context(
        FakeEndpoint::default()
            .with_snapshots("tank/src", &["s1"])
            .with_property("tank/src", "compression", "lz4")
            .with_version(2, 1),
        FakeEndpoint::default().with_version(2, 0),
        request(serde_json::json!({"source": "tank/src", "destination": "tank/dst"})),
    );
    let plan = transfer(engine().plan(&ctx, false).await.unwrap());
    assert_eq!(plan.compression, CompressionChoice::Native);
}

#[tokio::test]
async fn test_probed_external_compression_across_hosts() {
    let mut destination = FakeEndpoint::default()
        .with_snapshots("tank/dst", &[])
        .with_version(0, 8)
        .with_program("zstd");
    destination.remote = Some("root@peer");

    let ctx = context(
        FakeEndpoint::default()
            .with_snapshots("tank/src", &["s1"])
            .with_property("tank/src", "compression", "lz4")
            .with_version(0, 8)
            .with_program("zstd"),
        destination,
        request(serde_json::json!({
            "source": "tank/src",
            "destination": "tank/dst",
            "remote": "root@peer",
        })),
    );
    let plan = transfer(engine().plan(&ctx, false).await.unwrap());
    assert_eq!(plan.compression, CompressionChoice::External(CompressionAlgorithm::Zstd));
}

#[tokio::test]
async fn test_explicit_compression_honoured_when_native_unavailable() {
    let ctx = context(
        FakeEndpoint::default()
            .with_snapshots("tank/src", &["s1"])
            .with_version(0, 8),
        FakeEndpoint::default().with_version(0, 8),
        request(serde_json::json!({
            "source": "tank/src",
            "destination": "tank/dst",
            "compression": "gzip",
        })),
    );
    let plan = transfer(engine().plan(&ctx, false).await.unwrap());
    assert_eq!(plan.compression, CompressionChoice::External(CompressionAlgorithm::Gzip));
}

#[tokio::test]
async fn test_unknown_compression_rejected() {
    let ctx = context(
        FakeEndpoint::default().with_snapshots("tank/src", &["s1"]),
        FakeEndpoint::default(),
        request(serde_json::json!({
            "source": "tank/src",
            "destination": "tank/dst",
            "compression": "lzma9000",
        })),
    );
    let err = engine().plan(&ctx, false).await.unwrap_err();
    assert_eq!(err.kind(), "invalid_request");
}

#[tokio::test]
async fn test_remote_to_remote_rejected() {
    let mut source = FakeEndpoint::default().with_snapshots("tank/src", &["s1"]);
    source.remote = Some("a");
    let mut destination = FakeEndpoint::default();
    destination.remote = Some("b");

    let ctx = context(
        source,
        destination,
        request(serde_json::json!({"source": "tank/src", "destination": "tank/dst"})),
    );
    let err = engine().plan(&ctx, false).await.unwrap_err();
    assert_eq!(err.kind(), "invalid_request");
}

#[tokio::test]
async fn test_missing_source_dataset_is_not_found() {
    let ctx = context(
        FakeEndpoint::default(),
        FakeEndpoint::default(),
        request(serde_json::json!({"source": "tank/ghost", "destination": "tank/dst"})),
    );
    let err = engine().plan(&ctx, false).await.unwrap_err();
    assert_eq!(err.kind(), "not_found");
}
