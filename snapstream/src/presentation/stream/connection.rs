// /////////////////////////////////////////////////////////////////////////////
// Snapstream
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Authenticated Stream Connections
//!
//! The per-connection protocol behind both listeners:
//!
//! 1. read the length-prefixed token id;
//! 2. validate it against the token store with the peer's address; reply
//!    with a JSON failure frame and close on any miss;
//! 3. latch the token used; a loser of the single-use race is rejected the
//!    same way;
//! 4. reply `{"status": "started", ...}` describing the operation;
//! 5. send: stream the pipeline's stdout as length-prefixed chunks,
//!    zero-terminated, with one optional trailing error frame;
//!    receive: copy socket bytes into the pipeline's stdin until the
//!    client half-closes, then close stdin and wait.
//!
//! Validation failures are reported to the client with a generic reason;
//! which check fired is visible only in the server's own logs and
//! counters.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

use snapstream_domain::services::DatasetEndpoint;
use snapstream_domain::{CapabilityToken, ReplicationError, StreamOperation, TokenStore};

use crate::application::ReplicationEngine;
use crate::infrastructure::process::Pipeline;

use super::frames;

/// Reason string shown to clients for every validation miss; deliberately
/// uniform so nothing about the token's state leaks.
const REJECTION_REASON: &str = "invalid or expired token";

/// The seam between the socket protocol and the replication engine: given
/// an authorized token, spawn the pipeline behind it. Returns the argument
/// vector (echoed in the `started` reply) alongside the live pipeline.
#[async_trait]
pub trait StreamOpener: Send + Sync {
    async fn open_send(&self, token: &CapabilityToken) -> Result<(Vec<String>, Pipeline), ReplicationError>;
    async fn open_receive(&self, token: &CapabilityToken) -> Result<(Vec<String>, Pipeline), ReplicationError>;
}

/// Production opener: the replication engine over the local endpoint.
pub struct EngineStreamOpener {
    pub engine: Arc<ReplicationEngine>,
    pub local: Arc<dyn DatasetEndpoint>,
}

#[async_trait]
impl StreamOpener for EngineStreamOpener {
    async fn open_send(&self, token: &CapabilityToken) -> Result<(Vec<String>, Pipeline), ReplicationError> {
        self.engine.open_send_stream(token, self.local.as_ref()).await
    }

    async fn open_receive(&self, token: &CapabilityToken) -> Result<(Vec<String>, Pipeline), ReplicationError> {
        self.engine.open_receive_stream(token).await
    }
}

/// Shared dependencies of every connection.
pub struct StreamServerContext {
    pub tokens: Arc<dyn TokenStore>,
    pub opener: Arc<dyn StreamOpener>,
}

/// Drives one accepted connection to completion. Generic over the socket
/// so the Unix and TCP listeners (and tests) share it.
pub async fn handle_connection<S>(mut socket: S, peer: Option<String>, ctx: Arc<StreamServerContext>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let peer_label = peer.clone().unwrap_or_else(|| "local-socket".to_string());

    let token_id = match frames::read_token(&mut socket).await {
        Ok(token_id) => token_id,
        Err(err) => {
            // Protocol violation: close without any further bytes.
            debug!(peer = %peer_label, error = %err, "handshake violation");
            return;
        }
    };

    let preview = token_id.get(..8).unwrap_or(token_id.as_str()).to_string();
    info!(peer = %peer_label, token = %preview, "authenticating stream token");

    let token = match ctx.tokens.validate(&token_id, peer.as_deref()).await {
        Ok(Some(token)) => token,
        Ok(None) => {
            let _ = frames::write_failure(&mut socket, REJECTION_REASON).await;
            return;
        }
        Err(err) => {
            // Persistence trouble fails closed, indistinguishably.
            warn!(peer = %peer_label, error = %err, "token validation unavailable");
            let _ = frames::write_failure(&mut socket, REJECTION_REASON).await;
            return;
        }
    };

    match ctx.tokens.mark_used(&token_id, peer.as_deref()).await {
        Ok(true) => {}
        Ok(false) => {
            info!(peer = %peer_label, token = %preview, "rejecting reused token");
            let _ = frames::write_failure(&mut socket, REJECTION_REASON).await;
            return;
        }
        Err(err) => {
            warn!(peer = %peer_label, error = %err, "mark_used unavailable");
            let _ = frames::write_failure(&mut socket, REJECTION_REASON).await;
            return;
        }
    }

    info!(
        peer = %peer_label,
        token = %preview,
        operation = token.operation.as_str(),
        dataset = %token.dataset,
        "stream authorized"
    );

    let result = match token.operation {
        StreamOperation::Send => serve_send(&mut socket, &token, &ctx).await,
        StreamOperation::Receive => serve_receive(&mut socket, &token, &ctx).await,
    };
    if let Err(err) = result {
        warn!(peer = %peer_label, token = %preview, error = %err, "stream ended with error");
    }
}

async fn serve_send<S>(
    socket: &mut S,
    token: &CapabilityToken,
    ctx: &StreamServerContext,
) -> Result<(), ReplicationError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (argv, pipeline) = match ctx.opener.open_send(token).await {
        Ok(spawned) => spawned,
        Err(err) => {
            frames::write_failure(socket, &err.to_string()).await?;
            return Err(err);
        }
    };

    frames::write_json(
        socket,
        &json!({
            "status": "started",
            "operation": "send",
            "dataset": token.dataset.to_string(),
            "snapshot": token.snapshot.clone(),
            "command": argv.join(" "),
        }),
    )
    .await?;

    stream_pipeline_to_socket(socket, pipeline).await
}

/// Streams pipeline stdout as chunk frames, then settles the exit status.
async fn stream_pipeline_to_socket<S>(socket: &mut S, mut pipeline: Pipeline) -> Result<(), ReplicationError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut stdout = pipeline
        .take_stdout()
        .ok_or_else(|| ReplicationError::internal("send pipeline has no stdout"))?;

    let mut buffer = vec![0u8; frames::STREAM_CHUNK_SIZE];
    let mut total: u64 = 0;
    let copy_result: Result<(), ReplicationError> = loop {
        match stdout.read(&mut buffer).await {
            Ok(0) => break Ok(()),
            Ok(n) => {
                total += n as u64;
                if let Err(err) = frames::write_chunk(socket, &buffer[..n]).await {
                    break Err(err);
                }
            }
            Err(err) => break Err(ReplicationError::Io(err.to_string())),
        }
    };
    drop(stdout);

    let status = pipeline.wait().await?;
    copy_result?;

    frames::write_chunk_terminator(socket).await?;
    if status.success() {
        info!(bytes = total, "send stream completed");
        Ok(())
    } else {
        let error = status.to_error();
        frames::write_trailing_error(socket, &error.to_string()).await?;
        Err(error)
    }
}

async fn serve_receive<S>(
    socket: &mut S,
    token: &CapabilityToken,
    ctx: &StreamServerContext,
) -> Result<(), ReplicationError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (argv, mut pipeline) = match ctx.opener.open_receive(token).await {
        Ok(spawned) => spawned,
        Err(err) => {
            frames::write_failure(socket, &err.to_string()).await?;
            return Err(err);
        }
    };

    frames::write_json(
        socket,
        &json!({
            "status": "started",
            "operation": "receive",
            "dataset": token.dataset.to_string(),
            "command": argv.join(" "),
        }),
    )
    .await?;

    let mut stdin = pipeline
        .take_stdin()
        .ok_or_else(|| ReplicationError::internal("receive pipeline has no stdin"))?;

    let mut buffer = vec![0u8; frames::STREAM_CHUNK_SIZE];
    let mut total: u64 = 0;
    loop {
        match socket.read(&mut buffer).await {
            // Client half-closed its write side: end of stream.
            Ok(0) => break,
            Ok(n) => {
                total += n as u64;
                if let Err(err) = stdin.write_all(&buffer[..n]).await {
                    // The receive died underneath us; its stderr tells why.
                    warn!(bytes = total, error = %err, "receive pipeline closed early");
                    break;
                }
            }
            Err(err) => {
                warn!(bytes = total, error = %err, "socket read failed during receive");
                break;
            }
        }
    }
    // Closing stdin delivers EOF to the receive.
    drop(stdin);

    let status = pipeline.wait().await?;
    if status.success() {
        info!(bytes = total, dataset = %token.dataset, "receive stream completed");
        Ok(())
    } else {
        Err(status.to_error())
    }
}
