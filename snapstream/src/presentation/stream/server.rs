// /////////////////////////////////////////////////////////////////////////////
// Snapstream
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Stream Listeners
//!
//! Two listeners with the identical per-connection protocol: TCP for
//! network peers and a Unix socket for intra-host privileged callers.
//! Each accepted connection runs on its own task; the only state shared
//! between connections is the handle bundle in
//! [`StreamServerContext`](super::connection::StreamServerContext).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::net::{TcpListener, UnixListener};
use tracing::{info, warn};

use snapstream_bootstrap::ShutdownToken;
use snapstream_domain::ReplicationError;

use super::connection::{handle_connection, StreamServerContext};

/// Where the stream listeners ended up bound; reported by the control
/// API's `stream_endpoints`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct StreamEndpoints {
    pub tcp_address: String,
    pub local_path: PathBuf,
}

/// Binds the TCP listener and serves until shutdown.
pub async fn serve_tcp(
    bind: &str,
    ctx: Arc<StreamServerContext>,
    shutdown: ShutdownToken,
) -> Result<(), ReplicationError> {
    let listener = TcpListener::bind(bind)
        .await
        .map_err(|e| ReplicationError::Io(format!("cannot bind stream TCP {}: {}", bind, e)))?;
    info!(bind, "stream TCP listener up");

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((socket, peer)) => {
                    let ctx = Arc::clone(&ctx);
                    tokio::spawn(async move {
                        handle_connection(socket, Some(peer.ip().to_string()), ctx).await;
                    });
                }
                Err(err) => warn!(error = %err, "TCP accept failed"),
            },
        }
    }
    info!("stream TCP listener stopped");
    Ok(())
}

/// Binds the Unix listener (replacing a stale socket file) and serves
/// until shutdown.
pub async fn serve_unix(
    path: &Path,
    ctx: Arc<StreamServerContext>,
    shutdown: ShutdownToken,
) -> Result<(), ReplicationError> {
    if path.exists() {
        std::fs::remove_file(path)
            .map_err(|e| ReplicationError::Io(format!("cannot remove stale socket {}: {}", path.display(), e)))?;
    }
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ReplicationError::Io(format!("cannot create {}: {}", parent.display(), e)))?;
        }
    }

    let listener = UnixListener::bind(path)
        .map_err(|e| ReplicationError::Io(format!("cannot bind stream socket {}: {}", path.display(), e)))?;
    info!(path = %path.display(), "stream Unix listener up");

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((socket, _address)) => {
                    let ctx = Arc::clone(&ctx);
                    tokio::spawn(async move {
                        // Unix peers carry no address to bind tokens to.
                        handle_connection(socket, None, ctx).await;
                    });
                }
                Err(err) => warn!(error = %err, "Unix accept failed"),
            },
        }
    }
    let _ = std::fs::remove_file(path);
    info!("stream Unix listener stopped");
    Ok(())
}
