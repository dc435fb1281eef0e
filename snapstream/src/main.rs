// /////////////////////////////////////////////////////////////////////////////
// Snapstream
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Service entry point: parse arguments, load configuration, wire the
//! stores, engine, job manager and listeners, then run until a
//! termination signal arrives.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};

use snapstream::application::{DatasetAdmin, JobManager, ReplicationEngine, ReplicationJobHandler};
use snapstream::infrastructure::config::AppConfig;
use snapstream::infrastructure::persistence::{RedisJobStore, RedisStore, RedisTokenStore};
use snapstream::infrastructure::zfs::ZfsEndpoint;
use snapstream::presentation::stream::{self, EngineStreamOpener, StreamEndpoints, StreamServerContext};
use snapstream_bootstrap::{logger, platform, DaemonArgs, ShutdownController};
use snapstream_domain::entities::JOB_TYPE_REPLICATION;
use snapstream_domain::repositories::{JobStore, TokenStore};
use snapstream_domain::services::DatasetEndpoint;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = DaemonArgs::parse();
    logger::init(args.log_level.as_deref(), args.log_format);

    let mut config = AppConfig::load(args.config.as_deref()).context("loading configuration")?;
    if let Some(bind) = args.stream_tcp_bind {
        config.server.stream_tcp_bind = bind;
    }
    if let Some(path) = args.stream_unix_path {
        config.server.stream_unix_path = path;
    }
    if let Some(workers) = args.workers {
        config.jobs.workers = workers;
    }

    info!(
        redis = %config.redis.url,
        tcp = %config.server.stream_tcp_bind,
        unix = %config.server.stream_unix_path.display(),
        workers = config.jobs.workers,
        "starting snapstream"
    );

    let store = RedisStore::connect(&config.redis)
        .await
        .context("connecting to the persistence store")?;

    let tokens: Arc<dyn TokenStore> = Arc::new(RedisTokenStore::new(
        store.clone(),
        config.tokens.clone(),
        config.redis.key_prefix.clone(),
    ));
    let job_store: Arc<dyn JobStore> = Arc::new(RedisJobStore::new(store));
    let engine = Arc::new(ReplicationEngine::new(config.engine.clone()));
    let admin = Arc::new(DatasetAdmin::new());
    let local: Arc<dyn DatasetEndpoint> = Arc::new(ZfsEndpoint::local());

    let mut manager = JobManager::new(Arc::clone(&job_store), config.jobs.clone());
    manager.register_handler(
        JOB_TYPE_REPLICATION,
        Arc::new(ReplicationJobHandler::new(Arc::clone(&engine))),
    );
    let manager = Arc::new(manager);
    manager.start().await;

    let endpoints = StreamEndpoints {
        tcp_address: config.server.stream_tcp_bind.clone(),
        local_path: config.server.stream_unix_path.clone(),
    };
    let api = Arc::new(snapstream::presentation::ControlApi::new(
        Arc::clone(&manager),
        Arc::clone(&tokens),
        admin,
        Arc::clone(&engine),
        endpoints,
        config.tokens.clone(),
    ));
    // The control transport (out of scope here) dispatches through `api`;
    // keep it alive for the process lifetime.
    let _api = api;

    let shutdown = ShutdownController::new();
    let stream_ctx = Arc::new(StreamServerContext {
        tokens: Arc::clone(&tokens),
        opener: Arc::new(EngineStreamOpener {
            engine: Arc::clone(&engine),
            local,
        }),
    });

    let tcp_bind = config.server.stream_tcp_bind.clone();
    let tcp_ctx = Arc::clone(&stream_ctx);
    let tcp_token = shutdown.token();
    let tcp_listener = tokio::spawn(async move {
        if let Err(err) = stream::serve_tcp(&tcp_bind, tcp_ctx, tcp_token).await {
            error!(error = %err, "stream TCP listener failed");
        }
    });

    let unix_path = config.server.stream_unix_path.clone();
    let unix_ctx = Arc::clone(&stream_ctx);
    let unix_token = shutdown.token();
    let unix_listener = tokio::spawn(async move {
        if let Err(err) = stream::serve_unix(&unix_path, unix_ctx, unix_token).await {
            error!(error = %err, "stream Unix listener failed");
        }
    });

    platform::wait_for_termination().await.context("waiting for signals")?;

    info!("shutting down");
    shutdown.shutdown();
    manager.stop().await;
    let _ = tcp_listener.await;
    let _ = unix_listener.await;
    info!("bye");
    Ok(())
}
