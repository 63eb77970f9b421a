//! portal 应用装配：存储、发现、后台循环、路由与监听。

use std::{fs, sync::Arc};

use anyhow::Context;
use axum::{
    Router,
    routing::{get, post, put},
};
use chrono::Utc;
use toolbox_common::{
    api::{cors_layer, health_handler},
    shutdown_signal,
};
use tracing::{info, warn};

use crate::{
    config::Config,
    registry::{
        discovery::discover_once,
        health_probe::{probe_client, spawn_health_probe},
        heartbeat::spawn_heartbeat_sweep,
        store::{SqliteToolStore, ToolStore},
    },
    routes::{
        delete_tool_handler, get_tool_handler, heartbeat_handler, list_tools_handler,
        register_handler,
    },
    state::{AppState, Pm2Settings},
};

/// 注册表路由。
pub(crate) fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health_handler))
        .route("/api/tools", get(list_tools_handler))
        .route("/api/tools/register", post(register_handler))
        .route(
            "/api/tools/{name}",
            get(get_tool_handler).delete(delete_tool_handler),
        )
        .route("/api/tools/{name}/heartbeat", put(heartbeat_handler))
        .layer(cors_layer())
        .with_state(state)
}

/// portal 入口：打开存储，执行一次发现，启动心跳扫描与健康探测，然后监听 HTTP。
pub(crate) async fn run(config: Config) -> anyhow::Result<()> {
    if let Some(parent) = config.db_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create database dir: {}", parent.display()))?;
    }
    let store: Arc<dyn ToolStore> = Arc::new(
        SqliteToolStore::open(&config.db_path)
            .with_context(|| format!("open tool store: {}", config.db_path.display()))?,
    );

    match discover_once(store.as_ref(), &config.packages_dir, Utc::now()) {
        Ok(report) => info!(
            registered = report.registered,
            skipped = report.skipped,
            "local tool discovery finished"
        ),
        Err(err) => warn!("local tool discovery failed: {err:#}"),
    }

    let sweep = spawn_heartbeat_sweep(
        store.clone(),
        config.heartbeat_sweep_interval,
        config.heartbeat_timeout,
    );
    let probe = spawn_health_probe(
        store.clone(),
        probe_client(config.health_timeout)?,
        config.health_grace,
        config.health_interval,
    );

    let state = AppState::new(
        store,
        Pm2Settings {
            bin: config.pm2_bin.clone(),
            timeout: config.pm2_timeout,
        },
    );
    let listener = tokio::net::TcpListener::bind(&config.addr)
        .await
        .with_context(|| format!("bind portal listener on {}", config.addr))?;
    info!("portal listening on {}", config.addr);
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweep.abort();
    probe.abort();
    info!("portal stopped");
    Ok(())
}
