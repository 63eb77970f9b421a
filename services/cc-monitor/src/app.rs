//! cc-monitor 应用装配：会话表、进程扫描、路由、监听与 portal 注册。

use std::sync::Arc;

use anyhow::Context;
use axum::{
    Router,
    routing::{get, post},
};
use tokio::sync::RwLock;
use toolbox_common::{
    api::cors_layer,
    registration::{RegistrationOptions, spawn_registration},
    shutdown_signal,
};
use toolbox_protocol::ToolManifest;
use tracing::info;

use crate::{
    collector::SessionManager,
    config::Config,
    routes::{
        get_session_handler, health_handler, hooks_status_handler, ingest_event_handler,
        list_sessions_handler,
    },
    scanner::spawn_process_scanner,
    state::{AppState, HookProbe},
};

const TOOL_NAME: &str = "cc-monitor";

pub(crate) fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health_handler))
        .route("/api/events", post(ingest_event_handler))
        .route("/api/sessions", get(list_sessions_handler))
        .route("/api/sessions/{session_id}", get(get_session_handler))
        .route("/api/hooks/status", get(hooks_status_handler))
        .layer(cors_layer())
        .with_state(state)
}

fn manifest(config: &Config) -> ToolManifest {
    ToolManifest {
        name: TOOL_NAME.to_string(),
        display_name: "Claude Code Monitor".to_string(),
        description: "监控本地所有 Claude Code 实例的运行状态".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        url: config.public_url.clone(),
        health: "/api/health".to_string(),
        icon: None,
        category: None,
        process_manager_name: Some(TOOL_NAME.to_string()),
    }
}

/// cc-monitor 入口：启动进程扫描与 HTTP 监听，并在后台向 portal 注册。
pub(crate) async fn run(config: Config) -> anyhow::Result<()> {
    let sessions = Arc::new(RwLock::new(SessionManager::new()));
    let scanner = spawn_process_scanner(sessions.clone(), config.scan_interval, config.ps_timeout);

    let state = AppState::new(
        sessions,
        HookProbe {
            settings_path: config.settings_path.clone(),
            monitor_url: config.monitor_url.clone(),
        },
    );
    let listener = tokio::net::TcpListener::bind(&config.addr)
        .await
        .with_context(|| format!("bind cc-monitor listener on {}", config.addr))?;
    info!("cc-monitor listening on {}", config.addr);

    let registration = spawn_registration(RegistrationOptions::new(
        config.portal_url.clone(),
        manifest(&config),
    ))?;
    let served = axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await;
    registration.shutdown().await;
    scanner.abort();
    served?;
    info!("cc-monitor stopped");
    Ok(())
}
