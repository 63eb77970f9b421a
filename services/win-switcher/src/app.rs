//! win-switcher 应用装配：原生桥接、缓存、路由、监听与 portal 注册。

use anyhow::Context;
use axum::{
    Router,
    routing::{get, post},
};
use toolbox_common::{
    api::{cors_layer, health_handler},
    registration::{RegistrationOptions, spawn_registration},
    shutdown_signal,
};
use toolbox_protocol::ToolManifest;
use tracing::info;

use crate::{
    cache::TtlCache,
    config::Config,
    native::{
        NativeBridge,
        helper::{HelperTransport, SwiftHelper},
        thumbnail::{CaptureBackend, ScreenCapture, ThumbnailCapturer},
    },
    routes::{
        focus_by_pid_handler, focus_window_handler, list_windows_handler, thumbnail_handler,
    },
    state::AppState,
};

const TOOL_NAME: &str = "win-switcher";

pub(crate) fn build_router<H: HelperTransport, C: CaptureBackend>(
    state: AppState<H, C>,
) -> Router {
    Router::new()
        .route("/api/health", get(health_handler))
        .route("/api/windows", get(list_windows_handler::<H, C>))
        .route(
            "/api/windows/focus-by-pid",
            post(focus_by_pid_handler::<H, C>),
        )
        .route("/api/windows/{id}/thumb", get(thumbnail_handler::<H, C>))
        .route("/api/windows/{id}/focus", post(focus_window_handler::<H, C>))
        .layer(cors_layer())
        .with_state(state)
}

fn manifest(config: &Config) -> ToolManifest {
    ToolManifest {
        name: TOOL_NAME.to_string(),
        display_name: "Window Switcher".to_string(),
        description: "查看并快速跳转到本机所有打开的窗口".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        url: config.public_url.clone(),
        health: "/api/health".to_string(),
        icon: None,
        category: None,
        process_manager_name: Some(TOOL_NAME.to_string()),
    }
}

/// win-switcher 入口：监听 HTTP，并在后台向 portal 注册。
pub(crate) async fn run(config: Config) -> anyhow::Result<()> {
    let state = AppState::new(
        NativeBridge::new(SwiftHelper::new(
            config.helper_command.clone(),
            config.helper_timeout,
        )),
        ThumbnailCapturer::new(
            ScreenCapture::new(config.capture_timeout),
            config.thumb_dir.clone(),
            config.thumb_ttl,
            config.thumb_max_parallel,
        ),
        TtlCache::new(config.window_cache_ttl),
        TtlCache::new(config.permission_cache_ttl),
    );

    let listener = tokio::net::TcpListener::bind(&config.addr)
        .await
        .with_context(|| format!("bind win-switcher listener on {}", config.addr))?;
    info!("win-switcher listening on {}", config.addr);

    let registration = spawn_registration(RegistrationOptions::new(
        config.portal_url.clone(),
        manifest(&config),
    ))?;
    let served = axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await;
    registration.shutdown().await;
    served?;
    info!("win-switcher stopped");
    Ok(())
}
