//! 工具箱服务公共能力：日志、配置、HTTP 响应约定、CLI 分发与 portal 注册客户端。

pub mod api;
pub mod cli;
pub mod config;
pub mod logging;
pub mod registration;

/// 等待 Ctrl-C，用于 `axum::serve` 的优雅退出。
pub async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!("listen for ctrl-c failed: {err}");
        std::future::pending::<()>().await;
    }
}
