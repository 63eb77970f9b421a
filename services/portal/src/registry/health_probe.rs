//! 主动健康探测：对每个工具请求 `<url><health>`，只写 `healthStatus`。

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use chrono::Utc;
use futures_util::future::join_all;
use reqwest::Client;
use tokio::{task::JoinHandle, time::MissedTickBehavior};
use toolbox_protocol::{HealthStatus, ToolRecord};
use tracing::{debug, warn};

use super::store::ToolStore;

/// 构造探测用 HTTP 客户端；超时即视为 unhealthy。
pub fn probe_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .no_proxy()
        .build()
        .context("build health probe client failed")
}

/// 拼接探测地址：去掉 url 末尾的 `/` 再接健康路径。
pub fn health_endpoint(url: &str, health_path: &str) -> String {
    format!("{}{}", url.trim_end_matches('/'), health_path)
}

/// 探测全部工具一次，返回探测数量。
pub async fn probe_once(store: &dyn ToolStore, client: &Client) -> Result<usize> {
    let tools = store.list().context("load tools for health probe failed")?;
    let results = join_all(tools.iter().map(|tool| probe_tool(client, tool))).await;
    let now = Utc::now();
    for (tool, health) in tools.iter().zip(results) {
        debug!(tool = %tool.name, health = health.as_str(), "health probe finished");
        if let Err(err) = store.set_health_status(&tool.name, health, now) {
            warn!("store health status for {} failed: {err}", tool.name);
        }
    }
    Ok(tools.len())
}

async fn probe_tool(client: &Client, tool: &ToolRecord) -> HealthStatus {
    let endpoint = health_endpoint(&tool.url, &tool.health);
    match client.get(&endpoint).send().await {
        Ok(resp) if resp.status().is_success() => HealthStatus::Healthy,
        Ok(resp) => {
            debug!(tool = %tool.name, status = %resp.status(), "health endpoint answered non-2xx");
            HealthStatus::Unhealthy
        }
        Err(err) => {
            debug!(tool = %tool.name, "health request to {endpoint} failed: {err}");
            HealthStatus::Unhealthy
        }
    }
}

/// 启动周期探测：宽限 `grace` 后首次探测，之后每 `interval` 一次。
pub fn spawn_health_probe(
    store: Arc<dyn ToolStore>,
    client: Client,
    grace: Duration,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let start = tokio::time::Instant::now() + grace;
        let mut ticker = tokio::time::interval_at(start, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            if let Err(err) = probe_once(store.as_ref(), &client).await {
                warn!("health probe failed: {err:#}");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::{Router, http::StatusCode, routing::get};
    use chrono::Utc;
    use tokio::net::TcpListener;
    use toolbox_protocol::{HealthStatus, ToolManifest, ToolStatus};

    use super::{health_endpoint, probe_client, probe_once};
    use crate::registry::store::{SqliteToolStore, ToolStore};

    async fn spawn_tool_server() -> String {
        let app = Router::new()
            .route("/api/health", get(|| async { StatusCode::OK }))
            .route("/broken/health", get(|| async { StatusCode::SERVICE_UNAVAILABLE }));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        format!("http://{addr}/")
    }

    fn manifest(name: &str, url: &str, health: &str) -> ToolManifest {
        ToolManifest {
            name: name.to_string(),
            url: url.to_string(),
            health: health.to_string(),
            ..ToolManifest::default()
        }
    }

    #[test]
    fn endpoint_joins_url_and_health_path() {
        assert_eq!(
            health_endpoint("http://localhost:3002/", "/api/health"),
            "http://localhost:3002/api/health"
        );
        assert_eq!(
            health_endpoint("http://localhost:3002", "/healthz"),
            "http://localhost:3002/healthz"
        );
    }

    #[tokio::test]
    async fn probe_writes_health_and_leaves_status() {
        let base = spawn_tool_server().await;
        let dead = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            drop(listener);
            format!("http://{addr}")
        };

        let store = SqliteToolStore::open_in_memory().unwrap();
        let now = Utc::now();
        store
            .upsert_remote(&manifest("good", &base, "/api/health"), now)
            .unwrap();
        store
            .upsert_local(&manifest("sick", &base, "/broken/health"), now)
            .unwrap();
        store
            .upsert_remote(&manifest("gone", &dead, "/api/health"), now)
            .unwrap();

        let client = probe_client(Duration::from_secs(2)).unwrap();
        assert_eq!(probe_once(&store, &client).await.unwrap(), 3);

        let good = store.get("good").unwrap().unwrap();
        assert_eq!(good.health_status, Some(HealthStatus::Healthy));
        assert_eq!(good.status, ToolStatus::Running);
        assert_eq!(
            store.get("sick").unwrap().unwrap().health_status,
            Some(HealthStatus::Unhealthy)
        );
        let gone = store.get("gone").unwrap().unwrap();
        assert_eq!(gone.health_status, Some(HealthStatus::Unhealthy));
        assert_eq!(gone.status, ToolStatus::Running);
    }
}
