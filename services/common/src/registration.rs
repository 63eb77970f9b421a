//! 工具注册客户端职责：
//! 1. 在卫星服务内后台运行：向 portal 注册，失败按固定间隔无限重试，绝不阻塞宿主启动。
//! 2. 注册成功后按周期发送心跳；心跳失败静默吞掉，下个周期照常再试。
//! 3. 通过 watch 取消通道提供确定性的 `stop()`，可打断进行中的重试等待与请求。

use std::time::Duration;

use anyhow::{Context, anyhow};
use reqwest::{Client, StatusCode};
use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};
use toolbox_protocol::ToolManifest;
use tracing::{debug, info, warn};
use url::Url;

/// 默认心跳周期。
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
/// 注册失败后的重试间隔。
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);
/// 单次注册/心跳请求超时。
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// 注册客户端参数。
#[derive(Debug, Clone)]
pub struct RegistrationOptions {
    /// portal 根地址，例如 `http://localhost:3000`。
    pub portal_url: String,
    /// 本服务的工具清单。
    pub manifest: ToolManifest,
    pub heartbeat_interval: Duration,
    pub retry_delay: Duration,
    pub request_timeout: Duration,
}

impl RegistrationOptions {
    /// 使用默认周期构造参数。
    pub fn new(portal_url: impl Into<String>, manifest: ToolManifest) -> Self {
        Self {
            portal_url: portal_url.into(),
            manifest,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            retry_delay: DEFAULT_RETRY_DELAY,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// 后台注册任务句柄；句柄析构等同于 `stop()`。
pub struct RegistrationHandle {
    cancel_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl RegistrationHandle {
    /// 停止注册与心跳；可重复调用。
    pub fn stop(&self) {
        self.cancel_tx.send_replace(true);
    }

    /// 后台任务是否已经退出。
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// 停止并等待后台任务退出。
    pub async fn shutdown(self) {
        self.stop();
        if let Err(err) = self.task.await {
            warn!("registration task join failed: {err}");
        }
    }
}

/// portal 上本工具的两个端点。
#[derive(Debug, Clone, PartialEq, Eq)]
struct RegistryEndpoints {
    register: Url,
    heartbeat: Url,
}

impl RegistryEndpoints {
    fn resolve(portal_url: &str, tool_name: &str) -> anyhow::Result<Self> {
        let mut base = Url::parse(portal_url.trim())
            .with_context(|| format!("invalid portal url: {portal_url}"))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let register = base
            .join("api/tools/register")
            .context("build register endpoint failed")?;
        let mut heartbeat = base
            .join("api/tools/")
            .context("build heartbeat endpoint failed")?;
        heartbeat
            .path_segments_mut()
            .map_err(|_| anyhow!("portal url cannot be a base: {portal_url}"))?
            .pop_if_empty()
            .push(tool_name)
            .push("heartbeat");
        Ok(Self {
            register,
            heartbeat,
        })
    }
}

/// 启动后台注册任务并立即返回。
pub fn spawn_registration(options: RegistrationOptions) -> anyhow::Result<RegistrationHandle> {
    let manifest = options.manifest.clone().with_defaults();
    if !manifest.is_complete() {
        return Err(anyhow!("tool manifest requires name and url"));
    }
    let endpoints = RegistryEndpoints::resolve(&options.portal_url, &manifest.name)?;
    let client = Client::builder()
        .timeout(options.request_timeout)
        .no_proxy()
        .build()
        .context("build registration http client failed")?;

    let (cancel_tx, cancel_rx) = watch::channel(false);
    let task = tokio::spawn(run_registration(
        client, endpoints, manifest, options, cancel_rx,
    ));
    Ok(RegistrationHandle { cancel_tx, task })
}

async fn run_registration(
    client: Client,
    endpoints: RegistryEndpoints,
    manifest: ToolManifest,
    options: RegistrationOptions,
    mut cancel_rx: watch::Receiver<bool>,
) {
    let mut attempt = 0_u32;
    loop {
        attempt += 1;
        let outcome = tokio::select! {
            outcome = register_once(&client, &endpoints.register, &manifest) => outcome,
            _ = wait_cancelled(&mut cancel_rx) => return,
        };
        match outcome {
            Ok(status) => {
                info!(tool = %manifest.name, %status, attempt, "registered with portal");
                break;
            }
            Err(err) => warn!(
                tool = %manifest.name,
                attempt,
                "register with portal at {} failed, will retry: {err:#}",
                options.portal_url
            ),
        }
        tokio::select! {
            _ = tokio::time::sleep(options.retry_delay) => {}
            _ = wait_cancelled(&mut cancel_rx) => return,
        }
    }

    let period = options.heartbeat_interval.max(Duration::from_millis(1));
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = wait_cancelled(&mut cancel_rx) => return,
        }
        tokio::select! {
            result = heartbeat_once(&client, &endpoints.heartbeat) => {
                if let Err(err) = result {
                    debug!(tool = %manifest.name, "heartbeat failed: {err:#}");
                }
            }
            _ = wait_cancelled(&mut cancel_rx) => return,
        }
    }
}

async fn register_once(
    client: &Client,
    endpoint: &Url,
    manifest: &ToolManifest,
) -> anyhow::Result<StatusCode> {
    let resp = client
        .post(endpoint.clone())
        .json(manifest)
        .send()
        .await
        .context("request portal register failed")?;
    let status = resp.status();
    if !status.is_success() {
        return Err(anyhow!("portal register status is {status}"));
    }
    Ok(status)
}

async fn heartbeat_once(client: &Client, endpoint: &Url) -> anyhow::Result<()> {
    let resp = client
        .put(endpoint.clone())
        .send()
        .await
        .context("request portal heartbeat failed")?;
    if !resp.status().is_success() {
        return Err(anyhow!("portal heartbeat status is {}", resp.status()));
    }
    Ok(())
}

/// 等待取消信号；发送端析构同样视为取消。
async fn wait_cancelled(cancel_rx: &mut watch::Receiver<bool>) {
    loop {
        if *cancel_rx.borrow_and_update() {
            return;
        }
        if cancel_rx.changed().await.is_err() {
            return;
        }
    }
}
