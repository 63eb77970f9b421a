//! PM2 进程状态读取：`pm2 jlist` 输出中按进程名挑出一行。

use std::time::Duration;

use anyhow::{Result, anyhow};
use chrono::Utc;
use serde_json::Value;
use tokio::{process::Command, time::timeout};
use toolbox_protocol::Pm2ProcessInfo;
use tracing::debug;

/// 查询单个进程状态；PM2 不可用或进程不存在时返回 None。
pub async fn pm2_status(
    pm2_bin: &str,
    process_name: &str,
    command_timeout: Duration,
) -> Option<Pm2ProcessInfo> {
    match run_jlist(pm2_bin, command_timeout).await {
        Ok(raw) => parse_jlist(&raw, process_name, now_epoch_ms()),
        Err(err) => {
            debug!("pm2 jlist failed: {err:#}");
            None
        }
    }
}

async fn run_jlist(pm2_bin: &str, command_timeout: Duration) -> Result<String> {
    let output = timeout(command_timeout, Command::new(pm2_bin).arg("jlist").output())
        .await
        .map_err(|_| anyhow!("pm2 jlist timed out ({}ms)", command_timeout.as_millis()))??;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let short = stderr.lines().next().unwrap_or("pm2 jlist failed").trim();
        return Err(anyhow!(short.to_string()));
    }

    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if stdout.is_empty() {
        return Err(anyhow!("pm2 jlist output is empty"));
    }
    Ok(stdout)
}

/// 解析 `pm2 jlist` 的 JSON 数组；uptime 由 `pm_uptime` 推算为已运行毫秒数。
pub fn parse_jlist(raw: &str, process_name: &str, now_ms: u64) -> Option<Pm2ProcessInfo> {
    // pm2 在 JSON 之前可能打印升级提示，从第一个 `[` 开始解析。
    let start = raw.find('[')?;
    let rows = serde_json::from_str::<Value>(&raw[start..]).ok()?;
    let row = rows
        .as_array()?
        .iter()
        .find(|row| row.get("name").and_then(Value::as_str) == Some(process_name))?;

    let env = row.get("pm2_env");
    let monit = row.get("monit");
    let started_at = env
        .and_then(|env| env.get("pm_uptime"))
        .and_then(Value::as_u64)
        .unwrap_or(0);
    Some(Pm2ProcessInfo {
        status: env
            .and_then(|env| env.get("status"))
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string(),
        cpu: monit
            .and_then(|monit| monit.get("cpu"))
            .and_then(Value::as_f64)
            .unwrap_or(0.0),
        memory: monit
            .and_then(|monit| monit.get("memory"))
            .and_then(Value::as_u64)
            .unwrap_or(0),
        uptime: if started_at == 0 {
            0
        } else {
            now_ms.saturating_sub(started_at)
        },
    })
}

fn now_epoch_ms() -> u64 {
    u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0)
}
