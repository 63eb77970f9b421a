//! hook 安装探测：`~/.claude/settings.json` 里是否有指向本服务 `/api/events` 的 hook。

use std::path::{Path, PathBuf};

use serde_json::Value;
use toolbox_common::config::home_dir;

pub fn default_settings_path() -> PathBuf {
    home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".claude")
        .join("settings.json")
}

/// 文件缺失、读取失败或 JSON 非法时一律视为未安装。
pub async fn hooks_installed(settings_path: &Path, monitor_url: &str) -> bool {
    let Ok(raw) = tokio::fs::read_to_string(settings_path).await else {
        return false;
    };
    settings_reference_monitor(&raw, monitor_url)
}

fn settings_reference_monitor(raw: &str, monitor_url: &str) -> bool {
    let Ok(settings) = serde_json::from_str::<Value>(raw) else {
        return false;
    };
    let Some(hooks) = settings.get("hooks").and_then(Value::as_object) else {
        return false;
    };
    let endpoint = format!("{}/api/events", monitor_url.trim_end_matches('/'));
    hooks
        .values()
        .any(|entries| entries.to_string().contains(&endpoint))
}
