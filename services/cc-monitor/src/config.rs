//! cc-monitor 运行时配置：启动时从环境变量读取一次。

use std::{path::PathBuf, time::Duration};

use toolbox_common::config::{
    DEFAULT_PORTAL_URL, duration_from_env, env_or_default, local_url_for_addr,
};

use crate::hooks::default_settings_path;

const DEFAULT_ADDR: &str = "0.0.0.0:3001";

#[derive(Debug, Clone)]
pub(crate) struct Config {
    pub(crate) addr: String,
    /// 对 portal 注册的服务地址。
    pub(crate) public_url: String,
    pub(crate) portal_url: String,
    /// hook 命令里写入的监控地址，用于安装探测。
    pub(crate) monitor_url: String,
    pub(crate) settings_path: PathBuf,
    pub(crate) scan_interval: Duration,
    pub(crate) ps_timeout: Duration,
}

impl Config {
    pub(crate) fn from_env() -> Self {
        let addr = env_or_default("CC_MONITOR_ADDR", DEFAULT_ADDR);
        let public_url = env_or_default("CC_MONITOR_PUBLIC_URL", &local_url_for_addr(&addr));
        Self {
            monitor_url: env_or_default("CC_MONITOR_URL", &public_url),
            public_url,
            addr,
            portal_url: env_or_default("PORTAL_URL", DEFAULT_PORTAL_URL),
            settings_path: std::env::var("CLAUDE_SETTINGS_PATH")
                .ok()
                .map(|raw| raw.trim().to_string())
                .filter(|raw| !raw.is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(default_settings_path),
            scan_interval: duration_from_env("CC_MONITOR_SCAN_INTERVAL_SEC", 15),
            ps_timeout: duration_from_env("CC_MONITOR_PS_TIMEOUT_SEC", 5),
        }
    }

    /// `doctor` 子命令展示的生效配置。
    pub(crate) fn doctor_entries(&self) -> Vec<(&'static str, String)> {
        vec![
            ("addr", self.addr.clone()),
            ("publicUrl", self.public_url.clone()),
            ("portalUrl", self.portal_url.clone()),
            ("monitorUrl", self.monitor_url.clone()),
            ("settingsPath", self.settings_path.display().to_string()),
            ("scanIntervalSec", self.scan_interval.as_secs().to_string()),
            ("psTimeoutSec", self.ps_timeout.as_secs().to_string()),
        ]
    }
}
