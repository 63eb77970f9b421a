//! win-switcher 运行时配置：启动时从环境变量读取一次。

use std::{path::PathBuf, time::Duration};

use toolbox_common::config::{
    DEFAULT_PORTAL_URL, command_from_env, duration_from_env, duration_from_env_millis,
    env_or_default, local_url_for_addr, usize_from_env,
};

const DEFAULT_ADDR: &str = "0.0.0.0:3003";
const DEFAULT_HELPER_CMD: &str = "swift native/windows.swift";
const DEFAULT_THUMB_DIR: &str = "/tmp/winswitcher";

#[derive(Debug, Clone)]
pub(crate) struct Config {
    pub(crate) addr: String,
    /// 对 portal 注册的服务地址。
    pub(crate) public_url: String,
    pub(crate) portal_url: String,
    /// 助手命令行（program + 固定参数），子命令追加在后面。
    pub(crate) helper_command: Vec<String>,
    pub(crate) helper_timeout: Duration,
    pub(crate) capture_timeout: Duration,
    pub(crate) thumb_dir: PathBuf,
    pub(crate) thumb_ttl: Duration,
    pub(crate) thumb_max_parallel: usize,
    pub(crate) window_cache_ttl: Duration,
    pub(crate) permission_cache_ttl: Duration,
}

impl Config {
    pub(crate) fn from_env() -> Self {
        let addr = env_or_default("WIN_SWITCHER_ADDR", DEFAULT_ADDR);
        Self {
            public_url: env_or_default("WIN_SWITCHER_PUBLIC_URL", &local_url_for_addr(&addr)),
            addr,
            portal_url: env_or_default("PORTAL_URL", DEFAULT_PORTAL_URL),
            helper_command: command_from_env("WIN_HELPER_CMD", DEFAULT_HELPER_CMD),
            helper_timeout: duration_from_env("WIN_HELPER_TIMEOUT_SEC", 10),
            capture_timeout: duration_from_env("THUMB_CAPTURE_TIMEOUT_SEC", 8),
            thumb_dir: PathBuf::from(env_or_default("THUMB_DIR", DEFAULT_THUMB_DIR)),
            thumb_ttl: duration_from_env("THUMB_TTL_SEC", 15),
            thumb_max_parallel: usize_from_env("THUMB_MAX_PARALLEL", 4),
            window_cache_ttl: duration_from_env_millis("WINDOW_CACHE_TTL_MS", 5_000),
            permission_cache_ttl: duration_from_env_millis("PERMISSION_CACHE_TTL_MS", 30_000),
        }
    }

    /// `doctor` 子命令展示的生效配置。
    pub(crate) fn doctor_entries(&self) -> Vec<(&'static str, String)> {
        vec![
            ("addr", self.addr.clone()),
            ("publicUrl", self.public_url.clone()),
            ("portalUrl", self.portal_url.clone()),
            ("helperCommand", self.helper_command.join(" ")),
            ("helperTimeoutSec", self.helper_timeout.as_secs().to_string()),
            ("captureTimeoutSec", self.capture_timeout.as_secs().to_string()),
            ("thumbDir", self.thumb_dir.display().to_string()),
            ("thumbTtlSec", self.thumb_ttl.as_secs().to_string()),
            ("thumbMaxParallel", self.thumb_max_parallel.to_string()),
            (
                "windowCacheTtlMs",
                self.window_cache_ttl.as_millis().to_string(),
            ),
            (
                "permissionCacheTtlMs",
                self.permission_cache_ttl.as_millis().to_string(),
            ),
        ]
    }
}
