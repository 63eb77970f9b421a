//! portal 运行时配置：启动时从环境变量读取一次。

use std::{path::PathBuf, time::Duration};

use toolbox_common::config::{duration_from_env, env_or_default, home_dir};

const DEFAULT_ADDR: &str = "0.0.0.0:3000";
const DEFAULT_PACKAGES_DIR: &str = "packages";
const DEFAULT_PM2_BIN: &str = "pm2";

/// portal 配置。
#[derive(Debug, Clone)]
pub(crate) struct Config {
    /// HTTP 监听地址。
    pub(crate) addr: String,
    /// SQLite 数据库文件。
    pub(crate) db_path: PathBuf,
    /// 本地工具清单根目录（扫描 `<dir>/*/tool.yaml`）。
    pub(crate) packages_dir: PathBuf,
    pub(crate) heartbeat_sweep_interval: Duration,
    /// 远程工具心跳超时阈值。
    pub(crate) heartbeat_timeout: Duration,
    pub(crate) health_interval: Duration,
    /// 启动后首次健康探测前的宽限时间。
    pub(crate) health_grace: Duration,
    pub(crate) health_timeout: Duration,
    pub(crate) pm2_bin: String,
    pub(crate) pm2_timeout: Duration,
}

impl Config {
    pub(crate) fn from_env() -> Self {
        Self {
            addr: env_or_default("PORTAL_ADDR", DEFAULT_ADDR),
            db_path: std::env::var("PORTAL_DB_PATH")
                .ok()
                .map(|raw| raw.trim().to_string())
                .filter(|raw| !raw.is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(default_db_path),
            packages_dir: PathBuf::from(env_or_default(
                "TOOLBOX_PACKAGES_DIR",
                DEFAULT_PACKAGES_DIR,
            )),
            heartbeat_sweep_interval: duration_from_env("PORTAL_HEARTBEAT_SWEEP_SEC", 30),
            heartbeat_timeout: duration_from_env("PORTAL_HEARTBEAT_TIMEOUT_SEC", 90),
            health_interval: duration_from_env("PORTAL_HEALTH_INTERVAL_SEC", 60),
            health_grace: duration_from_env("PORTAL_HEALTH_GRACE_SEC", 5),
            health_timeout: duration_from_env("PORTAL_HEALTH_TIMEOUT_SEC", 5),
            pm2_bin: env_or_default("PM2_BIN", DEFAULT_PM2_BIN),
            pm2_timeout: duration_from_env("PM2_TIMEOUT_SEC", 5),
        }
    }

    /// `doctor` 子命令展示的生效配置。
    pub(crate) fn doctor_entries(&self) -> Vec<(&'static str, String)> {
        vec![
            ("addr", self.addr.clone()),
            ("dbPath", self.db_path.display().to_string()),
            ("packagesDir", self.packages_dir.display().to_string()),
            (
                "heartbeatSweepSec",
                self.heartbeat_sweep_interval.as_secs().to_string(),
            ),
            (
                "heartbeatTimeoutSec",
                self.heartbeat_timeout.as_secs().to_string(),
            ),
            ("healthIntervalSec", self.health_interval.as_secs().to_string()),
            ("healthGraceSec", self.health_grace.as_secs().to_string()),
            ("healthTimeoutSec", self.health_timeout.as_secs().to_string()),
            ("pm2Bin", self.pm2_bin.clone()),
        ]
    }
}

/// 默认数据库路径：`~/.config/my-toolbox/portal/portal.db`。
fn default_db_path() -> PathBuf {
    home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("my-toolbox")
        .join("portal")
        .join("portal.db")
}
