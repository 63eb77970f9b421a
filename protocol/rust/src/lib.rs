// 文件职责：
// 1) 定义 portal 与各卫星服务共用的协议数据结构（工具清单、工具记录、统一响应包裹）。
// 2) 提供时间戳格式化等跨服务一致的基础函数。
// 3) 作为 Rust 侧协议唯一代码源，供 portal / win-switcher / cc-monitor 复用。

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// 清单未声明健康检查路径时的默认值。
pub const DEFAULT_HEALTH_PATH: &str = "/api/health";
/// 清单未声明版本时的默认值。
pub const DEFAULT_TOOL_VERSION: &str = "0.0.0";

/// 将 UTC 时间格式化为协议统一的时间戳（RFC3339 毫秒精度，定宽，字典序即时间序）。
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// 工具清单：本地 `tool.yaml` 与远程 `POST /api/tools/register` 共用。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolManifest {
    // 工具唯一名称（注册表主键）。
    #[serde(default)]
    pub name: String,
    // 展示名称，缺省回退为 name。
    #[serde(default)]
    pub display_name: String,
    // 描述。
    #[serde(default)]
    pub description: String,
    // 版本号。
    #[serde(default)]
    pub version: String,
    // 服务根地址，例如 `http://localhost:3002`。
    #[serde(default)]
    pub url: String,
    // 健康检查路径，拼接在 url 之后。
    #[serde(default)]
    pub health: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    // 进程管理器中的进程名（兼容旧字段 `pm2Name`）。
    #[serde(default, alias = "pm2Name", skip_serializing_if = "Option::is_none")]
    pub process_manager_name: Option<String>,
}

impl ToolManifest {
    /// 是否具备注册所需的最小字段（name + url）。
    pub fn is_complete(&self) -> bool {
        !self.name.trim().is_empty() && !self.url.trim().is_empty()
    }

    /// 补齐缺省字段，空白可选字段归一为 None。
    pub fn with_defaults(mut self) -> Self {
        self.name = self.name.trim().to_string();
        self.url = self.url.trim().to_string();
        if self.display_name.trim().is_empty() {
            self.display_name = self.name.clone();
        }
        if self.version.trim().is_empty() {
            self.version = DEFAULT_TOOL_VERSION.to_string();
        }
        if self.health.trim().is_empty() {
            self.health = DEFAULT_HEALTH_PATH.to_string();
        }
        self.icon = non_blank(self.icon);
        self.category = non_blank(self.category);
        self.process_manager_name = non_blank(self.process_manager_name);
        self
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|raw| !raw.trim().is_empty())
}

/// 工具存活状态（由注册/心跳/心跳超时扫描维护）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    Running,
    Unreachable,
    Stopped,
}

impl ToolStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Unreachable => "unreachable",
            Self::Stopped => "stopped",
        }
    }

    /// 从存储文本解析；未知值返回 None。
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "running" => Some(Self::Running),
            "unreachable" => Some(Self::Unreachable),
            "stopped" => Some(Self::Stopped),
            _ => None,
        }
    }
}

impl fmt::Display for ToolStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 工具来源：本地清单扫描 or 远程推送注册。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolSource {
    Local,
    Remote,
}

impl ToolSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Remote => "remote",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "local" => Some(Self::Local),
            "remote" => Some(Self::Remote),
            _ => None,
        }
    }
}

/// 主动健康探测结果，与 `ToolStatus` 正交。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

impl HealthStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Unhealthy => "unhealthy",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "healthy" => Some(Self::Healthy),
            "unhealthy" => Some(Self::Unhealthy),
            _ => None,
        }
    }
}

/// 进程管理器（PM2）侧的进程摘要。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pm2ProcessInfo {
    // PM2 进程状态（online / stopped / errored ...）。
    pub status: String,
    // CPU 百分比。
    pub cpu: f64,
    // 内存字节数。
    pub memory: u64,
    // 已运行毫秒数。
    pub uptime: u64,
}

/// 注册表中的一行工具记录。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolRecord {
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub version: String,
    pub url: String,
    pub health: String,
    pub icon: Option<String>,
    pub category: Option<String>,
    pub process_manager_name: Option<String>,
    pub status: ToolStatus,
    pub source: ToolSource,
    pub last_heartbeat: Option<String>,
    pub health_status: Option<HealthStatus>,
    pub created_at: String,
    pub updated_at: String,
    // 仅单工具查询时按需补充。
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pm2_status: Option<Option<Pm2ProcessInfo>>,
}

/// 通用 API 成功/失败包裹：`{ ok, data?, code?, error? }`。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiEnvelope<T> {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiEnvelope<T> {
    /// 成功响应。
    pub fn ok(data: Option<T>) -> Self {
        Self {
            ok: true,
            data,
            code: None,
            error: None,
        }
    }

    /// 失败响应。
    pub fn failure(code: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            code: Some(code.into()),
            error: Some(error.into()),
        }
    }
}
