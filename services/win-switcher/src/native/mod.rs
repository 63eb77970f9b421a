//! 原生窗口桥接：把助手子进程的结果翻译成服务内类型，区分硬失败与降级成功。

pub mod ancestry;
pub mod dedupe;
pub mod helper;
pub mod thumbnail;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use self::{
    ancestry::{ProcessTree, resolve_window_owner},
    dedupe::dedupe_windows,
    helper::{
        HelperTransport, SwiftHelper, parse_focus, parse_focus_by_cwd, parse_permissions,
        parse_windows,
    },
};

/// 助手侧 `focus-by-cwd` 的打开超时。
pub const FOCUS_BY_CWD_TIMEOUT_MS: u64 = 5_000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NativeError {
    #[error("native call failed: {0}")]
    Call(String),
    #[error("native output unparsable: {0}")]
    Parse(String),
    #[error("native call timed out after {0}ms")]
    Timeout(u64),
    #[error("no application found among process ancestors")]
    NoApplicationFound,
    #[error("no ancestor process owns a window")]
    NoTerminalWindow,
    #[error("thumbnail unavailable")]
    ThumbnailUnavailable,
}

/// 单个窗口描述。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowInfo {
    pub id: u32,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub app: String,
    pub pid: i32,
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default)]
    pub width: f64,
    #[serde(default)]
    pub height: f64,
    #[serde(default = "default_on_screen")]
    pub on_screen: bool,
}

fn default_on_screen() -> bool {
    true
}

impl WindowInfo {
    pub fn area(&self) -> f64 {
        self.width.max(0.0) * self.height.max(0.0)
    }
}

/// 辅助功能 / 屏幕录制权限。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionStatus {
    pub accessibility: bool,
    pub screen_recording: bool,
}

/// 降级成功的原因。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FocusDegradedReason {
    NoAccessibility,
    NoAxWindows,
    TitleNotMatched,
    #[serde(other)]
    Unknown,
}

/// 聚焦结果；`degraded` 时仍算成功（应用已激活，只是没精确定位到窗口）。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FocusOutcome {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub degraded: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<FocusDegradedReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// 原生桥接入口。
pub struct NativeBridge<H: HelperTransport = SwiftHelper> {
    helper: H,
}

impl<H: HelperTransport> NativeBridge<H> {
    pub fn new(helper: H) -> Self {
        Self { helper }
    }

    /// 枚举窗口并按进程去重。
    pub async fn list_windows(&self) -> Result<Vec<WindowInfo>, NativeError> {
        let raw = self.helper.call(vec!["list".to_string()]).await?;
        Ok(dedupe_windows(parse_windows(&raw)?))
    }

    pub async fn check_permissions(&self) -> Result<PermissionStatus, NativeError> {
        let raw = self
            .helper
            .call(vec!["check-permissions".to_string()])
            .await?;
        parse_permissions(&raw)
    }

    pub async fn focus_window(
        &self,
        window_id: u32,
        pid: i32,
        title: &str,
    ) -> Result<FocusOutcome, NativeError> {
        let raw = self
            .helper
            .call(vec![
                "focus".to_string(),
                window_id.to_string(),
                pid.to_string(),
                title.to_string(),
            ])
            .await?;
        parse_focus(&raw)
    }

    /// 让 `pid` 祖先链上的应用打开 `cwd`（祖先查找由助手完成）。
    pub async fn focus_by_ancestor_cwd(&self, pid: i32, cwd: &str) -> Result<(), NativeError> {
        let raw = self
            .helper
            .call(vec![
                "focus-by-cwd".to_string(),
                pid.to_string(),
                cwd.to_string(),
            ])
            .await?;
        parse_focus_by_cwd(&raw)
    }

    /// 用最新窗口列表 + 当前进程表，找出拥有 `pid` 的窗口。
    pub async fn find_window_owner_by_pid(
        &self,
        pid: i32,
        cwd: Option<&str>,
    ) -> Result<WindowInfo, NativeError> {
        let windows = self.list_windows().await?;
        let tree = tokio::task::spawn_blocking(ProcessTree::snapshot)
            .await
            .map_err(|err| NativeError::Call(format!("process snapshot failed: {err}")))?;
        self.find_window_owner_in(&tree, &windows, pid, cwd)
    }

    pub fn find_window_owner_in(
        &self,
        tree: &ProcessTree,
        windows: &[WindowInfo],
        pid: i32,
        cwd: Option<&str>,
    ) -> Result<WindowInfo, NativeError> {
        resolve_window_owner(tree, windows, pid, cwd).ok_or(NativeError::NoTerminalWindow)
    }

    #[cfg(test)]
    pub(crate) fn helper(&self) -> &H {
        &self.helper
    }
}
