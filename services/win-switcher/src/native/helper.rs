//! 原生助手适配层：子进程调用与 stdout JSON 解析都收敛在这里，调用方只看到类型化结果。

use std::{future::Future, time::Duration};

use serde::{Deserialize, de::DeserializeOwned};
use tokio::{process::Command, time::timeout};

use super::{FocusOutcome, NativeError, PermissionStatus, WindowInfo};

/// 助手调用通道；测试中以假实现替换真实子进程。
pub trait HelperTransport: Send + Sync + 'static {
    /// 以给定子命令参数调用助手，返回去除首尾空白的 stdout。
    fn call(&self, args: Vec<String>) -> impl Future<Output = Result<String, NativeError>> + Send;
}

/// 通过配置的命令行（默认 `swift native/windows.swift`）启动助手。
#[derive(Debug, Clone)]
pub struct SwiftHelper {
    command: Vec<String>,
    timeout: Duration,
}

impl SwiftHelper {
    pub fn new(command: Vec<String>, timeout: Duration) -> Self {
        Self { command, timeout }
    }
}

impl HelperTransport for SwiftHelper {
    async fn call(&self, args: Vec<String>) -> Result<String, NativeError> {
        let Some((program, base_args)) = self.command.split_first() else {
            return Err(NativeError::Call("helper command is empty".to_string()));
        };
        let mut command = Command::new(program);
        command.args(base_args).args(&args);

        let output = timeout(self.timeout, command.output())
            .await
            .map_err(|_| NativeError::Timeout(self.timeout.as_millis() as u64))?
            .map_err(|err| NativeError::Call(format!("spawn {program} failed: {err}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let short = stderr
                .lines()
                .next()
                .unwrap_or("native helper failed")
                .trim();
            return Err(NativeError::Call(short.to_string()));
        }

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if stdout.is_empty() {
            return Err(NativeError::Parse("helper output is empty".to_string()));
        }
        Ok(stdout)
    }
}

/// `focus-by-cwd` 的原始应答。
#[derive(Debug, Deserialize)]
struct FocusByCwdReply {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

fn parse_json<T: DeserializeOwned>(raw: &str, command: &str) -> Result<T, NativeError> {
    serde_json::from_str::<T>(raw.trim())
        .map_err(|err| NativeError::Parse(format!("{command}: {err}")))
}

pub(crate) fn parse_windows(raw: &str) -> Result<Vec<WindowInfo>, NativeError> {
    parse_json(raw, "list")
}

pub(crate) fn parse_permissions(raw: &str) -> Result<PermissionStatus, NativeError> {
    parse_json(raw, "check-permissions")
}

pub(crate) fn parse_focus(raw: &str) -> Result<FocusOutcome, NativeError> {
    parse_json(raw, "focus")
}

/// `{"ok":true}` 为成功；`no_app_found` / `timeout` 映射为专用错误。
pub(crate) fn parse_focus_by_cwd(raw: &str) -> Result<(), NativeError> {
    let reply: FocusByCwdReply = parse_json(raw, "focus-by-cwd")?;
    if reply.ok {
        return Ok(());
    }
    match reply.error.as_deref() {
        Some("no_app_found") => Err(NativeError::NoApplicationFound),
        Some("timeout") => Err(NativeError::Timeout(super::FOCUS_BY_CWD_TIMEOUT_MS)),
        Some(other) => Err(NativeError::Call(other.to_string())),
        None => Err(NativeError::Call("focus-by-cwd failed".to_string())),
    }
}
