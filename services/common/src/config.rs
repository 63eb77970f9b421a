//! 配置辅助模块职责：
//! 1. 为各服务的 `Config::from_env` 提供统一的环境变量读取与默认值回退。
//! 2. 解析秒/毫秒时长、正整数、命令行等常见配置格式。
//! 3. 推导服务对外的本机访问地址，供注册清单使用。

use std::{net::SocketAddr, path::PathBuf, time::Duration};

/// portal 默认地址（卫星服务注册目标）。
pub const DEFAULT_PORTAL_URL: &str = "http://localhost:3000";

/// 读取环境变量；不存在或为空白时返回默认值。
pub fn env_or_default(key: &str, fallback: &str) -> String {
    std::env::var(key)
        .ok()
        .map(|raw| raw.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| fallback.to_string())
}

/// 读取秒级时长配置，非法值回退到默认秒数。
pub fn duration_from_env(key: &str, fallback_sec: u64) -> Duration {
    parse_duration_secs(std::env::var(key).ok().as_deref(), fallback_sec)
}

/// 读取毫秒级时长配置，非法值回退到默认毫秒数。
pub fn duration_from_env_millis(key: &str, fallback_ms: u64) -> Duration {
    parse_duration_millis(std::env::var(key).ok().as_deref(), fallback_ms)
}

/// 读取 usize 配置，非法值回退到默认值。
pub fn usize_from_env(key: &str, fallback: usize) -> usize {
    parse_positive_usize(std::env::var(key).ok().as_deref(), fallback)
}

/// 读取“命令 + 参数”形式的配置（按空白切分）。
pub fn command_from_env(key: &str, fallback: &str) -> Vec<String> {
    split_command_line(&env_or_default(key, fallback))
}

/// 解析秒级时长：必须是正整数。
pub fn parse_duration_secs(raw: Option<&str>, fallback_sec: u64) -> Duration {
    raw.and_then(|value| value.trim().parse::<u64>().ok())
        .filter(|value| *value > 0)
        .map(Duration::from_secs)
        .unwrap_or_else(|| Duration::from_secs(fallback_sec))
}

/// 解析毫秒级时长：必须是正整数。
pub fn parse_duration_millis(raw: Option<&str>, fallback_ms: u64) -> Duration {
    raw.and_then(|value| value.trim().parse::<u64>().ok())
        .filter(|value| *value > 0)
        .map(Duration::from_millis)
        .unwrap_or_else(|| Duration::from_millis(fallback_ms))
}

/// 解析正整数。
pub fn parse_positive_usize(raw: Option<&str>, fallback: usize) -> usize {
    raw.and_then(|value| value.trim().parse::<usize>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(fallback)
}

/// 将命令行字符串按空白切分为 program + args。
pub fn split_command_line(raw: &str) -> Vec<String> {
    raw.split_whitespace().map(ToString::to_string).collect()
}

/// 由监听地址推导本机访问 URL（`0.0.0.0:3003` -> `http://localhost:3003`）。
pub fn local_url_for_addr(addr: &str) -> String {
    match addr.trim().parse::<SocketAddr>() {
        Ok(parsed) => format!("http://localhost:{}", parsed.port()),
        Err(_) => {
            let port = addr.rsplit(':').next().unwrap_or_default().trim();
            if port.is_empty() {
                "http://localhost".to_string()
            } else {
                format!("http://localhost:{port}")
            }
        }
    }
}

/// 当前用户 HOME 目录；未设置时返回 None。
pub fn home_dir() -> Option<PathBuf> {
    let home = std::env::var("HOME").ok()?;
    if home.trim().is_empty() {
        return None;
    }
    Some(PathBuf::from(home))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{
        local_url_for_addr, parse_duration_millis, parse_duration_secs, parse_positive_usize,
        split_command_line,
    };

    #[test]
    fn durations_fall_back_on_invalid_values() {
        assert_eq!(parse_duration_secs(Some("45"), 30), Duration::from_secs(45));
        assert_eq!(parse_duration_secs(Some("0"), 30), Duration::from_secs(30));
        assert_eq!(parse_duration_secs(Some("abc"), 30), Duration::from_secs(30));
        assert_eq!(parse_duration_secs(None, 30), Duration::from_secs(30));
        assert_eq!(
            parse_duration_millis(Some(" 250 "), 5_000),
            Duration::from_millis(250)
        );
        assert_eq!(parse_positive_usize(Some("-1"), 4), 4);
        assert_eq!(parse_positive_usize(Some("8"), 4), 8);
    }

    #[test]
    fn local_url_uses_listen_port() {
        assert_eq!(local_url_for_addr("0.0.0.0:3003"), "http://localhost:3003");
        assert_eq!(local_url_for_addr("127.0.0.1:3001"), "http://localhost:3001");
        assert_eq!(local_url_for_addr("localhost:3005"), "http://localhost:3005");
    }

    #[test]
    fn command_line_is_split_on_whitespace() {
        assert_eq!(
            split_command_line("swift  native/windows.swift"),
            vec!["swift".to_string(), "native/windows.swift".to_string()]
        );
        assert!(split_command_line("   ").is_empty());
    }
}
