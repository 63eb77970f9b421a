//! claude 进程扫描：周期列出命令名恰为 `claude` 的进程，补齐 cwd 后与会话表对账。

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::Duration,
};

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System, UpdateKind};
use tokio::{process::Command, sync::RwLock, task::JoinHandle, time::MissedTickBehavior};
use tracing::{debug, warn};

use crate::collector::SessionManager;

/// `ps -eo pid,tty,command` 中的一行。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaudeProcess {
    pub pid: u32,
    pub tty: String,
    pub command: String,
}

/// 只保留可执行文件名恰为 `claude` 的行（`claude ...` 或 `.../claude ...`）。
pub fn parse_ps_output(stdout: &str) -> Vec<ClaudeProcess> {
    stdout
        .lines()
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let pid = parts.next()?.parse::<u32>().ok()?;
            let tty = parts.next()?.to_string();
            let executable = parts.next()?;
            if executable != "claude" && !executable.ends_with("/claude") {
                return None;
            }
            let command = std::iter::once(executable)
                .chain(parts)
                .collect::<Vec<_>>()
                .join(" ");
            Some(ClaudeProcess { pid, tty, command })
        })
        .collect()
}

async fn list_claude_processes(ps_timeout: Duration) -> Result<Vec<ClaudeProcess>> {
    let output = tokio::time::timeout(
        ps_timeout,
        Command::new("ps").args(["-eo", "pid,tty,command"]).output(),
    )
    .await
    .map_err(|_| anyhow!("ps timed out ({}ms)", ps_timeout.as_millis()))??;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let short = stderr.lines().next().unwrap_or("ps failed").trim();
        return Err(anyhow!(short.to_string()));
    }
    Ok(parse_ps_output(&String::from_utf8_lossy(&output.stdout)))
}

/// 读取进程工作目录；无权限或进程已退出的条目直接缺席。
fn resolve_cwds(pids: &[u32]) -> HashMap<u32, String> {
    if pids.is_empty() {
        return HashMap::new();
    }
    let targets = pids.iter().copied().map(Pid::from_u32).collect::<Vec<_>>();
    let mut sys = System::new();
    sys.refresh_processes_specifics(
        ProcessesToUpdate::Some(&targets),
        true,
        ProcessRefreshKind::nothing().with_cwd(UpdateKind::Always),
    );
    pids.iter()
        .filter_map(|pid| {
            let cwd = sys.process(Pid::from_u32(*pid))?.cwd()?;
            Some((*pid, cwd.to_string_lossy().into_owned()))
        })
        .collect()
}

/// 执行一次扫描并对账，返回发现的进程数。进程列表读取失败时不做终止判定。
pub async fn scan_once(sessions: &RwLock<SessionManager>, ps_timeout: Duration) -> Result<usize> {
    let listing = list_claude_processes(ps_timeout).await;
    apply_listing(sessions, listing).await
}

async fn apply_listing(
    sessions: &RwLock<SessionManager>,
    listing: Result<Vec<ClaudeProcess>>,
) -> Result<usize> {
    let processes = listing?;
    let pids = processes.iter().map(|process| process.pid).collect::<Vec<_>>();
    let cwds = tokio::task::spawn_blocking(move || resolve_cwds(&pids))
        .await
        .map_err(|err| anyhow!("resolve process cwd failed: {err}"))?;

    let mut manager = sessions.write().await;
    let terminated = reconcile(&mut manager, &processes, &cwds, Utc::now());
    if terminated > 0 {
        debug!(terminated, "sessions marked terminated");
    }
    Ok(processes.len())
}

/// 以一次完整快照对账：登记每个存活进程，再终止快照外的会话。返回终止数量。
pub fn reconcile(
    manager: &mut SessionManager,
    processes: &[ClaudeProcess],
    cwds: &HashMap<u32, String>,
    now: DateTime<Utc>,
) -> usize {
    let mut active = HashSet::with_capacity(processes.len());
    for process in processes {
        active.insert(process.pid);
        debug!(pid = process.pid, command = %process.command, "claude process found");
        manager.register_process(
            process.pid,
            &process.tty,
            cwds.get(&process.pid).map(String::as_str),
            now,
        );
    }
    manager.mark_terminated(&active, now)
}

/// 启动周期扫描任务；启动时立即扫描一次。
pub fn spawn_process_scanner(
    sessions: Arc<RwLock<SessionManager>>,
    interval: Duration,
    ps_timeout: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            match scan_once(&sessions, ps_timeout).await {
                Ok(found) => debug!(found, "claude process scan finished"),
                Err(err) => warn!("claude process scan skipped: {err:#}"),
            }
        }
    })
}
