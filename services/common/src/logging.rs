//! 日志系统模块职责：
//! 1. 初始化 stdout + 文件双通道 tracing 日志，所有工具箱服务共用。
//! 2. 将运行日志按天落在 `<log_dir>/raw/<service>.log.<YYYY-MM-DD>`。
//! 3. 将历史日期日志自动归档到 `<log_dir>/archive/<YYYY-MM-DD>.7z`。

use std::{
    collections::BTreeMap,
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use sevenz_rust::compress_to_path;
use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tracing::warn;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter, Layer, filter::LevelFilter, layer::SubscriberExt, util::SubscriberInitExt,
};

use crate::config::{duration_from_env, env_or_default};

/// 默认日志根目录（相对当前工作目录）。
const DEFAULT_LOG_DIR: &str = "logs";
const RAW_DIR_NAME: &str = "raw";
const ARCHIVE_DIR_NAME: &str = "archive";
/// 归档临时目录名。
const ARCHIVE_TMP_DIR_NAME: &str = ".archive-tmp";
/// 归档互斥锁目录名（多个服务共享同一日志根目录）。
const ARCHIVE_LOCK_DIR_NAME: &str = ".archive-lock";
const DEFAULT_ARCHIVE_INTERVAL_SEC: u64 = 3600;
/// 文件日志级别环境变量（独立于 `RUST_LOG`）。
const FILE_LOG_LEVEL_ENV: &str = "TOOLBOX_FILE_LOG_LEVEL";
const DEFAULT_STDOUT_FILTER: &str = "info";

/// 日志运行时守卫，防止 non-blocking writer 提前析构。
pub struct LogRuntime {
    _stdout_guard: WorkerGuard,
    _file_guard: WorkerGuard,
    _archiver: JoinHandle<()>,
}

/// 日志目录布局。
#[derive(Debug, Clone)]
struct LogLayout {
    root: PathBuf,
    raw: PathBuf,
    archive: PathBuf,
}

impl LogLayout {
    fn new(root: PathBuf) -> Self {
        Self {
            raw: root.join(RAW_DIR_NAME),
            archive: root.join(ARCHIVE_DIR_NAME),
            root,
        }
    }

    fn ensure_dirs(&self) -> Result<()> {
        fs::create_dir_all(&self.raw)
            .with_context(|| format!("create raw log dir: {}", self.raw.display()))?;
        fs::create_dir_all(&self.archive)
            .with_context(|| format!("create archive log dir: {}", self.archive.display()))?;
        Ok(())
    }
}

/// 初始化服务日志系统，并启动自动归档任务。必须在 tokio 运行时内调用。
pub fn init(service_name: &str) -> Result<LogRuntime> {
    let layout = LogLayout::new(resolve_log_root());
    layout.ensure_dirs()?;
    archive_completed_days(&layout)?;

    let file_appender = tracing_appender::rolling::daily(&layout.raw, format!("{service_name}.log"));
    let (file_writer, file_guard) = tracing_appender::non_blocking(file_appender);
    let (stdout_writer, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_writer(stdout_writer)
        .with_ansi(true)
        .with_target(false)
        .compact()
        .with_filter(resolve_stdout_env_filter());
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(file_writer)
        .with_ansi(false)
        .with_target(true)
        .with_filter(resolve_file_level_filter());

    tracing_subscriber::registry()
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .context("install tracing subscriber")?;

    let archiver = spawn_archive_task(layout);
    Ok(LogRuntime {
        _stdout_guard: stdout_guard,
        _file_guard: file_guard,
        _archiver: archiver,
    })
}

/// stdout 过滤规则：优先 `RUST_LOG`，回退默认摘要级别。
fn resolve_stdout_env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_STDOUT_FILTER))
}

/// 文件日志级别；默认 `debug`，便于回放后台循环的细节。
fn resolve_file_level_filter() -> LevelFilter {
    std::env::var(FILE_LOG_LEVEL_ENV)
        .ok()
        .and_then(|raw| raw.trim().parse::<LevelFilter>().ok())
        .unwrap_or(LevelFilter::DEBUG)
}

fn spawn_archive_task(layout: LogLayout) -> JoinHandle<()> {
    let interval = duration_from_env(
        "TOOLBOX_LOG_ARCHIVE_INTERVAL_SEC",
        DEFAULT_ARCHIVE_INTERVAL_SEC,
    );
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // 首个 tick 立即返回，启动时已归档过一次。
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if let Err(err) = archive_completed_days(&layout) {
                warn!("archive logs failed: {err:#}");
            }
        }
    })
}

/// 将 `TOOLBOX_LOG_DIR` 解析成绝对路径。
fn resolve_log_root() -> PathBuf {
    let path = PathBuf::from(env_or_default("TOOLBOX_LOG_DIR", DEFAULT_LOG_DIR));
    if path.is_absolute() {
        return path;
    }
    match std::env::current_dir() {
        Ok(dir) => dir.join(path),
        Err(_) => PathBuf::from(DEFAULT_LOG_DIR),
    }
}

/// 按天归档已完成日期的日志文件，成功后删除 raw 原文件。
fn archive_completed_days(layout: &LogLayout) -> Result<()> {
    let today = Local::now().date_naive().format("%Y-%m-%d").to_string();
    archive_days_before(layout, &today)
}

fn archive_days_before(layout: &LogLayout, today: &str) -> Result<()> {
    if !layout.raw.exists() {
        return Ok(());
    }
    let Some(_lock) = acquire_archive_lock(&layout.root)? else {
        return Ok(());
    };

    let mut grouped: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
    for entry in fs::read_dir(&layout.raw)
        .with_context(|| format!("read raw logs: {}", layout.raw.display()))?
    {
        let path = entry
            .with_context(|| format!("read entry under {}", layout.raw.display()))?
            .path();
        if !path.is_file() {
            continue;
        }
        let Some(day) = path
            .file_name()
            .and_then(|value| value.to_str())
            .and_then(extract_day_from_log_name)
        else {
            continue;
        };
        if day.as_str() >= today {
            continue;
        }
        grouped.entry(day).or_default().push(path);
    }

    for (day, mut files) in grouped {
        files.sort();
        let archive_path = layout.archive.join(format!("{day}.7z"));
        if archive_path.exists() {
            // 同日归档已存在：说明上次归档成功但删除中断。
            remove_files(&files);
            continue;
        }

        let stage_dir = layout.root.join(ARCHIVE_TMP_DIR_NAME).join(&day);
        if stage_dir.exists() {
            let _ = fs::remove_dir_all(&stage_dir);
        }
        fs::create_dir_all(&stage_dir)
            .with_context(|| format!("create archive stage dir: {}", stage_dir.display()))?;
        for file in &files {
            let Some(name) = file.file_name() else {
                continue;
            };
            let target = stage_dir.join(name);
            fs::copy(file, &target).with_context(|| {
                format!("copy log to stage: {} -> {}", file.display(), target.display())
            })?;
        }

        let archive_tmp = layout.archive.join(format!("{day}.7z.tmp"));
        if archive_tmp.exists() {
            let _ = fs::remove_file(&archive_tmp);
        }
        compress_to_path(&stage_dir, &archive_tmp)
            .with_context(|| format!("compress logs to {}", archive_tmp.display()))?;
        fs::rename(&archive_tmp, &archive_path).with_context(|| {
            format!(
                "finalize archive {} -> {}",
                archive_tmp.display(),
                archive_path.display()
            )
        })?;

        remove_files(&files);
        let _ = fs::remove_dir_all(&stage_dir);
    }

    Ok(())
}

fn remove_files(files: &[PathBuf]) {
    for file in files {
        let _ = fs::remove_file(file);
    }
}

/// 从日志文件名中提取日期（`portal.log.2026-01-01` -> `2026-01-01`）。
fn extract_day_from_log_name(file_name: &str) -> Option<String> {
    let day = file_name.rsplit('.').next()?;
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()?;
    Some(day.to_string())
}

/// 尝试获取归档互斥锁，避免多个服务同时归档。
fn acquire_archive_lock(root_dir: &Path) -> Result<Option<ArchiveLockGuard>> {
    let lock_dir = root_dir.join(ARCHIVE_LOCK_DIR_NAME);
    match fs::create_dir(&lock_dir) {
        Ok(_) => Ok(Some(ArchiveLockGuard { lock_dir })),
        Err(err) if err.kind() == ErrorKind::AlreadyExists => Ok(None),
        Err(err) => {
            Err(err).with_context(|| format!("create archive lock: {}", lock_dir.display()))
        }
    }
}

/// 归档锁守卫，析构时释放锁目录。
struct ArchiveLockGuard {
    lock_dir: PathBuf,
}

impl Drop for ArchiveLockGuard {
    fn drop(&mut self) {
        let _ = fs::remove_dir(&self.lock_dir);
    }
}
