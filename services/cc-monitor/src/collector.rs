//! 会话采集器：把 hook 事件与进程扫描结果合并成每个 Claude Code 实例一条会话记录。
//!
//! 状态只由 hook 事件单向推进；进程扫描只负责创建 `detected` 伪会话、
//! 把伪会话合并进 hook 会话，以及把进程已消失的会话标记为 `terminated`。

use std::collections::{HashMap, HashSet, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use toolbox_protocol::format_timestamp;

/// 每个会话保留的最近事件数。
pub const MAX_EVENTS_PER_SESSION: usize = 100;
/// 进程扫描生成的伪会话 id 前缀。
pub const PSEUDO_SESSION_PREFIX: &str = "process-";
const UNKNOWN_PROJECT: &str = "unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Started,
    Processing,
    Working,
    Idle,
    WaitingForInput,
    Ended,
    Terminated,
    Detected,
}

impl SessionStatus {
    /// hook 事件名到新状态；未知事件返回 None（状态不变）。
    pub fn from_event(hook_event_name: &str) -> Option<Self> {
        match hook_event_name {
            "SessionStart" => Some(Self::Started),
            "UserPromptSubmit" => Some(Self::Processing),
            "PreToolUse" | "PostToolUse" => Some(Self::Working),
            "Stop" => Some(Self::Idle),
            "Notification" => Some(Self::WaitingForInput),
            "SessionEnd" => Some(Self::Ended),
            _ => None,
        }
    }

    /// ended / terminated 为终态。
    pub fn is_closed(self) -> bool {
        matches!(self, Self::Ended | Self::Terminated)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionEvent {
    pub hook_event_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    pub timestamp: String,
}

/// 单个会话的完整记录（含事件日志）。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub session_id: String,
    pub project: String,
    pub status: SessionStatus,
    pub last_activity: String,
    pub started_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tty: Option<String>,
    pub events: VecDeque<SessionEvent>,
}

impl SessionRecord {
    fn new(session_id: String, project: Option<&str>, status: SessionStatus, now: &str) -> Self {
        Self {
            session_id,
            project: project.unwrap_or(UNKNOWN_PROJECT).to_string(),
            status,
            last_activity: now.to_string(),
            started_at: now.to_string(),
            pid: None,
            tty: None,
            events: VecDeque::new(),
        }
    }

    pub fn is_pseudo(&self) -> bool {
        self.session_id.starts_with(PSEUDO_SESSION_PREFIX)
    }

    fn push_event(&mut self, event: SessionEvent) {
        self.events.push_back(event);
        while self.events.len() > MAX_EVENTS_PER_SESSION {
            self.events.pop_front();
        }
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            session_id: self.session_id.clone(),
            project: self.project.clone(),
            status: self.status,
            last_activity: self.last_activity.clone(),
            started_at: self.started_at.clone(),
            pid: self.pid,
            tty: self.tty.clone(),
            event_count: self.events.len(),
            last_tool_name: self
                .events
                .back()
                .and_then(|event| event.tool_name.clone()),
        }
    }
}

/// 列表接口返回的摘要：去掉事件日志，附带事件数与最近工具名。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub session_id: String,
    pub project: String,
    pub status: SessionStatus,
    pub last_activity: String,
    pub started_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tty: Option<String>,
    pub event_count: usize,
    pub last_tool_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStats {
    pub total_sessions: usize,
    pub active_sessions: usize,
    pub last_event_time: Option<String>,
}

/// Claude Code hook 推送的事件体（只取用到的字段，其余忽略）。
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HookEvent {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub hook_event_name: Option<String>,
    #[serde(default)]
    pub cwd: Option<String>,
    #[serde(default)]
    pub tool_name: Option<String>,
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|raw| !raw.is_empty())
}

#[derive(Debug, Default)]
pub struct SessionManager {
    sessions: HashMap<String, SessionRecord>,
    last_event_time: Option<String>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// 处理一条 hook 事件；缺少 session_id 或 hook_event_name 时静默丢弃并返回 false。
    pub fn handle_event(&mut self, event: &HookEvent, now: DateTime<Utc>) -> bool {
        let (Some(session_id), Some(hook_event_name)) = (
            non_empty(event.session_id.as_deref()),
            non_empty(event.hook_event_name.as_deref()),
        ) else {
            return false;
        };
        let cwd = non_empty(event.cwd.as_deref());
        let now = format_timestamp(now);
        self.last_event_time = Some(now.clone());

        let session = self
            .sessions
            .entry(session_id.to_string())
            .or_insert_with(|| {
                SessionRecord::new(session_id.to_string(), cwd, SessionStatus::Started, &now)
            });
        session.last_activity = now.clone();
        session.push_event(SessionEvent {
            hook_event_name: hook_event_name.to_string(),
            tool_name: event.tool_name.clone(),
            timestamp: now,
        });

        if let Some(status) = SessionStatus::from_event(hook_event_name) {
            session.status = status;
            if status == SessionStatus::Started
                && let Some(cwd) = cwd
            {
                session.project = cwd.to_string();
            }
        }
        true
    }

    /// 进程扫描发现一个 claude 进程。
    ///
    /// hook 会话已持有该 pid 时不做任何事；否则按 cwd 精确匹配一个尚无 pid 的活跃 hook 会话并合并，
    /// 同时删除对应的 `process-<pid>` 伪会话；都不满足时创建或刷新伪会话。
    pub fn register_process(&mut self, pid: u32, tty: &str, cwd: Option<&str>, now: DateTime<Utc>) {
        let owned_by_hook = self
            .sessions
            .values()
            .any(|session| session.pid == Some(pid) && !session.is_pseudo());
        if owned_by_hook {
            return;
        }

        let pseudo_id = format!("{PSEUDO_SESSION_PREFIX}{pid}");
        let cwd = non_empty(cwd);
        if let Some(cwd) = cwd {
            let candidate = self.sessions.values_mut().find(|session| {
                session.pid.is_none()
                    && !session.is_pseudo()
                    && session.project == cwd
                    && !session.status.is_closed()
            });
            if let Some(session) = candidate {
                session.pid = Some(pid);
                session.tty = Some(tty.to_string());
                self.sessions.remove(&pseudo_id);
                return;
            }
        }

        let now = format_timestamp(now);
        let session = self.sessions.entry(pseudo_id.clone()).or_insert_with(|| {
            SessionRecord::new(pseudo_id, cwd, SessionStatus::Detected, &now)
        });
        session.last_activity = now;
        session.pid = Some(pid);
        session.tty = Some(tty.to_string());
        if let Some(cwd) = cwd {
            session.project = cwd.to_string();
        }
    }

    /// 持有 pid 但 pid 不在活跃集合内的未结束会话转为 terminated，返回转换数量。
    pub fn mark_terminated(&mut self, active_pids: &HashSet<u32>, now: DateTime<Utc>) -> usize {
        let now = format_timestamp(now);
        let mut changed = 0;
        for session in self.sessions.values_mut() {
            let Some(pid) = session.pid else {
                continue;
            };
            if active_pids.contains(&pid) || session.status.is_closed() {
                continue;
            }
            session.status = SessionStatus::Terminated;
            session.last_activity = now.clone();
            changed += 1;
        }
        changed
    }

    /// 活跃会话，按 lastActivity 倒序。
    pub fn get_all(&self) -> Vec<&SessionRecord> {
        sorted_by_activity(
            self.sessions
                .values()
                .filter(|session| !session.status.is_closed()),
        )
    }

    pub fn get_all_including_ended(&self) -> Vec<&SessionRecord> {
        sorted_by_activity(self.sessions.values())
    }

    pub fn get_by_id(&self, session_id: &str) -> Option<&SessionRecord> {
        self.sessions.get(session_id)
    }

    pub fn summaries(&self, include_ended: bool) -> Vec<SessionSummary> {
        let sessions = if include_ended {
            self.get_all_including_ended()
        } else {
            self.get_all()
        };
        sessions.into_iter().map(SessionRecord::summary).collect()
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            total_sessions: self.sessions.len(),
            active_sessions: self
                .sessions
                .values()
                .filter(|session| !session.status.is_closed())
                .count(),
            last_event_time: self.last_event_time.clone(),
        }
    }
}

// 时间戳定宽，字符串序即时间序；同一时刻按 id 排，保证输出稳定。
fn sorted_by_activity<'a>(
    sessions: impl Iterator<Item = &'a SessionRecord>,
) -> Vec<&'a SessionRecord> {
    let mut sessions = sessions.collect::<Vec<_>>();
    sessions.sort_by(|a, b| {
        b.last_activity
            .cmp(&a.last_activity)
            .then_with(|| a.session_id.cmp(&b.session_id))
    });
    sessions
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use chrono::{DateTime, TimeZone, Utc};

    use super::{HookEvent, MAX_EVENTS_PER_SESSION, SessionManager, SessionStatus};

    fn at(second: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, second).unwrap()
    }

    fn event(session_id: &str, name: &str, cwd: Option<&str>) -> HookEvent {
        HookEvent {
            session_id: Some(session_id.to_string()),
            hook_event_name: Some(name.to_string()),
            cwd: cwd.map(ToString::to_string),
            tool_name: None,
        }
    }

    #[test]
    fn events_drive_status_transitions() {
        let mut manager = SessionManager::new();
        let steps = [
            ("SessionStart", SessionStatus::Started),
            ("UserPromptSubmit", SessionStatus::Processing),
            ("PreToolUse", SessionStatus::Working),
            ("PostToolUse", SessionStatus::Working),
            ("Stop", SessionStatus::Idle),
            ("Notification", SessionStatus::WaitingForInput),
            ("SubagentStop", SessionStatus::WaitingForInput),
            ("SessionEnd", SessionStatus::Ended),
        ];
        for (second, (name, expected)) in steps.into_iter().enumerate() {
            assert!(manager.handle_event(&event("s1", name, Some("/work/app")), at(second as u32)));
            assert_eq!(manager.get_by_id("s1").unwrap().status, expected, "after {name}");
        }

        let session = manager.get_by_id("s1").unwrap();
        assert_eq!(session.project, "/work/app");
        assert_eq!(session.events.len(), steps.len());
        assert_eq!(session.last_activity, "2026-03-01T09:00:07.000Z");
        assert_eq!(session.started_at, "2026-03-01T09:00:00.000Z");
    }

    #[test]
    fn malformed_events_are_dropped() {
        let mut manager = SessionManager::new();
        assert!(!manager.handle_event(&HookEvent::default(), at(0)));
        assert!(!manager.handle_event(&event("", "Stop", None), at(0)));
        assert!(!manager.handle_event(&event("s1", "", None), at(0)));
        assert_eq!(manager.stats().total_sessions, 0);
        assert_eq!(manager.stats().last_event_time, None);
    }

    #[test]
    fn event_log_keeps_last_hundred() {
        let mut manager = SessionManager::new();
        for index in 0..500 {
            let mut hook = event("s1", "PreToolUse", None);
            hook.tool_name = Some(format!("tool-{index}"));
            manager.handle_event(&hook, at(0));
        }
        let session = manager.get_by_id("s1").unwrap();
        assert_eq!(session.events.len(), MAX_EVENTS_PER_SESSION);
        assert_eq!(session.events.front().unwrap().tool_name.as_deref(), Some("tool-400"));
        assert_eq!(session.events.back().unwrap().tool_name.as_deref(), Some("tool-499"));
        assert_eq!(session.project, "unknown");

        let summary = session.summary();
        assert_eq!(summary.event_count, MAX_EVENTS_PER_SESSION);
        assert_eq!(summary.last_tool_name.as_deref(), Some("tool-499"));
    }

    #[test]
    fn process_merges_into_hook_session_by_cwd() {
        let mut manager = SessionManager::new();
        // 扫描先于 hook 到达：生成伪会话。
        manager.register_process(4242, "ttys003", Some("/work/app"), at(0));
        assert_eq!(
            manager.get_by_id("process-4242").unwrap().status,
            SessionStatus::Detected
        );

        manager.handle_event(&event("hook-1", "SessionStart", Some("/work/app")), at(1));
        manager.register_process(4242, "ttys003", Some("/work/app"), at(2));

        assert!(manager.get_by_id("process-4242").is_none());
        let merged = manager.get_by_id("hook-1").unwrap();
        assert_eq!(merged.pid, Some(4242));
        assert_eq!(merged.tty.as_deref(), Some("ttys003"));
        assert_eq!(merged.status, SessionStatus::Started);

        // 合并后再扫描是幂等的。
        manager.register_process(4242, "ttys003", Some("/work/app"), at(3));
        assert_eq!(manager.stats().total_sessions, 1);
        assert_eq!(manager.get_by_id("hook-1").unwrap().pid, Some(4242));
    }

    #[test]
    fn process_without_matching_cwd_stays_pseudo() {
        let mut manager = SessionManager::new();
        manager.handle_event(&event("hook-1", "SessionStart", Some("/work/app")), at(0));
        manager.register_process(7, "ttys001", Some("/work/other"), at(1));
        manager.register_process(7, "ttys001", Some("/work/other"), at(2));

        assert_eq!(manager.stats().total_sessions, 2);
        let pseudo = manager.get_by_id("process-7").unwrap();
        assert_eq!(pseudo.project, "/work/other");
        assert_eq!(pseudo.started_at, "2026-03-01T09:00:01.000Z");
        assert_eq!(pseudo.last_activity, "2026-03-01T09:00:02.000Z");
        assert!(manager.get_by_id("hook-1").unwrap().pid.is_none());
    }

    #[test]
    fn closed_sessions_do_not_absorb_processes() {
        let mut manager = SessionManager::new();
        manager.handle_event(&event("hook-1", "SessionStart", Some("/work/app")), at(0));
        manager.handle_event(&event("hook-1", "SessionEnd", None), at(1));
        manager.register_process(9, "ttys002", Some("/work/app"), at(2));
        assert!(manager.get_by_id("process-9").is_some());
        assert!(manager.get_by_id("hook-1").unwrap().pid.is_none());
    }

    #[test]
    fn vanished_processes_are_terminated_once() {
        let mut manager = SessionManager::new();
        manager.register_process(1, "ttys001", None, at(0));
        manager.register_process(2, "ttys002", None, at(0));
        manager.handle_event(&event("hook-1", "SessionStart", None), at(0));

        let active = HashSet::from([2]);
        assert_eq!(manager.mark_terminated(&active, at(5)), 1);
        assert_eq!(
            manager.get_by_id("process-1").unwrap().status,
            SessionStatus::Terminated
        );
        assert_eq!(
            manager.get_by_id("process-2").unwrap().status,
            SessionStatus::Detected
        );
        // 没有 pid 的 hook 会话不受扫描影响。
        assert_eq!(
            manager.get_by_id("hook-1").unwrap().status,
            SessionStatus::Started
        );
        assert_eq!(manager.mark_terminated(&active, at(6)), 0);
    }

    #[test]
    fn listings_filter_closed_and_sort_by_activity() {
        let mut manager = SessionManager::new();
        manager.handle_event(&event("old", "SessionStart", None), at(0));
        manager.handle_event(&event("new", "SessionStart", None), at(3));
        manager.handle_event(&event("done", "SessionStart", None), at(1));
        manager.handle_event(&event("done", "SessionEnd", None), at(4));

        let active = manager
            .get_all()
            .into_iter()
            .map(|session| session.session_id.as_str())
            .collect::<Vec<_>>();
        assert_eq!(active, vec!["new", "old"]);

        let all = manager
            .get_all_including_ended()
            .into_iter()
            .map(|session| session.session_id.as_str())
            .collect::<Vec<_>>();
        assert_eq!(all, vec!["done", "new", "old"]);

        let stats = manager.stats();
        assert_eq!(stats.total_sessions, 3);
        assert_eq!(stats.active_sessions, 2);
        assert_eq!(stats.last_event_time.as_deref(), Some("2026-03-01T09:00:04.000Z"));
    }
}
