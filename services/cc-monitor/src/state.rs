//! cc-monitor 共享状态。

use std::{path::PathBuf, sync::Arc};

use tokio::sync::RwLock;

use crate::collector::SessionManager;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) sessions: Arc<RwLock<SessionManager>>,
    pub(crate) hooks: Arc<HookProbe>,
}

/// hook 安装探测参数。
#[derive(Debug, Clone)]
pub(crate) struct HookProbe {
    pub(crate) settings_path: PathBuf,
    pub(crate) monitor_url: String,
}

impl AppState {
    pub(crate) fn new(sessions: Arc<RwLock<SessionManager>>, hooks: HookProbe) -> Self {
        Self {
            sessions,
            hooks: Arc::new(hooks),
        }
    }
}
