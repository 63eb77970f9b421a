//! portal 共享状态：注册表存储句柄与 PM2 查询参数。

use std::{sync::Arc, time::Duration};

use crate::registry::store::ToolStore;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) store: Arc<dyn ToolStore>,
    pub(crate) pm2: Pm2Settings,
}

/// PM2 状态查询参数。
#[derive(Debug, Clone)]
pub(crate) struct Pm2Settings {
    pub(crate) bin: String,
    pub(crate) timeout: Duration,
}

impl AppState {
    pub(crate) fn new(store: Arc<dyn ToolStore>, pm2: Pm2Settings) -> Self {
        Self { store, pm2 }
    }
}
