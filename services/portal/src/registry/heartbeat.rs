//! 心跳超时扫描：远程工具超过阈值未心跳即标记为 unreachable。

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tracing::{debug, info, warn};

use super::store::{StoreError, ToolStore};

/// 执行一次扫描，返回被标记的行数。
pub fn sweep_once(
    store: &dyn ToolStore,
    timeout: Duration,
    now: DateTime<Utc>,
) -> Result<usize, StoreError> {
    let cutoff = chrono::Duration::from_std(timeout)
        .ok()
        .and_then(|window| now.checked_sub_signed(window))
        .unwrap_or(DateTime::<Utc>::MIN_UTC);
    store.mark_unreachable_before(cutoff, now)
}

/// 启动周期扫描任务；首个周期结束后才第一次扫描。
pub fn spawn_heartbeat_sweep(
    store: Arc<dyn ToolStore>,
    interval: Duration,
    timeout: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let start = tokio::time::Instant::now() + interval;
        let mut ticker = tokio::time::interval_at(start, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            match sweep_once(store.as_ref(), timeout, Utc::now()) {
                Ok(0) => debug!("heartbeat sweep found no stale tools"),
                Ok(changed) => info!(changed, "heartbeat sweep marked tools unreachable"),
                Err(err) => warn!("heartbeat sweep failed: {err}"),
            }
        }
    })
}
