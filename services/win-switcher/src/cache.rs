//! 单槽 TTL 缓存：窗口列表（5 秒）与权限状态（30 秒）。过期即未命中，不返回旧值，也不后台刷新。

use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct CacheEntry<T> {
    value: T,
    expires_at: Instant,
}

#[derive(Debug, Clone)]
pub(crate) struct TtlCache<T> {
    ttl: Duration,
    entry: Option<CacheEntry<T>>,
}

impl<T: Clone> TtlCache<T> {
    pub(crate) fn new(ttl: Duration) -> Self {
        Self { ttl, entry: None }
    }

    pub(crate) fn get(&self) -> Option<T> {
        self.get_at(Instant::now())
    }

    /// `now < expiresAt` 时命中。
    pub(crate) fn get_at(&self, now: Instant) -> Option<T> {
        self.entry
            .as_ref()
            .filter(|entry| now < entry.expires_at)
            .map(|entry| entry.value.clone())
    }

    pub(crate) fn set(&mut self, value: T) {
        self.set_at(value, Instant::now());
    }

    pub(crate) fn set_at(&mut self, value: T, now: Instant) {
        self.entry = Some(CacheEntry {
            value,
            expires_at: now + self.ttl,
        });
    }

    pub(crate) fn invalidate(&mut self) {
        self.entry = None;
    }
}
