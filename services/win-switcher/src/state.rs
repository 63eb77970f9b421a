//! win-switcher 共享状态：原生桥接、缩略图采集器与两个 TTL 缓存。

use std::sync::Arc;

use tokio::sync::RwLock;

use crate::{
    cache::TtlCache,
    native::{
        NativeBridge, PermissionStatus, WindowInfo,
        helper::{HelperTransport, SwiftHelper},
        thumbnail::{CaptureBackend, ScreenCapture, ThumbnailCapturer},
    },
};

pub(crate) struct AppState<H: HelperTransport = SwiftHelper, C: CaptureBackend = ScreenCapture> {
    pub(crate) bridge: Arc<NativeBridge<H>>,
    pub(crate) thumbnails: Arc<ThumbnailCapturer<C>>,
    pub(crate) windows: Arc<RwLock<TtlCache<Vec<WindowInfo>>>>,
    pub(crate) permissions: Arc<RwLock<TtlCache<PermissionStatus>>>,
}

// 字段全是 Arc，不要求 H/C 本身可 Clone。
impl<H: HelperTransport, C: CaptureBackend> Clone for AppState<H, C> {
    fn clone(&self) -> Self {
        Self {
            bridge: self.bridge.clone(),
            thumbnails: self.thumbnails.clone(),
            windows: self.windows.clone(),
            permissions: self.permissions.clone(),
        }
    }
}

impl<H: HelperTransport, C: CaptureBackend> AppState<H, C> {
    pub(crate) fn new(
        bridge: NativeBridge<H>,
        thumbnails: ThumbnailCapturer<C>,
        windows: TtlCache<Vec<WindowInfo>>,
        permissions: TtlCache<PermissionStatus>,
    ) -> Self {
        Self {
            bridge: Arc::new(bridge),
            thumbnails: Arc::new(thumbnails),
            windows: Arc::new(RwLock::new(windows)),
            permissions: Arc::new(RwLock::new(permissions)),
        }
    }
}
