//! 窗口缩略图：按窗口 id 落盘 PNG，15 秒内复用；截图子进程全局限流，失败时回退旧文件。

use std::{
    future::Future,
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};

use tokio::{process::Command, sync::Semaphore, time::timeout};
use tracing::debug;

use super::NativeError;

/// 截图后端；测试中以假实现替换 `screencapture`。
pub trait CaptureBackend: Send + Sync + 'static {
    fn capture(
        &self,
        window_id: u32,
        path: &Path,
    ) -> impl Future<Output = Result<(), NativeError>> + Send;
}

/// macOS `screencapture -l <wid> -x -t png <file>`。
#[derive(Debug, Clone)]
pub struct ScreenCapture {
    timeout: Duration,
}

impl ScreenCapture {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl CaptureBackend for ScreenCapture {
    async fn capture(&self, window_id: u32, path: &Path) -> Result<(), NativeError> {
        let mut command = Command::new("screencapture");
        command
            .arg("-l")
            .arg(window_id.to_string())
            .args(["-x", "-t", "png"])
            .arg(path);
        let output = timeout(self.timeout, command.output())
            .await
            .map_err(|_| NativeError::Timeout(self.timeout.as_millis() as u64))?
            .map_err(|err| NativeError::Call(format!("spawn screencapture failed: {err}")))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let short = stderr
                .lines()
                .next()
                .unwrap_or("screencapture failed")
                .trim();
            return Err(NativeError::Call(short.to_string()));
        }
        Ok(())
    }
}

/// 缩略图采集器：TTL 复用 + 公平信号量限流 + 旧文件回退。
pub struct ThumbnailCapturer<C: CaptureBackend = ScreenCapture> {
    backend: C,
    dir: PathBuf,
    ttl: Duration,
    limiter: Semaphore,
}

impl<C: CaptureBackend> ThumbnailCapturer<C> {
    pub fn new(backend: C, dir: PathBuf, ttl: Duration, max_parallel: usize) -> Self {
        Self {
            backend,
            dir,
            ttl,
            limiter: Semaphore::new(max_parallel.max(1)),
        }
    }

    pub fn thumb_path(&self, window_id: u32) -> PathBuf {
        self.dir.join(format!("thumb-{window_id}.png"))
    }

    /// 返回可用缩略图路径；无新截图也无旧文件时返回 `ThumbnailUnavailable`。
    pub async fn capture(&self, window_id: u32) -> Result<PathBuf, NativeError> {
        let path = self.thumb_path(window_id);
        if self.is_fresh(&path).await {
            return Ok(path);
        }

        let _permit = self
            .limiter
            .acquire()
            .await
            .map_err(|_| NativeError::ThumbnailUnavailable)?;
        // 排队期间同一窗口可能已被其他请求截好。
        if self.is_fresh(&path).await {
            return Ok(path);
        }
        if let Err(err) = tokio::fs::create_dir_all(&self.dir).await {
            debug!("create thumbnail dir {} failed: {err}", self.dir.display());
        }

        match self.backend.capture(window_id, &path).await {
            Ok(()) if path_exists(&path).await => Ok(path),
            Ok(()) => Err(NativeError::ThumbnailUnavailable),
            Err(err) => {
                debug!(window_id, "thumbnail capture failed: {err}");
                if path_exists(&path).await {
                    Ok(path)
                } else {
                    Err(NativeError::ThumbnailUnavailable)
                }
            }
        }
    }

    /// 采集并读出 PNG 字节。
    pub async fn read(&self, window_id: u32) -> Result<Vec<u8>, NativeError> {
        let path = self.capture(window_id).await?;
        tokio::fs::read(&path)
            .await
            .map_err(|_| NativeError::ThumbnailUnavailable)
    }

    async fn is_fresh(&self, path: &Path) -> bool {
        let Ok(metadata) = tokio::fs::metadata(path).await else {
            return false;
        };
        let Ok(modified) = metadata.modified() else {
            return false;
        };
        match SystemTime::now().duration_since(modified) {
            Ok(age) => age < self.ttl,
            // mtime 在未来（时钟回拨）时按新鲜处理。
            Err(_) => true,
        }
    }
}

async fn path_exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use std::{
        fs,
        path::Path,
        sync::{
            Arc, Mutex,
            atomic::{AtomicUsize, Ordering},
        },
        time::{Duration, SystemTime},
    };

    use tokio::sync::Semaphore;

    use super::{CaptureBackend, ThumbnailCapturer};
    use crate::native::NativeError;

    #[derive(Default)]
    struct FakeCapture {
        fail: bool,
        calls: AtomicUsize,
    }

    impl CaptureBackend for Arc<FakeCapture> {
        async fn capture(&self, _window_id: u32, path: &Path) -> Result<(), NativeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(NativeError::Call("window is minimized".to_string()));
            }
            fs::write(path, b"png").map_err(|err| NativeError::Call(err.to_string()))
        }
    }

    /// 截图在 `release` 放行前一直挂起，用于观察限流与排队顺序。
    struct GatedCapture {
        started: Mutex<Vec<u32>>,
        in_flight: AtomicUsize,
        release: Semaphore,
    }

    impl GatedCapture {
        fn new() -> Self {
            Self {
                started: Mutex::new(Vec::new()),
                in_flight: AtomicUsize::new(0),
                release: Semaphore::new(0),
            }
        }

        fn started(&self) -> Vec<u32> {
            self.started.lock().unwrap().clone()
        }
    }

    impl CaptureBackend for Arc<GatedCapture> {
        async fn capture(&self, window_id: u32, path: &Path) -> Result<(), NativeError> {
            self.in_flight.fetch_add(1, Ordering::SeqCst);
            self.started.lock().unwrap().push(window_id);
            self.release.acquire().await.unwrap().forget();
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            fs::write(path, b"png").map_err(|err| NativeError::Call(err.to_string()))
        }
    }

    async fn wait_until(condition: impl Fn() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached within 5s");
    }

    #[tokio::test]
    async fn concurrent_captures_respect_the_cap() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(GatedCapture::new());
        let capturer = Arc::new(ThumbnailCapturer::new(
            backend.clone(),
            dir.path().to_path_buf(),
            Duration::from_secs(15),
            4,
        ));
        let spawn = |id: u32| {
            let capturer = capturer.clone();
            tokio::spawn(async move { capturer.capture(id).await })
        };

        let mut tasks = (1..=4).map(&spawn).collect::<Vec<_>>();
        wait_until(|| backend.in_flight.load(Ordering::SeqCst) == 4).await;
        tasks.push(spawn(5));
        tokio::time::sleep(Duration::from_millis(50)).await;
        tasks.push(spawn(6));
        tokio::time::sleep(Duration::from_millis(50)).await;

        // 第 5、6 个请求在限流处排队，后端仍只有 4 个截图。
        assert_eq!(backend.in_flight.load(Ordering::SeqCst), 4);
        assert_eq!(backend.started().len(), 4);

        backend.release.add_permits(1);
        wait_until(|| backend.started().len() == 5).await;
        assert_eq!(backend.in_flight.load(Ordering::SeqCst), 4);

        backend.release.add_permits(5);
        for task in tasks {
            assert!(task.await.unwrap().is_ok());
        }
        let started = backend.started();
        assert_eq!(started.len(), 6);
        assert_eq!(started[4..], [5, 6]);
    }

    #[tokio::test]
    async fn fresh_file_is_reused_without_capture() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(FakeCapture::default());
        let capturer =
            ThumbnailCapturer::new(backend.clone(), dir.path().to_path_buf(), Duration::from_secs(15), 4);
        fs::write(capturer.thumb_path(7), b"cached").unwrap();

        let bytes = capturer.read(7).await.unwrap();

        assert_eq!(bytes, b"cached");
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failed_capture_falls_back_to_stale_file() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(FakeCapture {
            fail: true,
            ..FakeCapture::default()
        });
        let capturer =
            ThumbnailCapturer::new(backend.clone(), dir.path().to_path_buf(), Duration::from_secs(15), 4);
        let stale = capturer.thumb_path(9);
        fs::write(&stale, b"old").unwrap();
        fs::File::options()
            .write(true)
            .open(&stale)
            .unwrap()
            .set_modified(SystemTime::now() - Duration::from_secs(60))
            .unwrap();

        assert_eq!(capturer.read(9).await.unwrap(), b"old");
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);

        assert!(matches!(
            capturer.capture(10).await,
            Err(NativeError::ThumbnailUnavailable)
        ));
    }
}
