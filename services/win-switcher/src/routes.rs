//! 窗口 HTTP 接口：列表、缩略图、按窗口聚焦、按进程聚焦。

use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::{
        StatusCode,
        header::{CACHE_CONTROL, CONTENT_TYPE},
    },
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::{Value, json};
use toolbox_common::api::ApiError;
use tracing::{info, warn};

use crate::{
    native::{
        NativeError, PermissionStatus, WindowInfo, helper::HelperTransport,
        thumbnail::CaptureBackend,
    },
    state::AppState,
};

#[derive(Debug, Serialize)]
pub(crate) struct WindowsResponse {
    windows: Vec<WindowInfo>,
    permissions: PermissionStatus,
}

fn parse_window_id(raw: &str) -> Option<u32> {
    raw.trim().parse::<u32>().ok()
}

/// 请求体按 JSON 解析；非法 JSON 视为空对象，由字段校验给出 400。
fn json_body(body: &Bytes) -> Value {
    serde_json::from_slice(body).unwrap_or(Value::Null)
}

fn pid_field(body: &Value) -> Option<i32> {
    body.get("pid")
        .and_then(Value::as_i64)
        .and_then(|pid| i32::try_from(pid).ok())
}

async fn cached_permissions<H: HelperTransport, C: CaptureBackend>(
    state: &AppState<H, C>,
) -> PermissionStatus {
    let cached = state.permissions.read().await.get();
    if let Some(permissions) = cached {
        return permissions;
    }
    match state.bridge.check_permissions().await {
        Ok(permissions) => {
            state.permissions.write().await.set(permissions);
            permissions
        }
        Err(err) => {
            warn!("check permissions failed: {err}");
            PermissionStatus::default()
        }
    }
}

async fn cached_windows<H: HelperTransport, C: CaptureBackend>(
    state: &AppState<H, C>,
) -> Result<Vec<WindowInfo>, NativeError> {
    let cached = state.windows.read().await.get();
    if let Some(windows) = cached {
        return Ok(windows);
    }
    let windows = state.bridge.list_windows().await?;
    state.windows.write().await.set(windows.clone());
    Ok(windows)
}

/// `GET /api/windows`：权限查询失败按全 false 返回；窗口列表失败返回 500。
pub(crate) async fn list_windows_handler<H: HelperTransport, C: CaptureBackend>(
    State(state): State<AppState<H, C>>,
) -> Result<Json<WindowsResponse>, ApiError> {
    let permissions = cached_permissions(&state).await;
    let windows = cached_windows(&state).await.map_err(|err| {
        warn!("list windows failed: {err}");
        ApiError::internal("LIST_WINDOWS_FAILED", "Failed to list windows")
    })?;
    Ok(Json(WindowsResponse {
        windows,
        permissions,
    }))
}

/// `GET /api/windows/{id}/thumb`
pub(crate) async fn thumbnail_handler<H: HelperTransport, C: CaptureBackend>(
    State(state): State<AppState<H, C>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let Some(window_id) = parse_window_id(&id) else {
        return Err(ApiError::bad_request("INVALID_WINDOW_ID", "Invalid window id"));
    };
    let bytes = state
        .thumbnails
        .read(window_id)
        .await
        .map_err(|_| ApiError::not_found("THUMBNAIL_UNAVAILABLE", "Thumbnail unavailable"))?;
    Ok((
        [(CONTENT_TYPE, "image/png"), (CACHE_CONTROL, "no-store")],
        bytes,
    )
        .into_response())
}

/// `POST /api/windows/{id}/focus`：`ok:false` 原样以 404 返回。
pub(crate) async fn focus_window_handler<H: HelperTransport, C: CaptureBackend>(
    State(state): State<AppState<H, C>>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let body = json_body(&body);
    let window_id = parse_window_id(&id);
    let pid = pid_field(&body);
    let title = body.get("title").and_then(Value::as_str);
    let (Some(window_id), Some(pid), Some(title)) = (window_id, pid, title) else {
        return Err(ApiError::bad_request(
            "INVALID_FOCUS_REQUEST",
            "wid (url param), pid (number) and title (string) are required",
        ));
    };

    let outcome = state
        .bridge
        .focus_window(window_id, pid, title)
        .await
        .map_err(|err| {
            warn!(window_id, pid, "focus window failed: {err}");
            ApiError::internal("FOCUS_FAILED", "Failed to focus window")
        })?;
    if !outcome.ok {
        return Ok((StatusCode::NOT_FOUND, Json(outcome)).into_response());
    }
    // 聚焦会改变窗口层级，下一次列表应重新读取。
    state.windows.write().await.invalidate();
    if outcome.degraded == Some(true) {
        info!(window_id, pid, reason = ?outcome.reason, "window focused in degraded mode");
    }
    Ok(Json(outcome).into_response())
}

/// `POST /api/windows/focus-by-pid`：沿祖先链找到拥有窗口的应用再聚焦。
pub(crate) async fn focus_by_pid_handler<H: HelperTransport, C: CaptureBackend>(
    State(state): State<AppState<H, C>>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let body = json_body(&body);
    let Some(pid) = pid_field(&body) else {
        return Err(ApiError::bad_request(
            "INVALID_PID",
            "pid (number) is required",
        ));
    };
    let cwd = body
        .get("cwd")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|cwd| !cwd.is_empty());

    let owner = match state.bridge.find_window_owner_by_pid(pid, cwd).await {
        Ok(owner) => owner,
        Err(NativeError::NoTerminalWindow) => {
            return Err(ApiError::not_found(
                "NO_TERMINAL_WINDOW",
                "no_terminal_window",
            ));
        }
        Err(err) => {
            warn!(pid, "resolve window owner failed: {err}");
            return Err(ApiError::internal("LIST_FAILED", "list_failed"));
        }
    };

    if let Some(cwd) = cwd {
        return match state.bridge.focus_by_ancestor_cwd(pid, cwd).await {
            Ok(()) => Ok(Json(json!({ "ok": true }))),
            Err(NativeError::NoApplicationFound) => {
                Err(ApiError::not_found("NO_APP_FOUND", "no_app_found"))
            }
            Err(err) => {
                warn!(pid, cwd, "focus by cwd failed: {err}");
                Err(ApiError::internal("FOCUS_FAILED", "focus_failed"))
            }
        };
    }

    state
        .bridge
        .focus_window(owner.id, owner.pid, &owner.title)
        .await
        .map_err(|err| {
            warn!(pid, window_id = owner.id, "focus owner window failed: {err}");
            ApiError::internal("FOCUS_FAILED", "focus_failed")
        })?;
    state.windows.write().await.invalidate();
    Ok(Json(json!({
        "ok": true,
        "windowId": owner.id,
        "app": owner.app,
    })))
}

#[cfg(test)]
mod tests {
    use std::{path::Path, time::Duration};

    use axum::{
        Router,
        body::{Body, to_bytes},
        http::{
            Method, Request, StatusCode,
            header::{CACHE_CONTROL, CONTENT_TYPE},
        },
    };
    use serde_json::{Value, json};
    use tempfile::TempDir;
    use tower::ServiceExt;

    use crate::{
        app::build_router,
        cache::TtlCache,
        native::{
            NativeBridge, NativeError, testing::FakeHelper, thumbnail::CaptureBackend,
            thumbnail::ThumbnailCapturer,
        },
        state::AppState,
    };

    const WINDOWS: &str = r#"[
        {"id":11,"title":"zsh","app":"Terminal","pid":600,"x":0,"y":0,"width":800,"height":600,"onScreen":true},
        {"id":12,"title":"Inbox","app":"Mail","pid":700,"x":0,"y":0,"width":900,"height":700,"onScreen":true}
    ]"#;

    /// 写入固定字节的截图后端。
    struct StaticCapture;

    impl CaptureBackend for StaticCapture {
        async fn capture(&self, _window_id: u32, path: &Path) -> Result<(), NativeError> {
            std::fs::write(path, b"\x89PNG").map_err(|err| NativeError::Call(err.to_string()))
        }
    }

    struct Harness {
        router: Router,
        state: AppState<FakeHelper, StaticCapture>,
        _dir: TempDir,
    }

    fn harness(helper: FakeHelper) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::new(
            NativeBridge::new(helper),
            ThumbnailCapturer::new(StaticCapture, dir.path().to_path_buf(), Duration::from_secs(15), 4),
            TtlCache::new(Duration::from_secs(5)),
            TtlCache::new(Duration::from_secs(30)),
        );
        Harness {
            router: build_router(state.clone()),
            state,
            _dir: dir,
        }
    }

    async fn call(router: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(value) => {
                builder = builder.header(CONTENT_TYPE, "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };
        let response = router
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn list_is_served_from_cache_within_ttl() {
        let app = harness(
            FakeHelper::default()
                .reply("list", Ok(WINDOWS))
                .reply(
                    "check-permissions",
                    Ok(r#"{"accessibility":true,"screenRecording":true}"#),
                ),
        );

        let (status, body) = call(&app.router, Method::GET, "/api/windows", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["windows"].as_array().unwrap().len(), 2);
        assert_eq!(body["permissions"]["screenRecording"], true);

        let (status, _) = call(&app.router, Method::GET, "/api/windows", None).await;
        assert_eq!(status, StatusCode::OK);
        let helper = app.state.bridge.helper();
        assert_eq!(helper.call_count("list"), 1);
        assert_eq!(helper.call_count("check-permissions"), 1);
    }

    #[tokio::test]
    async fn list_failure_is_500_and_permission_failure_degrades() {
        let app = harness(
            FakeHelper::default()
                .reply("list", Err(NativeError::Timeout(10_000)))
                .reply("check-permissions", Err(NativeError::Call("denied".to_string()))),
        );
        let (status, body) = call(&app.router, Method::GET, "/api/windows", None).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["ok"], false);
        assert_eq!(body["error"], "Failed to list windows");
        // 权限失败不缓存。
        assert!(app.state.permissions.read().await.get().is_none());
    }

    #[tokio::test]
    async fn thumbnail_is_png_without_caching_headers() {
        let app = harness(FakeHelper::default());
        let response = app
            .router
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/windows/42/thumb")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_TYPE], "image/png");
        assert_eq!(response.headers()[CACHE_CONTROL], "no-store");

        let (status, body) = call(&app.router, Method::GET, "/api/windows/abc/thumb", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid window id");
    }

    #[tokio::test]
    async fn focus_validates_and_maps_helper_result() {
        let app = harness(FakeHelper::default().reply(
            "focus",
            Ok(r#"{"ok":false,"error":"window_not_found"}"#),
        ));

        let (status, _) = call(
            &app.router,
            Method::POST,
            "/api/windows/12/focus",
            Some(json!({ "pid": "700", "title": "Inbox" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = call(
            &app.router,
            Method::POST,
            "/api/windows/12/focus",
            Some(json!({ "pid": 700, "title": "Inbox" })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({ "ok": false, "error": "window_not_found" }));
    }

    #[tokio::test]
    async fn degraded_focus_is_success() {
        let app = harness(FakeHelper::default().reply(
            "focus",
            Ok(r#"{"ok":true,"degraded":true,"reason":"no_accessibility"}"#),
        ));
        let (status, body) = call(
            &app.router,
            Method::POST,
            "/api/windows/12/focus",
            Some(json!({ "pid": 700, "title": "Inbox" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["degraded"], true);
        assert_eq!(body["reason"], "no_accessibility");
    }

    #[tokio::test]
    async fn focus_by_pid_requires_numeric_pid() {
        let app = harness(FakeHelper::default());
        let (status, body) = call(
            &app.router,
            Method::POST,
            "/api/windows/focus-by-pid",
            Some(json!({ "cwd": "/tmp" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "pid (number) is required");
    }

    #[tokio::test]
    async fn focus_by_pid_without_owner_is_404() {
        let app = harness(FakeHelper::default().reply("list", Ok("[]")));
        let pid = std::process::id() as i64;
        let (status, body) = call(
            &app.router,
            Method::POST,
            "/api/windows/focus-by-pid",
            Some(json!({ "pid": pid })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "no_terminal_window");
    }

    #[tokio::test]
    async fn focus_by_pid_focuses_the_parent_window() {
        let parent = std::os::unix::process::parent_id() as i32;
        if parent <= 1 {
            return;
        }
        let windows = json!([{
            "id": 31, "title": "cargo", "app": "Terminal", "pid": parent,
            "x": 0, "y": 0, "width": 800, "height": 600, "onScreen": true
        }])
        .to_string();
        let helper = FakeHelper::default()
            .reply("list", Ok(windows.as_str()))
            .reply("focus", Ok(r#"{"ok":true}"#))
            .reply("focus-by-cwd", Ok(r#"{"ok":false,"error":"no_app_found"}"#));
        let app = harness(helper);
        let pid = std::process::id() as i64;

        let (status, body) = call(
            &app.router,
            Method::POST,
            "/api/windows/focus-by-pid",
            Some(json!({ "pid": pid })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "ok": true, "windowId": 31, "app": "Terminal" }));

        let (status, body) = call(
            &app.router,
            Method::POST,
            "/api/windows/focus-by-pid",
            Some(json!({ "pid": pid, "cwd": "/work/crate" })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "no_app_found");

        let calls = app.state.bridge.helper().calls.lock().unwrap().clone();
        assert!(calls.contains(&vec![
            "focus-by-cwd".to_string(),
            pid.to_string(),
            "/work/crate".to_string(),
        ]));
    }

    #[tokio::test]
    async fn health_is_ok() {
        let app = harness(FakeHelper::default());
        let (status, body) = call(&app.router, Method::GET, "/api/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "ok": true }));
    }
}
