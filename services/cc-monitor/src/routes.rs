//! 会话采集 HTTP 接口：hook 事件入口、会话查询、hook 安装状态。

use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use toolbox_common::api::{ApiError, ok_empty};
use toolbox_protocol::ApiEnvelope;
use tracing::debug;

use crate::{
    collector::{HookEvent, SessionRecord, SessionStats, SessionSummary},
    hooks::hooks_installed,
    state::AppState,
};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SessionsQuery {
    #[serde(default)]
    include_ended: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct SessionsResponse {
    ok: bool,
    data: Vec<SessionSummary>,
    stats: SessionStats,
}

#[derive(Debug, Serialize)]
pub(crate) struct HooksStatus {
    installed: bool,
}

/// `GET /api/health`：cc-monitor 沿用 `{status:"ok"}` 形态。
pub(crate) async fn health_handler() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// `POST /api/events`：hook 只管投递，任何输入都回 `{ok:true}`。
pub(crate) async fn ingest_event_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> Json<ApiEnvelope<()>> {
    match serde_json::from_slice::<HookEvent>(&body) {
        Ok(event) => {
            let accepted = state
                .sessions
                .write()
                .await
                .handle_event(&event, Utc::now());
            if !accepted {
                debug!("hook event without session_id or hook_event_name dropped");
            }
        }
        Err(err) => debug!("unparsable hook event dropped: {err}"),
    }
    ok_empty()
}

/// `GET /api/sessions?includeEnded=true`
pub(crate) async fn list_sessions_handler(
    State(state): State<AppState>,
    Query(query): Query<SessionsQuery>,
) -> Json<SessionsResponse> {
    let include_ended = query.include_ended.as_deref() == Some("true");
    let manager = state.sessions.read().await;
    Json(SessionsResponse {
        ok: true,
        data: manager.summaries(include_ended),
        stats: manager.stats(),
    })
}

/// `GET /api/sessions/{sessionId}`：完整记录，含事件日志。
pub(crate) async fn get_session_handler(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<ApiEnvelope<SessionRecord>>, ApiError> {
    let manager = state.sessions.read().await;
    let Some(record) = manager.get_by_id(&session_id) else {
        return Err(ApiError::not_found("SESSION_NOT_FOUND", "Session not found"));
    };
    Ok(Json(ApiEnvelope::ok(Some(record.clone()))))
}

/// `GET /api/hooks/status`
pub(crate) async fn hooks_status_handler(
    State(state): State<AppState>,
) -> Json<ApiEnvelope<HooksStatus>> {
    let installed = hooks_installed(&state.hooks.settings_path, &state.hooks.monitor_url).await;
    Json(ApiEnvelope::ok(Some(HooksStatus { installed })))
}
