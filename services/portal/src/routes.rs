//! 注册表 HTTP 接口：注册、心跳、查询、删除。

use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
};
use chrono::Utc;
use toolbox_common::api::{ApiError, ok_empty, ok_response};
use toolbox_protocol::{ApiEnvelope, ToolManifest, ToolRecord};
use tracing::{info, warn};

use crate::{
    registry::{pm2::pm2_status, store::StoreError},
    state::AppState,
};

const MISSING_FIELDS_MESSAGE: &str = "Missing required fields: name, url";

/// 存储错误转接口错误；清单不完整属于调用方错误。
fn store_error(err: StoreError) -> ApiError {
    match err {
        StoreError::IncompleteManifest => {
            ApiError::bad_request("MISSING_FIELDS", MISSING_FIELDS_MESSAGE)
        }
        other => {
            warn!("tool store failed: {other}");
            ApiError::internal("STORE_ERROR", other.to_string())
        }
    }
}

fn tool_not_found(name: &str) -> ApiError {
    ApiError::not_found("TOOL_NOT_FOUND", format!("Tool '{name}' not found"))
}

/// `POST /api/tools/register`：按 name upsert，新建 201，更新 200。
pub(crate) async fn register_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<ApiEnvelope<ToolRecord>>), ApiError> {
    let manifest = serde_json::from_slice::<ToolManifest>(&body)
        .map_err(|err| ApiError::bad_request("INVALID_BODY", format!("invalid body: {err}")))?;
    if !manifest.is_complete() {
        return Err(ApiError::bad_request(
            "MISSING_FIELDS",
            MISSING_FIELDS_MESSAGE,
        ));
    }

    let outcome = state
        .store
        .upsert_remote(&manifest, Utc::now())
        .map_err(store_error)?;
    let status = if outcome.created {
        info!(tool = %outcome.record.name, url = %outcome.record.url, "tool registered");
        StatusCode::CREATED
    } else {
        info!(tool = %outcome.record.name, url = %outcome.record.url, "tool re-registered");
        StatusCode::OK
    };
    Ok(ok_response(status, Some(outcome.record)))
}

/// `PUT /api/tools/{name}/heartbeat`：未注册返回 404，不建行。
pub(crate) async fn heartbeat_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<ApiEnvelope<()>>, ApiError> {
    let found = state
        .store
        .record_heartbeat(&name, Utc::now())
        .map_err(store_error)?;
    if !found {
        return Err(tool_not_found(&name));
    }
    Ok(ok_empty())
}

/// `GET /api/tools`：按创建时间升序列出。
pub(crate) async fn list_tools_handler(
    State(state): State<AppState>,
) -> Result<Json<ApiEnvelope<Vec<ToolRecord>>>, ApiError> {
    let tools = state.store.list().map_err(store_error)?;
    Ok(Json(ApiEnvelope::ok(Some(tools))))
}

/// `GET /api/tools/{name}`：声明了进程名时附带 PM2 状态。
pub(crate) async fn get_tool_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<ApiEnvelope<ToolRecord>>, ApiError> {
    let Some(mut record) = state.store.get(&name).map_err(store_error)? else {
        return Err(tool_not_found(&name));
    };
    if let Some(process_name) = record.process_manager_name.clone() {
        let status = pm2_status(&state.pm2.bin, &process_name, state.pm2.timeout).await;
        record.pm2_status = Some(status);
    }
    Ok(Json(ApiEnvelope::ok(Some(record))))
}

/// `DELETE /api/tools/{name}`：显式管理删除。
pub(crate) async fn delete_tool_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<ApiEnvelope<()>>, ApiError> {
    if !state.store.delete(&name).map_err(store_error)? {
        return Err(tool_not_found(&name));
    }
    info!(tool = %name, "tool deleted");
    Ok(ok_empty())
}
