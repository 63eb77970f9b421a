//! HTTP 响应约定：统一 `{ ok, data?, code?, error? }` 包裹与错误转换。

use axum::{
    Json,
    http::{Method, StatusCode, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use toolbox_protocol::ApiEnvelope;
use tower_http::cors::{Any, CorsLayer};

/// 接口错误：状态码 + 机器可读 code + 人类可读描述。
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    /// 400：请求字段缺失或非法。
    pub fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, code, message)
    }

    /// 404：目标不存在，调用方不应重试。
    pub fn not_found(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, code, message)
    }

    /// 500：外部依赖（原生助手、存储）失败。
    pub fn internal(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, code, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ApiEnvelope::<()>::failure(self.code, self.message)),
        )
            .into_response()
    }
}

/// 构造成功响应。
pub fn ok_response<T: Serialize>(
    status: StatusCode,
    data: Option<T>,
) -> (StatusCode, Json<ApiEnvelope<T>>) {
    (status, Json(ApiEnvelope::ok(data)))
}

/// 无 data 的 `{ok:true}`。
pub fn ok_empty() -> Json<ApiEnvelope<()>> {
    Json(ApiEnvelope::ok(None))
}

/// 所有服务共用的 CORS：小组件以 iframe 形式嵌在其他端口下。
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([CONTENT_TYPE])
}

/// 健康检查接口，供 portal 主动探测。
pub async fn health_handler() -> Json<ApiEnvelope<()>> {
    ok_empty()
}
