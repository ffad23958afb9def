//! HTTP 错误响应与 DTO 转换

use api_contract::{ApiResponse, DeviceDto};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use domain::DeviceRecord;
use irrigation_pipeline::PipelineError;
use irrigation_storage::StorageError;

/// 错误请求响应
pub fn bad_request_error(message: impl Into<String>) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ApiResponse::<()>::error("INVALID.REQUEST", message.into())),
    )
        .into_response()
}

/// 资源未找到错误响应
pub fn not_found_error(message: impl Into<String>) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(ApiResponse::<()>::error("RESOURCE.NOT_FOUND", message.into())),
    )
        .into_response()
}

/// 存储错误响应（未注册设备映射为 404）
pub fn storage_error(err: StorageError) -> Response {
    if err.is_not_found() {
        return not_found_error(err.to_string());
    }
    internal_error(err.to_string())
}

/// 事件流写入失败（已满或已关闭）
pub fn pipeline_error(err: PipelineError) -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(ApiResponse::<()>::error("PIPELINE.UNAVAILABLE", err.to_string())),
    )
        .into_response()
}

pub fn internal_error(message: impl Into<String>) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ApiResponse::<()>::error("INTERNAL.ERROR", message.into())),
    )
        .into_response()
}

/// DeviceRecord 转 DeviceDto
pub fn device_to_dto(record: DeviceRecord) -> DeviceDto {
    DeviceDto {
        device_id: record.device_id,
        address: record.address.ip().to_string(),
        port: record.address.port(),
        last_seen_at_ms: record.last_seen_at_ms,
    }
}
