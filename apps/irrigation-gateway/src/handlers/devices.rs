//! 设备与最近上报查询
//!
//! - GET /api/devices - 列出已注册设备
//! - GET /api/devices/{device_id} - 查询单个设备
//! - GET /api/sensors/last - 最近一条状态上报

use crate::AppState;
use crate::utils::response::{device_to_dto, internal_error, not_found_error, storage_error};
use api_contract::ApiResponse;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};

#[derive(serde::Deserialize)]
pub struct DevicePath {
    device_id: String,
}

pub async fn list_devices(State(state): State<AppState>) -> Response {
    match state.registry.list().await {
        Ok(items) => {
            let data: Vec<_> = items.into_iter().map(device_to_dto).collect();
            (StatusCode::OK, Json(ApiResponse::success(data))).into_response()
        }
        Err(err) => storage_error(err),
    }
}

pub async fn get_device(State(state): State<AppState>, Path(path): Path<DevicePath>) -> Response {
    match state.registry.lookup(&path.device_id).await {
        Ok(record) => (
            StatusCode::OK,
            Json(ApiResponse::success(device_to_dto(record))),
        )
            .into_response(),
        Err(err) => storage_error(err),
    }
}

pub async fn get_last_report(State(state): State<AppState>) -> Response {
    match state.cache.get_last().await {
        Ok(Some(cached)) => match serde_json::to_value(&cached.report) {
            Ok(report) => (StatusCode::OK, Json(ApiResponse::success(report))).into_response(),
            Err(err) => internal_error(err.to_string()),
        },
        Ok(None) => not_found_error("no state report received yet"),
        Err(err) => storage_error(err),
    }
}
