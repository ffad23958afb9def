//! 稳定的 DTO 与 API 响应契约。

use serde::Serialize;

/// 标准 API 响应封装。
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<ApiError>,
}

/// 失败响应的错误体。
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ApiError {
                code: code.into(),
                message: message.into(),
            }),
        }
    }
}

/// 已注册设备。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceDto {
    pub device_id: String,
    pub address: String,
    pub port: u16,
    pub last_seen_at_ms: i64,
}

/// 上报流中的一条事件。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDto {
    pub seq: u64,
    /// state / command_ack / command_error
    pub kind: String,
    pub device_id: Option<String>,
    /// 事件的原始对外形状
    pub payload: serde_json::Value,
}

/// 事件分页。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPageDto {
    pub events: Vec<EventDto>,
    /// 下一页起始序号
    pub next_seq: u64,
    pub total: u64,
}

/// 命令已入队。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandAcceptedDto {
    pub seq: u64,
    pub device_id: String,
}

/// 计数指标快照。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshotDto {
    pub inbound_requests: u64,
    pub decode_failures: u64,
    pub registrations: u64,
    pub reports_ingested: u64,
    pub event_publish_failures: u64,
    pub bus_publish_success: u64,
    pub bus_publish_failures: u64,
    pub commands_received: u64,
    pub commands_rejected: u64,
    pub commands_acked: u64,
    pub commands_resolve_failed: u64,
    pub commands_timed_out: u64,
    pub commands_dispatch_failed: u64,
    pub dispatch_latency_ms_total: u64,
    pub dispatch_latency_ms_count: u64,
    pub reports_stream_len: u64,
    pub commands_stream_len: u64,
}
