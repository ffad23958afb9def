//! 命令注入
//!
//! - POST /api/commands：请求体与持久总线上的命令文档相同（至少包含 `deviceId`），
//!   解码后追加到命令流，由命令桥接按顺序下发。结果出现在上报流中。

use crate::AppState;
use crate::utils::response::{bad_request_error, pipeline_error};
use api_contract::{ApiResponse, CommandAcceptedDto};
use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use irrigation_normalize::decode_command;
use irrigation_telemetry::{record_command_rejected, record_event_publish_failure};
use tracing::{info, warn};

pub async fn submit_command(State(state): State<AppState>, body: Bytes) -> Response {
    let command = match decode_command(&body) {
        Ok(command) => command,
        Err(err) => {
            record_command_rejected();
            warn!(target: "irrigation.gateway", error = %err, "http_command_invalid");
            return bad_request_error(err.to_string());
        }
    };
    let device_id = command.device_id.clone();
    match state.bus.commands.publish(command) {
        Ok(seq) => {
            info!(target: "irrigation.gateway", device_id = %device_id, seq, "http_command_enqueued");
            (
                StatusCode::ACCEPTED,
                Json(ApiResponse::success(CommandAcceptedDto { seq, device_id })),
            )
                .into_response()
        }
        Err(err) => {
            record_event_publish_failure();
            warn!(target: "irrigation.gateway", device_id = %device_id, error = %err, "http_command_enqueue_failed");
            pipeline_error(err)
        }
    }
}
