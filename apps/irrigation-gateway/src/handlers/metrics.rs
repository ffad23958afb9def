//! 计数指标快照
//!
//! - GET /api/metrics

use crate::AppState;
use api_contract::{ApiResponse, MetricsSnapshotDto};
use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use irrigation_telemetry::metrics;

pub async fn get_metrics(State(state): State<AppState>) -> Response {
    let snapshot = metrics().snapshot();
    (
        StatusCode::OK,
        Json(ApiResponse::success(MetricsSnapshotDto {
            inbound_requests: snapshot.inbound_requests,
            decode_failures: snapshot.decode_failures,
            registrations: snapshot.registrations,
            reports_ingested: snapshot.reports_ingested,
            event_publish_failures: snapshot.event_publish_failures,
            bus_publish_success: snapshot.bus_publish_success,
            bus_publish_failures: snapshot.bus_publish_failures,
            commands_received: snapshot.commands_received,
            commands_rejected: snapshot.commands_rejected,
            commands_acked: snapshot.commands_acked,
            commands_resolve_failed: snapshot.commands_resolve_failed,
            commands_timed_out: snapshot.commands_timed_out,
            commands_dispatch_failed: snapshot.commands_dispatch_failed,
            dispatch_latency_ms_total: snapshot.dispatch_latency_ms_total,
            dispatch_latency_ms_count: snapshot.dispatch_latency_ms_count,
            reports_stream_len: state.bus.reports.len(),
            commands_stream_len: state.bus.commands.len(),
        })),
    )
        .into_response()
}
