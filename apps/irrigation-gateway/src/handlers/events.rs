//! 上报流回放（分页）
//!
//! - GET /api/events?from=1&limit=100

use crate::AppState;
use crate::utils::response::internal_error;
use api_contract::{ApiResponse, EventDto, EventPageDto};
use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};

const DEFAULT_LIMIT: usize = 100;
const MAX_LIMIT: usize = 1000;

#[derive(Debug, Default, serde::Deserialize)]
pub struct EventQuery {
    from: Option<u64>,
    limit: Option<usize>,
}

pub async fn list_events(State(state): State<AppState>, Query(query): Query<EventQuery>) -> Response {
    let from = query.from.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let entries = state.bus.reports.read_from(from, limit);

    let mut events = Vec::with_capacity(entries.len());
    for entry in entries {
        let payload = match serde_json::to_value(entry.value.as_ref()) {
            Ok(payload) => payload,
            Err(err) => return internal_error(err.to_string()),
        };
        events.push(EventDto {
            seq: entry.seq,
            kind: entry.value.kind().to_string(),
            device_id: entry.value.device_id().map(str::to_string),
            payload,
        });
    }
    let next_seq = events.last().map(|event| event.seq + 1).unwrap_or(from);
    let page = EventPageDto {
        events,
        next_seq,
        total: state.bus.reports.len(),
    };
    (StatusCode::OK, Json(ApiResponse::success(page))).into_response()
}
