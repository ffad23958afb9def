//! Handlers 模块

pub mod commands;
pub mod devices;
pub mod events;
pub mod metrics;

pub use commands::*;
pub use devices::*;
pub use events::*;
pub use metrics::*;

use axum::{Json, response::IntoResponse};

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "ok": true }))
}
