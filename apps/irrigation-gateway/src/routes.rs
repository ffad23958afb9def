//! 路由定义
//!
//! - 健康检查：/health
//! - 设备：/api/devices, /api/devices/{device_id}
//! - 最近上报：/api/sensors/last
//! - 事件回放：/api/events
//! - 命令注入：/api/commands
//! - 指标：/api/metrics

use super::AppState;
use super::handlers::*;
use super::middleware::request_context;
use axum::{
    Router, middleware,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/devices", get(list_devices))
        .route("/api/devices/:device_id", get(get_device))
        .route("/api/sensors/last", get(get_last_report))
        .route("/api/events", get(list_events))
        .route("/api/commands", post(submit_command))
        .route("/api/metrics", get(get_metrics))
        .with_state(state)
        .layer(middleware::from_fn(request_context))
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use domain::{CommandOutcome, DeviceRecord, OutboundEvent};
    use http_body_util::BodyExt;
    use irrigation_pipeline::EventBus;
    use irrigation_storage::{
        DeviceRegistry, InMemoryDeviceRegistry, InMemoryReportCache,
    };
    use serde_json::Value;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn state() -> AppState {
        AppState {
            registry: Arc::new(InMemoryDeviceRegistry::new()),
            cache: Arc::new(InMemoryReportCache::new()),
            bus: EventBus::new(16),
        }
    }

    async fn send(state: &AppState, request: Request<Body>) -> (StatusCode, Value) {
        let response = create_router(state.clone())
            .oneshot(request)
            .await
            .expect("response");
        let status = response.status();
        assert!(response.headers().contains_key("x-request-id"));
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body")
            .to_bytes();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).expect("request")
    }

    #[tokio::test]
    async fn health_is_ok() {
        let (status, body) = send(&state(), get("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], true);
    }

    #[tokio::test]
    async fn devices_are_listed_and_looked_up() {
        let state = state();
        state
            .registry
            .register(DeviceRecord::new(
                "dev1",
                "10.0.0.5:5001".parse().expect("addr"),
                42,
            ))
            .await
            .expect("register");

        let (status, body) = send(&state, get("/api/devices")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"][0]["deviceId"], "dev1");
        assert_eq!(body["data"][0]["port"], 5001);

        let (status, body) = send(&state, get("/api/devices/dev1")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["address"], "10.0.0.5");

        let (status, body) = send(&state, get("/api/devices/ghost")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "RESOURCE.NOT_FOUND");
    }

    #[tokio::test]
    async fn last_report_is_missing_until_first_report() {
        let (status, body) = send(&state(), get("/api/sensors/last")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn command_is_enqueued() {
        let state = state();
        let request = Request::builder()
            .method("POST")
            .uri("/api/commands")
            .body(Body::from(r#"{"deviceId":"dev1","action":"OPEN_VALVE_1"}"#))
            .expect("request");
        let (status, body) = send(&state, request).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["data"]["seq"], 1);

        let queued = state.bus.commands.read_from(1, 1);
        assert_eq!(queued[0].value.device_id, "dev1");
        assert_eq!(
            queued[0].value.payload,
            r#"{"deviceId":"dev1","action":"OPEN_VALVE_1"}"#
        );
    }

    #[tokio::test]
    async fn invalid_command_is_rejected() {
        let state = state();
        let request = Request::builder()
            .method("POST")
            .uri("/api/commands")
            .body(Body::from(r#"{"action":"OPEN"}"#))
            .expect("request");
        let (status, _) = send(&state, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(state.bus.commands.is_empty());
    }

    #[tokio::test]
    async fn closed_command_stream_is_unavailable() {
        let state = state();
        state.bus.close();
        let request = Request::builder()
            .method("POST")
            .uri("/api/commands")
            .body(Body::from(r#"{"deviceId":"dev1"}"#))
            .expect("request");
        let (status, body) = send(&state, request).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"]["code"], "PIPELINE.UNAVAILABLE");
    }

    #[tokio::test]
    async fn events_are_paged_by_sequence() {
        let state = state();
        for device in ["dev1", "dev2", "dev3"] {
            state
                .bus
                .reports
                .publish(OutboundEvent::Command(CommandOutcome::acked(device, "OK")))
                .expect("publish");
        }

        let (status, body) = send(&state, get("/api/events?from=2&limit=1")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["total"], 3);
        assert_eq!(body["data"]["nextSeq"], 3);
        let event = &body["data"]["events"][0];
        assert_eq!(event["seq"], 2);
        assert_eq!(event["kind"], "command_ack");
        assert_eq!(event["deviceId"], "dev2");
        assert_eq!(event["payload"]["type"], "command_ack");

        let (_, body) = send(&state, get("/api/events?from=10")).await;
        assert_eq!(body["data"]["events"].as_array().map(Vec::len), Some(0));
        assert_eq!(body["data"]["nextSeq"], 10);
    }

    #[tokio::test]
    async fn metrics_include_stream_lengths() {
        let state = state();
        state
            .bus
            .commands
            .publish(domain::Command::new("dev1", "{}"))
            .expect("publish");
        let (status, body) = send(&state, get("/api/metrics")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["commandsStreamLen"], 1);
        assert_eq!(body["data"]["reportsStreamLen"], 0);
    }
}
