//! 网关 CoAP 资源。

use crate::BusPublisher;
use async_trait::async_trait;
use domain::{DeviceRecord, OutboundEvent, StateReport, now_epoch_ms};
use irrigation_normalize::{decode_device_id, decode_state_report, encode_state_report};
use irrigation_pipeline::EventLog;
use irrigation_protocol::{Code, InboundRequest, Method, OutboundResponse, RequestHandler};
use irrigation_storage::{CachedReport, DeviceRegistry, ReportCache};
use irrigation_telemetry::{
    record_bus_publish_failure, record_bus_publish_success, record_decode_failure,
    record_event_publish_failure, record_inbound_request, record_registration,
    record_report_ingested,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// 状态上报在持久总线上的去向。
#[derive(Debug, Clone)]
pub struct StateRoute {
    pub topic: String,
    /// 固定分区键，保证所有上报落在同一分区内有序
    pub partition_key: String,
}

/// 网关资源集合：hello / time / register / sensors。
pub struct GatewayResources {
    registry: Arc<dyn DeviceRegistry>,
    cache: Arc<dyn ReportCache>,
    reports: EventLog<OutboundEvent>,
    publisher: Arc<dyn BusPublisher>,
    route: StateRoute,
}

impl GatewayResources {
    pub fn new(
        registry: Arc<dyn DeviceRegistry>,
        cache: Arc<dyn ReportCache>,
        reports: EventLog<OutboundEvent>,
        publisher: Arc<dyn BusPublisher>,
        route: StateRoute,
    ) -> Self {
        Self {
            registry,
            cache,
            reports,
            publisher,
            route,
        }
    }

    fn time() -> OutboundResponse {
        let body = serde_json::json!({
            "type": "time",
            "time": now_epoch_ms().to_string(),
        });
        OutboundResponse::json(Code::CONTENT, body.to_string())
    }

    async fn lookup_device(&self, payload: &[u8]) -> OutboundResponse {
        let device_id = match decode_device_id(payload) {
            Ok(device_id) => device_id,
            Err(err) => {
                record_decode_failure();
                return OutboundResponse::text(Code::BAD_REQUEST, err.to_string());
            }
        };
        match self.registry.lookup(&device_id).await {
            Ok(record) => match serde_json::to_string(&record) {
                Ok(body) => OutboundResponse::json(Code::CONTENT, body),
                Err(err) => OutboundResponse::text(Code::INTERNAL_SERVER_ERROR, err.to_string()),
            },
            Err(err) if err.is_not_found() => {
                OutboundResponse::text(Code::NOT_FOUND, err.to_string())
            }
            Err(err) => OutboundResponse::text(Code::INTERNAL_SERVER_ERROR, err.to_string()),
        }
    }

    async fn register_device(&self, payload: &[u8], source: SocketAddr) -> OutboundResponse {
        let device_id = match decode_device_id(payload) {
            Ok(device_id) => device_id,
            Err(err) => {
                record_decode_failure();
                warn!(target: "irrigation.ingest", source = %source, error = %err, "register_payload_invalid");
                return OutboundResponse::text(Code::BAD_REQUEST, err.to_string());
            }
        };
        let record = DeviceRecord::new(device_id.clone(), source, now_epoch_ms());
        if let Err(err) = self.registry.register(record).await {
            error!(target: "irrigation.ingest", device_id = %device_id, error = %err, "device_register_failed");
            return OutboundResponse::text(Code::INTERNAL_SERVER_ERROR, err.to_string());
        }
        record_registration();
        info!(target: "irrigation.ingest", device_id = %device_id, address = %source, "device_registered");
        OutboundResponse::text(Code::CHANGED, device_id)
    }

    async fn last_report(&self) -> OutboundResponse {
        match self.cache.get_last().await {
            Ok(Some(cached)) => OutboundResponse::json(Code::CONTENT, cached.text),
            Ok(None) => OutboundResponse::empty(Code::CONTENT),
            Err(err) => OutboundResponse::text(Code::INTERNAL_SERVER_ERROR, err.to_string()),
        }
    }

    async fn ingest_report(&self, payload: &[u8], source: SocketAddr) -> OutboundResponse {
        let report = match decode_state_report(payload) {
            Ok(report) => report,
            Err(err) => {
                record_decode_failure();
                warn!(
                    target: "irrigation.ingest",
                    source = %source,
                    size = payload.len(),
                    error = %err,
                    "state_report_invalid"
                );
                return OutboundResponse::text(Code::BAD_REQUEST, err.to_string());
            }
        };
        let text = match encode_state_report(&report) {
            Ok(text) => text,
            Err(err) => return OutboundResponse::text(Code::BAD_REQUEST, err.to_string()),
        };
        let device_id = report.device_id().to_string();
        let schema = report.schema();
        let received_at_ms = now_epoch_ms();

        // 上报者即可达设备：按物理来源地址刷新注册表
        let record = DeviceRecord::new(device_id.clone(), source, received_at_ms);
        if let Err(err) = self.registry.register(record).await {
            error!(target: "irrigation.ingest", device_id = %device_id, error = %err, "device_register_failed");
            return OutboundResponse::text(Code::INTERNAL_SERVER_ERROR, err.to_string());
        }

        let cached = CachedReport {
            report: report.clone(),
            text: text.clone(),
            received_at_ms,
        };
        if let Err(err) = self.cache.set_last(cached).await {
            warn!(target: "irrigation.ingest", device_id = %device_id, error = %err, "report_cache_failed");
        }

        if let Err(response) = self.publish(report, &device_id, &text) {
            return response;
        }
        if let Err(err) = self
            .publisher
            .publish(&self.route.topic, &self.route.partition_key, &text)
            .await
        {
            record_bus_publish_failure();
            error!(
                target: "irrigation.ingest",
                device_id = %device_id,
                topic = %self.route.topic,
                partition_key = %self.route.partition_key,
                error = %err,
                "state_bus_publish_failed"
            );
            return OutboundResponse::text(Code::INTERNAL_SERVER_ERROR, err.to_string());
        }
        record_bus_publish_success();
        record_report_ingested();
        info!(
            target: "irrigation.ingest",
            device_id = %device_id,
            source = %source,
            schema = schema.as_str(),
            "state_report_ingested"
        );
        OutboundResponse::json(Code::CHANGED, text)
    }

    fn publish(&self, report: StateReport, device_id: &str, text: &str) -> Result<u64, OutboundResponse> {
        match self.reports.publish(OutboundEvent::State(report)) {
            Ok(seq) => {
                debug!(target: "irrigation.ingest", device_id, seq, "state_event_published");
                Ok(seq)
            }
            Err(err) => {
                record_event_publish_failure();
                error!(
                    target: "irrigation.ingest",
                    device_id,
                    stream = self.reports.name(),
                    size = text.len(),
                    error = %err,
                    "state_event_publish_failed"
                );
                Err(OutboundResponse::text(Code::INTERNAL_SERVER_ERROR, err.to_string()))
            }
        }
    }
}

#[async_trait]
impl RequestHandler for GatewayResources {
    async fn handle(&self, request: InboundRequest) -> OutboundResponse {
        record_inbound_request();
        debug!(
            target: "irrigation.ingest",
            method = request.method.as_str(),
            path = %request.path,
            source = %request.source,
            "coap_request"
        );
        match (request.path.as_str(), request.method) {
            ("hello", Method::Get) => OutboundResponse::text(Code::CONTENT, "Hello world!"),
            ("time", Method::Get) => Self::time(),
            ("register", Method::Get) => self.lookup_device(&request.payload).await,
            ("register", Method::Put) => {
                self.register_device(&request.payload, request.source).await
            }
            ("sensors", Method::Get) => self.last_report().await,
            ("sensors", Method::Put) => {
                self.ingest_report(&request.payload, request.source).await
            }
            ("hello" | "time" | "register" | "sensors", _) => {
                OutboundResponse::empty(Code::METHOD_NOT_ALLOWED)
            }
            _ => OutboundResponse::empty(Code::NOT_FOUND),
        }
    }
}
