use async_trait::async_trait;
use domain::OutboundEvent;
use irrigation_ingest::{BusPublisher, GatewayResources, IngestError, NoopBusPublisher, StateRoute};
use irrigation_normalize::decode_state_report;
use irrigation_pipeline::EventLog;
use irrigation_protocol::{
    CoapEndpoint, Code, InboundRequest, Method, OutboundResponse, RequestHandler,
};
use irrigation_storage::{DeviceRegistry, InMemoryDeviceRegistry, InMemoryReportCache};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const SAMPLE: &str = r#"{"type":"state","time":1000,"deviceId":"dev1","valves":[1,0],"flow1":5,"flow2":0,"flow3":0,"moist01":40,"moist02":55}"#;

#[derive(Default)]
struct RecordingPublisher {
    published: Mutex<Vec<(String, String, String)>>,
    fail: bool,
}

impl RecordingPublisher {
    fn failing() -> Self {
        Self {
            published: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    fn published(&self) -> Vec<(String, String, String)> {
        self.published.lock().expect("lock").clone()
    }
}

#[async_trait]
impl BusPublisher for RecordingPublisher {
    async fn publish(&self, topic: &str, key: &str, value: &str) -> Result<(), IngestError> {
        if self.fail {
            return Err(IngestError::Publish("broker unavailable".to_string()));
        }
        self.published
            .lock()
            .expect("lock")
            .push((topic.to_string(), key.to_string(), value.to_string()));
        Ok(())
    }
}

struct Harness {
    registry: Arc<InMemoryDeviceRegistry>,
    reports: EventLog<OutboundEvent>,
    publisher: Arc<RecordingPublisher>,
    resources: GatewayResources,
}

fn harness_with(publisher: RecordingPublisher, capacity: usize) -> Harness {
    let registry = Arc::new(InMemoryDeviceRegistry::new());
    let reports = EventLog::new("reports", capacity);
    let publisher = Arc::new(publisher);
    let resources = GatewayResources::new(
        registry.clone(),
        Arc::new(InMemoryReportCache::new()),
        reports.clone(),
        publisher.clone(),
        StateRoute {
            topic: "irrigation/state".to_string(),
            partition_key: "1".to_string(),
        },
    );
    Harness {
        registry,
        reports,
        publisher,
        resources,
    }
}

fn harness() -> Harness {
    harness_with(RecordingPublisher::default(), 64)
}

fn addr(text: &str) -> SocketAddr {
    text.parse().expect("socket addr")
}

fn request(method: Method, path: &str, payload: &str, source: &str) -> InboundRequest {
    InboundRequest {
        method,
        path: path.to_string(),
        payload: payload.as_bytes().to_vec(),
        source: addr(source),
    }
}

async fn call(harness: &Harness, request: InboundRequest) -> OutboundResponse {
    harness.resources.handle(request).await
}

#[tokio::test]
async fn state_report_registers_publishes_and_echoes() {
    let h = harness();
    let response = call(&h, request(Method::Put, "sensors", SAMPLE, "10.0.0.5:5001")).await;

    assert_eq!(response.code, Code::CHANGED);
    assert_eq!(response.payload_text(), SAMPLE);

    let record = h.registry.lookup("dev1").await.expect("registered");
    assert_eq!(record.address, addr("10.0.0.5:5001"));

    let events = h.reports.read_from(1, 10);
    assert_eq!(events.len(), 1);
    let expected = decode_state_report(SAMPLE.as_bytes()).expect("decode");
    assert_eq!(*events[0].value, OutboundEvent::State(expected));

    assert_eq!(
        h.publisher.published(),
        vec![(
            "irrigation/state".to_string(),
            "1".to_string(),
            SAMPLE.to_string()
        )]
    );

    let last = call(&h, request(Method::Get, "sensors", "", "10.0.0.9:1")).await;
    assert_eq!(last.code, Code::CONTENT);
    assert_eq!(last.payload_text(), SAMPLE);
}

#[tokio::test]
async fn newer_report_moves_device_address() {
    let h = harness();
    call(&h, request(Method::Put, "sensors", SAMPLE, "10.0.0.5:5001")).await;
    call(&h, request(Method::Put, "sensors", SAMPLE, "10.0.0.6:5002")).await;

    let record = h.registry.lookup("dev1").await.expect("registered");
    assert_eq!(record.address, addr("10.0.0.6:5002"));
    assert_eq!(h.reports.len(), 2);
}

#[tokio::test]
async fn invalid_report_changes_nothing() {
    let h = harness();
    let response = call(&h, request(Method::Put, "sensors", "not json", "10.0.0.5:5001")).await;

    assert_eq!(response.code, Code::BAD_REQUEST);
    assert!(response.payload_text().starts_with("invalid payload"));
    assert!(h.registry.list().await.expect("list").is_empty());
    assert!(h.reports.is_empty());
    assert!(h.publisher.published().is_empty());

    let last = call(&h, request(Method::Get, "sensors", "", "10.0.0.5:5001")).await;
    assert_eq!(last.code, Code::CONTENT);
    assert!(last.payload.is_empty());
}

#[tokio::test]
async fn bus_failure_turns_into_server_error() {
    let h = harness_with(RecordingPublisher::failing(), 64);
    let response = call(&h, request(Method::Put, "sensors", SAMPLE, "10.0.0.5:5001")).await;

    assert_eq!(response.code, Code::INTERNAL_SERVER_ERROR);
    assert!(response.payload_text().contains("broker unavailable"));
}

#[tokio::test]
async fn saturated_event_log_skips_bus_publish() {
    let h = harness_with(RecordingPublisher::default(), 1);
    let first = call(&h, request(Method::Put, "sensors", SAMPLE, "10.0.0.5:5001")).await;
    assert_eq!(first.code, Code::CHANGED);

    let second = call(&h, request(Method::Put, "sensors", SAMPLE, "10.0.0.5:5001")).await;
    assert_eq!(second.code, Code::INTERNAL_SERVER_ERROR);
    assert!(second.payload_text().starts_with("backpressure"));
    assert_eq!(h.publisher.published().len(), 1);
}

#[tokio::test]
async fn register_then_lookup() {
    let h = harness();
    let put = call(&h, request(Method::Put, "register", " dev9\n", "10.0.0.7:6000")).await;
    assert_eq!(put.code, Code::CHANGED);
    assert_eq!(put.payload_text(), "dev9");

    let get = call(&h, request(Method::Get, "register", "dev9", "10.0.0.1:1")).await;
    assert_eq!(get.code, Code::CONTENT);
    let body: serde_json::Value = serde_json::from_slice(&get.payload).expect("json");
    assert_eq!(
        body,
        serde_json::json!({"deviceId": "dev9", "address": "10.0.0.7", "port": 6000})
    );

    let missing = call(&h, request(Method::Get, "register", "ghost", "10.0.0.1:1")).await;
    assert_eq!(missing.code, Code::NOT_FOUND);

    let empty = call(&h, request(Method::Put, "register", "", "10.0.0.1:1")).await;
    assert_eq!(empty.code, Code::BAD_REQUEST);
    assert_eq!(h.registry.list().await.expect("list").len(), 1);
}

#[tokio::test]
async fn static_resources_and_routing_errors() {
    let h = harness();
    let hello = call(&h, request(Method::Get, "hello", "", "10.0.0.1:1")).await;
    assert_eq!(hello.payload_text(), "Hello world!");

    let time = call(&h, request(Method::Get, "time", "", "10.0.0.1:1")).await;
    let body: serde_json::Value = serde_json::from_slice(&time.payload).expect("json");
    assert_eq!(body["type"], "time");
    let millis: i64 = body["time"].as_str().expect("string").parse().expect("millis");
    assert!(millis > 0);

    let wrong_method = call(&h, request(Method::Delete, "hello", "", "10.0.0.1:1")).await;
    assert_eq!(wrong_method.code, Code::METHOD_NOT_ALLOWED);

    let unknown = call(&h, request(Method::Get, "valves", "", "10.0.0.1:1")).await;
    assert_eq!(unknown.code, Code::NOT_FOUND);
}

#[tokio::test]
async fn report_over_udp_registers_physical_source() {
    let registry = Arc::new(InMemoryDeviceRegistry::new());
    let reports = EventLog::new("reports", 16);
    let resources = GatewayResources::new(
        registry.clone(),
        Arc::new(InMemoryReportCache::new()),
        reports.clone(),
        Arc::new(NoopBusPublisher),
        StateRoute {
            topic: "irrigation/state".to_string(),
            partition_key: "1".to_string(),
        },
    );
    let gateway = CoapEndpoint::bind("127.0.0.1:0").await.expect("bind");
    let serving = gateway.clone();
    tokio::spawn(async move {
        let _ = serving.serve(Arc::new(resources)).await;
    });

    let device = CoapEndpoint::bind("127.0.0.1:0").await.expect("bind");
    let device_loop = device.clone();
    tokio::spawn(async move {
        let _ = device_loop.serve(Arc::new(NotFound)).await;
    });

    let response = device
        .request(
            gateway.local_addr(),
            Method::Put,
            "sensors",
            SAMPLE.as_bytes(),
            Duration::from_secs(1),
        )
        .await
        .expect("response");
    assert_eq!(response.code, Code::CHANGED);
    assert_eq!(response.payload_text(), SAMPLE);

    let record = registry.lookup("dev1").await.expect("registered");
    assert_eq!(record.address, device.local_addr());
    assert_eq!(reports.len(), 1);
}

struct NotFound;

#[async_trait]
impl RequestHandler for NotFound {
    async fn handle(&self, _request: InboundRequest) -> OutboundResponse {
        OutboundResponse::empty(Code::NOT_FOUND)
    }
}
