use api_contract::{ApiResponse, DeviceDto, EventDto, EventPageDto};
use serde_json::{Value, json};

#[test]
fn device_dto_is_camel_case() {
    let dto = DeviceDto {
        device_id: "dev1".to_string(),
        address: "10.0.0.5".to_string(),
        port: 5001,
        last_seen_at_ms: 1_700_000_000_000,
    };
    let value = serde_json::to_value(dto).expect("serialize");
    assert_eq!(value["deviceId"], "dev1");
    assert_eq!(value["lastSeenAtMs"], 1_700_000_000_000i64);
    assert!(value.get("device_id").is_none());
}

#[test]
fn event_page_keeps_payload_shape() {
    let page = EventPageDto {
        events: vec![EventDto {
            seq: 3,
            kind: "command_ack".to_string(),
            device_id: Some("dev1".to_string()),
            payload: json!({"type": "command_ack", "deviceId": "dev1", "result": "OK"}),
        }],
        next_seq: 4,
        total: 3,
    };
    let value = serde_json::to_value(page).expect("serialize");
    assert_eq!(value["nextSeq"], 4);
    assert_eq!(value["events"][0]["payload"]["result"], "OK");
}

#[test]
fn error_envelope_has_no_data() {
    let value: Value =
        serde_json::to_value(ApiResponse::<()>::error("RESOURCE.NOT_FOUND", "not found"))
            .expect("serialize");
    assert_eq!(value["success"], false);
    assert!(value["data"].is_null());
    assert_eq!(value["error"]["code"], "RESOURCE.NOT_FOUND");
}

#[test]
fn success_envelope_carries_data() {
    let response = ApiResponse::success(vec!["dev1"]);
    assert!(response.success);
    assert_eq!(response.data.as_deref(), Some(&["dev1"][..]));
    assert!(response.error.is_none());
}
