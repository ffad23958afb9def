//! 设备与总线报文解码。
//!
//! - 状态上报：按区分字段识别 V1 / V2，两者都不匹配（或同时匹配）时明确失败，不做字段合并。
//! - 设备 ID：`register` 资源的文本负载。
//! - 命令：总线投递的 JSON 文本，至少包含 `deviceId`。

use domain::{Command, StateReport, StateReportV1, StateReportV2};
use serde_json::{Map, Value};

/// 只出现在 V1 报文中的字段。
const V1_FIELDS: [&str; 5] = ["flow1", "flow2", "flow3", "moist01", "moist02"];
/// 只出现在 V2 报文中的字段。
const V2_FIELDS: [&str; 3] = ["start_time", "flows", "moists"];

const MAX_DEVICE_ID_LEN: usize = 128;

/// 解码错误。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NormalizeError {
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
    #[error("unknown report schema: {0}")]
    UnknownSchema(String),
    #[error("report does not match schema {schema}: {message}")]
    SchemaMismatch {
        schema: &'static str,
        message: String,
    },
    #[error("invalid device id: {0}")]
    InvalidDeviceId(String),
}

/// 解码状态上报负载。
pub fn decode_state_report(payload: &[u8]) -> Result<StateReport, NormalizeError> {
    let object = parse_object(payload)?;
    let is_v1 = V1_FIELDS.iter().any(|field| object.contains_key(*field));
    let is_v2 = V2_FIELDS.iter().any(|field| object.contains_key(*field));
    let report: StateReport = match (is_v1, is_v2) {
        (true, false) => serde_json::from_value::<StateReportV1>(Value::Object(object))
            .map_err(|err| NormalizeError::SchemaMismatch {
                schema: "v1",
                message: err.to_string(),
            })?
            .into(),
        (false, true) => serde_json::from_value::<StateReportV2>(Value::Object(object))
            .map_err(|err| NormalizeError::SchemaMismatch {
                schema: "v2",
                message: err.to_string(),
            })?
            .into(),
        (true, true) => {
            return Err(NormalizeError::UnknownSchema(
                "fields of both v1 and v2 present".to_string(),
            ));
        }
        (false, false) => {
            return Err(NormalizeError::UnknownSchema(
                "no flow/moisture fields".to_string(),
            ));
        }
    };
    validate_device_id(report.device_id())?;
    Ok(report)
}

/// 状态上报编码为发布用文本（保持所属版本的字段形状）。
pub fn encode_state_report(report: &StateReport) -> Result<String, NormalizeError> {
    serde_json::to_string(report).map_err(|err| NormalizeError::InvalidPayload(err.to_string()))
}

/// 解码 `register` 资源负载中的设备 ID。
pub fn decode_device_id(payload: &[u8]) -> Result<String, NormalizeError> {
    let text = std::str::from_utf8(payload)
        .map_err(|err| NormalizeError::InvalidPayload(err.to_string()))?;
    let device_id = text.trim();
    validate_device_id(device_id)?;
    Ok(device_id.to_string())
}

/// 解码总线投递的命令文本。
pub fn decode_command(payload: &[u8]) -> Result<Command, NormalizeError> {
    let text = std::str::from_utf8(payload)
        .map_err(|err| NormalizeError::InvalidPayload(err.to_string()))?
        .trim();
    let object = parse_object(text.as_bytes())?;
    let device_id = object
        .get("deviceId")
        .and_then(Value::as_str)
        .ok_or_else(|| NormalizeError::InvalidPayload("missing deviceId".to_string()))?;
    validate_device_id(device_id)?;
    Ok(Command::new(device_id, text))
}

fn parse_object(payload: &[u8]) -> Result<Map<String, Value>, NormalizeError> {
    if payload.iter().all(u8::is_ascii_whitespace) {
        return Err(NormalizeError::InvalidPayload("empty payload".to_string()));
    }
    match serde_json::from_slice::<Value>(payload) {
        Ok(Value::Object(object)) => Ok(object),
        Ok(_) => Err(NormalizeError::InvalidPayload(
            "expected json object".to_string(),
        )),
        Err(err) => Err(NormalizeError::InvalidPayload(err.to_string())),
    }
}

fn validate_device_id(device_id: &str) -> Result<(), NormalizeError> {
    if device_id.is_empty() {
        return Err(NormalizeError::InvalidDeviceId("empty".to_string()));
    }
    if device_id.len() > MAX_DEVICE_ID_LEN {
        return Err(NormalizeError::InvalidDeviceId(format!(
            "longer than {} bytes",
            MAX_DEVICE_ID_LEN
        )));
    }
    if device_id.chars().any(char::is_control) {
        return Err(NormalizeError::InvalidDeviceId(
            "contains control characters".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::ReportSchema;

    const V1_SAMPLE: &str = r#"{"type":"state","time":1000,"deviceId":"dev1","valves":[1,0],"flow1":5,"flow2":0,"flow3":0,"moist01":40,"moist02":55}"#;
    const V2_SAMPLE: &str = r#"{"type":"state","time":120,"start_time":1700000000,"deviceId":"dev2","valves":[0,0,1],"flows":[396,0],"moists":[41,52,60]}"#;

    #[test]
    fn detects_v1_schema() {
        let report = decode_state_report(V1_SAMPLE.as_bytes()).expect("v1");
        assert_eq!(report.schema(), ReportSchema::V1);
        assert_eq!(report.device_id(), "dev1");
        assert_eq!(report.flows(), vec![5, 0, 0]);
        assert_eq!(encode_state_report(&report).expect("encode"), V1_SAMPLE);
    }

    #[test]
    fn detects_v2_schema() {
        let report = decode_state_report(V2_SAMPLE.as_bytes()).expect("v2");
        assert_eq!(report.schema(), ReportSchema::V2);
        assert_eq!(report.moistures(), vec![41, 52, 60]);
        assert_eq!(encode_state_report(&report).expect("encode"), V2_SAMPLE);
    }

    #[test]
    fn mixed_fields_are_rejected() {
        let payload = r#"{"type":"state","time":1,"deviceId":"d","valves":[],"flow1":1,"flows":[1]}"#;
        let err = decode_state_report(payload.as_bytes()).expect_err("ambiguous");
        assert!(matches!(err, NormalizeError::UnknownSchema(_)));
    }

    #[test]
    fn missing_fields_fail_against_detected_schema() {
        let payload = r#"{"type":"state","time":1,"deviceId":"d","valves":[],"flow1":1}"#;
        let err = decode_state_report(payload.as_bytes()).expect_err("incomplete v1");
        assert!(matches!(err, NormalizeError::SchemaMismatch { schema: "v1", .. }));
    }

    #[test]
    fn non_object_payloads_are_invalid() {
        for payload in ["", "   ", "[1,2]", "\"state\"", "{not json"] {
            let err = decode_state_report(payload.as_bytes()).expect_err(payload);
            assert!(matches!(err, NormalizeError::InvalidPayload(_)), "{}", payload);
        }
    }

    #[test]
    fn report_requires_device_id() {
        let payload = r#"{"type":"state","time":1,"deviceId":"","valves":[],"flows":[],"moists":[],"start_time":0}"#;
        let err = decode_state_report(payload.as_bytes()).expect_err("empty id");
        assert!(matches!(err, NormalizeError::InvalidDeviceId(_)));
    }

    #[test]
    fn device_id_is_trimmed_text() {
        assert_eq!(decode_device_id(b"  dev1\n").expect("id"), "dev1");
        assert!(decode_device_id(b"").is_err());
        assert!(decode_device_id(&[0xff, 0xfe]).is_err());
        assert!(decode_device_id(b"dev\x01").is_err());
    }

    #[test]
    fn command_keeps_original_document() {
        let text = r#"{"deviceId":"dev1","payload":"OPEN_VALVE_1"}"#;
        let command = decode_command(text.as_bytes()).expect("command");
        assert_eq!(command.device_id, "dev1");
        assert_eq!(command.payload, text);

        let err = decode_command(br#"{"payload":"OPEN_VALVE_1"}"#).expect_err("no device");
        assert_eq!(err, NormalizeError::InvalidPayload("missing deviceId".to_string()));
    }
}
