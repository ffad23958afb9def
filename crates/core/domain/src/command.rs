//! 命令与命令回执。

use serde::{Deserialize, Serialize};

/// 成功回执的类型标记。
pub const COMMAND_ACK_KIND: &str = "command_ack";

/// 下发给设备的命令。
///
/// `payload` 为订阅方投递的完整命令文档，网关不解释其内容，原样转发给设备。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub device_id: String,
    pub payload: String,
}

impl Command {
    pub fn new(device_id: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            payload: payload.into(),
        }
    }
}

/// 成功回执：携带设备响应的原始内容。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandAck {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "deviceId")]
    pub device_id: String,
    pub result: String,
}

impl CommandAck {
    pub fn new(device_id: impl Into<String>, result: impl Into<String>) -> Self {
        Self {
            kind: COMMAND_ACK_KIND.to_string(),
            device_id: device_id.into(),
            result: result.into(),
        }
    }
}

/// 失败回执：`{"error": "...", "deviceId": "..."}`。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandFailure {
    pub error: String,
    #[serde(rename = "deviceId", default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
}

/// 单条命令的最终结果，每条命令恰好产生一个。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum CommandOutcome {
    Acked(CommandAck),
    Failed(CommandFailure),
}

impl CommandOutcome {
    pub fn acked(device_id: impl Into<String>, result: impl Into<String>) -> Self {
        Self::Acked(CommandAck::new(device_id, result))
    }

    pub fn failed(device_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self::Failed(CommandFailure {
            error: error.into(),
            device_id: Some(device_id.into()),
        })
    }

    pub fn is_acked(&self) -> bool {
        matches!(self, Self::Acked(_))
    }

    pub fn device_id(&self) -> Option<&str> {
        match self {
            Self::Acked(ack) => Some(&ack.device_id),
            Self::Failed(failure) => failure.device_id.as_deref(),
        }
    }
}
