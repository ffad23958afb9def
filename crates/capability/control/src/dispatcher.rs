use crate::ControlError;
use async_trait::async_trait;
use domain::Command;
use irrigation_protocol::{CoapEndpoint, Method, ProtocolError};
use std::net::SocketAddr;
use std::time::Duration;
use tracing::{info, warn};

/// 设备侧命令资源路径。
const COMMANDS_PATH: &str = "commands";

/// 命令下发器抽象：把命令送到设备并返回设备响应内容。
#[async_trait]
pub trait CommandDispatcher: Send + Sync {
    async fn dispatch(&self, target: SocketAddr, command: &Command) -> Result<String, ControlError>;
}

/// CoAP 下发器：向设备 `PUT commands`，等待关联响应。
#[derive(Clone)]
pub struct CoapCommandDispatcher {
    endpoint: CoapEndpoint,
    timeout: Duration,
}

impl CoapCommandDispatcher {
    pub fn new(endpoint: CoapEndpoint, timeout: Duration) -> Self {
        Self { endpoint, timeout }
    }
}

#[async_trait]
impl CommandDispatcher for CoapCommandDispatcher {
    async fn dispatch(&self, target: SocketAddr, command: &Command) -> Result<String, ControlError> {
        info!(
            target: "irrigation.control",
            device_id = %command.device_id,
            peer = %target,
            payload_size = command.payload.len(),
            "command_dispatch_send"
        );
        let response = self
            .endpoint
            .request(
                target,
                Method::Put,
                COMMANDS_PATH,
                command.payload.as_bytes(),
                self.timeout,
            )
            .await
            .map_err(|err| match err {
                ProtocolError::Timeout(timeout_ms) => ControlError::DispatchTimeout {
                    device_id: command.device_id.clone(),
                    timeout_ms,
                },
                other => ControlError::DispatchTransport(other.to_string()),
            })?;
        // 设备作出任何响应即视为已送达，响应码只记录
        if !response.code.is_success() {
            warn!(
                target: "irrigation.control",
                device_id = %command.device_id,
                code = %response.code,
                "command_device_error_code"
            );
        }
        Ok(response.payload_text())
    }
}
