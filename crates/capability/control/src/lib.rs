//! 命令桥接：订阅方命令 → 查找设备地址 → CoAP 下发 → 回执。
//!
//! ```text
//! CommandSource (持久总线) ──▶ EventBus.commands ──▶ CommandBridge ──▶ CommandDispatcher ──▶ 设备
//!                                                         │
//!                                                         ▼
//!                                              EventBus.reports (回执)
//! ```
//!
//! 每条命令恰好产生一条结果（成功回执或失败回执），失败不会中断桥接循环。

mod bridge;
mod dispatcher;
mod source;

pub use bridge::{CommandBridge, CommandState};
pub use dispatcher::{CoapCommandDispatcher, CommandDispatcher};
pub use source::{CommandSource, MqttCommandSource, MqttCommandSourceConfig, NoopCommandSource};

/// 控制链路错误。
#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    #[error("device not registered: {0}")]
    DeviceNotFound(String),
    #[error("registry error: {0}")]
    Registry(String),
    #[error("dispatch to {device_id} timed out after {timeout_ms} ms")]
    DispatchTimeout { device_id: String, timeout_ms: u64 },
    #[error("dispatch transport error: {0}")]
    DispatchTransport(String),
    #[error("publish error: {0}")]
    Publish(String),
    #[error("command source error: {0}")]
    Source(String),
}
