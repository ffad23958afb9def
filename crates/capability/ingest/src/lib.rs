//! 设备上行处理：CoAP 资源与持久总线发布。
//!
//! `PUT sensors` 的处理顺序：解码 → 以来源地址刷新注册表 → 缓存最近上报
//! → 发布到事件总线上报流 → 发布到持久总线 → 2.04 回显报文。

mod publisher;
mod resources;

pub use publisher::{BusPublisher, MqttBusConfig, MqttBusPublisher, NoopBusPublisher, qos_from_u8};
pub use resources::{GatewayResources, StateRoute};

/// 采集错误。
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("bus publish error: {0}")]
    Publish(String),
    #[error("bus connect error: {0}")]
    Connect(String),
}
