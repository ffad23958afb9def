//! 设备注册记录。

use serde::ser::{Serialize, SerializeStruct, Serializer};
use std::net::SocketAddr;

/// 设备注册记录：设备 ID → 最近一次接触的网络地址。
///
/// 每次设备上行（注册或状态上报）都会整体覆盖，进程生命周期内不删除。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRecord {
    pub device_id: String,
    pub address: SocketAddr,
    pub last_seen_at_ms: i64,
}

impl DeviceRecord {
    pub fn new(device_id: impl Into<String>, address: SocketAddr, last_seen_at_ms: i64) -> Self {
        Self {
            device_id: device_id.into(),
            address,
            last_seen_at_ms,
        }
    }
}

/// 设备协议侧的对外形状：`{"deviceId", "address", "port"}`。
impl Serialize for DeviceRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("DeviceRecord", 3)?;
        state.serialize_field("deviceId", &self.device_id)?;
        state.serialize_field("address", &self.address.ip().to_string())?;
        state.serialize_field("port", &self.address.port())?;
        state.end()
    }
}
