//! 设备注册表内存实现
//!
//! 使用 RwLock + HashMap 提供线程安全的内存存储。每次 upsert / 查询只持有一次锁，
//! 读者看到的是完整的旧记录或完整的新记录。

use crate::error::StorageError;
use crate::traits::DeviceRegistry;
use domain::DeviceRecord;
use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Default)]
pub struct InMemoryDeviceRegistry {
    devices: RwLock<HashMap<String, DeviceRecord>>,
}

impl InMemoryDeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl DeviceRegistry for InMemoryDeviceRegistry {
    async fn register(&self, record: DeviceRecord) -> Result<(), StorageError> {
        let mut map = self
            .devices
            .write()
            .map_err(|_| StorageError::Backend("lock failed".to_string()))?;
        map.insert(record.device_id.clone(), record);
        Ok(())
    }

    async fn lookup(&self, device_id: &str) -> Result<DeviceRecord, StorageError> {
        let map = self
            .devices
            .read()
            .map_err(|_| StorageError::Backend("lock failed".to_string()))?;
        map.get(device_id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(device_id.to_string()))
    }

    async fn list(&self) -> Result<Vec<DeviceRecord>, StorageError> {
        let map = self
            .devices
            .read()
            .map_err(|_| StorageError::Backend("lock failed".to_string()))?;
        let mut items: Vec<DeviceRecord> = map.values().cloned().collect();
        items.sort_by(|a, b| a.device_id.cmp(&b.device_id));
        Ok(items)
    }
}
