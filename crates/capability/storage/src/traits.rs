//! 存储接口 Trait 定义
//!
//! - DeviceRegistry：设备注册表
//! - ReportCache：最近上报缓存
//!
//! 使用 async_trait 支持动态分发，实现通过 `Arc<dyn ...>` 注入到入站处理与命令桥接。

use crate::error::StorageError;
use async_trait::async_trait;
use domain::{DeviceRecord, StateReport};

/// 设备注册表接口
#[async_trait]
pub trait DeviceRegistry: Send + Sync {
    /// 写入或覆盖设备记录（后写覆盖）
    async fn register(&self, record: DeviceRecord) -> Result<(), StorageError>;

    /// 按设备 ID 查找，未注册返回 `StorageError::NotFound`
    async fn lookup(&self, device_id: &str) -> Result<DeviceRecord, StorageError>;

    /// 列出全部设备记录（按设备 ID 排序）
    async fn list(&self) -> Result<Vec<DeviceRecord>, StorageError>;
}

/// 缓存的最近一条上报。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedReport {
    pub report: StateReport,
    /// 规范化后的报文文本（原样回给 `GET sensors`）
    pub text: String,
    pub received_at_ms: i64,
}

/// 最近上报缓存接口
#[async_trait]
pub trait ReportCache: Send + Sync {
    async fn set_last(&self, report: CachedReport) -> Result<(), StorageError>;

    async fn get_last(&self) -> Result<Option<CachedReport>, StorageError>;
}
