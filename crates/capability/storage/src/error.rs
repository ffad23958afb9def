//! 存储层错误类型

/// 注册表与缓存错误
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    /// 设备尚未注册（从未上行过）
    #[error("device not registered: {0}")]
    NotFound(String),

    /// 底层存储故障（如锁中毒）
    #[error("storage error: {0}")]
    Backend(String),
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
