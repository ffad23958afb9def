//! 最近上报缓存内存实现。

use crate::error::StorageError;
use crate::traits::{CachedReport, ReportCache};
use std::sync::RwLock;

#[derive(Default)]
pub struct InMemoryReportCache {
    last: RwLock<Option<CachedReport>>,
}

impl InMemoryReportCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl ReportCache for InMemoryReportCache {
    async fn set_last(&self, report: CachedReport) -> Result<(), StorageError> {
        let mut last = self
            .last
            .write()
            .map_err(|_| StorageError::Backend("lock failed".to_string()))?;
        *last = Some(report);
        Ok(())
    }

    async fn get_last(&self) -> Result<Option<CachedReport>, StorageError> {
        let last = self
            .last
            .read()
            .map_err(|_| StorageError::Backend("lock failed".to_string()))?;
        Ok(last.clone())
    }
}
