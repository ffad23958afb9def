//! 内存存储实现模块
//!
//! - DeviceRegistry: InMemoryDeviceRegistry
//! - ReportCache: InMemoryReportCache

pub mod device;
pub mod report;

pub use device::*;
pub use report::*;
