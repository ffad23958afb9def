//! # Irrigation Storage 模块
//!
//! 网关运行期状态的存储抽象：
//!
//! 1. **设备注册表** ([`DeviceRegistry`])：设备 ID → 最近一次接触的网络地址，
//!    入站处理任务与命令桥接任务共享。
//! 2. **最近上报缓存** ([`ReportCache`])：保留最后一条状态上报，供 `GET sensors` 同步读取。
//!
//! ## 语义约束
//!
//! - `register` 为幂等 upsert，后写覆盖先写；并发读写下不会读到半写的记录。
//! - `lookup` 未命中返回 [`StorageError::NotFound`]，调用方应视为"设备尚不可达"，
//!   而非致命错误。
//! - 记录在进程生命周期内保留，不做过期清理。
//!
//! ## 存储实现
//!
//! - [`in_memory`]：`RwLock<HashMap>` 内存实现，单次 upsert / 查询即一次加锁。

pub mod error;
pub mod in_memory;
pub mod traits;

pub use error::*;
pub use in_memory::{InMemoryDeviceRegistry, InMemoryReportCache};
pub use traits::*;
