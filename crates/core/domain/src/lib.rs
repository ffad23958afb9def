//! 网关核心领域模型：设备注册记录、状态上报、命令与回执、对外事件。

pub mod command;
pub mod device;
pub mod event;
pub mod report;

pub use command::{COMMAND_ACK_KIND, Command, CommandAck, CommandFailure, CommandOutcome};
pub use device::DeviceRecord;
pub use event::OutboundEvent;
pub use report::{ReportSchema, StateReport, StateReportV1, StateReportV2};

/// 获取当前时间戳（毫秒）。
pub fn now_epoch_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
