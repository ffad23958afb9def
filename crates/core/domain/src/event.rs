//! 面向订阅方的对外事件。

use crate::command::CommandOutcome;
use crate::report::StateReport;
use serde::Serialize;

/// 上报流中的事件：状态上报或命令结果。
///
/// 序列化为各自的原始形状（不额外包裹），订阅方按 `type` / `error` 字段区分。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum OutboundEvent {
    State(StateReport),
    Command(CommandOutcome),
}

impl OutboundEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::State(_) => "state",
            Self::Command(CommandOutcome::Acked(_)) => "command_ack",
            Self::Command(CommandOutcome::Failed(_)) => "command_error",
        }
    }

    pub fn device_id(&self) -> Option<&str> {
        match self {
            Self::State(report) => Some(report.device_id()),
            Self::Command(outcome) => outcome.device_id(),
        }
    }
}

impl From<StateReport> for OutboundEvent {
    fn from(report: StateReport) -> Self {
        Self::State(report)
    }
}

impl From<CommandOutcome> for OutboundEvent {
    fn from(outcome: CommandOutcome) -> Self {
        Self::Command(outcome)
    }
}
