use crate::ControlError;
use crate::dispatcher::CommandDispatcher;
use domain::{Command, CommandOutcome, OutboundEvent};
use irrigation_pipeline::{EventLog, Subscription};
use irrigation_storage::DeviceRegistry;
use irrigation_telemetry::{
    new_correlation_id, record_command_acked, record_command_dispatch_failed,
    record_command_received, record_command_resolve_failed, record_command_timed_out,
    record_dispatch_latency_ms, record_event_publish_failure,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// 单条命令的处理阶段。
///
/// `Received → Resolved → Dispatched → (Acked | TimedOut | DispatchFailed)`，
/// 查找失败时 `Received → ResolveFailed`。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandState {
    Received,
    Resolved,
    Dispatched,
    Acked,
    TimedOut,
    ResolveFailed,
    DispatchFailed,
}

impl CommandState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Resolved => "resolved",
            Self::Dispatched => "dispatched",
            Self::Acked => "acked",
            Self::TimedOut => "timed_out",
            Self::ResolveFailed => "resolve_failed",
            Self::DispatchFailed => "dispatch_failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Acked | Self::TimedOut | Self::ResolveFailed | Self::DispatchFailed
        )
    }
}

/// 命令桥接器：按到达顺序逐条处理命令。
pub struct CommandBridge {
    registry: Arc<dyn DeviceRegistry>,
    dispatcher: Arc<dyn CommandDispatcher>,
    reports: EventLog<OutboundEvent>,
}

impl CommandBridge {
    pub fn new(
        registry: Arc<dyn DeviceRegistry>,
        dispatcher: Arc<dyn CommandDispatcher>,
        reports: EventLog<OutboundEvent>,
    ) -> Self {
        Self {
            registry,
            dispatcher,
            reports,
        }
    }

    /// 处理一条命令并发布其唯一结果，返回终止状态。
    pub async fn process(&self, command: &Command) -> CommandState {
        let correlation_id = new_correlation_id();
        let device_id = command.device_id.as_str();
        record_command_received();
        info!(
            target: "irrigation.control",
            correlation_id = %correlation_id,
            device_id,
            state = CommandState::Received.as_str(),
            "command_state"
        );

        let (state, outcome) = match self.resolve(device_id).await {
            Err(err) => {
                record_command_resolve_failed();
                warn!(
                    target: "irrigation.control",
                    correlation_id = %correlation_id,
                    device_id,
                    error = %err,
                    "command_resolve_failed"
                );
                (
                    CommandState::ResolveFailed,
                    CommandOutcome::failed(device_id, err.to_string()),
                )
            }
            Ok(target) => {
                info!(
                    target: "irrigation.control",
                    correlation_id = %correlation_id,
                    device_id,
                    peer = %target,
                    state = CommandState::Resolved.as_str(),
                    "command_state"
                );
                let started = Instant::now();
                info!(
                    target: "irrigation.control",
                    correlation_id = %correlation_id,
                    device_id,
                    state = CommandState::Dispatched.as_str(),
                    "command_state"
                );
                let result = self.dispatcher.dispatch(target, command).await;
                let latency_ms = started.elapsed().as_millis() as u64;
                record_dispatch_latency_ms(latency_ms);
                match result {
                    Ok(response) => {
                        record_command_acked();
                        (
                            CommandState::Acked,
                            CommandOutcome::acked(device_id, response),
                        )
                    }
                    Err(err) => {
                        let state = match err {
                            ControlError::DispatchTimeout { .. } => {
                                record_command_timed_out();
                                CommandState::TimedOut
                            }
                            _ => {
                                record_command_dispatch_failed();
                                CommandState::DispatchFailed
                            }
                        };
                        warn!(
                            target: "irrigation.control",
                            correlation_id = %correlation_id,
                            device_id,
                            latency_ms,
                            error = %err,
                            "command_dispatch_failed"
                        );
                        (state, CommandOutcome::failed(device_id, err.to_string()))
                    }
                }
            }
        };

        match self.reports.publish(OutboundEvent::Command(outcome)) {
            Ok(seq) => {
                info!(
                    target: "irrigation.control",
                    correlation_id = %correlation_id,
                    device_id,
                    seq,
                    state = state.as_str(),
                    "command_outcome_published"
                );
            }
            Err(err) => {
                record_event_publish_failure();
                error!(
                    target: "irrigation.control",
                    correlation_id = %correlation_id,
                    device_id,
                    state = state.as_str(),
                    stream = self.reports.name(),
                    error = %err,
                    "command_outcome_publish_failed"
                );
            }
        }
        state
    }

    async fn resolve(&self, device_id: &str) -> Result<std::net::SocketAddr, ControlError> {
        match self.registry.lookup(device_id).await {
            Ok(record) => Ok(record.address),
            Err(err) if err.is_not_found() => Err(ControlError::DeviceNotFound(device_id.to_string())),
            Err(err) => Err(ControlError::Registry(err.to_string())),
        }
    }

    /// 消费命令流直到其关闭。命令严格串行处理。
    pub async fn run(&self, mut commands: Subscription<Command>) {
        info!(target: "irrigation.control", from_seq = commands.cursor(), "command_bridge_started");
        while let Some(entry) = commands.next().await {
            self.process(&entry.value).await;
        }
        info!(target: "irrigation.control", "command_bridge_stopped");
    }

    /// 在独立任务中运行桥接循环。
    pub fn spawn(self: Arc<Self>, commands: Subscription<Command>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move { self.run(commands).await })
    }
}
