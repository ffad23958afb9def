use crate::ControlError;
use async_trait::async_trait;
use domain::Command;
use irrigation_normalize::decode_command;
use irrigation_pipeline::EventLog;
use irrigation_telemetry::{record_command_rejected, record_event_publish_failure};
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// 命令来源：把外部投递的命令按到达顺序追加到命令流。
#[async_trait]
pub trait CommandSource: Send + Sync {
    async fn run(&self, sink: EventLog<Command>) -> Result<(), ControlError>;
}

/// 占位来源（总线未启用时使用）。
#[derive(Debug, Default)]
pub struct NoopCommandSource;

#[async_trait]
impl CommandSource for NoopCommandSource {
    async fn run(&self, _sink: EventLog<Command>) -> Result<(), ControlError> {
        Ok(())
    }
}

/// MQTT 命令来源配置。
#[derive(Debug, Clone)]
pub struct MqttCommandSourceConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub topic: String,
    /// 消费组：多个网关实例共享同一订阅，每条命令只投递给其中一个
    pub group: String,
    pub qos: u8,
}

impl MqttCommandSourceConfig {
    /// `$share/{group}/{topic}`；组名为空时退化为普通订阅。
    pub fn subscription(&self) -> String {
        let topic = self.topic.trim_matches('/');
        let group = self.group.trim();
        if group.is_empty() {
            topic.to_string()
        } else {
            format!("$share/{}/{}", group, topic)
        }
    }
}

/// MQTT 命令来源。
#[derive(Debug, Clone)]
pub struct MqttCommandSource {
    config: MqttCommandSourceConfig,
}

impl MqttCommandSource {
    pub fn new(config: MqttCommandSourceConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MqttCommandSourceConfig {
        &self.config
    }
}

#[async_trait]
impl CommandSource for MqttCommandSource {
    async fn run(&self, sink: EventLog<Command>) -> Result<(), ControlError> {
        let client_id = format!("irrigation-control-{}", uuid::Uuid::new_v4());
        let mut options =
            MqttOptions::new(client_id, self.config.host.clone(), self.config.port);
        options.set_keep_alive(Duration::from_secs(30));
        if let (Some(username), Some(password)) =
            (self.config.username.as_ref(), self.config.password.as_ref())
        {
            options.set_credentials(username, password);
        }
        let (client, mut eventloop) = AsyncClient::new(options, 10);
        let subscription = self.config.subscription();
        let qos = qos_from_u8(self.config.qos);

        loop {
            match eventloop.poll().await {
                // 每次（重）连接后重新订阅
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    client
                        .subscribe(subscription.clone(), qos)
                        .await
                        .map_err(|err| ControlError::Source(err.to_string()))?;
                    info!(
                        target: "irrigation.control",
                        subscription = %subscription,
                        "command_source_subscribed"
                    );
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    on_publish(&publish.topic, &publish.payload, &sink)?;
                }
                Ok(_) => {}
                Err(err) => {
                    if sink.is_closed() {
                        return Ok(());
                    }
                    warn!(target: "irrigation.control", error = %err, "command_source_eventloop_error");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }
}

/// 处理一条投递：解码并追加到命令流，返回分配的序号。
///
/// 无法解码的消息与背压下被拒的命令记录后跳过（`Ok(None)`），
/// 只有命令流已关闭才返回错误，让来源退出。
fn on_publish(
    topic: &str,
    payload: &[u8],
    sink: &EventLog<Command>,
) -> Result<Option<u64>, ControlError> {
    let command = match decode_command(payload) {
        Ok(command) => command,
        Err(err) => {
            record_command_rejected();
            warn!(
                target: "irrigation.control",
                topic = %topic,
                size = payload.len(),
                error = %err,
                "command_payload_invalid"
            );
            return Ok(None);
        }
    };
    let device_id = command.device_id.clone();
    match sink.publish(command) {
        Ok(seq) => {
            debug!(target: "irrigation.control", device_id = %device_id, seq, "command_enqueued");
            Ok(Some(seq))
        }
        Err(err) => {
            record_event_publish_failure();
            error!(
                target: "irrigation.control",
                device_id = %device_id,
                stream = sink.name(),
                error = %err,
                "command_enqueue_failed"
            );
            if sink.is_closed() {
                Err(ControlError::Publish(err.to_string()))
            } else {
                Ok(None)
            }
        }
    }
}

fn qos_from_u8(value: u8) -> QoS {
    match value {
        0 => QoS::AtMostOnce,
        2 => QoS::ExactlyOnce,
        _ => QoS::AtLeastOnce,
    }
}
