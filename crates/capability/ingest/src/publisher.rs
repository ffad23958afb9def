use crate::IngestError;
use async_trait::async_trait;
use rumqttc::{AsyncClient, MqttOptions, QoS};
use std::time::Duration;
use tracing::{info, warn};

/// 持久总线发布抽象。
#[async_trait]
pub trait BusPublisher: Send + Sync {
    /// 以分区键 `key` 向 `topic` 发布 `value`。
    async fn publish(&self, topic: &str, key: &str, value: &str) -> Result<(), IngestError>;
}

/// 空发布器（总线未启用时使用）。
#[derive(Debug, Default)]
pub struct NoopBusPublisher;

#[async_trait]
impl BusPublisher for NoopBusPublisher {
    async fn publish(&self, _topic: &str, _key: &str, _value: &str) -> Result<(), IngestError> {
        Ok(())
    }
}

/// MQTT 发布器配置。
#[derive(Debug, Clone)]
pub struct MqttBusConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub qos: u8,
}

/// MQTT 发布器：分区键作为 topic 的最后一级（`{topic}/{key}`），
/// 同一键的消息落在同一 topic 上，保持相对顺序。
#[derive(Clone)]
pub struct MqttBusPublisher {
    client: AsyncClient,
    qos: QoS,
}

impl MqttBusPublisher {
    pub fn connect(
        config: MqttBusConfig,
    ) -> Result<(Self, tokio::task::JoinHandle<()>), IngestError> {
        if config.host.trim().is_empty() {
            return Err(IngestError::Connect("empty mqtt host".to_string()));
        }
        let client_id = format!("irrigation-ingest-{}", uuid::Uuid::new_v4());
        let mut options = MqttOptions::new(client_id, config.host.clone(), config.port);
        options.set_keep_alive(Duration::from_secs(30));
        if let (Some(username), Some(password)) = (config.username, config.password) {
            options.set_credentials(username, password);
        }
        let (client, mut eventloop) = AsyncClient::new(options, 64);
        info!(
            target: "irrigation.ingest",
            host = %config.host,
            port = config.port,
            "bus_publisher_connecting"
        );
        let handle = tokio::spawn(async move {
            loop {
                if let Err(err) = eventloop.poll().await {
                    warn!(target: "irrigation.ingest", error = %err, "bus_publisher_eventloop_error");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        });
        Ok((
            Self {
                client,
                qos: qos_from_u8(config.qos),
            },
            handle,
        ))
    }
}

#[async_trait]
impl BusPublisher for MqttBusPublisher {
    async fn publish(&self, topic: &str, key: &str, value: &str) -> Result<(), IngestError> {
        let topic = keyed_topic(topic, key);
        // 请求通道满（broker 不可达时 eventloop 不再消费）立即失败，不阻塞入站处理
        self.client
            .try_publish(topic, self.qos, false, value.as_bytes().to_vec())
            .map_err(|err| IngestError::Publish(err.to_string()))
    }
}

fn keyed_topic(topic: &str, key: &str) -> String {
    let topic = topic.trim_end_matches('/');
    let key = key.trim_matches('/');
    if key.is_empty() {
        topic.to_string()
    } else {
        format!("{}/{}", topic, key)
    }
}

pub fn qos_from_u8(value: u8) -> QoS {
    match value {
        0 => QoS::AtMostOnce,
        2 => QoS::ExactlyOnce,
        _ => QoS::AtLeastOnce,
    }
}
