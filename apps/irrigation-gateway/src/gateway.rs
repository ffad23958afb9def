//! 网关组件装配
//!
//! 按配置构建注册表、事件总线、CoAP 端点、入站资源、命令桥接与总线接入，
//! 并启动各长期任务：
//! - CoAP 接收循环（每个入站请求一个任务）
//! - 命令桥接循环（串行消费命令流）
//! - 命令来源（持久总线订阅 → 命令流）

use crate::AppState;
use irrigation_config::GatewayConfig;
use irrigation_control::{
    CoapCommandDispatcher, CommandBridge, CommandSource, MqttCommandSource,
    MqttCommandSourceConfig, NoopCommandSource,
};
use irrigation_ingest::{
    BusPublisher, GatewayResources, IngestError, MqttBusConfig, MqttBusPublisher,
    NoopBusPublisher, StateRoute,
};
use irrigation_pipeline::EventBus;
use irrigation_protocol::{CoapEndpoint, ProtocolError};
use irrigation_storage::{InMemoryDeviceRegistry, InMemoryReportCache};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// 启动失败。
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("coap endpoint: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("durable bus: {0}")]
    Bus(#[from] IngestError),
}

/// 运行中的网关。
pub struct Gateway {
    state: AppState,
    coap_addr: SocketAddr,
    bridge: JoinHandle<()>,
    source: JoinHandle<()>,
    background: Vec<JoinHandle<()>>,
}

impl Gateway {
    pub async fn start(config: &GatewayConfig) -> Result<Self, StartupError> {
        let registry = Arc::new(InMemoryDeviceRegistry::new());
        let cache = Arc::new(InMemoryReportCache::new());
        let bus = EventBus::new(config.event_log_capacity);
        let mut background = Vec::new();

        let publisher: Arc<dyn BusPublisher> = if config.bus_enabled {
            let (publisher, handle) = MqttBusPublisher::connect(MqttBusConfig {
                host: config.mqtt_host.clone(),
                port: config.mqtt_port,
                username: config.mqtt_username.clone(),
                password: config.mqtt_password.clone(),
                qos: config.mqtt_qos,
            })?;
            background.push(handle);
            Arc::new(publisher)
        } else {
            Arc::new(NoopBusPublisher)
        };

        let endpoint = CoapEndpoint::bind(config.coap_addr.as_str()).await?;
        let coap_addr = endpoint.local_addr();
        let resources = Arc::new(GatewayResources::new(
            registry.clone(),
            cache.clone(),
            bus.reports.clone(),
            publisher,
            StateRoute {
                topic: config.state_topic.clone(),
                partition_key: config.state_partition_key.clone(),
            },
        ));
        let serving = endpoint.clone();
        background.push(tokio::spawn(async move {
            if let Err(err) = serving.serve(resources).await {
                error!(target: "irrigation.gateway", error = %err, "coap_endpoint_stopped");
            }
        }));

        let dispatcher = Arc::new(CoapCommandDispatcher::new(
            endpoint.clone(),
            Duration::from_millis(config.dispatch_timeout_ms),
        ));
        let bridge = Arc::new(CommandBridge::new(
            registry.clone(),
            dispatcher,
            bus.reports.clone(),
        ))
        .spawn(bus.commands.subscribe());

        let source: Arc<dyn CommandSource> = if config.bus_enabled {
            Arc::new(MqttCommandSource::new(MqttCommandSourceConfig {
                host: config.mqtt_host.clone(),
                port: config.mqtt_port,
                username: config.mqtt_username.clone(),
                password: config.mqtt_password.clone(),
                topic: config.command_topic.clone(),
                group: config.command_group.clone(),
                qos: config.mqtt_qos,
            }))
        } else {
            Arc::new(NoopCommandSource)
        };
        let sink = bus.commands.clone();
        let source = tokio::spawn(async move {
            if let Err(err) = source.run(sink).await {
                error!(target: "irrigation.gateway", error = %err, "command_source_stopped");
            }
        });

        info!(
            target: "irrigation.gateway",
            coap_addr = %coap_addr,
            bus_enabled = config.bus_enabled,
            dispatch_timeout_ms = config.dispatch_timeout_ms,
            "gateway_started"
        );

        Ok(Self {
            state: AppState {
                registry,
                cache,
                bus,
            },
            coap_addr,
            bridge,
            source,
            background,
        })
    }

    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    /// CoAP 端点实际绑定的地址（配置端口为 0 时由系统分配）。
    pub fn coap_addr(&self) -> SocketAddr {
        self.coap_addr
    }

    /// 停止命令来源并关闭事件流，等待命令桥接处理完已入队命令，再停止其余任务。
    pub async fn shutdown(self) {
        self.source.abort();
        self.state.bus.close();
        if tokio::time::timeout(Duration::from_secs(5), self.bridge)
            .await
            .is_err()
        {
            error!(target: "irrigation.gateway", "command_bridge_drain_timeout");
        }
        for task in &self.background {
            task.abort();
        }
        info!(target: "irrigation.gateway", "gateway_stopped");
    }
}
