//! 灌溉设备网关进程：CoAP 端点、命令桥接、持久总线接入与运维 HTTP 接口。

mod gateway;
mod handlers;
mod middleware;
mod routes;
mod utils;

use irrigation_config::GatewayConfig;
use irrigation_pipeline::EventBus;
use irrigation_storage::{DeviceRegistry, ReportCache};
use irrigation_telemetry::init_tracing;
use std::sync::Arc;
use tracing::{error, info};

/// 运维 HTTP 共享状态。
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<dyn DeviceRegistry>,
    pub cache: Arc<dyn ReportCache>,
    pub bus: EventBus,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 加载本地 .env（如存在），便于直接 cargo run 启动
    dotenvy::dotenv().ok();
    // 从环境变量加载运行配置
    let config = GatewayConfig::from_env()?;
    // 初始化结构化日志
    init_tracing();

    let gateway = gateway::Gateway::start(&config).await?;
    info!(target: "irrigation.gateway", coap_addr = %gateway.coap_addr(), "coap_listening");

    let http = if config.http_enabled {
        let listener = tokio::net::TcpListener::bind(&config.http_addr).await?;
        info!(target: "irrigation.gateway", http_addr = %config.http_addr, "http_listening");
        let app = routes::create_router(gateway.state());
        Some(tokio::spawn(async move {
            if let Err(err) = axum::serve(listener, app).await {
                error!(target: "irrigation.gateway", error = %err, "http_server_failed");
            }
        }))
    } else {
        None
    };

    tokio::signal::ctrl_c().await?;
    info!(target: "irrigation.gateway", "shutdown_signal");

    if let Some(http) = http {
        http.abort();
    }
    gateway.shutdown().await;
    Ok(())
}
