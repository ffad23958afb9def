//! 网关运行配置加载。

use std::env;

/// 配置加载错误。
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {0}: {1}")]
    Invalid(String, String),
}

/// 网关运行配置。
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// CoAP 端点监听地址（UDP）。
    pub coap_addr: String,
    pub http_enabled: bool,
    pub http_addr: String,
    /// 是否接入持久总线（关闭时使用空发布器与空命令源）。
    pub bus_enabled: bool,
    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub mqtt_username: Option<String>,
    pub mqtt_password: Option<String>,
    pub mqtt_qos: u8,
    pub state_topic: String,
    /// 状态上报发布使用的固定分区键。
    pub state_partition_key: String,
    pub command_topic: String,
    pub command_group: String,
    /// 命令下发等待设备响应的超时（毫秒）。
    pub dispatch_timeout_ms: u64,
    /// 进程内事件日志容量，写满后发布失败。
    pub event_log_capacity: usize,
}

impl GatewayConfig {
    /// 从环境变量读取配置。
    pub fn from_env() -> Result<Self, ConfigError> {
        let coap_addr =
            env::var("IRRIGATION_COAP_ADDR").unwrap_or_else(|_| "0.0.0.0:5683".to_string());
        let http_enabled = read_bool_with_default("IRRIGATION_HTTP", true);
        let http_addr =
            env::var("IRRIGATION_HTTP_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_string());
        let bus_enabled = read_bool_with_default("IRRIGATION_BUS", false);
        let mqtt_host = env::var("IRRIGATION_MQTT_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let mqtt_port = read_u16_with_default("IRRIGATION_MQTT_PORT", 1883)?;
        let mqtt_username = read_optional("IRRIGATION_MQTT_USERNAME");
        let mqtt_password = read_optional("IRRIGATION_MQTT_PASSWORD");
        let mqtt_qos = read_u8_with_default("IRRIGATION_MQTT_QOS", 1)?;
        if mqtt_qos > 2 {
            return Err(ConfigError::Invalid(
                "IRRIGATION_MQTT_QOS".to_string(),
                mqtt_qos.to_string(),
            ));
        }
        let state_topic =
            env::var("IRRIGATION_STATE_TOPIC").unwrap_or_else(|_| "irrigation/state".to_string());
        let state_partition_key =
            env::var("IRRIGATION_STATE_PARTITION_KEY").unwrap_or_else(|_| "1".to_string());
        let command_topic = env::var("IRRIGATION_COMMAND_TOPIC")
            .unwrap_or_else(|_| "irrigation/commands".to_string());
        let command_group = env::var("IRRIGATION_COMMAND_GROUP")
            .unwrap_or_else(|_| "irrigation-gateway".to_string());
        let dispatch_timeout_ms = read_u64_with_default("IRRIGATION_DISPATCH_TIMEOUT_MS", 1000)?;
        if dispatch_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "IRRIGATION_DISPATCH_TIMEOUT_MS".to_string(),
                "0".to_string(),
            ));
        }
        let event_log_capacity =
            read_u64_with_default("IRRIGATION_EVENT_LOG_CAPACITY", 100_000)? as usize;

        Ok(Self {
            coap_addr,
            http_enabled,
            http_addr,
            bus_enabled,
            mqtt_host,
            mqtt_port,
            mqtt_username,
            mqtt_password,
            mqtt_qos,
            state_topic,
            state_partition_key,
            command_topic,
            command_group,
            dispatch_timeout_ms,
            event_log_capacity,
        })
    }
}

fn read_u16_with_default(key: &str, default: u16) -> Result<u16, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<u16>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_u8_with_default(key: &str, default: u8) -> Result<u8, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<u8>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_u64_with_default(key: &str, default: u64) -> Result<u64, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<u64>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_optional(key: &str) -> Option<String> {
    match env::var(key) {
        Ok(value) if !value.is_empty() => Some(value),
        _ => None,
    }
}

fn read_bool_with_default(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(value) => matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "on"),
        Err(_) => default,
    }
}
