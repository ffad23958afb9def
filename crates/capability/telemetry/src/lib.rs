//! 追踪初始化、请求 ID 生成与基础计数指标。

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::{EnvFilter, fmt};

/// 请求级追踪标识。
#[derive(Debug, Clone)]
pub struct RequestIds {
    pub request_id: String,
    pub trace_id: String,
}

/// 指标快照。
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsSnapshot {
    pub inbound_requests: u64,
    pub decode_failures: u64,
    pub registrations: u64,
    pub reports_ingested: u64,
    pub event_publish_failures: u64,
    pub bus_publish_success: u64,
    pub bus_publish_failures: u64,
    pub commands_received: u64,
    pub commands_rejected: u64,
    pub commands_acked: u64,
    pub commands_resolve_failed: u64,
    pub commands_timed_out: u64,
    pub commands_dispatch_failed: u64,
    pub dispatch_latency_ms_total: u64,
    pub dispatch_latency_ms_count: u64,
}

/// 网关计数指标（进程级）。
pub struct TelemetryMetrics {
    inbound_requests: AtomicU64,
    decode_failures: AtomicU64,
    registrations: AtomicU64,
    reports_ingested: AtomicU64,
    event_publish_failures: AtomicU64,
    bus_publish_success: AtomicU64,
    bus_publish_failures: AtomicU64,
    commands_received: AtomicU64,
    commands_rejected: AtomicU64,
    commands_acked: AtomicU64,
    commands_resolve_failed: AtomicU64,
    commands_timed_out: AtomicU64,
    commands_dispatch_failed: AtomicU64,
    dispatch_latency_ms_total: AtomicU64,
    dispatch_latency_ms_count: AtomicU64,
}

impl TelemetryMetrics {
    pub fn new() -> Self {
        Self {
            inbound_requests: AtomicU64::new(0),
            decode_failures: AtomicU64::new(0),
            registrations: AtomicU64::new(0),
            reports_ingested: AtomicU64::new(0),
            event_publish_failures: AtomicU64::new(0),
            bus_publish_success: AtomicU64::new(0),
            bus_publish_failures: AtomicU64::new(0),
            commands_received: AtomicU64::new(0),
            commands_rejected: AtomicU64::new(0),
            commands_acked: AtomicU64::new(0),
            commands_resolve_failed: AtomicU64::new(0),
            commands_timed_out: AtomicU64::new(0),
            commands_dispatch_failed: AtomicU64::new(0),
            dispatch_latency_ms_total: AtomicU64::new(0),
            dispatch_latency_ms_count: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            inbound_requests: self.inbound_requests.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            registrations: self.registrations.load(Ordering::Relaxed),
            reports_ingested: self.reports_ingested.load(Ordering::Relaxed),
            event_publish_failures: self.event_publish_failures.load(Ordering::Relaxed),
            bus_publish_success: self.bus_publish_success.load(Ordering::Relaxed),
            bus_publish_failures: self.bus_publish_failures.load(Ordering::Relaxed),
            commands_received: self.commands_received.load(Ordering::Relaxed),
            commands_rejected: self.commands_rejected.load(Ordering::Relaxed),
            commands_acked: self.commands_acked.load(Ordering::Relaxed),
            commands_resolve_failed: self.commands_resolve_failed.load(Ordering::Relaxed),
            commands_timed_out: self.commands_timed_out.load(Ordering::Relaxed),
            commands_dispatch_failed: self.commands_dispatch_failed.load(Ordering::Relaxed),
            dispatch_latency_ms_total: self.dispatch_latency_ms_total.load(Ordering::Relaxed),
            dispatch_latency_ms_count: self.dispatch_latency_ms_count.load(Ordering::Relaxed),
        }
    }
}

impl Default for TelemetryMetrics {
    fn default() -> Self {
        Self::new()
    }
}

static METRICS: OnceLock<TelemetryMetrics> = OnceLock::new();

/// 获取全局指标实例。
pub fn metrics() -> &'static TelemetryMetrics {
    METRICS.get_or_init(TelemetryMetrics::new)
}

/// 初始化 tracing（默认 info）。
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}

/// 生成新的 request_id 与 trace_id。
pub fn new_request_ids() -> RequestIds {
    RequestIds {
        request_id: uuid::Uuid::new_v4().to_string(),
        trace_id: uuid::Uuid::new_v4().to_string(),
    }
}

/// 生成命令关联 ID（仅用于日志串联）。
pub fn new_correlation_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// 记录 CoAP 入站请求次数。
pub fn record_inbound_request() {
    metrics().inbound_requests.fetch_add(1, Ordering::Relaxed);
}

/// 记录报文解码失败次数（上报、注册、命令）。
pub fn record_decode_failure() {
    metrics().decode_failures.fetch_add(1, Ordering::Relaxed);
}

/// 记录注册表写入次数。
pub fn record_registration() {
    metrics().registrations.fetch_add(1, Ordering::Relaxed);
}

/// 记录状态上报接收成功次数。
pub fn record_report_ingested() {
    metrics().reports_ingested.fetch_add(1, Ordering::Relaxed);
}

/// 记录进程内事件总线发布失败次数。
pub fn record_event_publish_failure() {
    metrics()
        .event_publish_failures
        .fetch_add(1, Ordering::Relaxed);
}

/// 记录持久总线发布成功次数。
pub fn record_bus_publish_success() {
    metrics().bus_publish_success.fetch_add(1, Ordering::Relaxed);
}

/// 记录持久总线发布失败次数。
pub fn record_bus_publish_failure() {
    metrics().bus_publish_failures.fetch_add(1, Ordering::Relaxed);
}

/// 记录进入桥接的命令次数。
pub fn record_command_received() {
    metrics().commands_received.fetch_add(1, Ordering::Relaxed);
}

/// 记录总线上无法解码而丢弃的命令次数。
pub fn record_command_rejected() {
    metrics().commands_rejected.fetch_add(1, Ordering::Relaxed);
}

/// 记录设备成功响应的命令次数。
pub fn record_command_acked() {
    metrics().commands_acked.fetch_add(1, Ordering::Relaxed);
}

/// 记录目标设备未注册的命令次数。
pub fn record_command_resolve_failed() {
    metrics()
        .commands_resolve_failed
        .fetch_add(1, Ordering::Relaxed);
}

/// 记录等待设备响应超时的命令次数。
pub fn record_command_timed_out() {
    metrics().commands_timed_out.fetch_add(1, Ordering::Relaxed);
}

/// 记录下发传输失败的命令次数。
pub fn record_command_dispatch_failed() {
    metrics()
        .commands_dispatch_failed
        .fetch_add(1, Ordering::Relaxed);
}

/// 记录一次下发往返耗时（毫秒）。
pub fn record_dispatch_latency_ms(latency_ms: u64) {
    let metrics = metrics();
    metrics
        .dispatch_latency_ms_total
        .fetch_add(latency_ms, Ordering::Relaxed);
    metrics
        .dispatch_latency_ms_count
        .fetch_add(1, Ordering::Relaxed);
}
