//! 灌溉控制器状态上报。
//!
//! 设备固件存在两种互不兼容的报文形状，按版本分别建模：
//!
//! - V1：`type, time, deviceId, valves[], flow1, flow2, flow3, moist01, moist02`
//! - V2：`type, time, start_time, deviceId, valves[], flows[], moists[]`
//!
//! 序列化时各版本保持自己的字段形状，解码（版本识别）见 normalize 模块。

use serde::{Deserialize, Serialize};

/// 状态上报的报文版本。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportSchema {
    V1,
    V2,
}

impl ReportSchema {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::V1 => "v1",
            Self::V2 => "v2",
        }
    }
}

/// V1 上报：三路流量、两路湿度为独立字段。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateReportV1 {
    #[serde(rename = "type")]
    pub kind: String,
    pub time: i64,
    #[serde(rename = "deviceId")]
    pub device_id: String,
    pub valves: Vec<i64>,
    pub flow1: i64,
    pub flow2: i64,
    pub flow3: i64,
    pub moist01: i64,
    pub moist02: i64,
}

/// V2 上报：流量与湿度为数组，`time` 相对 `start_time` 计时。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateReportV2 {
    #[serde(rename = "type")]
    pub kind: String,
    pub time: i64,
    pub start_time: i64,
    #[serde(rename = "deviceId")]
    pub device_id: String,
    pub valves: Vec<i64>,
    /// 未接流量计/湿度传感器的固件省略这两个数组
    #[serde(default)]
    pub flows: Vec<i64>,
    #[serde(default)]
    pub moists: Vec<i64>,
}

/// 状态上报（构造后不可变）。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum StateReport {
    V1(StateReportV1),
    V2(StateReportV2),
}

impl StateReport {
    pub fn schema(&self) -> ReportSchema {
        match self {
            Self::V1(_) => ReportSchema::V1,
            Self::V2(_) => ReportSchema::V2,
        }
    }

    pub fn kind(&self) -> &str {
        match self {
            Self::V1(report) => &report.kind,
            Self::V2(report) => &report.kind,
        }
    }

    pub fn device_id(&self) -> &str {
        match self {
            Self::V1(report) => &report.device_id,
            Self::V2(report) => &report.device_id,
        }
    }

    /// 报文自带的时间戳（V2 为相对 `start_time` 的偏移）。
    pub fn time(&self) -> i64 {
        match self {
            Self::V1(report) => report.time,
            Self::V2(report) => report.time,
        }
    }

    pub fn valves(&self) -> &[i64] {
        match self {
            Self::V1(report) => &report.valves,
            Self::V2(report) => &report.valves,
        }
    }

    /// 按通道顺序的流量读数。
    pub fn flows(&self) -> Vec<i64> {
        match self {
            Self::V1(report) => vec![report.flow1, report.flow2, report.flow3],
            Self::V2(report) => report.flows.clone(),
        }
    }

    /// 按通道顺序的土壤湿度读数。
    pub fn moistures(&self) -> Vec<i64> {
        match self {
            Self::V1(report) => vec![report.moist01, report.moist02],
            Self::V2(report) => report.moists.clone(),
        }
    }
}

impl From<StateReportV1> for StateReport {
    fn from(report: StateReportV1) -> Self {
        Self::V1(report)
    }
}

impl From<StateReportV2> for StateReport {
    fn from(report: StateReportV2) -> Self {
        Self::V2(report)
    }
}
