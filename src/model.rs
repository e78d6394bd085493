//! `Phase`, `Event`, `DataPoint`, and `TestResult`: the data model shared
//! between the Runner, the persistence boundary, and the telemetry sink.

use std::collections::HashMap;
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

use crate::config::TestConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Pre,
    Load,
    Post,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Phase::Pre => "pre",
            Phase::Load => "load",
            Phase::Post => "post",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Phase,
    Ramp,
    IfaceStart,
    IfaceStop,
    Custom,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub message: String,
    pub timestamp: SystemTime,
}

impl Event {
    pub fn new(event_type: EventType, message: impl Into<String>) -> Self {
        Self {
            event_type,
            message: message.into(),
            timestamp: SystemTime::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataPoint {
    pub timestamp: SystemTime,
    pub power_mw: f64,
    pub throughput_total_mbps: f64,
    pub throughput_by_interface: HashMap<String, f64>,
    pub target_by_interface: HashMap<String, f64>,
    pub phase: Phase,
    pub events: Vec<Event>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    pub config: TestConfig,
    pub data_points: Vec<DataPoint>,
    pub start_time: SystemTime,
    pub end_time: SystemTime,
}

impl TestResult {
    pub fn duration(&self) -> Duration {
        self.end_time
            .duration_since(self.start_time)
            .unwrap_or(Duration::ZERO)
    }
}
