//! `RunStore`: persistence boundary for a finished `TestResult`, plus the
//! summary statistics computed before handing it off.
//!
//! A single `rusqlite` connection behind a `Mutex`, with `serde_json` blobs
//! for the nested config/data-point structures and indices matching the
//! record's natural lookup keys (device, test name, timestamp).

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::SystemTime;

use async_trait::async_trait;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

use crate::error::{LoadBenchError, Result};
use crate::model::{DataPoint, Phase, TestResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseStats {
    pub mean_power_mw: f64,
    pub stddev_power_mw: f64,
    pub mean_throughput_mbps: f64,
    pub stddev_throughput_mbps: f64,
    pub duration_secs: f64,
    pub sample_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub avg_power_mw: f64,
    pub min_power_mw: f64,
    pub max_power_mw: f64,
    pub avg_throughput_mbps: f64,
    pub max_throughput_mbps: f64,
    pub per_phase: HashMap<String, PhaseStats>,
}

/// Compute the summary statistics from a result's data points.
pub fn summarize(result: &TestResult) -> RunSummary {
    let power: Vec<f64> = result.data_points.iter().map(|d| d.power_mw).collect();
    let throughput: Vec<f64> = result
        .data_points
        .iter()
        .map(|d| d.throughput_total_mbps)
        .collect();

    let avg_power_mw = mean(&power);
    let min_power_mw = power.iter().cloned().fold(f64::INFINITY, f64::min);
    let max_power_mw = power.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let avg_throughput_mbps = mean(&throughput);
    let max_throughput_mbps = throughput.iter().cloned().fold(f64::NEG_INFINITY, f64::max);

    let mut per_phase = HashMap::new();
    for phase in [Phase::Pre, Phase::Load, Phase::Post] {
        let points: Vec<&DataPoint> = result
            .data_points
            .iter()
            .filter(|d| d.phase == phase)
            .collect();
        if points.is_empty() {
            continue;
        }
        let phase_power: Vec<f64> = points.iter().map(|d| d.power_mw).collect();
        let phase_throughput: Vec<f64> = points.iter().map(|d| d.throughput_total_mbps).collect();
        let duration_secs = points
            .last()
            .unwrap()
            .timestamp
            .duration_since(points.first().unwrap().timestamp)
            .unwrap_or_default()
            .as_secs_f64();

        per_phase.insert(
            phase.to_string(),
            PhaseStats {
                mean_power_mw: mean(&phase_power),
                stddev_power_mw: stddev(&phase_power),
                mean_throughput_mbps: mean(&phase_throughput),
                stddev_throughput_mbps: stddev(&phase_throughput),
                duration_secs,
                sample_count: points.len(),
            },
        );
    }

    RunSummary {
        avg_power_mw: nan_to_zero(avg_power_mw),
        min_power_mw: nan_to_zero_inf(min_power_mw),
        max_power_mw: nan_to_zero_inf(max_power_mw),
        avg_throughput_mbps: nan_to_zero(avg_throughput_mbps),
        max_throughput_mbps: nan_to_zero_inf(max_throughput_mbps),
        per_phase,
    }
}

fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    xs.iter().sum::<f64>() / xs.len() as f64
}

fn stddev(xs: &[f64]) -> f64 {
    if xs.len() < 2 {
        return 0.0;
    }
    let m = mean(xs);
    let variance = xs.iter().map(|x| (x - m).powi(2)).sum::<f64>() / xs.len() as f64;
    variance.sqrt()
}

fn nan_to_zero(x: f64) -> f64 {
    if x.is_nan() {
        0.0
    } else {
        x
    }
}

fn nan_to_zero_inf(x: f64) -> f64 {
    if x.is_finite() {
        x
    } else {
        0.0
    }
}

#[async_trait]
pub trait RunStore: Send + Sync {
    async fn save(&self, result: &TestResult) -> Result<i64>;
}

/// SQLite-backed `RunStore`: `config` and `dataPoints` persist as opaque
/// JSON blobs, alongside the computed `RunSummary` blob.
pub struct SqliteRunStore {
    conn: Mutex<Connection>,
}

impl SqliteRunStore {
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path).map_err(|e| LoadBenchError::Store(e.to_string()))?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS runs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                test_name TEXT NOT NULL,
                device_name TEXT NOT NULL,
                start_timestamp INTEGER NOT NULL,
                config_blob TEXT NOT NULL,
                data_points_blob TEXT NOT NULL,
                summary_blob TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_runs_timestamp ON runs(start_timestamp);
            CREATE INDEX IF NOT EXISTS idx_runs_device ON runs(device_name);
            CREATE INDEX IF NOT EXISTS idx_runs_test ON runs(test_name);
            CREATE INDEX IF NOT EXISTS idx_runs_created ON runs(created_at);",
        )
        .map_err(|e| LoadBenchError::Store(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn in_memory() -> Result<Self> {
        Self::open(":memory:")
    }
}

#[async_trait]
impl RunStore for SqliteRunStore {
    async fn save(&self, result: &TestResult) -> Result<i64> {
        let summary = summarize(result);
        let config_blob = serde_json::to_string(&result.config)
            .map_err(|e| LoadBenchError::Store(e.to_string()))?;
        let data_points_blob = serde_json::to_string(&result.data_points)
            .map_err(|e| LoadBenchError::Store(e.to_string()))?;
        let summary_blob =
            serde_json::to_string(&summary).map_err(|e| LoadBenchError::Store(e.to_string()))?;

        let start_timestamp = result
            .start_time
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as i64;
        let created_at = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as i64;

        let conn = self.conn.lock().expect("sqlite connection mutex poisoned");
        conn.execute(
            "INSERT INTO runs (test_name, device_name, start_timestamp, config_blob, data_points_blob, summary_blob, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                result.config.test_name,
                result.config.device_name,
                start_timestamp,
                config_blob,
                data_points_blob,
                summary_blob,
                created_at,
            ],
        )
        .map_err(|e| LoadBenchError::Store(e.to_string()))?;

        Ok(conn.last_insert_rowid())
    }
}
