//! Worker configuration.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use roomsense_engine::AggregatorConfig;

use crate::error::WorkerError;

/// Source of "now" for occupancy reports and expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockMode {
    /// Wall clock; for live input
    System,
    /// Follows the newest resolved detection timestamp; for recorded input.
    /// Cameras resolve concurrently, so a camera whose queue lags the others
    /// still sees a clock up to the other cameras' queue lag ahead.
    Stream,
}

impl FromStr for ClockMode {
    type Err = WorkerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "system" | "wall" => Ok(ClockMode::System),
            "stream" | "replay" => Ok(ClockMode::Stream),
            other => Err(WorkerError::config_error(format!(
                "unknown clock mode '{}', expected 'system' or 'stream'",
                other
            ))),
        }
    }
}

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// JSON file with room definitions
    pub rooms_file: PathBuf,
    /// Newline-delimited detections; stdin when unset
    pub input: Option<PathBuf>,
    /// Capacity of each camera queue
    pub queue_capacity: usize,
    /// Period of the expiry maintenance pass
    pub maintenance_interval: Duration,
    /// Period of occupancy log lines
    pub report_interval: Duration,
    /// Prometheus listen address; metrics are not exported when unset
    pub metrics_addr: Option<SocketAddr>,
    pub clock_mode: ClockMode,
    /// Global engine configuration; the rooms file may override registry defaults
    pub aggregator: AggregatorConfig,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            rooms_file: PathBuf::from("rooms.json"),
            input: None,
            queue_capacity: 256, // ~8s of one camera at 30 fps
            maintenance_interval: Duration::from_secs(1),
            report_interval: Duration::from_secs(5),
            metrics_addr: None,
            clock_mode: ClockMode::Stream,
            aggregator: AggregatorConfig::default(),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Result<Self, WorkerError> {
        let metrics_addr = match std::env::var("ROOMSENSE_METRICS_ADDR") {
            Ok(addr) if !addr.trim().is_empty() => Some(addr.trim().parse().map_err(|e| {
                WorkerError::config_error(format!("invalid ROOMSENSE_METRICS_ADDR '{}': {}", addr, e))
            })?),
            _ => None,
        };
        let clock_mode = match std::env::var("ROOMSENSE_CLOCK") {
            Ok(mode) => mode.parse()?,
            Err(_) => ClockMode::Stream,
        };

        Ok(Self {
            rooms_file: std::env::var("ROOMSENSE_ROOMS_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("rooms.json")),
            input: std::env::var("ROOMSENSE_INPUT")
                .ok()
                .filter(|s| !s.is_empty() && s != "-")
                .map(PathBuf::from),
            queue_capacity: std::env::var("ROOMSENSE_QUEUE_CAPACITY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(256),
            maintenance_interval: Duration::from_millis(
                std::env::var("ROOMSENSE_MAINTENANCE_INTERVAL_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(1_000),
            ),
            report_interval: Duration::from_millis(
                std::env::var("ROOMSENSE_REPORT_INTERVAL_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(5_000),
            ),
            metrics_addr,
            clock_mode,
            aggregator: AggregatorConfig::from_env(),
        })
    }
}
