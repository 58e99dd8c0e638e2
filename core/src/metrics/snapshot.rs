//! Immutable point-in-time metrics views

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Latency percentiles (all values in milliseconds)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq)]
pub struct LatencyPercentiles {
    /// Minimum value
    pub min: f64,
    /// 50th percentile (median)
    pub p50: f64,
    /// 95th percentile
    pub p95: f64,
    /// 99th percentile
    pub p99: f64,
    /// 99.9th percentile
    pub p999: f64,
    /// Maximum value
    pub max: f64,
    /// Mean value
    pub mean: f64,
}

/// Self-consistent copy of the collector window at one instant
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Snapshot {
    /// When the snapshot was taken
    pub taken_at: chrono::DateTime<chrono::Utc>,

    /// Start of the measurement window (creation or last reset)
    pub window_started_at: chrono::DateTime<chrono::Utc>,

    /// Seconds between window start and `taken_at`
    pub elapsed_secs: f64,

    /// Successful operations
    pub successes: u64,

    /// Failed operations
    pub failures: u64,

    /// Bytes moved by successful operations
    pub bytes: u64,

    /// Operations per second over the window
    pub ops_per_sec: f64,

    /// Bytes per second over the window
    pub bytes_per_sec: f64,

    /// Latency of successful operations
    pub latency: LatencyPercentiles,
}

impl Snapshot {
    /// Successes plus failures
    pub fn total_operations(&self) -> u64 {
        self.successes + self.failures
    }

    /// Failure share (0.0 - 1.0)
    pub fn error_rate(&self) -> f64 {
        let total = self.total_operations();
        if total == 0 {
            0.0
        } else {
            self.failures as f64 / total as f64
        }
    }

    /// Throughput in MiB per second
    pub fn megabytes_per_sec(&self) -> f64 {
        self.bytes_per_sec / (1024.0 * 1024.0)
    }

    /// Window length as a `Duration`
    pub fn elapsed(&self) -> Duration {
        Duration::from_secs_f64(self.elapsed_secs.max(0.0))
    }
}

/// Divide by elapsed seconds, 0 for an empty window
pub(crate) fn per_second(value: u64, elapsed_secs: f64) -> f64 {
    if elapsed_secs > 0.0 {
        value as f64 / elapsed_secs
    } else {
        0.0
    }
}
