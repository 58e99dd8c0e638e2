//! Run configuration types and validation

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{BenchError, BenchResult};

/// Upper bound on concurrently running workers
pub const MAX_WORKERS: usize = 10_000;
/// Smallest accepted payload, in bytes
pub const MIN_PAYLOAD_SIZE: usize = 1;
/// Largest accepted payload, in bytes (10 MiB)
pub const MAX_PAYLOAD_SIZE: usize = 10 * 1024 * 1024;
/// Largest accepted batch, in messages
pub const MAX_BATCH_MESSAGES: u32 = 100_000;
/// Longest accepted batch linger
pub const MAX_BATCH_DELAY: Duration = Duration::from_secs(10);
/// Largest accepted producer queue / consumer backlog
pub const MAX_QUEUE_SIZE: usize = 1_000_000;
/// Shortest accepted metrics interval
pub const MIN_METRICS_INTERVAL: Duration = Duration::from_millis(100);
/// Longest accepted metrics interval
pub const MAX_METRICS_INTERVAL: Duration = Duration::from_secs(3600);

/// Run configuration
///
/// Produced by [`crate::profile::ProfileResolver`] and consumed by the worker pool.
/// A zero `rate`, `total_operations` or `duration` means unbounded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    /// Number of concurrently running workers
    pub workers: usize,

    /// Target operations per second across all workers (0 = unbounded)
    pub rate: u64,

    /// Total operations to perform across all workers (0 = unbounded)
    pub total_operations: u64,

    /// Message payload size in bytes
    pub payload_size: usize,

    /// Producer batching parameters
    pub batching: BatchConfig,

    /// Payload compression codec
    pub compression: Compression,

    /// Consumer subscription mode
    pub subscription: SubscriptionType,

    /// Producer pending-message queue / consumer receive backlog
    pub queue_size: usize,

    /// Test duration (zero = run until stopped)
    #[serde(with = "millis")]
    pub duration: Duration,

    /// Warm-up phase excluded from the reported metrics
    #[serde(with = "millis")]
    pub warmup: Duration,

    /// Interval between periodic snapshots
    #[serde(with = "millis")]
    pub metrics_interval: Duration,

    /// Upper bound on how long stop waits for workers to confirm exit
    #[serde(with = "millis")]
    pub shutdown_timeout: Duration,

    /// Snapshot export settings
    pub export: ExportConfig,
}

/// Producer batching parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Whether the transport should batch messages
    pub enabled: bool,

    /// Maximum messages per batch
    pub max_messages: u32,

    /// Maximum time a message may wait for its batch to fill
    #[serde(with = "millis")]
    pub max_delay: Duration,
}

impl BatchConfig {
    /// Batching turned off
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            max_messages: 1,
            max_delay: Duration::ZERO,
        }
    }

    /// Batching with the given limits
    pub fn new(max_messages: u32, max_delay: Duration) -> Self {
        Self {
            enabled: true,
            max_messages,
            max_delay,
        }
    }
}

/// Snapshot export settings
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Whether snapshots are written to `path`
    pub enabled: bool,

    /// JSON-lines destination
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

/// Payload compression codec requested from the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    /// No compression
    #[default]
    None,
    /// LZ4 block compression
    Lz4,
    /// zlib / deflate
    Zlib,
    /// Zstandard
    Zstd,
    /// Snappy
    Snappy,
}

impl Compression {
    /// All accepted codecs
    pub const ALL: [Compression; 5] = [
        Compression::None,
        Compression::Lz4,
        Compression::Zlib,
        Compression::Zstd,
        Compression::Snappy,
    ];

    /// Canonical lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            Compression::None => "none",
            Compression::Lz4 => "lz4",
            Compression::Zlib => "zlib",
            Compression::Zstd => "zstd",
            Compression::Snappy => "snappy",
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Compression {
    type Err = BenchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        Compression::ALL
            .into_iter()
            .find(|c| c.as_str() == normalized)
            .ok_or_else(|| {
                BenchError::invalid(
                    "compression",
                    format!("unrecognized codec `{s}` (expected none, lz4, zlib, zstd or snappy)"),
                )
            })
    }
}

/// Consumer subscription mode requested from the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SubscriptionType {
    /// A single consumer owns the subscription
    #[default]
    Exclusive,
    /// Consumers compete for messages round-robin
    Shared,
    /// One active consumer with standbys
    Failover,
    /// Messages with equal keys go to the same consumer
    KeyShared,
}

impl SubscriptionType {
    /// All accepted modes
    pub const ALL: [SubscriptionType; 4] = [
        SubscriptionType::Exclusive,
        SubscriptionType::Shared,
        SubscriptionType::Failover,
        SubscriptionType::KeyShared,
    ];

    /// Canonical kebab-case name
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionType::Exclusive => "exclusive",
            SubscriptionType::Shared => "shared",
            SubscriptionType::Failover => "failover",
            SubscriptionType::KeyShared => "key-shared",
        }
    }
}

impl fmt::Display for SubscriptionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubscriptionType {
    type Err = BenchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        SubscriptionType::ALL
            .into_iter()
            .find(|t| t.as_str() == normalized)
            .ok_or_else(|| {
                BenchError::invalid(
                    "subscription",
                    format!(
                        "unrecognized mode `{s}` (expected exclusive, shared, failover or key-shared)"
                    ),
                )
            })
    }
}

impl Default for Configuration {
    fn default() -> Self {
        crate::profile::Profile::Balanced.defaults()
    }
}

impl Configuration {
    /// Set the worker count
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Set the target rate (0 = unbounded)
    pub fn with_rate(mut self, rate: u64) -> Self {
        self.rate = rate;
        self
    }

    /// Set the total operation count (0 = unbounded)
    pub fn with_total_operations(mut self, total: u64) -> Self {
        self.total_operations = total;
        self
    }

    /// Set the test duration (zero = unbounded)
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Set the warm-up duration
    pub fn with_warmup(mut self, warmup: Duration) -> Self {
        self.warmup = warmup;
        self
    }

    /// Set the stop grace timeout
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// True when no rate limit applies
    pub fn is_rate_unbounded(&self) -> bool {
        self.rate == 0
    }

    /// Test duration, or `None` when the run is unbounded in time
    pub fn duration_limit(&self) -> Option<Duration> {
        (!self.duration.is_zero()).then_some(self.duration)
    }

    /// Total operations, or `None` when unbounded in count
    pub fn operation_limit(&self) -> Option<u64> {
        (self.total_operations > 0).then_some(self.total_operations)
    }

    /// Validate every field, failing on the first out-of-range value
    pub fn validate(&self) -> BenchResult<()> {
        if self.workers == 0 {
            return Err(BenchError::invalid("workers", "must be at least 1"));
        }
        if self.workers > MAX_WORKERS {
            return Err(BenchError::invalid(
                "workers",
                format!("cannot exceed {MAX_WORKERS}, got {}", self.workers),
            ));
        }

        if !(MIN_PAYLOAD_SIZE..=MAX_PAYLOAD_SIZE).contains(&self.payload_size) {
            return Err(BenchError::invalid(
                "payload_size",
                format!(
                    "must be between {MIN_PAYLOAD_SIZE} and {MAX_PAYLOAD_SIZE} bytes, got {}",
                    self.payload_size
                ),
            ));
        }

        if self.batching.enabled {
            if self.batching.max_messages == 0 || self.batching.max_messages > MAX_BATCH_MESSAGES
            {
                return Err(BenchError::invalid(
                    "batching.max_messages",
                    format!(
                        "must be between 1 and {MAX_BATCH_MESSAGES}, got {}",
                        self.batching.max_messages
                    ),
                ));
            }
            if self.batching.max_delay > MAX_BATCH_DELAY {
                return Err(BenchError::invalid(
                    "batching.max_delay",
                    format!("cannot exceed {MAX_BATCH_DELAY:?}"),
                ));
            }
        }

        if self.queue_size == 0 || self.queue_size > MAX_QUEUE_SIZE {
            return Err(BenchError::invalid(
                "queue_size",
                format!(
                    "must be between 1 and {MAX_QUEUE_SIZE}, got {}",
                    self.queue_size
                ),
            ));
        }

        if let Some(duration) = self.duration_limit()
            && self.warmup >= duration
        {
            return Err(BenchError::invalid(
                "warmup",
                format!(
                    "warm-up ({:?}) must be shorter than the test duration ({duration:?})",
                    self.warmup
                ),
            ));
        }

        if self.metrics_interval < MIN_METRICS_INTERVAL
            || self.metrics_interval > MAX_METRICS_INTERVAL
        {
            return Err(BenchError::invalid(
                "metrics_interval",
                format!(
                    "must be between {MIN_METRICS_INTERVAL:?} and {MAX_METRICS_INTERVAL:?}, got {:?}",
                    self.metrics_interval
                ),
            ));
        }

        if self.shutdown_timeout.is_zero() {
            return Err(BenchError::invalid(
                "shutdown_timeout",
                "must be greater than zero",
            ));
        }

        if self.export.enabled {
            match &self.export.path {
                Some(path) if !path.as_os_str().is_empty() => {}
                _ => {
                    return Err(BenchError::invalid(
                        "export.path",
                        "required when export is enabled",
                    ));
                }
            }
        }

        Ok(())
    }
}

/// Serde adapter storing durations as integer milliseconds
pub(crate) mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
