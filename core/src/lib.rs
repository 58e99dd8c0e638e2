//! streambench-core: Load generation engine for messaging backends
//!
//! This crate provides the concurrent machinery behind streambench:
//!
//! - Token-bucket rate limiting shared by all workers
//! - Lock-free metrics collection with snapshots and latency percentiles
//! - Workers and a controllable worker pool (pause, resume, scale, stop)
//! - Named profiles resolved into a validated [`Configuration`]
//! - JSON-lines snapshot export
//!
//! Backends plug in through the [`Operation`] trait.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod export;
pub mod metrics;
pub mod pool;
pub mod profile;
pub mod traits;
pub mod worker;

pub use config::{BatchConfig, Compression, Configuration, ExportConfig, SubscriptionType};
pub use error::*;
pub use export::{RecordKind, SnapshotExporter};
pub use metrics::{LatencyPercentiles, MetricsCollector, Snapshot};
pub use pool::{AggregatedStats, PoolBuilder, PoolState, StopReport, WorkerPool, WorkerShare};
pub use profile::{Profile, ProfileOverrides, ProfileResolver};
pub use traits::*;
pub use worker::{AcquireError, PauseGate, RateLimiter, Worker, WorkerBuilder, WorkerStats};
