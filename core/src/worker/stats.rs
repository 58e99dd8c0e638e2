//! Per-worker counters returned when a worker exits

use std::time::{Duration, Instant};

use serde::Serialize;

/// Outcome counters of one worker run
///
/// Owned by the worker, independent of the shared collector; metric resets do
/// not touch it.
#[derive(Debug, Default, Clone, Serialize)]
pub struct WorkerStats {
    /// Worker that produced these counters
    pub worker_id: usize,

    /// Operations that succeeded
    pub completed: u64,

    /// Operations that failed, fatal or not
    pub errors: u64,

    /// Bytes reported by successful operations
    pub bytes: u64,

    /// Worker exited because its operation reported a fatal error
    pub fatal: bool,

    /// When the worker loop began
    #[serde(skip)]
    pub started_at: Option<Instant>,

    /// When the worker loop ended
    #[serde(skip)]
    pub ended_at: Option<Instant>,
}

impl WorkerStats {
    /// Create new empty stats
    pub fn new() -> Self {
        Self::default()
    }

    /// Stats for `worker_id` with the clock already running
    pub fn started(worker_id: usize) -> Self {
        Self {
            worker_id,
            started_at: Some(Instant::now()),
            ..Self::default()
        }
    }

    /// Stop the clock
    pub fn finish(&mut self) {
        self.ended_at.get_or_insert_with(Instant::now);
    }

    /// Successes plus failures
    pub fn total_operations(&self) -> u64 {
        self.completed + self.errors
    }

    /// Fraction of operations that succeeded (0 when nothing ran)
    pub fn success_rate(&self) -> f64 {
        ratio(self.completed, self.total_operations())
    }

    /// Fraction of operations that failed (0 when nothing ran)
    pub fn error_rate(&self) -> f64 {
        ratio(self.errors, self.total_operations())
    }

    /// Run time so far, or the full run time once finished
    pub fn elapsed(&self) -> Option<Duration> {
        let start = self.started_at?;
        Some(match self.ended_at {
            Some(end) => end.saturating_duration_since(start),
            None => start.elapsed(),
        })
    }

    /// Operations per second over [`elapsed`](Self::elapsed)
    pub fn operations_per_second(&self) -> f64 {
        self.rate_of(self.total_operations())
    }

    /// Bytes per second over [`elapsed`](Self::elapsed)
    pub fn bytes_per_second(&self) -> f64 {
        self.rate_of(self.bytes)
    }

    fn rate_of(&self, value: u64) -> f64 {
        match self.elapsed().map(|d| d.as_secs_f64()) {
            Some(secs) if secs > 0.0 => value as f64 / secs,
            _ => 0.0,
        }
    }

    /// Count one success
    pub fn record_success(&mut self, bytes: u64) {
        self.completed += 1;
        self.bytes += bytes;
    }

    /// Count one failure
    pub fn record_error(&mut self) {
        self.errors += 1;
    }

    /// Add another worker's counters to these
    pub fn merge(&mut self, other: &WorkerStats) {
        self.completed += other.completed;
        self.errors += other.errors;
        self.bytes += other.bytes;
        self.fatal |= other.fatal;
    }
}

fn ratio(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}
