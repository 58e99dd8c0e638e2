//! Lock-free metrics collection
//!
//! All counters of the current measurement window live in one [`Window`] behind an
//! `ArcSwap`. A record loads the window once and updates every field on it, and
//! [`MetricsCollector::reset`] swaps a fresh window in, so a record racing a reset
//! is counted entirely in the old window or entirely in the new one.

mod histogram;
mod snapshot;

pub use histogram::{AtomicHistogram, BUCKET_COUNT, HistogramCounts, MAX_TRACKABLE_MICROS};
pub use snapshot::{LatencyPercentiles, Snapshot};

use arc_swap::ArcSwap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use snapshot::per_second;

/// One measurement window
pub(crate) struct Window {
    started: Instant,
    started_at: chrono::DateTime<chrono::Utc>,
    successes: AtomicU64,
    failures: AtomicU64,
    bytes: AtomicU64,
    latency_sum_us: AtomicU64,
    latency_min_us: AtomicU64,
    latency_max_us: AtomicU64,
    histogram: AtomicHistogram,
}

impl Window {
    fn new() -> Self {
        Self {
            started: Instant::now(),
            started_at: chrono::Utc::now(),
            successes: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            bytes: AtomicU64::new(0),
            latency_sum_us: AtomicU64::new(0),
            latency_min_us: AtomicU64::new(u64::MAX),
            latency_max_us: AtomicU64::new(0),
            histogram: AtomicHistogram::new(),
        }
    }

    fn snapshot(&self) -> Snapshot {
        let elapsed_secs = self.started.elapsed().as_secs_f64();
        let successes = self.successes.load(Ordering::Acquire);
        let failures = self.failures.load(Ordering::Acquire);
        let bytes = self.bytes.load(Ordering::Acquire);

        Snapshot {
            taken_at: chrono::Utc::now(),
            window_started_at: self.started_at,
            elapsed_secs,
            successes,
            failures,
            bytes,
            ops_per_sec: per_second(successes + failures, elapsed_secs),
            bytes_per_sec: per_second(bytes, elapsed_secs),
            latency: self.latency(),
        }
    }

    fn latency(&self) -> LatencyPercentiles {
        let counts = self.histogram.counts();
        let samples = counts.total();
        if samples == 0 {
            return LatencyPercentiles::default();
        }

        let min = self.latency_min_us.load(Ordering::Acquire);
        let max = self.latency_max_us.load(Ordering::Acquire);
        // min/max of a sample still being recorded may not be visible yet
        let (min, max) = if min > max { (0, max) } else { (min, max) };
        let sum = self.latency_sum_us.load(Ordering::Acquire);
        let to_ms = |us: u64| us as f64 / 1_000.0;

        let exact = LatencyPercentiles {
            min: to_ms(min),
            max: to_ms(max),
            mean: sum as f64 / samples as f64 / 1_000.0,
            ..LatencyPercentiles::default()
        };
        let histogram = match counts.to_hdr() {
            Ok(histogram) => histogram,
            Err(e) => {
                tracing::warn!(error = ?e, "Failed to build latency histogram");
                return exact;
            }
        };
        // Quantiles never leave the exactly observed range
        let quantile = |q: f64| to_ms(histogram.value_at_quantile(q).clamp(min, max));

        LatencyPercentiles {
            p50: quantile(0.50),
            p95: quantile(0.95),
            p99: quantile(0.99),
            p999: quantile(0.999),
            ..exact
        }
    }
}

/// Shared, lock-free collector of operation outcomes
///
/// Share one instance between workers via `Arc`. Recording never blocks and never
/// drops an update.
pub struct MetricsCollector {
    window: ArcSwap<Window>,
    frozen: OnceLock<Snapshot>,
}

impl MetricsCollector {
    /// Create a collector whose window starts now
    pub fn new() -> Self {
        Self {
            window: ArcSwap::from_pointee(Window::new()),
            frozen: OnceLock::new(),
        }
    }

    /// Count a successful operation
    pub fn record_success(&self, bytes: u64, latency: Duration) {
        let micros = u64::try_from(latency.as_micros()).unwrap_or(u64::MAX);
        let window = self.window.load();
        window.successes.fetch_add(1, Ordering::AcqRel);
        window.bytes.fetch_add(bytes, Ordering::AcqRel);
        window.latency_sum_us.fetch_add(micros, Ordering::AcqRel);
        window.latency_min_us.fetch_min(micros, Ordering::AcqRel);
        window.latency_max_us.fetch_max(micros, Ordering::AcqRel);
        window.histogram.record(micros);
    }

    /// Count a failed operation
    pub fn record_failure(&self) {
        self.window.load().failures.fetch_add(1, Ordering::AcqRel);
    }

    /// Current figures, or the frozen final figures once [`freeze`](Self::freeze) ran
    pub fn snapshot(&self) -> Snapshot {
        match self.frozen.get() {
            Some(frozen) => frozen.clone(),
            None => self.window.load().snapshot(),
        }
    }

    /// Zero every counter and restart the elapsed baseline
    ///
    /// Ignored after [`freeze`](Self::freeze).
    pub fn reset(&self) {
        if self.is_frozen() {
            tracing::debug!("Ignoring metrics reset after freeze");
            return;
        }
        self.swap_window();
        tracing::debug!("Metrics window reset");
    }

    /// Capture the final snapshot; every later [`snapshot`](Self::snapshot) returns it
    pub fn freeze(&self) -> Snapshot {
        self.frozen
            .get_or_init(|| self.window.load().snapshot())
            .clone()
    }

    /// True once the final snapshot has been captured
    pub fn is_frozen(&self) -> bool {
        self.frozen.get().is_some()
    }

    pub(crate) fn swap_window(&self) -> Arc<Window> {
        self.window.swap(Arc::new(Window::new()))
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MetricsCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let window = self.window.load();
        f.debug_struct("MetricsCollector")
            .field("successes", &window.successes.load(Ordering::Relaxed))
            .field("failures", &window.failures.load(Ordering::Relaxed))
            .field("frozen", &self.is_frozen())
            .finish()
    }
}
