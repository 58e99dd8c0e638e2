//! Fixed-size atomic latency histogram
//!
//! Log-linear layout over microseconds: values below 16 get one bucket each, and every
//! power of two above that is split into 16 equal sub-buckets. Any recorded value is
//! off by at most 1/16 of itself. Values past [`MAX_TRACKABLE_MICROS`] land in the top
//! bucket.
//!
//! Workers only bump counters here; quantiles come from replaying a copy of the
//! counters into an HdrHistogram when a snapshot is taken.

use std::sync::atomic::{AtomicU64, Ordering};

use hdrhistogram::{CreationError, Histogram};

const SUB_BITS: u32 = 4;
const SUB_COUNT: u64 = 1 << SUB_BITS;

/// Largest distinguishable latency (~38 hours)
pub const MAX_TRACKABLE_MICROS: u64 = (1 << 37) - 1;

/// Precision of the replay histogram; finer than the 1/16 buckets it is fed from
const SIGNIFICANT_FIGURES: u8 = 2;

/// Number of buckets needed to cover `0..=MAX_TRACKABLE_MICROS`
pub const BUCKET_COUNT: usize = bucket_index(MAX_TRACKABLE_MICROS) + 1;

/// Bucket holding `micros`
pub const fn bucket_index(micros: u64) -> usize {
    let v = if micros > MAX_TRACKABLE_MICROS {
        MAX_TRACKABLE_MICROS
    } else {
        micros
    };
    if v < SUB_COUNT {
        return v as usize;
    }
    let msb = 63 - v.leading_zeros();
    let shift = msb - SUB_BITS;
    (((shift + 1) as u64) << SUB_BITS | ((v >> shift) & (SUB_COUNT - 1))) as usize
}

/// Inclusive lower bound and width of bucket `index`
pub const fn bucket_bounds(index: usize) -> (u64, u64) {
    let index = index as u64;
    if index < SUB_COUNT {
        return (index, 1);
    }
    let group = index >> SUB_BITS;
    let sub = index & (SUB_COUNT - 1);
    let shift = group - 1;
    ((SUB_COUNT + sub) << shift, 1 << shift)
}

/// Lock-free bucket counters
pub struct AtomicHistogram {
    buckets: Box<[AtomicU64]>,
}

impl AtomicHistogram {
    /// Create an empty histogram
    pub fn new() -> Self {
        Self {
            buckets: (0..BUCKET_COUNT).map(|_| AtomicU64::new(0)).collect(),
        }
    }

    /// Count one sample
    pub fn record(&self, micros: u64) {
        self.buckets[bucket_index(micros)].fetch_add(1, Ordering::Relaxed);
    }

    /// Copy the current bucket counts
    pub fn counts(&self) -> HistogramCounts {
        HistogramCounts {
            counts: self
                .buckets
                .iter()
                .map(|b| b.load(Ordering::Relaxed))
                .collect(),
        }
    }
}

impl Default for AtomicHistogram {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AtomicHistogram {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AtomicHistogram")
            .field("total", &self.counts().total())
            .finish()
    }
}

/// Plain copy of histogram buckets, used to compute percentiles
#[derive(Debug, Clone)]
pub struct HistogramCounts {
    counts: Vec<u64>,
}

impl HistogramCounts {
    /// Number of samples
    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// Replay the buckets into an HdrHistogram for quantile queries
    ///
    /// Every bucket is recorded at its midpoint, so a quantile is off by at most half
    /// a bucket width plus HdrHistogram's own rounding.
    pub fn to_hdr(&self) -> Result<Histogram<u64>, CreationError> {
        let mut histogram =
            Histogram::new_with_bounds(1, MAX_TRACKABLE_MICROS, SIGNIFICANT_FIGURES)?;
        for (index, &count) in self.counts.iter().enumerate() {
            if count > 0 {
                let (lower, width) = bucket_bounds(index);
                histogram.saturating_record_n(lower + width / 2, count);
            }
        }
        Ok(histogram)
    }
}
