//! Per-worker breakdown of a finished run
//!
//! The collector snapshot already carries run totals and rates. What only the
//! per-worker stats can tell is how the work was spread and which workers left
//! early on a fatal error.

use serde::Serialize;
use std::time::Duration;

use crate::worker::WorkerStats;

/// Operations attributed to one worker
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WorkerShare {
    pub worker_id: usize,
    pub operations: u64,
}

/// Summary over the stats of every worker that reported
#[derive(Debug, Clone, Default, Serialize)]
pub struct AggregatedStats {
    /// Workers that reported stats, scaled-down ones included
    pub total_workers: usize,

    /// Workers that exited on a fatal operation error
    pub fatal_workers: usize,

    /// Workers that performed nothing
    pub idle_workers: usize,

    pub total_completed: u64,
    pub total_errors: u64,
    pub total_bytes: u64,

    /// Worker with the most operations (lowest id on ties)
    pub busiest: Option<WorkerShare>,

    /// Worker with the fewest operations (lowest id on ties)
    pub quietest: Option<WorkerShare>,

    /// Operations per reporting worker
    pub mean_operations: f64,

    /// Busiest worker's operations over the mean; 1.0 is a perfectly even spread
    pub imbalance: f64,

    /// Longest single worker run
    pub longest_run: Duration,
}

impl AggregatedStats {
    /// Successes plus failures across every worker
    pub fn total_operations(&self) -> u64 {
        self.total_completed + self.total_errors
    }

    /// Fraction of operations that succeeded (0 when nothing ran)
    pub fn success_rate(&self) -> f64 {
        fraction(self.total_completed, self.total_operations())
    }

    /// Fraction of operations that failed (0 when nothing ran)
    pub fn error_rate(&self) -> f64 {
        fraction(self.total_errors, self.total_operations())
    }

    /// Operations between the quietest and the busiest worker
    pub fn spread(&self) -> u64 {
        match (self.busiest, self.quietest) {
            (Some(busiest), Some(quietest)) => busiest.operations - quietest.operations,
            _ => 0,
        }
    }
}

/// Aggregate statistics from multiple workers
pub fn aggregate_worker_stats(stats: &[WorkerStats]) -> AggregatedStats {
    let mut agg = AggregatedStats {
        total_workers: stats.len(),
        ..AggregatedStats::default()
    };

    // Visit in id order so ties resolve to the lowest id
    let mut ordered: Vec<&WorkerStats> = stats.iter().collect();
    ordered.sort_by_key(|s| s.worker_id);

    for worker in ordered {
        agg.total_completed += worker.completed;
        agg.total_errors += worker.errors;
        agg.total_bytes += worker.bytes;
        if worker.fatal {
            agg.fatal_workers += 1;
        }

        let share = WorkerShare {
            worker_id: worker.worker_id,
            operations: worker.total_operations(),
        };
        if share.operations == 0 {
            agg.idle_workers += 1;
        }
        if agg.busiest.is_none_or(|b| share.operations > b.operations) {
            agg.busiest = Some(share);
        }
        if agg.quietest.is_none_or(|q| share.operations < q.operations) {
            agg.quietest = Some(share);
        }
        if let Some(elapsed) = worker.elapsed() {
            agg.longest_run = agg.longest_run.max(elapsed);
        }
    }

    if agg.total_workers > 0 {
        agg.mean_operations = agg.total_operations() as f64 / agg.total_workers as f64;
    }
    if let Some(busiest) = agg.busiest
        && agg.mean_operations > 0.0
    {
        agg.imbalance = busiest.operations as f64 / agg.mean_operations;
    }

    agg
}

fn fraction(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}
