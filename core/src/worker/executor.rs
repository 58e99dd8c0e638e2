//! Worker execution loop

use crate::metrics::MetricsCollector;
use crate::traits::Operation;

use super::pause::PauseGate;
use super::rate_limiter::RateLimiter;
use super::stats::WorkerStats;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Worker repeats: pause check -> claim -> token -> pause re-check -> perform -> record
///
/// Workers are tokio tasks managed by the pool. They share the operation,
/// rate limiter, metrics collector and pause gate via Arc.
pub struct Worker {
    /// Unique worker identifier
    id: usize,

    /// Operation performed once per admitted token
    operation: Arc<dyn Operation>,

    /// Shared token bucket
    limiter: Arc<RateLimiter>,

    /// Shared metrics sink
    metrics: Arc<MetricsCollector>,

    /// Shared pause flag
    gate: Arc<PauseGate>,

    /// Shared operation counter for fair distribution
    operation_counter: Option<Arc<AtomicU64>>,

    /// Total operations (when using counter-based distribution)
    total_operations: Option<u64>,
}

impl Worker {
    /// Create a new worker
    pub fn new(
        id: usize,
        operation: Arc<dyn Operation>,
        limiter: Arc<RateLimiter>,
        metrics: Arc<MetricsCollector>,
        gate: Arc<PauseGate>,
    ) -> Self {
        Self {
            id,
            operation,
            limiter,
            metrics,
            gate,
            operation_counter: None,
            total_operations: None,
        }
    }

    /// Set a shared operation counter for fair work distribution
    ///
    /// When set, workers claim slots with an atomic increment so exactly
    /// `total_operations` operations run across the pool.
    pub fn with_operation_counter(mut self, counter: Arc<AtomicU64>, total_operations: u64) -> Self {
        self.operation_counter = Some(counter);
        self.total_operations = Some(total_operations);
        self
    }

    /// Run the worker loop until `cancel` fires, the claim counter is exhausted,
    /// the limiter stops, or the operation reports a fatal error
    ///
    /// An operation already in flight is always allowed to finish.
    pub async fn run(self, cancel: CancellationToken) -> WorkerStats {
        let mut stats = WorkerStats::started(self.id);

        tracing::debug!(
            worker_id = self.id,
            operation = self.operation.name(),
            "Worker started"
        );

        loop {
            if cancel.is_cancelled() {
                tracing::debug!(worker_id = self.id, "Worker received cancel signal");
                break;
            }

            if !self.gate.wait(&cancel).await {
                tracing::debug!(worker_id = self.id, "Worker cancelled while paused");
                break;
            }

            if !self.try_claim_operation() {
                tracing::debug!(
                    worker_id = self.id,
                    "No more operations to claim, worker stopping"
                );
                break;
            }

            if let Err(reason) = self.limiter.wait_for_token(&cancel).await {
                self.release_claim();
                tracing::debug!(worker_id = self.id, %reason, "Worker stopped waiting for token");
                break;
            }

            // Paused while waiting: hand the token back and park at the gate
            if self.gate.is_paused() {
                self.limiter.refund();
                self.release_claim();
                continue;
            }

            let start = Instant::now();
            match self.operation.perform().await {
                Ok(output) => {
                    let latency = output.latency.unwrap_or_else(|| start.elapsed());
                    self.metrics.record_success(output.bytes, latency);
                    stats.record_success(output.bytes);
                }
                Err(e) if e.is_fatal() => {
                    self.metrics.record_failure();
                    stats.record_error();
                    stats.fatal = true;
                    tracing::warn!(
                        worker_id = self.id,
                        error = %e,
                        "Fatal operation error, worker exiting"
                    );
                    break;
                }
                Err(e) => {
                    self.metrics.record_failure();
                    stats.record_error();
                    tracing::trace!(worker_id = self.id, error = %e, "Operation failed");
                }
            }

            // Unbounded limiter plus an operation that never suspends would otherwise
            // monopolize the runtime thread
            tokio::task::consume_budget().await;
        }

        stats.finish();
        tracing::debug!(
            worker_id = self.id,
            completed = stats.completed,
            errors = stats.errors,
            elapsed_ms = ?stats.elapsed().map(|d| d.as_millis()),
            "Worker finished"
        );

        stats
    }

    /// Try to claim an operation slot from the shared counter
    ///
    /// Returns `true` if a slot was claimed, `false` if no more slots available.
    /// Always returns `true` if not using counter-based distribution.
    fn try_claim_operation(&self) -> bool {
        if let (Some(counter), Some(total)) = (&self.operation_counter, self.total_operations) {
            let claimed = counter.fetch_add(1, Ordering::SeqCst);
            if claimed >= total {
                // Over-claimed near the limit; keep the counter accurate for others
                counter.fetch_sub(1, Ordering::SeqCst);
                return false;
            }
            true
        } else {
            true
        }
    }

    /// Return a claimed slot that will not be performed
    fn release_claim(&self) {
        if let Some(counter) = &self.operation_counter {
            counter.fetch_sub(1, Ordering::SeqCst);
        }
    }

    /// Get the worker ID
    pub fn id(&self) -> usize {
        self.id
    }
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("id", &self.id)
            .field("operation", &self.operation.name())
            .field("limiter", &self.limiter)
            .field("total_operations", &self.total_operations)
            .finish()
    }
}
