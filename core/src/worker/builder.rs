//! Builder pattern for Worker construction

use crate::error::{BenchError, BenchResult};
use crate::metrics::MetricsCollector;
use crate::traits::Operation;

use super::executor::Worker;
use super::pause::PauseGate;
use super::rate_limiter::RateLimiter;

use std::sync::Arc;
use std::sync::atomic::AtomicU64;

/// Builder for creating Worker instances
///
/// # Example
/// ```ignore
/// let worker = WorkerBuilder::new(0)
///     .operation(operation)
///     .limiter(limiter)
///     .metrics(collector)
///     .operation_counter(counter, 10_000)
///     .build()?;
/// ```
#[derive(Default)]
pub struct WorkerBuilder {
    id: usize,
    operation: Option<Arc<dyn Operation>>,
    limiter: Option<Arc<RateLimiter>>,
    metrics: Option<Arc<MetricsCollector>>,
    gate: Option<Arc<PauseGate>>,
    operation_counter: Option<Arc<AtomicU64>>,
    total_operations: Option<u64>,
}

impl WorkerBuilder {
    /// Create a new builder with the given worker ID
    pub fn new(id: usize) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }

    /// Set the operation
    pub fn operation(mut self, operation: Arc<dyn Operation>) -> Self {
        self.operation = Some(operation);
        self
    }

    /// Set the shared rate limiter
    pub fn limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    /// Set the shared metrics collector
    pub fn metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Set the shared pause gate (defaults to a private, always-open gate)
    pub fn gate(mut self, gate: Arc<PauseGate>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Set a shared operation counter for fair work distribution
    pub fn operation_counter(mut self, counter: Arc<AtomicU64>, total: u64) -> Self {
        self.operation_counter = Some(counter);
        self.total_operations = Some(total);
        self
    }

    /// Build the Worker
    ///
    /// # Errors
    /// Returns an error if any required field is missing.
    pub fn build(self) -> BenchResult<Worker> {
        let operation = self
            .operation
            .ok_or(BenchError::missing_config("operation"))?;
        let limiter = self.limiter.ok_or(BenchError::missing_config("limiter"))?;
        let metrics = self.metrics.ok_or(BenchError::missing_config("metrics"))?;
        let gate = self.gate.unwrap_or_default();

        let mut worker = Worker::new(self.id, operation, limiter, metrics, gate);

        if let (Some(counter), Some(total)) = (self.operation_counter, self.total_operations) {
            worker = worker.with_operation_counter(counter, total);
        }

        Ok(worker)
    }
}
