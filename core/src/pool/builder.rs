//! Builder pattern for WorkerPool construction

use std::sync::Arc;
use std::time::Duration;

use crate::config::Configuration;
use crate::error::{BenchError, BenchResult};
use crate::traits::Operation;

use super::coordinator::WorkerPool;

/// Builder for creating a WorkerPool with proper configuration
///
/// # Example
///
/// ```ignore
/// let pool = PoolBuilder::new()
///     .config(ProfileResolver::new("burst").resolve()?)
///     .workers(16)
///     .operation(operation)
///     .build()?;
///
/// let report = pool.run().await?;
/// ```
pub struct PoolBuilder {
    config: Configuration,
    operation: Option<Arc<dyn Operation>>,
}

impl PoolBuilder {
    /// Create a new pool builder with the default configuration
    pub fn new() -> Self {
        Self {
            config: Configuration::default(),
            operation: None,
        }
    }

    /// Set the full configuration
    pub fn config(mut self, config: Configuration) -> Self {
        self.config = config;
        self
    }

    /// Set the worker count
    pub fn workers(mut self, workers: usize) -> Self {
        self.config.workers = workers;
        self
    }

    /// Set the target rate (0 = unbounded)
    pub fn rate(mut self, rate: u64) -> Self {
        self.config.rate = rate;
        self
    }

    /// Set the total operation count (0 = unbounded)
    pub fn total_operations(mut self, total: u64) -> Self {
        self.config.total_operations = total;
        self
    }

    /// Set the test duration (zero = unbounded)
    pub fn duration(mut self, duration: Duration) -> Self {
        self.config.duration = duration;
        self
    }

    /// Set the operation every worker performs
    pub fn operation(mut self, operation: Arc<dyn Operation>) -> Self {
        self.operation = Some(operation);
        self
    }

    /// Build the pool
    ///
    /// # Errors
    ///
    /// Returns an error if the operation is not set, or if configuration
    /// validation fails.
    pub fn build(self) -> BenchResult<WorkerPool> {
        let operation = self
            .operation
            .ok_or_else(|| BenchError::missing_config("operation"))?;

        WorkerPool::new(self.config, operation)
    }
}

impl Default for PoolBuilder {
    fn default() -> Self {
        Self::new()
    }
}
