//! Operation with fixed latency and a random failure ratio

use std::time::Duration;

use async_trait::async_trait;

use streambench_core::{Operation, OperationError, OperationOutput};

/// Sleeps for a fixed latency, then succeeds or fails at random
#[derive(Debug, Clone)]
pub struct SyntheticOperation {
    latency: Duration,
    failure_ratio: f64,
    bytes: u64,
}

impl SyntheticOperation {
    /// Always-succeeding operation reporting `bytes` per call
    pub fn new(bytes: u64) -> Self {
        Self {
            latency: Duration::ZERO,
            failure_ratio: 0.0,
            bytes,
        }
    }

    /// Sleep this long before completing
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Fraction of calls that fail, clamped to `0.0..=1.0`
    pub fn with_failure_ratio(mut self, ratio: f64) -> Self {
        self.failure_ratio = if ratio.is_nan() {
            0.0
        } else {
            ratio.clamp(0.0, 1.0)
        };
        self
    }

    /// Effective failure ratio
    pub fn failure_ratio(&self) -> f64 {
        self.failure_ratio
    }
}

#[async_trait]
impl Operation for SyntheticOperation {
    fn name(&self) -> &str {
        "synthetic"
    }

    async fn perform(&self) -> Result<OperationOutput, OperationError> {
        let fail = self.failure_ratio > 0.0 && rand::random_bool(self.failure_ratio);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        if fail {
            return Err(OperationError::Failed("synthetic failure".to_string()));
        }
        Ok(OperationOutput::bytes(self.bytes).with_latency(self.latency))
    }
}
