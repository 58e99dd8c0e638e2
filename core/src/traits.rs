//! Core trait for the operation a worker repeats
//!
//! The trait is defined in core so backends can implement it without depending
//! on the pool. Implementations live in `streambench-backends`.

use async_trait::async_trait;
use std::time::Duration;

// ============================================================================
// Operation Trait
// ============================================================================

/// One unit of benchmark work (a produce, a consume, a synthetic call)
///
/// Workers call [`perform`](Operation::perform) once per admitted token. An
/// in-flight call is never cancelled; shutdown waits for it to return.
#[async_trait]
pub trait Operation: Send + Sync {
    /// Operation identifier, used in logs (e.g., "produce", "consume")
    fn name(&self) -> &str;

    /// Execute one operation
    async fn perform(&self) -> Result<OperationOutput, OperationError>;
}

/// Result of a successful operation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OperationOutput {
    /// Bytes moved by the operation
    pub bytes: u64,

    /// Latency measured by the operation itself
    ///
    /// When `None` the worker records its own wall-clock measurement.
    pub latency: Option<Duration>,
}

impl OperationOutput {
    /// Output moving `bytes` with worker-measured latency
    pub fn bytes(bytes: u64) -> Self {
        Self {
            bytes,
            latency: None,
        }
    }

    /// Attach an operation-measured latency
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }
}

/// Operation failures
#[derive(Debug, thiserror::Error)]
pub enum OperationError {
    /// Nothing was available to consume
    #[error("nothing available: {0}")]
    Empty(String),

    /// Destination refused the message (full queue, backpressure)
    #[error("rejected: {0}")]
    Rejected(String),

    /// Operation did not complete in time
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// Any other failure the worker should count and move past
    #[error("operation failed: {0}")]
    Failed(String),

    /// Unrecoverable failure; the worker exits after recording it
    #[error("fatal: {0}")]
    Fatal(String),
}

impl OperationError {
    /// Check if the worker must stop after this error
    pub fn is_fatal(&self) -> bool {
        matches!(self, OperationError::Fatal(_))
    }
}
