//! Backend errors

use std::time::Duration;

use streambench_core::OperationError;

/// Errors raised by the in-memory backends
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// Broker queue at capacity
    #[error("queue full (capacity {capacity})")]
    QueueFull {
        /// Configured queue size
        capacity: usize,
    },

    /// No message arrived within the receive timeout
    #[error("no message within {0:?}")]
    ReceiveTimeout(Duration),

    /// Broker was closed
    #[error("broker closed")]
    Closed,

    /// Payload could not be decompressed
    #[error("decompression failed: {0}")]
    Decompress(String),
}

impl From<BackendError> for OperationError {
    fn from(e: BackendError) -> Self {
        match e {
            BackendError::QueueFull { .. } => OperationError::Rejected(e.to_string()),
            BackendError::ReceiveTimeout(_) => OperationError::Empty(e.to_string()),
            BackendError::Closed => OperationError::Fatal(e.to_string()),
            BackendError::Decompress(_) => OperationError::Failed(e.to_string()),
        }
    }
}
