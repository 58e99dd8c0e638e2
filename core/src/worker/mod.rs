//! Worker module for executing benchmark operations
//!
//! The Worker is the execution unit of a pool, responsible for the simple loop:
//! **wait for admission -> perform -> record -> repeat**.
//!
//! Each Worker is a tokio task that:
//!
//! 1. Blocks while the pool is paused
//! 2. Claims an operation slot when a total operation count is configured
//! 3. Waits for a token from the shared [`RateLimiter`]
//! 4. Performs exactly one [`Operation`](crate::traits::Operation)
//! 5. Records success (bytes + latency) or failure in the shared collector
//! 6. Repeats until its cancel token fires
//!
//! Failed operations are counted, never retried. A fatal error ends only the
//! worker that saw it.
//!
//! # Example
//!
//! ```ignore
//! use streambench_core::worker::{RateLimiter, WorkerBuilder};
//!
//! let worker = WorkerBuilder::new(0)
//!     .operation(operation)
//!     .limiter(Arc::new(RateLimiter::new(1_000)))
//!     .metrics(collector)
//!     .build()?;
//!
//! let stats = worker.run(cancel.child_token()).await;
//! println!("Completed: {}", stats.completed);
//! ```

mod builder;
mod executor;
mod pause;
mod rate_limiter;
mod stats;

pub use builder::WorkerBuilder;
pub use executor::Worker;
pub use pause::PauseGate;
pub use rate_limiter::{AcquireError, MIN_RATE, REFILL_INTERVAL, RETRY_INTERVAL, RateLimiter};
pub use stats::WorkerStats;
