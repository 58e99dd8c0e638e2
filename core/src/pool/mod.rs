//! Worker pool for run lifecycle management
//!
//! The pool coordinates one benchmark run:
//! - Spawning workers that share a rate limiter, metrics collector and pause gate
//! - Pausing, resuming and scaling the worker set at runtime
//! - Resetting metrics after the warm-up phase
//! - Periodic snapshot logging and export
//! - Bounded graceful shutdown via a tree of cancellation tokens
//!
//! # Example
//!
//! ```ignore
//! use streambench_core::{PoolBuilder, ProfileResolver};
//!
//! let pool = Arc::new(
//!     PoolBuilder::new()
//!         .config(ProfileResolver::new("balanced").resolve()?)
//!         .operation(operation)
//!         .build()?,
//! );
//!
//! let report = pool.run().await?;
//! println!("{} ops/s", report.snapshot.ops_per_sec);
//! ```

mod aggregator;
mod builder;
mod coordinator;
mod reporter;
mod state;

pub use aggregator::{AggregatedStats, WorkerShare, aggregate_worker_stats};
pub use builder::PoolBuilder;
pub use coordinator::{StopReport, WorkerPool};
pub use state::PoolState;

#[cfg(test)]
mod tests;
