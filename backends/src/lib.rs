//! streambench-backends: Operations the worker pool can drive without external services
//!
//! - [`MemoryBroker`]: bounded in-process queue, with [`ProduceOperation`] and
//!   [`ConsumeOperation`] on top of it
//! - [`SyntheticOperation`]: fixed latency and a configurable failure ratio

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod broker;
pub mod error;
pub mod synthetic;

pub use broker::{ConsumeOperation, DEFAULT_RECEIVE_TIMEOUT, MemoryBroker, Message, ProduceOperation};
pub use error::BackendError;
pub use synthetic::SyntheticOperation;
