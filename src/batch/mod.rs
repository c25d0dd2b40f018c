//! Bounded-concurrency work queue.
//!
//! - [`Batch`] - Fail-fast executor for independent async operations
//! - [`BatchHandle`] - Feeds operations into a batch while it runs

mod queue;

pub use queue::{Batch, BatchHandle};
