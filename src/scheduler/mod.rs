//! Upload-side scheduling.
//!
//! - [`ChunkBufferScheduler`] - Cuts an input stream into pooled fixed-size chunks
//!   and runs a handler on them with bounded parallelism
//! - [`SchedulerStats`] - Allocation, dispatch, and backpressure counters

mod engine;

pub use engine::{ChunkBufferScheduler, SchedulerStats};
