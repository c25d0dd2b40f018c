//! Buffer management for the upload scheduler.
//!
//! - [`ChunkBuffer`] - A filled, pooled buffer lent to a chunk handler
//! - `BufferPool` - Bounded free list that recycles buffers (internal)
//! - `PendingRegion` - Unaligned input tail waiting to fill a buffer (internal)

mod pending;
mod pool;

pub(crate) use pending::PendingRegion;
pub(crate) use pool::BufferPool;
pub use pool::ChunkBuffer;
