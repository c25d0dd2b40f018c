//! Download-side range reads.
//!
//! - [`ResumableReadStream`] - Range read that reopens the source after a truncated response
//! - [`ByteStream`] / [`byte_stream`] - Type-erased byte streams handed in by callers
//! - [`ReadState`] - Lifecycle of a resumable read

mod stream;

pub use stream::{ByteStream, ReadState, ResumableReadStream, byte_stream};
