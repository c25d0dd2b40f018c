//! chunkxfer
//!
//! Chunked transfer core for object-storage clients.
//!
//! `chunkxfer` holds the pieces a block-blob or multipart client needs between
//! its byte source and its HTTP layer:
//!
//! - upload: cut an arbitrary stream into fixed-size, offset-tagged chunks
//!   with bounded memory and bounded handler parallelism
//! - batch: run independent async operations with a concurrency cap, failing
//!   fast on the first error
//! - download: read byte ranges that transparently resume after a truncated
//!   response
//!
//! The crate intentionally:
//! - does NOT speak HTTP or any storage API
//! - does NOT touch files or paths
//! - does NOT retry failed handlers or operations
//!
//! # Upload
//!
//! ```
//! use bytes::Bytes;
//! use chunkxfer::{ChunkBufferScheduler, ChunkBuffer, SchedulerConfig};
//! use futures_util::stream;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), chunkxfer::TransferError> {
//! let input = stream::iter(vec![
//!     Ok::<_, std::io::Error>(Bytes::from_static(b"ABCDE")),
//!     Ok(Bytes::from_static(b"FGHI")),
//! ]);
//! let config = SchedulerConfig::new(4, 2, 2)?;
//!
//! let mut scheduler = ChunkBufferScheduler::new(input, config, |chunk: ChunkBuffer| async move {
//!     println!("stage block at {} ({} bytes)", chunk.offset(), chunk.len());
//!     Ok::<_, std::io::Error>(())
//! })?;
//! scheduler.run().await?;
//! assert_eq!(scheduler.stats().chunks_dispatched, 3);
//! # Ok(())
//! # }
//! ```
//!
//! # Download
//!
//! ```
//! use std::sync::Arc;
//! use bytes::Bytes;
//! use chunkxfer::{byte_stream, download_to_buffer, ByteRange, ByteStream, DownloadOptions, RangeSource};
//! use futures_util::stream;
//!
//! struct Blob(Vec<u8>);
//!
//! impl RangeSource for Blob {
//!     type Error = std::io::Error;
//!
//!     async fn open(&self, range: ByteRange) -> std::io::Result<ByteStream> {
//!         let part = Bytes::copy_from_slice(&self.0[range.offset as usize..range.end() as usize]);
//!         Ok(byte_stream(stream::iter(vec![Ok::<_, std::io::Error>(part)])))
//!     }
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), chunkxfer::TransferError> {
//! let blob = Arc::new(Blob((0..100u8).collect()));
//! let options = DownloadOptions::default().with_block_size(16);
//! let data = download_to_buffer(blob, 20, 50, options).await?;
//! assert_eq!(data[0], 20);
//! assert_eq!(data.len(), 50);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod batch;
mod buffer;
mod config;
mod encoding;
mod error;
mod range;
mod resumable;
mod scheduler;

//
// Public surface
//

pub use batch::{Batch, BatchHandle};
pub use buffer::ChunkBuffer;
pub use config::{
    DEFAULT_BLOCK_SIZE, DEFAULT_BUFFER_SIZE, DEFAULT_CONCURRENCY, DEFAULT_MAX_BUFFERS,
    DEFAULT_MAX_RETRIES, DEFAULT_PARALLELISM, DownloadOptions, ProgressCallback, ResumeOptions,
    SchedulerConfig,
};
pub use encoding::{Fragment, TextEncoding};
pub use error::{BoxError, CorruptionKind, Result, TransferError};
pub use range::{ByteRange, RangeSource, download_to_buffer, plan_ranges};
pub use resumable::{ByteStream, ReadState, ResumableReadStream, byte_stream};
pub use scheduler::{ChunkBufferScheduler, SchedulerStats};

pub use tokio_util::sync::CancellationToken;
