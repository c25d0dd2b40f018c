//! Chunk buffer scheduler - fixed-size chunking with bounded buffers.
//!
//! [`ChunkBufferScheduler`] reads an unbounded input stream, cuts it into
//! `buffer_size` chunks held in a pool of at most `max_buffers` buffers, and
//! runs a chunk handler on up to `parallelism` chunks at once.
//!
//! # Example
//!
//! ```
//! use bytes::Bytes;
//! use chunkxfer::{ChunkBuffer, ChunkBufferScheduler, SchedulerConfig};
//! use futures_util::stream;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), chunkxfer::TransferError> {
//! let input = stream::iter(vec![
//!     Ok::<_, std::io::Error>(Bytes::from_static(b"ABCDE")),
//!     Ok(Bytes::from_static(b"FGHI")),
//! ]);
//!
//! let config = SchedulerConfig::new(4, 2, 1)?;
//! let mut scheduler = ChunkBufferScheduler::new(input, config, |chunk: ChunkBuffer| async move {
//!     println!("stage {} bytes at {}", chunk.len(), chunk.offset());
//!     Ok::<_, std::io::Error>(())
//! })?;
//! scheduler.run().await?;
//! assert_eq!(scheduler.stats().chunks_dispatched, 3);
//! # Ok(())
//! # }
//! ```

use std::collections::VecDeque;
use std::future::Future;

use futures_core::Stream;
use futures_util::stream::{BoxStream, FuturesUnordered, StreamExt};
use tokio::io::AsyncRead;
use tokio_util::io::ReaderStream;
use tracing::{debug, trace, warn};

use crate::buffer::{BufferPool, ChunkBuffer, PendingRegion};
use crate::config::SchedulerConfig;
use crate::encoding::Fragment;
use crate::error::{BoxError, Result, TransferError};

/// Read size used when the input is an `AsyncRead`.
const READER_CHUNK_SIZE: usize = 64 * 1024;

/// Counters describing a scheduler run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Buffers allocated so far. Never exceeds `max_buffers`.
    pub allocated_buffers: usize,
    /// Highest number of handler calls running at the same time.
    pub peak_in_flight: usize,
    /// Chunks handed to the handler, including the trailing short chunk.
    pub chunks_dispatched: u64,
    /// Bytes read from the input.
    pub bytes_consumed: u64,
    /// Times the input was paused because every buffer was busy.
    pub pauses: u64,
    /// Times a paused input was resumed.
    pub resumes: u64,
}

/// Outcome of cutting pending bytes into buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resolve {
    /// Fewer than `buffer_size` bytes remain pending.
    Drained,
    /// A full chunk is pending but no buffer is free.
    Exhausted,
}

/// Pool, pending bytes, and write cursor. Only the `run` future touches them.
#[derive(Debug)]
struct SchedulerState {
    pool: BufferPool,
    pending: PendingRegion,
    ready: VecDeque<ChunkBuffer>,
    cursor: u64,
    stats: SchedulerStats,
}

impl SchedulerState {
    fn resolve(&mut self, buffer_size: usize) -> Resolve {
        while self.pending.len() >= buffer_size {
            let Some(mut data) = self.pool.acquire() else {
                self.stats.allocated_buffers = self.pool.allocated();
                return Resolve::Exhausted;
            };
            self.pending.take_into(&mut data, buffer_size);
            self.enqueue(data);
        }
        self.stats.allocated_buffers = self.pool.allocated();
        Resolve::Drained
    }

    /// Cuts the undersized tail once the input has ended.
    fn seal_tail(&mut self) -> Result<()> {
        let len = self.pending.len();
        let Some(mut data) = self.pool.acquire() else {
            return Err(TransferError::Internal(
                "no buffer available for the trailing chunk".to_string(),
            ));
        };
        self.pending.take_into(&mut data, len);
        self.enqueue(data);
        self.stats.allocated_buffers = self.pool.allocated();
        Ok(())
    }

    // The cursor moves when a chunk is queued, not when its handler finishes,
    // so offsets follow stream order under any completion order.
    fn enqueue(&mut self, data: Vec<u8>) {
        let len = data.len() as u64;
        let chunk = self.pool.lease(data, self.cursor);
        self.cursor += len;
        self.ready.push_back(chunk);
    }
}

/// Turns an input byte stream into fixed-size chunks handled concurrently.
///
/// - At most `max_buffers` buffers are ever allocated; when all of them are
///   queued or lent to handlers the input is not polled (backpressure).
/// - Chunks carry offsets `0, B, 2B, ...` in stream order; the last chunk may
///   be shorter than `B`.
/// - The first error from the input or from any handler ends the run; other
///   in-flight handler futures are dropped.
pub struct ChunkBufferScheduler<'a, H> {
    input: BoxStream<'a, std::result::Result<Fragment, BoxError>>,
    handler: H,
    config: SchedulerConfig,
    state: SchedulerState,
}

impl<'a, H> ChunkBufferScheduler<'a, H> {
    /// Creates a scheduler over a stream of byte or text fragments.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::InvalidArgument`] if the configuration has a
    /// zero buffer size, buffer count, or parallelism.
    pub fn new<S, I, E>(input: S, config: SchedulerConfig, handler: H) -> Result<Self>
    where
        S: Stream<Item = std::result::Result<I, E>> + Send + 'a,
        I: Into<Fragment>,
        E: Into<BoxError>,
    {
        config.validate()?;
        let input: BoxStream<'a, std::result::Result<Fragment, BoxError>> = input
            .map(|item| item.map(I::into).map_err(E::into))
            .boxed();

        Ok(Self {
            input,
            handler,
            config,
            state: SchedulerState {
                pool: BufferPool::new(config.buffer_size(), config.max_buffers()),
                pending: PendingRegion::new(),
                ready: VecDeque::new(),
                cursor: 0,
                stats: SchedulerStats::default(),
            },
        })
    }

    /// Creates a scheduler reading from an [`AsyncRead`] source.
    pub fn from_reader<R>(reader: R, config: SchedulerConfig, handler: H) -> Result<Self>
    where
        R: AsyncRead + Send + 'a,
    {
        let capacity = config.buffer_size().clamp(1, READER_CHUNK_SIZE);
        Self::new(ReaderStream::with_capacity(reader, capacity), config, handler)
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Returns counters for the run so far.
    pub fn stats(&self) -> SchedulerStats {
        self.state.stats
    }
}

impl<H, Fut, E> ChunkBufferScheduler<'_, H>
where
    H: FnMut(ChunkBuffer) -> Fut,
    Fut: Future<Output = std::result::Result<(), E>>,
    E: Into<BoxError>,
{
    /// Consumes the whole input and waits for every chunk to be handled.
    ///
    /// Resolves once the input has ended and every chunk, including a final
    /// short one, has been handled successfully.
    ///
    /// # Errors
    ///
    /// - [`TransferError::Transport`] with the first input or handler error
    /// - [`TransferError::Encoding`] if a text fragment cannot be encoded
    /// - [`TransferError::Internal`] if handlers keep every buffer alive past
    ///   their return, leaving nothing to fill
    pub async fn run(&mut self) -> Result<()> {
        let buffer_size = self.config.buffer_size();
        let parallelism = self.config.parallelism();
        let encoding = self.config.encoding();

        let mut in_flight = FuturesUnordered::new();
        let mut eof = false;
        let mut paused = false;

        loop {
            let resolved = self.state.resolve(buffer_size);

            while in_flight.len() < parallelism {
                let Some(chunk) = self.state.ready.pop_front() else {
                    break;
                };
                trace!(offset = chunk.offset(), len = chunk.len(), "dispatching chunk");
                self.state.stats.chunks_dispatched += 1;
                in_flight.push((self.handler)(chunk));
            }
            self.state.stats.peak_in_flight = self.state.stats.peak_in_flight.max(in_flight.len());

            if eof && in_flight.is_empty() && self.state.ready.is_empty() {
                match self.state.pending.len() {
                    0 => {
                        debug!(
                            bytes = self.state.cursor,
                            chunks = self.state.stats.chunks_dispatched,
                            "all chunks handled"
                        );
                        return Ok(());
                    }
                    n if n < buffer_size => {
                        self.state.seal_tail()?;
                        continue;
                    }
                    n => {
                        return Err(TransferError::Internal(format!(
                            "{n} bytes still pending after end of input with {buffer_size}-byte buffers"
                        )));
                    }
                }
            }

            let accepting = !eof && resolved == Resolve::Drained;
            if !eof {
                if !accepting && !paused {
                    paused = true;
                    self.state.stats.pauses += 1;
                    debug!(
                        pending = self.state.pending.len(),
                        in_flight = in_flight.len(),
                        "buffers exhausted, pausing input"
                    );
                } else if accepting && paused {
                    paused = false;
                    self.state.stats.resumes += 1;
                    debug!("buffer released, resuming input");
                }
            }

            tokio::select! {
                biased;

                Some(done) = in_flight.next(), if !in_flight.is_empty() => {
                    if let Err(e) = done {
                        let err: BoxError = e.into();
                        warn!(error = %err, abandoned = in_flight.len(), "chunk handler failed");
                        return Err(TransferError::Transport(err));
                    }
                }
                next = self.input.next(), if accepting => match next {
                    Some(Ok(fragment)) => {
                        let bytes = fragment.into_bytes(encoding).inspect_err(|e| {
                            warn!(error = %e, "rejecting input fragment");
                        })?;
                        self.state.stats.bytes_consumed += bytes.len() as u64;
                        self.state.pending.push(bytes);
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, offset = self.state.cursor, "input stream failed");
                        return Err(TransferError::Transport(e));
                    }
                    None => {
                        debug!(pending = self.state.pending.len(), "input ended");
                        eof = true;
                    }
                },
                else => {
                    return Err(TransferError::Internal(
                        "every buffer is held outside the scheduler".to_string(),
                    ));
                }
            }
        }
    }
}
