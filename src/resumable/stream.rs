//! Resumable range read stream.
//!
//! [`ResumableReadStream`] forwards bytes from an underlying range read. When
//! that stream ends (or errors) before the requested range is complete, it
//! asks a continuation resolver for a new stream starting at the first byte
//! not yet delivered and carries on from there, up to `max_retries` times.
//!
//! # Example
//!
//! ```
//! use bytes::Bytes;
//! use chunkxfer::{byte_stream, ByteStream, ResumableReadStream, ResumeOptions};
//! use futures_util::{stream, StreamExt};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), chunkxfer::TransferError> {
//! const DATA: &[u8] = b"hello world";
//!
//! fn serve(from: u64, upto: u64) -> ByteStream {
//!     let part = Bytes::from_static(&DATA[from as usize..upto as usize]);
//!     byte_stream(stream::iter(vec![Ok::<_, std::io::Error>(part)]))
//! }
//!
//! // The first response is cut short after 5 bytes.
//! let mut reader = ResumableReadStream::new(
//!     serve(0, 5),
//!     |at| async move { Ok::<_, std::io::Error>(serve(at, 11)) },
//!     0,
//!     11,
//!     ResumeOptions::default(),
//! )?;
//!
//! let mut out = Vec::new();
//! while let Some(chunk) = reader.next().await {
//!     out.extend_from_slice(&chunk?);
//! }
//! assert_eq!(out, DATA);
//! assert_eq!(reader.retries(), 1);
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_core::Stream;
use futures_core::stream::FusedStream;
use futures_util::future::BoxFuture;
use futures_util::stream::BoxStream;
use futures_util::{FutureExt, StreamExt};
use tokio_util::io::StreamReader;
use tokio_util::sync::WaitForCancellationFutureOwned;
use tracing::{debug, warn};

use crate::config::{ProgressCallback, ResumeOptions};
use crate::error::{BoxError, CorruptionKind, Result, TransferError};
use crate::range::{ByteRange, RangeSource};

/// Type-erased stream of bytes from a remote read.
pub type ByteStream = BoxStream<'static, std::result::Result<Bytes, BoxError>>;

/// Erases a byte stream's concrete type and error type.
pub fn byte_stream<S, E>(stream: S) -> ByteStream
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Send + 'static,
    E: Into<BoxError>,
{
    stream
        .map(|item| item.map_err(|e| -> BoxError { e.into() }))
        .boxed()
}

type Continuation =
    Box<dyn FnMut(u64) -> BoxFuture<'static, std::result::Result<ByteStream, BoxError>> + Send>;

/// Where a [`ResumableReadStream`] is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadState {
    /// Forwarding bytes from the current underlying stream.
    Reading,
    /// Waiting for a continuation stream.
    Retrying,
    /// The whole range was delivered.
    Done,
    /// An error was returned; the stream yields nothing more.
    Failed,
}

/// A byte stream over `[offset, offset + count)` that survives truncated
/// underlying reads.
///
/// - Ends after exactly `count` bytes have been yielded.
/// - Premature end of the underlying stream triggers a continuation
///   request at the first undelivered offset, at most `max_retries` times;
///   after that it fails with [`TransferError::DataCorruption`].
/// - Bytes beyond the requested range fail immediately with
///   [`TransferError::DataCorruption`] and are never retried.
/// - The cancellation token fails it with [`TransferError::Aborted`] in
///   any non-terminal state, without spending retry budget.
///
/// Bytes already yielded are not taken back on failure.
pub struct ResumableReadStream {
    source: Option<ByteStream>,
    continuation: Option<BoxFuture<'static, std::result::Result<ByteStream, BoxError>>>,
    resolve: Continuation,
    cancelled: Option<Pin<Box<WaitForCancellationFutureOwned>>>,
    state: ReadState,
    start: u64,
    offset: u64,
    end: u64,
    retries: u32,
    max_retries: u32,
    on_progress: Option<ProgressCallback>,
}

impl ResumableReadStream {
    /// Creates a stream reading `count` bytes starting at `offset`.
    ///
    /// `initial` must begin at `offset`. `get_continuation(at)` must return a
    /// stream over the same resource beginning exactly at `at` and running to
    /// the end of the original range.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::InvalidArgument`] if `offset + count`
    /// overflows.
    pub fn new<S, E, G, Fut, E2>(
        initial: S,
        mut get_continuation: G,
        offset: u64,
        count: u64,
        options: ResumeOptions,
    ) -> Result<Self>
    where
        S: Stream<Item = std::result::Result<Bytes, E>> + Send + 'static,
        E: Into<BoxError>,
        G: FnMut(u64) -> Fut + Send + 'static,
        Fut: Future<Output = std::result::Result<ByteStream, E2>> + Send + 'static,
        E2: Into<BoxError>,
    {
        let end = offset
            .checked_add(count)
            .ok_or(TransferError::InvalidArgument {
                name: "count",
                reason: "offset + count overflows",
            })?;

        let resolve: Continuation = Box::new(move |at| {
            get_continuation(at)
                .map(|r| r.map_err(|e| -> BoxError { e.into() }))
                .boxed()
        });

        Ok(Self {
            source: Some(byte_stream(initial)),
            continuation: None,
            resolve,
            cancelled: options
                .cancellation
                .map(|token| Box::pin(token.cancelled_owned())),
            state: ReadState::Reading,
            start: offset,
            offset,
            end,
            retries: 0,
            max_retries: options.max_retries,
            on_progress: options.on_progress,
        })
    }

    /// Opens `range` on `source` and reads it, reopening from the first
    /// undelivered byte after a truncated read.
    ///
    /// # Errors
    ///
    /// - [`TransferError::InvalidArgument`] if the range overflows; the source
    ///   is not contacted
    /// - [`TransferError::Transport`] if the first open fails
    pub async fn open<R: RangeSource>(
        source: Arc<R>,
        range: ByteRange,
        options: ResumeOptions,
    ) -> Result<Self> {
        let end = range.validated_end()?;
        let initial = source
            .open(range)
            .await
            .map_err(TransferError::transport)?;

        Self::new(
            initial,
            move |at| {
                let source = Arc::clone(&source);
                async move { source.open(ByteRange::new(at, end - at)).await }
            },
            range.offset,
            range.count,
            options,
        )
    }

    /// Returns the current lifecycle state.
    pub fn state(&self) -> ReadState {
        self.state
    }

    /// Offset of the next byte to be delivered (one past the last confirmed byte).
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Offset one past the last requested byte.
    pub fn end(&self) -> u64 {
        self.end
    }

    /// Continuation requests made so far.
    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Wraps the stream as a [`tokio::io::AsyncRead`].
    pub fn into_async_read(self) -> StreamReader<Self, Bytes> {
        StreamReader::new(self)
    }
}

impl ResumableReadStream {
    fn fail(&mut self, err: TransferError) -> Poll<Option<Result<Bytes>>> {
        self.source = None;
        self.continuation = None;
        self.cancelled = None;
        self.state = ReadState::Failed;
        Poll::Ready(Some(Err(err)))
    }
}

impl Stream for ResumableReadStream {
    type Item = Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            if matches!(this.state, ReadState::Done | ReadState::Failed) {
                return Poll::Ready(None);
            }

            if let Some(cancelled) = this.cancelled.as_mut()
                && cancelled.as_mut().poll(cx).is_ready()
            {
                debug!(offset = this.offset, state = ?this.state, "read cancelled");
                return this.fail(TransferError::Aborted);
            }

            if this.state == ReadState::Retrying {
                let Some(pending) = this.continuation.as_mut() else {
                    return this.fail(TransferError::Internal(
                        "retrying without a continuation request".to_string(),
                    ));
                };
                match pending.as_mut().poll(cx) {
                    Poll::Pending => return Poll::Pending,
                    Poll::Ready(Ok(stream)) => {
                        debug!(offset = this.offset, "continuation stream attached");
                        this.continuation = None;
                        this.source = Some(stream);
                        this.state = ReadState::Reading;
                        continue;
                    }
                    Poll::Ready(Err(e)) => {
                        warn!(error = %e, offset = this.offset, "continuation request failed");
                        return this.fail(TransferError::Transport(e));
                    }
                }
            }

            let Some(source) = this.source.as_mut() else {
                return this.fail(TransferError::Internal(
                    "reading without an underlying stream".to_string(),
                ));
            };

            match source.as_mut().poll_next(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(Some(Ok(chunk))) => {
                    if chunk.is_empty() {
                        continue;
                    }
                    let received = this.offset.saturating_add(chunk.len() as u64);
                    if received > this.end {
                        warn!(received, expected = this.end, "source sent more data than requested");
                        let err = TransferError::DataCorruption {
                            kind: CorruptionKind::Overrun,
                            received,
                            expected: this.end,
                            retries: this.retries,
                        };
                        return this.fail(err);
                    }
                    this.offset = received;
                    if let Some(progress) = this.on_progress.as_ref() {
                        progress(received - this.start);
                    }
                    return Poll::Ready(Some(Ok(chunk)));
                }
                Poll::Ready(Some(Err(e))) => {
                    debug!(error = %e, offset = this.offset, "underlying stream failed");
                    this.source = None;
                }
                Poll::Ready(None) => {
                    this.source = None;
                }
            }

            // Underlying stream is gone: finished, resumable, or out of budget.
            if this.offset == this.end {
                debug!(bytes = this.end - this.start, retries = this.retries, "range complete");
                this.cancelled = None;
                this.state = ReadState::Done;
                return Poll::Ready(None);
            }

            if this.retries < this.max_retries {
                this.retries += 1;
                debug!(
                    offset = this.offset,
                    end = this.end,
                    retry = this.retries,
                    "underlying stream ended early, resuming"
                );
                this.continuation = Some((this.resolve)(this.offset));
                this.state = ReadState::Retrying;
                continue;
            }

            warn!(
                received = this.offset,
                expected = this.end,
                retries = this.retries,
                "retry budget exhausted"
            );
            let err = TransferError::DataCorruption {
                kind: CorruptionKind::Truncated,
                received: this.offset,
                expected: this.end,
                retries: this.retries,
            };
            return this.fail(err);
        }
    }
}

impl FusedStream for ResumableReadStream {
    fn is_terminated(&self) -> bool {
        matches!(self.state, ReadState::Done | ReadState::Failed)
    }
}

impl fmt::Debug for ResumableReadStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResumableReadStream")
            .field("state", &self.state)
            .field("start", &self.start)
            .field("offset", &self.offset)
            .field("end", &self.end)
            .field("retries", &self.retries)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}
