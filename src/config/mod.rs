//! Configuration for transfers.
//!
//! - [`SchedulerConfig`] - Buffer size, buffer count, and handler parallelism for uploads
//! - [`ResumeOptions`] - Retry budget, cancellation, and progress for resumable reads
//! - [`DownloadOptions`] - Block size and concurrency for parallel range downloads
//!
//! All sizes and limits are validated when a configuration is built, and again
//! when the component consuming it is constructed, never at first use.
//!
//! # Example
//!
//! ```
//! use chunkxfer::{SchedulerConfig, TextEncoding};
//!
//! let config = SchedulerConfig::new(4 * 1024 * 1024, 4, 2)?
//!     .with_encoding(TextEncoding::Latin1);
//! assert_eq!(config.max_buffers(), 4);
//! # Ok::<(), chunkxfer::TransferError>(())
//! ```

use std::fmt;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::encoding::TextEncoding;
use crate::error::{Result, TransferError};

/// Default upload buffer size (8 MiB).
pub const DEFAULT_BUFFER_SIZE: usize = 8 * 1024 * 1024;

/// Default number of upload buffers.
pub const DEFAULT_MAX_BUFFERS: usize = 5;

/// Default number of concurrent chunk handlers.
pub const DEFAULT_PARALLELISM: usize = 5;

/// Default resume budget for a single range read.
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Default block size for parallel range downloads (4 MiB).
pub const DEFAULT_BLOCK_SIZE: u64 = 4 * 1024 * 1024;

/// Default number of concurrent range reads.
pub const DEFAULT_CONCURRENCY: usize = 5;

/// Callback receiving the number of bytes transferred so far.
pub type ProgressCallback = Arc<dyn Fn(u64) + Send + Sync>;

/// Configuration for [`ChunkBufferScheduler`](crate::ChunkBufferScheduler).
///
/// Peak buffer memory is bounded by `buffer_size * max_buffers` no matter how
/// fast the input produces data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SchedulerConfig {
    buffer_size: usize,
    max_buffers: usize,
    parallelism: usize,
    encoding: TextEncoding,
}

impl SchedulerConfig {
    /// Creates a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::InvalidArgument`] if any value is zero.
    pub fn new(buffer_size: usize, max_buffers: usize, parallelism: usize) -> Result<Self> {
        let config = Self {
            buffer_size,
            max_buffers,
            parallelism,
            encoding: TextEncoding::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Sets the buffer size. Not validated until [`SchedulerConfig::validate`].
    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    /// Sets the number of buffers. Not validated until [`SchedulerConfig::validate`].
    pub fn with_max_buffers(mut self, count: usize) -> Self {
        self.max_buffers = count;
        self
    }

    /// Sets handler parallelism. Not validated until [`SchedulerConfig::validate`].
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism;
        self
    }

    /// Sets the encoding used for text fragments.
    pub fn with_encoding(mut self, encoding: TextEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Returns the buffer size in bytes.
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Returns the maximum number of buffers.
    pub fn max_buffers(&self) -> usize {
        self.max_buffers
    }

    /// Returns the maximum number of concurrent handler invocations.
    pub fn parallelism(&self) -> usize {
        self.parallelism
    }

    /// Returns the text encoding.
    pub fn encoding(&self) -> TextEncoding {
        self.encoding
    }

    /// Validates the current configuration.
    pub fn validate(&self) -> Result<()> {
        positive("buffer_size", self.buffer_size)?;
        positive("max_buffers", self.max_buffers)?;
        positive("parallelism", self.parallelism)?;
        Ok(())
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            max_buffers: DEFAULT_MAX_BUFFERS,
            parallelism: DEFAULT_PARALLELISM,
            encoding: TextEncoding::default(),
        }
    }
}

/// Options for [`ResumableReadStream`](crate::ResumableReadStream).
#[derive(Clone)]
pub struct ResumeOptions {
    /// Maximum number of continuation requests after the initial stream.
    pub max_retries: u32,
    /// Fires once to abort the read.
    pub cancellation: Option<CancellationToken>,
    /// Receives bytes delivered so far, relative to the start offset.
    pub on_progress: Option<ProgressCallback>,
}

impl ResumeOptions {
    /// Sets the retry budget.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the cancellation token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Sets the progress callback.
    pub fn with_progress(mut self, callback: impl Fn(u64) + Send + Sync + 'static) -> Self {
        self.on_progress = Some(Arc::new(callback));
        self
    }
}

impl Default for ResumeOptions {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            cancellation: None,
            on_progress: None,
        }
    }
}

impl fmt::Debug for ResumeOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResumeOptions")
            .field("max_retries", &self.max_retries)
            .field("cancellation", &self.cancellation)
            .field("on_progress", &self.on_progress.is_some())
            .finish()
    }
}

/// Options for [`download_to_buffer`](crate::download_to_buffer).
#[derive(Clone)]
pub struct DownloadOptions {
    /// Size of each range read.
    pub block_size: u64,
    /// Number of range reads in flight.
    pub concurrency: usize,
    /// Retry budget, cancellation, and progress applied to the whole download.
    pub resume: ResumeOptions,
}

impl DownloadOptions {
    /// Sets the block size.
    pub fn with_block_size(mut self, block_size: u64) -> Self {
        self.block_size = block_size;
        self
    }

    /// Sets the number of concurrent range reads.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Sets the per-range options.
    pub fn with_resume(mut self, resume: ResumeOptions) -> Self {
        self.resume = resume;
        self
    }

    /// Validates the current options.
    pub fn validate(&self) -> Result<()> {
        if self.block_size == 0 {
            return Err(TransferError::InvalidArgument {
                name: "block_size",
                reason: "must be greater than zero",
            });
        }
        positive("concurrency", self.concurrency)
    }
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            concurrency: DEFAULT_CONCURRENCY,
            resume: ResumeOptions::default(),
        }
    }
}

impl fmt::Debug for DownloadOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DownloadOptions")
            .field("block_size", &self.block_size)
            .field("concurrency", &self.concurrency)
            .field("resume", &self.resume)
            .finish()
    }
}

pub(crate) fn positive(name: &'static str, value: usize) -> Result<()> {
    if value == 0 {
        return Err(TransferError::InvalidArgument {
            name,
            reason: "must be greater than zero",
        });
    }
    Ok(())
}
