//! Byte ranges and ranged downloads.
//!
//! - [`ByteRange`] - Half-open byte span of a remote object
//! - [`plan_ranges`] - Splits a span into fixed-size blocks
//! - [`RangeSource`] - Opens a byte stream over a range of a remote object
//! - [`download_to_buffer`] - Parallel resumable download into memory

mod download;

pub use download::download_to_buffer;

use std::fmt;
use std::future::Future;

use crate::error::{BoxError, Result, TransferError};
use crate::resumable::ByteStream;

/// `count` bytes starting at `offset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ByteRange {
    /// First byte.
    pub offset: u64,
    /// Number of bytes.
    pub count: u64,
}

impl ByteRange {
    /// Creates a range.
    pub const fn new(offset: u64, count: u64) -> Self {
        Self { offset, count }
    }

    /// Offset one past the last byte, saturating at `u64::MAX`.
    pub const fn end(&self) -> u64 {
        self.offset.saturating_add(self.count)
    }

    /// Offset one past the last byte, or `None` if it does not fit in a `u64`.
    pub const fn checked_end(&self) -> Option<u64> {
        self.offset.checked_add(self.count)
    }

    /// Returns the exclusive end, rejecting ranges that overflow.
    pub(crate) fn validated_end(&self) -> Result<u64> {
        self.checked_end().ok_or(TransferError::InvalidArgument {
            name: "count",
            reason: "offset + count overflows",
        })
    }

    /// Returns true if the range holds no bytes.
    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// HTTP `Range` header value, e.g. `bytes=0-1023`. `None` for an empty range.
    pub fn header_value(&self) -> Option<String> {
        if self.is_empty() {
            return None;
        }
        let end = self.checked_end()?;
        Some(format!("bytes={}-{}", self.offset, end - 1))
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.offset, self.end())
    }
}

/// Splits `[offset, offset + count)` into consecutive ranges of `block_size`
/// bytes; the last one may be shorter.
///
/// # Errors
///
/// Returns [`TransferError::InvalidArgument`] if `block_size` is zero or the
/// span overflows `u64`.
pub fn plan_ranges(offset: u64, count: u64, block_size: u64) -> Result<Vec<ByteRange>> {
    if block_size == 0 {
        return Err(TransferError::InvalidArgument {
            name: "block_size",
            reason: "must be greater than zero",
        });
    }
    let end = ByteRange::new(offset, count).validated_end()?;

    let mut ranges = Vec::with_capacity(count.div_ceil(block_size).min(1024) as usize);
    let mut at = offset;
    while at < end {
        let len = block_size.min(end - at);
        ranges.push(ByteRange::new(at, len));
        at += len;
    }
    Ok(ranges)
}

/// A remote object that can be read by byte range.
///
/// The returned stream must begin exactly at `range.offset` and carry at most
/// `range.count` bytes.
pub trait RangeSource: Send + Sync + 'static {
    /// Error produced when a range cannot be opened.
    type Error: Into<BoxError> + Send + 'static;

    /// Opens a read over `range`.
    fn open(
        &self,
        range: ByteRange,
    ) -> impl Future<Output = std::result::Result<ByteStream, Self::Error>> + Send;
}
