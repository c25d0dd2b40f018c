//! Error types for chunkxfer.

use std::fmt;
use std::io;

use thiserror::Error;

use crate::encoding::TextEncoding;

/// Boxed error carried through from caller-supplied streams and handlers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result alias used throughout the crate.
pub type Result<T, E = TransferError> = std::result::Result<T, E>;

/// How a resumable read disagreed with the range it asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorruptionKind {
    /// Fewer bytes than requested arrived and the retry budget ran out.
    Truncated,
    /// The source served bytes past the end of the requested range.
    Overrun,
}

impl fmt::Display for CorruptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CorruptionKind::Truncated => f.write_str("received less data than required"),
            CorruptionKind::Overrun => f.write_str("received more data than requested"),
        }
    }
}

/// Errors that can occur while moving bytes.
#[derive(Debug, Error)]
pub enum TransferError {
    /// A size, concurrency, or range parameter was rejected at construction.
    #[error("invalid argument `{name}`: {reason}")]
    InvalidArgument {
        /// Name of the offending parameter.
        name: &'static str,
        /// Description of what was invalid.
        reason: &'static str,
    },

    /// Error raised by the input stream, a chunk handler, a batch operation,
    /// or a range reader. The original error is kept as the source.
    #[error("transport error: {0}")]
    Transport(#[source] BoxError),

    /// A text fragment could not be converted with the configured encoding.
    #[error("cannot encode text fragment as {encoding}: {reason}")]
    Encoding {
        /// Encoding that was in effect.
        encoding: TextEncoding,
        /// Why the conversion failed.
        reason: String,
    },

    /// A resumable read delivered a different amount of data than requested.
    ///
    /// Offsets are exclusive end positions in the remote resource.
    #[error(
        "data corruption: {kind}; received offset {received}, needed offset {expected}, retries {retries}"
    )]
    DataCorruption {
        /// Which direction the mismatch went.
        kind: CorruptionKind,
        /// End offset (exclusive) of the bytes actually received.
        received: u64,
        /// End offset (exclusive) of the requested range.
        expected: u64,
        /// Resume attempts made before giving up.
        retries: u32,
    },

    /// The cancellation signal fired.
    #[error("the operation was aborted")]
    Aborted,

    /// Internal contract violation.
    #[error("internal error: {0}")]
    Internal(String),
}

impl TransferError {
    pub(crate) fn transport(err: impl Into<BoxError>) -> Self {
        TransferError::Transport(err.into())
    }

    /// Recovers a `TransferError` that was boxed on its way through a batch.
    pub(crate) fn from_boxed(err: BoxError) -> Self {
        match err.downcast::<TransferError>() {
            Ok(inner) => *inner,
            Err(other) => TransferError::Transport(other),
        }
    }

    /// Returns true for [`TransferError::DataCorruption`].
    pub fn is_data_corruption(&self) -> bool {
        matches!(self, TransferError::DataCorruption { .. })
    }

    /// Returns true for [`TransferError::Aborted`].
    pub fn is_aborted(&self) -> bool {
        matches!(self, TransferError::Aborted)
    }

    /// Returns the caller's original error if this is a transport error.
    pub fn into_transport(self) -> Option<BoxError> {
        match self {
            TransferError::Transport(e) => Some(e),
            _ => None,
        }
    }
}

impl From<TransferError> for io::Error {
    fn from(e: TransferError) -> Self {
        let kind = match &e {
            TransferError::InvalidArgument { .. } => io::ErrorKind::InvalidInput,
            TransferError::Encoding { .. } => io::ErrorKind::InvalidData,
            TransferError::DataCorruption {
                kind: CorruptionKind::Truncated,
                ..
            } => io::ErrorKind::UnexpectedEof,
            TransferError::DataCorruption { .. } => io::ErrorKind::InvalidData,
            TransferError::Aborted => io::ErrorKind::Interrupted,
            TransferError::Transport(source) => match source.downcast_ref::<io::Error>() {
                Some(inner) => inner.kind(),
                None => io::ErrorKind::Other,
            },
            TransferError::Internal(_) => io::ErrorKind::Other,
        };
        io::Error::new(kind, e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_keeps_source() {
        let io_err = io::Error::new(io::ErrorKind::ConnectionReset, "reset by peer");
        let err = TransferError::transport(io_err);
        let source = err.into_transport().unwrap();
        let io_err = source.downcast::<io::Error>().unwrap();
        assert_eq!(io_err.kind(), io::ErrorKind::ConnectionReset);
    }

    #[test]
    fn test_corruption_display() {
        let err = TransferError::DataCorruption {
            kind: CorruptionKind::Truncated,
            received: 50,
            expected: 100,
            retries: 3,
        };
        let msg = err.to_string();
        assert!(msg.contains("received offset 50"));
        assert!(msg.contains("needed offset 100"));
        assert!(msg.contains("retries 3"));
        assert!(err.is_data_corruption());
    }

    #[test]
    fn test_io_conversion_kinds() {
        let err: io::Error = TransferError::Aborted.into();
        assert_eq!(err.kind(), io::ErrorKind::Interrupted);

        let err: io::Error = TransferError::DataCorruption {
            kind: CorruptionKind::Overrun,
            received: 11,
            expected: 10,
            retries: 0,
        }
        .into();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);

        let inner = io::Error::new(io::ErrorKind::TimedOut, "slow");
        let err: io::Error = TransferError::transport(inner).into();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    }
}
