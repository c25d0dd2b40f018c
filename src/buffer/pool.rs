//! Bounded pool of fixed-size chunk buffers.

use std::fmt;
use std::ops::Deref;
use std::sync::{Arc, Mutex, PoisonError, Weak};

/// Free list shared between the pool and the buffers it handed out.
#[derive(Debug, Default)]
struct FreeList {
    buffers: Mutex<Vec<Vec<u8>>>,
}

impl FreeList {
    fn pop(&self) -> Option<Vec<u8>> {
        self.buffers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop()
    }

    fn push(&self, buf: Vec<u8>) {
        self.buffers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(buf);
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.buffers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Allocates at most `max_buffers` buffers of `buffer_size` bytes and
/// recycles them for its whole lifetime.
#[derive(Debug)]
pub(crate) struct BufferPool {
    free: Arc<FreeList>,
    buffer_size: usize,
    max_buffers: usize,
    allocated: usize,
}

impl BufferPool {
    pub(crate) fn new(buffer_size: usize, max_buffers: usize) -> Self {
        Self {
            free: Arc::new(FreeList::default()),
            buffer_size,
            max_buffers,
            allocated: 0,
        }
    }

    /// Takes a free buffer, allocating a new one while under the cap.
    ///
    /// Returns `None` when every buffer is queued or held by a handler.
    pub(crate) fn acquire(&mut self) -> Option<Vec<u8>> {
        if let Some(buf) = self.free.pop() {
            return Some(buf);
        }
        if self.allocated < self.max_buffers {
            self.allocated += 1;
            return Some(Vec::with_capacity(self.buffer_size));
        }
        None
    }

    /// Wraps a filled buffer so it returns here when dropped.
    pub(crate) fn lease(&self, data: Vec<u8>, offset: u64) -> ChunkBuffer {
        ChunkBuffer {
            data,
            offset,
            home: Arc::downgrade(&self.free),
        }
    }

    /// Number of buffers allocated so far.
    pub(crate) fn allocated(&self) -> usize {
        self.allocated
    }

    /// Number of buffers sitting in the free list.
    #[cfg(test)]
    pub(crate) fn available(&self) -> usize {
        self.free.len()
    }
}

/// A filled chunk handed to a chunk handler.
///
/// The handler owns the buffer for the duration of the call. Dropping it
/// (normally when the handler's future completes) returns the storage to the
/// scheduler's pool for the next chunk.
pub struct ChunkBuffer {
    data: Vec<u8>,
    offset: u64,
    home: Weak<FreeList>,
}

impl ChunkBuffer {
    /// Offset of the first byte of this chunk in the input stream.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Returns the chunk bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Returns the number of bytes in the chunk.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the chunk holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Offset one past the last byte of this chunk.
    pub fn end(&self) -> u64 {
        self.offset + self.data.len() as u64
    }

    /// Copies the chunk into an owned [`bytes::Bytes`], e.g. for a request body
    /// that must outlive the handler call.
    pub fn to_bytes(&self) -> bytes::Bytes {
        bytes::Bytes::copy_from_slice(&self.data)
    }
}

impl Deref for ChunkBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.data
    }
}

impl AsRef<[u8]> for ChunkBuffer {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

impl fmt::Debug for ChunkBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChunkBuffer")
            .field("offset", &self.offset)
            .field("len", &self.data.len())
            .finish()
    }
}

impl Drop for ChunkBuffer {
    fn drop(&mut self) {
        // Pool already gone: let the allocation go with it.
        if let Some(home) = self.home.upgrade() {
            let mut data = std::mem::take(&mut self.data);
            data.clear();
            home.push(data);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_respects_cap() {
        let mut pool = BufferPool::new(16, 2);
        let a = pool.acquire().unwrap();
        let b = pool.acquire().unwrap();
        assert!(pool.acquire().is_none());
        assert_eq!(pool.allocated(), 2);
        assert!(a.capacity() >= 16);
        assert!(b.capacity() >= 16);
    }

    #[test]
    fn test_drop_returns_buffer() {
        let mut pool = BufferPool::new(8, 1);
        let mut data = pool.acquire().unwrap();
        data.extend_from_slice(b"abcd");
        let ptr = data.as_ptr();

        let chunk = pool.lease(data, 4);
        assert_eq!(chunk.offset(), 4);
        assert_eq!(&chunk[..], b"abcd");
        assert_eq!(chunk.end(), 8);
        assert!(pool.acquire().is_none());

        drop(chunk);
        assert_eq!(pool.available(), 1);

        let reused = pool.acquire().unwrap();
        assert!(reused.is_empty());
        assert_eq!(reused.as_ptr(), ptr);
        assert_eq!(pool.allocated(), 1);
    }

    #[test]
    fn test_chunk_outliving_pool() {
        let mut pool = BufferPool::new(4, 1);
        let data = pool.acquire().unwrap();
        let chunk = pool.lease(data, 0);
        drop(pool);
        drop(chunk);
    }
}
