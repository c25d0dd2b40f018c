//! Input bytes that have not yet been cut into a chunk.

use std::collections::VecDeque;

use bytes::{Buf, Bytes};

/// Queue of raw input fragments plus their total length.
#[derive(Debug, Default)]
pub(crate) struct PendingRegion {
    fragments: VecDeque<Bytes>,
    len: usize,
}

impl PendingRegion {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, fragment: Bytes) {
        if fragment.is_empty() {
            return;
        }
        self.len += fragment.len();
        self.fragments.push_back(fragment);
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Moves the first `n` pending bytes into `dst`.
    ///
    /// A head fragment that already covers `n` bytes is copied in one pass;
    /// otherwise fragments are drained front to back. Caller guarantees
    /// `n <= self.len()`.
    pub(crate) fn take_into(&mut self, dst: &mut Vec<u8>, n: usize) {
        debug_assert!(n <= self.len);

        if let Some(head) = self.fragments.front_mut()
            && head.len() >= n
        {
            dst.extend_from_slice(&head[..n]);
            head.advance(n);
            if head.is_empty() {
                self.fragments.pop_front();
            }
            self.len -= n;
            return;
        }

        let mut remaining = n;
        while remaining > 0 {
            let Some(head) = self.fragments.front_mut() else {
                break;
            };
            if head.len() <= remaining {
                dst.extend_from_slice(head);
                remaining -= head.len();
                self.fragments.pop_front();
            } else {
                dst.extend_from_slice(&head[..remaining]);
                head.advance(remaining);
                remaining = 0;
            }
        }
        self.len -= n - remaining;
    }
}
