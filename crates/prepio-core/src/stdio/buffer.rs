//! Per-handle byte buffers.
//!
//! A handle owns one [`WriteBuffer`] (bytes accepted but not yet committed)
//! and one [`ReadBuffer`] (bytes fetched but not yet delivered). The two are
//! independent; neither ever grows past the capacity fixed at open.

/// Bytes accepted by `write` and waiting for a flush.
///
/// Invariant: `len <= data.len()` (capacity is fixed at creation).
#[derive(Debug)]
pub struct WriteBuffer {
    data: Box<[u8]>,
    len: usize,
}

/// Returned by [`WriteBuffer::try_push`] when the bytes do not fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoRoom {
    pub requested: usize,
    pub remaining: usize,
}

impl WriteBuffer {
    /// Allocate an empty buffer. Capacity is at least 1.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: vec![0u8; capacity.max(1)].into_boxed_slice(),
            len: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.len
    }

    /// Append `bytes` after the pending ones, or leave the buffer untouched
    /// if they do not fit.
    pub fn try_push(&mut self, bytes: &[u8]) -> Result<(), NoRoom> {
        let remaining = self.remaining();
        if bytes.len() > remaining {
            return Err(NoRoom {
                requested: bytes.len(),
                remaining,
            });
        }
        self.data[self.len..self.len + bytes.len()].copy_from_slice(bytes);
        self.len += bytes.len();
        Ok(())
    }

    /// Pending bytes in call order.
    pub fn pending(&self) -> &[u8] {
        &self.data[..self.len]
    }

    /// Drop the first `n` pending bytes (they reached the file).
    pub fn consume(&mut self, n: usize) {
        let n = n.min(self.len);
        self.data.copy_within(n..self.len, 0);
        self.len -= n;
    }

    /// Mark everything as committed.
    pub fn clear(&mut self) {
        self.len = 0;
    }
}

/// Bytes fetched from the file and not yet handed to a caller.
///
/// Invariant: `cursor <= filled <= data.len()`.
#[derive(Debug)]
pub struct ReadBuffer {
    data: Box<[u8]>,
    cursor: usize,
    filled: usize,
}

impl ReadBuffer {
    /// Allocate an empty buffer. Capacity is at least 1.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: vec![0u8; capacity.max(1)].into_boxed_slice(),
            cursor: 0,
            filled: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Number of buffered bytes not yet delivered.
    pub fn readable(&self) -> usize {
        self.filled - self.cursor
    }

    /// Copy as many unread bytes as fit into `dst`, advancing the cursor.
    pub fn take_into(&mut self, dst: &mut [u8]) -> usize {
        let take = dst.len().min(self.readable());
        dst[..take].copy_from_slice(&self.data[self.cursor..self.cursor + take]);
        self.cursor += take;
        take
    }

    /// Whole backing storage, to be filled by one underlying read.
    ///
    /// Must be followed by [`ReadBuffer::set_filled`].
    pub fn refill_slot(&mut self) -> &mut [u8] {
        self.cursor = 0;
        self.filled = 0;
        &mut self.data[..]
    }

    /// Record how many bytes the refill produced and rewind the cursor.
    pub fn set_filled(&mut self, n: usize) {
        self.filled = n.min(self.data.len());
        self.cursor = 0;
    }

    /// Discard all buffered bytes.
    pub fn reset(&mut self) {
        self.cursor = 0;
        self.filled = 0;
    }
}
