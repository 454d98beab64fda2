//! Buffered remainder of the most recent server chunk.

use bytes::Bytes;

use crate::stub::ChunkLease;

/// At most one undelivered chunk, plus how far into it the caller has read.
///
/// The server responds in multi-megabyte messages but callers may ask for
/// less; the remainder is parked here and handed out on subsequent reads.
/// The zero-copy lease backing the bytes is held until the buffer is
/// released.
#[derive(Debug)]
pub(crate) struct ChunkBuffer {
    bytes: Bytes,
    read_offset: usize,
    lease: Option<ChunkLease>,
}

impl ChunkBuffer {
    pub fn new(bytes: Bytes, read_offset: usize, lease: Option<ChunkLease>) -> Self {
        debug_assert!(read_offset <= bytes.len());
        Self {
            bytes,
            read_offset,
            lease,
        }
    }

    /// Bytes not yet handed to the caller.
    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.read_offset
    }

    /// The undelivered slice.
    pub fn pending(&self) -> &[u8] {
        &self.bytes[self.read_offset..]
    }

    pub fn advance(&mut self, n: usize) {
        debug_assert!(n <= self.remaining());
        self.read_offset += n;
    }

    /// Returns the pooled memory behind this buffer to the transport.
    pub fn release(self) {
        if let Some(lease) = self.lease {
            lease.release();
        }
    }
}
