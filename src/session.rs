//! In-flight server-streaming call state.

use std::fmt;

use crate::stub::{CancelHandle, MediaChunk, MediaStream, Status};

/// One open media stream: the response stream, its cancellation handle, and
/// the request coordinates it was issued with.
///
/// A channel owns at most one session at a time. Dropping the session is the
/// tear-down: it fires the cancellation handle and abandons the stream, and
/// both steps are idempotent.
pub(crate) struct StreamSession {
    stream: Box<dyn MediaStream>,
    cancel: CancelHandle,
    read_offset: u64,
    read_limit: Option<u64>,
}

impl StreamSession {
    /// Wraps a freshly opened stream. The cancellation handle is taken
    /// before any message is pulled, so a later cancel is legal even if
    /// nothing ever arrives.
    pub fn new(stream: Box<dyn MediaStream>, read_offset: u64, read_limit: Option<u64>) -> Self {
        let cancel = stream.cancel_handle();
        Self {
            stream,
            cancel,
            read_offset,
            read_limit,
        }
    }

    /// Receives the next message. A cancelled session reports end of stream
    /// without touching the underlying call; a naturally exhausted one fires
    /// its own cancellation handle on the way out.
    pub async fn next_chunk(&mut self) -> Option<Result<MediaChunk, Status>> {
        if self.cancel.is_fired() {
            return None;
        }
        let next = self.stream.next_chunk().await;
        if next.is_none() {
            self.cancel.fire();
        }
        next
    }

    pub fn read_offset(&self) -> u64 {
        self.read_offset
    }

    pub fn read_limit(&self) -> Option<u64> {
        self.read_limit
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        self.cancel.fire();
    }
}

impl fmt::Debug for StreamSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamSession")
            .field("read_offset", &self.read_offset)
            .field("read_limit", &self.read_limit)
            .field("cancelled", &self.cancel.is_fired())
            .finish()
    }
}
