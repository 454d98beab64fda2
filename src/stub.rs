//! Transport abstraction for the object store's read surface.
//!
//! The channel consumes two RPCs: a unary metadata fetch and a
//! server-streaming media read. Both are issued through a [`StorageStub`]
//! obtained from a [`StubProvider`], which also knows when a stub has gone
//! bad for a given status code and must be replaced.
//!
//! ## Zero-copy chunks
//!
//! When the transport supports a zero-copy message path, each [`MediaChunk`]
//! carries a [`ChunkLease`] scoping the pooled memory that backs its bytes.
//! The lease must be returned on every consumption path: when the chunk is
//! fully delivered, when it is skipped past, or when the buffered remainder
//! holding it is invalidated. Dropping a lease returns it as well, so an
//! error path can never strand pooled memory.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::object::{ObjectMetadata, ResourceId};

/// Transport status codes, mirroring the RPC layer's classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    Cancelled,
    Unknown,
    InvalidArgument,
    DeadlineExceeded,
    NotFound,
    PermissionDenied,
    ResourceExhausted,
    FailedPrecondition,
    Aborted,
    OutOfRange,
    Unimplemented,
    Internal,
    Unavailable,
    DataLoss,
    Unauthenticated,
}

impl StatusCode {
    /// Codes the retry loop must not re-enter: these are translated to
    /// domain errors and surfaced immediately. Everything else is treated
    /// as retryable at this layer.
    pub fn is_policy_terminal(self) -> bool {
        matches!(
            self,
            StatusCode::NotFound
                | StatusCode::OutOfRange
                | StatusCode::InvalidArgument
                | StatusCode::PermissionDenied
                | StatusCode::Unauthenticated
        )
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StatusCode::Cancelled => "CANCELLED",
            StatusCode::Unknown => "UNKNOWN",
            StatusCode::InvalidArgument => "INVALID_ARGUMENT",
            StatusCode::DeadlineExceeded => "DEADLINE_EXCEEDED",
            StatusCode::NotFound => "NOT_FOUND",
            StatusCode::PermissionDenied => "PERMISSION_DENIED",
            StatusCode::ResourceExhausted => "RESOURCE_EXHAUSTED",
            StatusCode::FailedPrecondition => "FAILED_PRECONDITION",
            StatusCode::Aborted => "ABORTED",
            StatusCode::OutOfRange => "OUT_OF_RANGE",
            StatusCode::Unimplemented => "UNIMPLEMENTED",
            StatusCode::Internal => "INTERNAL",
            StatusCode::Unavailable => "UNAVAILABLE",
            StatusCode::DataLoss => "DATA_LOSS",
            StatusCode::Unauthenticated => "UNAUTHENTICATED",
        };
        write!(f, "{}", name)
    }
}

/// A transport-layer failure: a status code plus a human-readable message.
#[derive(Debug, Clone)]
pub struct Status {
    code: StatusCode,
    message: String,
}

impl Status {
    pub fn new(code: StatusCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn code(&self) -> StatusCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NotFound, message)
    }

    pub fn out_of_range(message: impl Into<String>) -> Self {
        Self::new(StatusCode::OutOfRange, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::Unavailable, message)
    }

    pub fn deadline_exceeded(message: impl Into<String>) -> Self {
        Self::new(StatusCode::DeadlineExceeded, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::Internal, message)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for Status {}

/// Parameters of one server-streaming media request.
#[derive(Debug, Clone)]
pub struct MediaRequest {
    pub resource: ResourceId,

    /// Generation pinned at open time; the server rejects the request if the
    /// object has since been overwritten.
    pub generation: u64,

    /// Offset of the first byte to stream
    pub read_offset: u64,

    /// Maximum bytes the server should stream; `None` streams to end of
    /// object
    pub read_limit: Option<u64>,
}

/// One streamed response message: a contiguous byte range with its checks.
#[derive(Debug)]
pub struct MediaChunk {
    /// Payload bytes. Slicing is cheap; the storage is shared with `lease`.
    pub data: Bytes,

    /// CRC32-C over `data`, when the server supplies one
    pub crc32c: Option<u32>,

    /// Byte offset of `data[0]` within the object, when the server supplies
    /// one
    pub offset: Option<u64>,

    /// Pooled-memory lease backing `data` on the zero-copy path
    pub lease: Option<ChunkLease>,
}

/// Owned handle to transport-pooled memory backing one chunk.
///
/// Exactly one lease exists per zero-copy chunk. [`ChunkLease::release`]
/// returns the memory on the deliberate paths; `Drop` covers the rest.
#[derive(Debug)]
pub struct ChunkLease {
    outstanding: Option<Arc<AtomicUsize>>,
}

impl ChunkLease {
    /// Acquires against `outstanding`, the transport's count of leases not
    /// yet returned.
    pub fn acquire(outstanding: Arc<AtomicUsize>) -> Self {
        outstanding.fetch_add(1, Ordering::SeqCst);
        Self {
            outstanding: Some(outstanding),
        }
    }

    pub fn release(mut self) {
        self.put_back();
    }

    fn put_back(&mut self) {
        if let Some(outstanding) = self.outstanding.take() {
            outstanding.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl Drop for ChunkLease {
    fn drop(&mut self) {
        self.put_back();
    }
}

/// Cancellation handle for an in-flight streaming call.
///
/// Obtained from the stream before the first message is pulled, so firing it
/// is legal even if nothing ever arrives. Firing is idempotent and safe
/// after the stream has completed naturally.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    fired: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fire(&self) {
        self.fired.store(true, Ordering::SeqCst);
    }

    pub fn is_fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }
}

/// A live server-streaming media call.
#[async_trait]
pub trait MediaStream: Send {
    /// Handle that aborts this call when fired
    fn cancel_handle(&self) -> CancelHandle;

    /// Receives the next message. `None` is normal end of stream; an `Err`
    /// leaves the stream unusable.
    async fn next_chunk(&mut self) -> Option<Result<MediaChunk, Status>>;
}

/// Stub over the store's read RPCs, bound to one authenticated channel.
#[async_trait]
pub trait StorageStub: Send + Sync {
    /// Unary metadata fetch for an object's current generation, size, and
    /// content encoding.
    async fn get_object(&self, resource: &ResourceId) -> Result<ObjectMetadata, Status>;

    /// Opens a ranged server-streaming read. The returned stream yields
    /// chunks lazily; no bytes move until the first receive.
    async fn open_media(&self, request: MediaRequest) -> Result<Box<dyn MediaStream>, Status>;
}

/// Supplies stubs and classifies stub-killing status codes.
///
/// Shared between channels. When a call fails with a code for which
/// [`StubProvider::is_stub_broken`] returns true (authentication expired,
/// channel shut down), the caller discards its stub and routes future calls
/// through a fresh one.
pub trait StubProvider: Send + Sync {
    fn new_stub(&self) -> Arc<dyn StorageStub>;

    fn is_stub_broken(&self, code: StatusCode) -> bool;
}
