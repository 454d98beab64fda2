//! Error taxonomy for the read channel.
//!
//! Retryable transport failures never surface directly: the retry loops in
//! [`crate::channel`] absorb them and reissue requests. What callers see is
//! either a domain condition (not found, checksum mismatch, gzip content) or
//! a `Transport` error wrapping the retry-exhausted cause.

use thiserror::Error;

use crate::object::ResourceId;
use crate::stub::{Status, StatusCode};

#[derive(Debug, Error)]
pub enum ReadError {
    /// Any operation other than `is_open`/`close` on a closed channel.
    #[error("read channel for '{resource}' is closed")]
    Closed { resource: ResourceId },

    /// The store reports that the object does not exist.
    #[error("object not found: '{resource}'")]
    NotFound {
        resource: ResourceId,
        #[source]
        source: Status,
    },

    /// The store reported a read past the end of the pinned generation.
    #[error("unexpected end of object '{resource}'")]
    UnexpectedEof {
        resource: ResourceId,
        #[source]
        source: Status,
    },

    /// Seek target at or beyond the end of the object.
    #[error(
        "read position {position} must be before end of object '{resource}' (size {size})"
    )]
    PositionOutOfBounds {
        resource: ResourceId,
        position: u64,
        size: u64,
    },

    /// A server chunk failed CRC32-C validation. Not retried: the bytes are
    /// already suspect and a silent re-read could mask deeper corruption.
    #[error(
        "chunk checksum mismatch for '{resource}': expected {expected:#010x}, computed {computed:#010x}"
    )]
    ChecksumMismatch {
        resource: ResourceId,
        expected: u32,
        computed: u32,
    },

    /// The object is stored gzip-encoded and this channel does not inflate.
    #[error("can't read gzip content-encoded object '{resource}'")]
    GzipContentEncoding { resource: ResourceId },

    /// Generic I/O failure wrapping the underlying transport cause.
    #[error("error reading '{resource}'")]
    Transport {
        resource: ResourceId,
        #[source]
        source: Status,
    },
}

/// Translates a terminal transport status into the domain error surfaced to
/// callers. Retryable codes never reach this point unless retries were
/// exhausted, in which case they fall through to `Transport`.
pub(crate) fn convert_status(status: Status, resource: &ResourceId) -> ReadError {
    match status.code() {
        StatusCode::NotFound => ReadError::NotFound {
            resource: resource.clone(),
            source: status,
        },
        StatusCode::OutOfRange => ReadError::UnexpectedEof {
            resource: resource.clone(),
            source: status,
        },
        _ => ReadError::Transport {
            resource: resource.clone(),
            source: status,
        },
    }
}
