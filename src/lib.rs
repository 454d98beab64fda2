//! # Blobstore streaming read channel
//!
//! A seekable, positional read channel over a cloud object store's
//! server-streaming read RPC.
//!
//! The channel pins one object generation at open time and then translates
//! arbitrary-position `read` calls into a coalesced sequence of streaming
//! requests, so every byte a caller sees comes from a single immutable
//! snapshot. It supports:
//!
//! - **Sequential streaming**: one long-lived stream runs to end of object
//! - **Random access**: bounded ranged requests sized to the caller's buffer
//! - **Adaptive sizing**: sequential until a non-trivial seek is observed
//!
//! Small forward seeks are absorbed by discarding bytes from the open stream
//! (consuming already-reserved bandwidth is cheaper than a fresh request);
//! transient stream failures reconnect transparently at the current
//! position; per-chunk CRC32-C is enforced when the server supplies it; and
//! zero-copy chunk leases are returned to the transport on every path.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use blobstore_read_channel::{ReadChannel, ReadOptions, ResourceId, StubProvider};
//!
//! async fn dump(provider: Arc<dyn StubProvider>) -> anyhow::Result<()> {
//!     let options = ReadOptions::builder().build()?;
//!     let resource = ResourceId::new("my-bucket", "logs/2026-08-01.bin");
//!     let mut channel = ReadChannel::open(provider, resource, options).await?;
//!
//!     let mut buf = vec![0u8; 64 * 1024];
//!     while let Some(n) = channel.read(&mut buf).await? {
//!         println!("got {} bytes at offset {}", n, channel.position()? - n as u64);
//!     }
//!     channel.close();
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`channel`]: The read channel itself: open, read, seek, close
//! - [`stub`]: Transport abstraction (stubs, streams, chunks, leases)
//! - [`config`]: Read options and the access-pattern hint
//! - [`backoff`]: Retry backoff state machines
//! - [`object`]: Resource coordinates and pinned metadata
//! - [`error`]: The error taxonomy callers match on

pub mod backoff;
mod buffer;
pub mod channel;
pub mod config;
pub mod error;
pub mod object;
mod session;
pub mod stub;

// Re-exports for convenience
pub use channel::{ReadChannel, ReadStats};
pub use config::{Fadvise, OptionsError, ReadOptions};
pub use error::ReadError;
pub use object::{ObjectMetadata, ResourceId};
pub use stub::{
    CancelHandle, ChunkLease, MediaChunk, MediaRequest, MediaStream, Status, StatusCode,
    StorageStub, StubProvider,
};

/// Prelude module for common imports
pub mod prelude {
    pub use crate::channel::ReadChannel;
    pub use crate::config::{Fadvise, ReadOptions};
    pub use crate::error::ReadError;
    pub use crate::object::ResourceId;
    pub use crate::stub::{StorageStub, StubProvider};
}
