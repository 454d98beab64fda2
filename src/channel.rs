//! The seekable read channel.
//!
//! This module implements the positional byte-channel abstraction over the
//! store's server-streaming media RPC. A channel pins one object generation
//! at open time and then translates arbitrary-position reads into a
//! coalesced sequence of streaming requests:
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                       ReadChannel                          │
//! │                                                            │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────┐    │
//! │  │ StreamSession│──▶│  ChunkBuffer │──▶│ caller's dst │    │
//! │  │ (media RPC)  │   │ (remainder)  │   │   buffer     │    │
//! │  └──────┬───────┘   └──────────────┘   └──────────────┘    │
//! │         │                                                  │
//! │  ┌──────▼───────┐   ┌──────────────┐                       │
//! │  │ StorageStub  │◀──│ StubProvider │  (swapped when a      │
//! │  └──────────────┘   └──────────────┘   status breaks it)   │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! Reads drain the buffered chunk remainder first, then pull from the open
//! stream, starting or re-starting one as needed. Small forward seeks are
//! absorbed by discarding bytes in-band; larger or backward seeks tear the
//! stream down and, under `auto`, flip the channel to random-access sizing
//! for good.

use std::cmp::min;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::timeout;

use crate::backoff::BackoffFactory;
use crate::buffer::ChunkBuffer;
use crate::config::{Fadvise, ReadOptions};
use crate::error::{convert_status, ReadError};
use crate::object::{ObjectMetadata, ResourceId};
use crate::session::StreamSession;
use crate::stub::{MediaChunk, MediaRequest, Status, StorageStub, StubProvider};

/// Counters for one channel's traffic.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ReadStats {
    /// Bytes handed to callers
    pub bytes_delivered: u64,

    /// Streaming media requests issued
    pub media_requests: u64,

    /// Chunks received across all streams
    pub chunks_received: u64,

    /// Retries taken after transient transport failures
    pub retries: u64,
}

/// Seekable, positional read channel over one pinned object generation.
///
/// Not safe for concurrent use: all operations take `&mut self` and internal
/// blocking is synchronous from the caller's perspective.
pub struct ReadChannel {
    stub: Arc<dyn StorageStub>,
    provider: Arc<dyn StubProvider>,
    resource: ResourceId,

    // Reads cite a specific generation to stay consistent across calls.
    generation: u64,
    object_size: u64,

    options: ReadOptions,
    backoff_factory: BackoffFactory,
    strategy: Fadvise,

    open: bool,

    // Offset of the next byte to consume from the stream. When a small
    // forward seek is pending, the caller's position runs ahead of this by
    // `skip_before_reading`.
    position: u64,
    skip_before_reading: u64,

    buffered: Option<ChunkBuffer>,
    session: Option<StreamSession>,

    stats: ReadStats,
}

impl ReadChannel {
    /// Opens a channel, pinning the object's current generation and size.
    ///
    /// The streaming media call carries no generation number, so a separate
    /// unary fetch pins one first; every subsequent media request cites it
    /// so that all bytes come from a single snapshot.
    pub async fn open(
        provider: Arc<dyn StubProvider>,
        resource: ResourceId,
        options: ReadOptions,
    ) -> Result<Self, ReadError> {
        let backoff_factory = options.backoff_factory();
        Self::open_with_backoff(provider, resource, options, backoff_factory).await
    }

    pub(crate) async fn open_with_backoff(
        provider: Arc<dyn StubProvider>,
        resource: ResourceId,
        options: ReadOptions,
        backoff_factory: BackoffFactory,
    ) -> Result<Self, ReadError> {
        let metadata_timeout = options.metadata_timeout();
        let mut backoff = backoff_factory.new_backoff();

        let (stub, metadata) = loop {
            // A fresh stub per attempt: the previous one may be the reason
            // the call failed.
            let stub = provider.new_stub();
            match Self::fetch_metadata(stub.as_ref(), &resource, metadata_timeout).await {
                Ok(metadata) => break (stub, metadata),
                Err(status) => {
                    if status.code().is_policy_terminal() {
                        return Err(convert_status(status, &resource));
                    }
                    let Some(delay) = backoff.next_delay() else {
                        return Err(ReadError::Transport {
                            resource,
                            source: status,
                        });
                    };
                    tracing::warn!(
                        "metadata fetch for '{}' failed ({}), retrying in {:?}",
                        resource,
                        status,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        };

        // This channel doesn't decompress gzip-encoded objects on the fly,
        // so fail fast rather than return gibberish.
        if metadata.content_encoding.contains("gzip") {
            return Err(ReadError::GzipContentEncoding { resource });
        }

        let strategy = options.fadvise();
        Ok(Self {
            stub,
            provider,
            resource,
            generation: metadata.generation,
            object_size: metadata.size,
            options,
            backoff_factory,
            strategy,
            open: true,
            position: 0,
            skip_before_reading: 0,
            buffered: None,
            session: None,
            stats: ReadStats::default(),
        })
    }

    async fn fetch_metadata(
        stub: &dyn StorageStub,
        resource: &ResourceId,
        deadline: Duration,
    ) -> Result<ObjectMetadata, Status> {
        match timeout(deadline, stub.get_object(resource)).await {
            Ok(result) => result,
            Err(_) => Err(Status::deadline_exceeded("metadata fetch timed out")),
        }
    }

    /// Reads up to `dst.len()` bytes at the current position.
    ///
    /// Returns `Some(n)` with `n > 0` when bytes were delivered, `Some(0)`
    /// only when `dst` is empty, and `None` when the caller is already at
    /// end of object. Successive reads deliver a contiguous byte sequence.
    pub async fn read(&mut self, dst: &mut [u8]) -> Result<Option<usize>, ReadError> {
        self.ensure_open()?;
        tracing::trace!(
            "read of up to {} bytes at offset {} from object '{}'",
            dst.len(),
            self.position + self.skip_before_reading,
            self.resource
        );

        let outcome = self.read_into(dst).await?;
        if let Some(n) = outcome {
            self.stats.bytes_delivered += n as u64;
        }
        Ok(outcome)
    }

    async fn read_into(&mut self, dst: &mut [u8]) -> Result<Option<usize>, ReadError> {
        let mut bytes_read = 0;

        if self.buffered.is_some() {
            bytes_read += self.read_buffered_into(dst);
        }
        if bytes_read == dst.len() {
            return Ok(Some(bytes_read));
        }
        if self.position == self.object_size {
            return Ok(if bytes_read > 0 { Some(bytes_read) } else { None });
        }

        while bytes_read < dst.len() {
            let want = dst.len() - bytes_read;
            let chunk = match self.next_chunk(want).await? {
                Some(chunk) => chunk,
                None => {
                    if bytes_read == 0 && self.position < self.object_size {
                        // A bounded request can be consumed entirely by the
                        // pending-skip window; reissue at the advanced
                        // position rather than hand back an empty read.
                        continue;
                    }
                    break;
                }
            };
            self.stats.chunks_received += 1;

            let MediaChunk {
                data,
                crc32c: server_crc,
                offset,
                lease,
            } = chunk;

            if let Some(server_offset) = offset {
                // A conforming stream is strictly sequential; anything else
                // means the transport lost its place.
                if server_offset != self.position {
                    if let Some(lease) = lease {
                        lease.release();
                    }
                    self.teardown_session();
                    self.invalidate_buffer();
                    return Err(ReadError::Transport {
                        resource: self.resource.clone(),
                        source: Status::internal(format!(
                            "stream chunk arrived at offset {}, expected {}",
                            server_offset, self.position
                        )),
                    });
                }
            }

            if self.skip_before_reading >= data.len() as u64 {
                // The whole chunk falls inside the pending-skip window.
                self.position += data.len() as u64;
                self.skip_before_reading -= data.len() as u64;
                if let Some(lease) = lease {
                    lease.release();
                }
                continue;
            }

            if self.options.checksums_enabled {
                if let Some(expected) = server_crc {
                    let computed = crc32c::crc32c(&data);
                    if computed != expected {
                        if let Some(lease) = lease {
                            lease.release();
                        }
                        self.teardown_session();
                        return Err(ReadError::ChecksumMismatch {
                            resource: self.resource.clone(),
                            expected,
                            computed,
                        });
                    }
                }
            }

            // Discard the skipped prefix without copying.
            let chunk_data = if self.skip_before_reading > 0 {
                let skip = self.skip_before_reading as usize;
                self.position += self.skip_before_reading;
                self.skip_before_reading = 0;
                data.slice(skip..)
            } else {
                data
            };

            let to_write = min(chunk_data.len(), dst.len() - bytes_read);
            dst[bytes_read..bytes_read + to_write].copy_from_slice(&chunk_data[..to_write]);
            bytes_read += to_write;
            self.position += to_write as u64;

            if to_write < chunk_data.len() {
                // The chunk outlives the caller's buffer: park the rest,
                // lease and all, for the next read.
                self.invalidate_buffer();
                self.buffered = Some(ChunkBuffer::new(chunk_data, to_write, lease));
            } else if let Some(lease) = lease {
                lease.release();
            }
        }

        Ok(Some(bytes_read))
    }

    /// Drains the parked chunk remainder into `dst`, consuming any pending
    /// skip against it first.
    fn read_buffered_into(&mut self, dst: &mut [u8]) -> usize {
        let Some(buffered) = self.buffered.as_mut() else {
            return 0;
        };

        let skip = min(buffered.remaining() as u64, self.skip_before_reading);
        buffered.advance(skip as usize);
        self.position += skip;
        self.skip_before_reading -= skip;

        let to_write = min(buffered.remaining(), dst.len());
        dst[..to_write].copy_from_slice(&buffered.pending()[..to_write]);
        self.position += to_write as u64;

        if buffered.remaining() > to_write {
            buffered.advance(to_write);
        } else {
            self.invalidate_buffer();
        }

        to_write
    }

    /// Receives one message, creating or re-creating the streaming call as
    /// needed. Retryable mid-stream failures tear the session down and
    /// reissue a new ranged request at the current position, which already
    /// accounts for every byte delivered so far.
    async fn next_chunk(&mut self, want: usize) -> Result<Option<MediaChunk>, ReadError> {
        let read_deadline = self.options.read_timeout();
        let mut backoff = self.backoff_factory.new_backoff();

        loop {
            if self.session.is_none() {
                let session = self.start_session(want).await?;
                self.session = Some(session);
            }

            let outcome = match self.session.as_mut() {
                Some(session) => match timeout(read_deadline, session.next_chunk()).await {
                    Ok(outcome) => outcome,
                    Err(_) => Some(Err(Status::deadline_exceeded("media receive timed out"))),
                },
                None => None,
            };

            match outcome {
                Some(Ok(chunk)) => return Ok(Some(chunk)),
                Some(Err(status)) => {
                    self.recreate_stub_if_broken(&status);
                    self.teardown_session();
                    if status.code().is_policy_terminal() {
                        self.invalidate_buffer();
                        return Err(convert_status(status, &self.resource));
                    }
                    let Some(delay) = backoff.next_delay() else {
                        self.invalidate_buffer();
                        return Err(ReadError::Transport {
                            resource: self.resource.clone(),
                            source: status,
                        });
                    };
                    self.stats.retries += 1;
                    tracing::warn!(
                        "media stream for '{}' failed ({}), reissuing at offset {} in {:?}",
                        self.resource,
                        status,
                        self.position,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                None => {
                    self.teardown_session();
                    return Ok(None);
                }
            }
        }
    }

    /// Issues a new ranged streaming request at the current position.
    async fn start_session(&mut self, want: usize) -> Result<StreamSession, ReadError> {
        let read_limit = match self.strategy {
            Fadvise::Random => Some((want as u64).max(self.options.min_range_request_size)),
            _ => None,
        };
        let request = MediaRequest {
            resource: self.resource.clone(),
            generation: self.generation,
            read_offset: self.position,
            read_limit,
        };
        tracing::debug!(
            "opening media stream for '{}' at offset {} (limit {:?})",
            self.resource,
            request.read_offset,
            request.read_limit
        );

        let deadline = self.options.read_timeout();
        let mut backoff = self.backoff_factory.new_backoff();

        loop {
            let result = match timeout(deadline, self.stub.open_media(request.clone())).await {
                Ok(result) => result,
                Err(_) => Err(Status::deadline_exceeded("media stream open timed out")),
            };

            match result {
                Ok(stream) => {
                    self.stats.media_requests += 1;
                    return Ok(StreamSession::new(
                        stream,
                        request.read_offset,
                        request.read_limit,
                    ));
                }
                Err(status) => {
                    self.recreate_stub_if_broken(&status);
                    if status.code().is_policy_terminal() {
                        self.invalidate_buffer();
                        return Err(convert_status(status, &self.resource));
                    }
                    let Some(delay) = backoff.next_delay() else {
                        self.invalidate_buffer();
                        return Err(ReadError::Transport {
                            resource: self.resource.clone(),
                            source: status,
                        });
                    };
                    self.stats.retries += 1;
                    tracing::warn!(
                        "media stream open for '{}' failed ({}), retrying in {:?}",
                        self.resource,
                        status,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Caller-visible position: the next byte a `read` would deliver.
    pub fn position(&self) -> Result<u64, ReadError> {
        self.ensure_open()?;
        // The real cursor is `position`; a pending small seek makes the
        // caller-visible position run ahead of it.
        Ok(self.position + self.skip_before_reading)
    }

    /// Repositions the channel.
    ///
    /// A forward seek within the in-place window is absorbed by discarding
    /// bytes from the open stream; anything else cancels the in-flight call,
    /// drops buffered data, and (under `auto`) makes the channel
    /// sticky-random.
    pub fn seek(&mut self, new_position: u64) -> Result<(), ReadError> {
        self.ensure_open()?;
        if new_position >= self.object_size {
            return Err(ReadError::PositionOutOfBounds {
                resource: self.resource.clone(),
                position: new_position,
                size: self.object_size,
            });
        }
        if new_position == self.position + self.skip_before_reading {
            return Ok(());
        }

        if new_position >= self.position
            && new_position - self.position <= self.options.inplace_seek_limit
        {
            self.skip_before_reading = new_position - self.position;
            return Ok(());
        }

        if self.strategy == Fadvise::Auto {
            // One non-trivial seek is a strong hint that more will follow.
            self.strategy = Fadvise::Random;
        }

        self.teardown_session();
        self.invalidate_buffer();
        self.position = new_position;
        self.skip_before_reading = 0;
        Ok(())
    }

    /// Size of the pinned generation, in bytes.
    pub fn size(&self) -> Result<u64, ReadError> {
        self.ensure_open()?;
        Ok(self.object_size)
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Cancels any in-flight stream, releases buffered transport memory, and
    /// marks the channel closed. Idempotent; never fails.
    pub fn close(&mut self) {
        self.teardown_session();
        self.invalidate_buffer();
        self.open = false;
    }

    pub fn resource(&self) -> &ResourceId {
        &self.resource
    }

    /// Generation pinned at open time.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Access strategy currently in effect (`auto` downgrades to `random`
    /// after a non-trivial seek).
    pub fn strategy(&self) -> Fadvise {
        self.strategy
    }

    /// Traffic counters for this channel.
    pub fn stats(&self) -> ReadStats {
        self.stats
    }

    fn ensure_open(&self) -> Result<(), ReadError> {
        if self.open {
            Ok(())
        } else {
            Err(ReadError::Closed {
                resource: self.resource.clone(),
            })
        }
    }

    fn teardown_session(&mut self) {
        // Dropping the session fires its cancellation handle.
        self.session = None;
    }

    fn invalidate_buffer(&mut self) {
        if let Some(buffered) = self.buffered.take() {
            buffered.release();
        }
    }

    fn recreate_stub_if_broken(&mut self, status: &Status) {
        if self.provider.is_stub_broken(status.code()) {
            self.stub = self.provider.new_stub();
        }
    }
}

impl fmt::Debug for ReadChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadChannel")
            .field("resource", &self.resource)
            .field("generation", &self.generation)
            .finish()
    }
}
