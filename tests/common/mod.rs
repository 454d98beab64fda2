//! Scripted in-memory transport for exercising the read channel.
//!
//! `FakeStore` plays the object store: it serves one object in configurable
//! chunk sizes, records every request it sees, counts zero-copy leases that
//! have not been returned, and can be scripted to fail stream opens, fail
//! mid-stream after N chunks, corrupt checksums, skew chunk offsets, or
//! stall receives forever.

#![allow(dead_code)]

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;

use blobstore_read_channel::{
    CancelHandle, ChunkLease, MediaChunk, MediaRequest, MediaStream, ObjectMetadata, ResourceId,
    Status, StatusCode, StorageStub, StubProvider,
};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// An object whose bytes are `0, 1, 2, ...` wrapping at 256 — easy to spot
/// gaps and duplicates in.
pub fn counting_bytes(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 256) as u8).collect()
}

pub struct FakeStoreBuilder {
    data: Vec<u8>,
    chunk_size: usize,
    generation: u64,
    content_encoding: String,
    exists: bool,
    emit_offsets: bool,
    offset_skew: u64,
    stall_streams: bool,
}

impl FakeStoreBuilder {
    pub fn chunk_size(mut self, bytes: usize) -> Self {
        self.chunk_size = bytes;
        self
    }

    pub fn generation(mut self, generation: u64) -> Self {
        self.generation = generation;
        self
    }

    pub fn content_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.content_encoding = encoding.into();
        self
    }

    pub fn missing(mut self) -> Self {
        self.exists = false;
        self
    }

    pub fn emit_offsets(mut self) -> Self {
        self.emit_offsets = true;
        self
    }

    /// Report chunk offsets shifted by `delta` — a misbehaving server.
    pub fn skew_offsets(mut self, delta: u64) -> Self {
        self.emit_offsets = true;
        self.offset_skew = delta;
        self
    }

    /// Every stream receive hangs forever; only deadlines get reads back.
    pub fn stall_streams(mut self) -> Self {
        self.stall_streams = true;
        self
    }

    pub fn build(self) -> FakeStore {
        FakeStore {
            inner: Arc::new(Inner {
                resource: ResourceId::new("test-bucket", "test-object"),
                data: Bytes::from(self.data),
                chunk_size: self.chunk_size,
                pinned_generation: self.generation,
                current_generation: AtomicU64::new(self.generation),
                content_encoding: self.content_encoding,
                exists: self.exists,
                emit_offsets: self.emit_offsets,
                offset_skew: self.offset_skew,
                stall_streams: self.stall_streams,
                open_faults: Mutex::new(VecDeque::new()),
                stream_faults: Mutex::new(VecDeque::new()),
                metadata_faults: Mutex::new(VecDeque::new()),
                corrupt_crc_at: Mutex::new(None),
                broken_codes: Mutex::new(HashSet::new()),
                media_requests: Mutex::new(Vec::new()),
                cancel_handles: Mutex::new(Vec::new()),
                get_object_calls: AtomicUsize::new(0),
                stubs_created: AtomicUsize::new(0),
                outstanding_leases: Arc::new(AtomicUsize::new(0)),
            }),
        }
    }
}

struct Inner {
    resource: ResourceId,
    data: Bytes,
    chunk_size: usize,
    pinned_generation: u64,
    current_generation: AtomicU64,
    content_encoding: String,
    exists: bool,
    emit_offsets: bool,
    offset_skew: u64,
    stall_streams: bool,

    open_faults: Mutex<VecDeque<Status>>,
    stream_faults: Mutex<VecDeque<(usize, Status)>>,
    metadata_faults: Mutex<VecDeque<Status>>,
    corrupt_crc_at: Mutex<Option<u64>>,
    broken_codes: Mutex<HashSet<StatusCode>>,

    media_requests: Mutex<Vec<MediaRequest>>,
    cancel_handles: Mutex<Vec<CancelHandle>>,
    get_object_calls: AtomicUsize,
    stubs_created: AtomicUsize,
    outstanding_leases: Arc<AtomicUsize>,
}

pub struct FakeStore {
    inner: Arc<Inner>,
}

impl Clone for FakeStore {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl FakeStore {
    pub fn builder(data: impl Into<Vec<u8>>) -> FakeStoreBuilder {
        FakeStoreBuilder {
            data: data.into(),
            chunk_size: 2 * 1024 * 1024,
            generation: 1,
            content_encoding: String::new(),
            exists: true,
            emit_offsets: false,
            offset_skew: 0,
            stall_streams: false,
        }
    }

    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self::builder(data).build()
    }

    pub fn resource(&self) -> ResourceId {
        self.inner.resource.clone()
    }

    pub fn provider(&self) -> Arc<dyn StubProvider> {
        Arc::new(self.clone())
    }

    // === Scripted faults ===

    pub fn fail_next_open(&self, status: Status) {
        self.inner.open_faults.lock().unwrap().push_back(status);
    }

    /// The next opened stream delivers `after_chunks` chunks, then fails.
    pub fn fail_stream_after(&self, after_chunks: usize, status: Status) {
        self.inner
            .stream_faults
            .lock()
            .unwrap()
            .push_back((after_chunks, status));
    }

    pub fn fail_next_metadata(&self, status: Status) {
        self.inner.metadata_faults.lock().unwrap().push_back(status);
    }

    /// Any chunk starting at `offset` is served with a wrong CRC32-C.
    pub fn corrupt_crc_at(&self, offset: u64) {
        *self.inner.corrupt_crc_at.lock().unwrap() = Some(offset);
    }

    pub fn mark_broken(&self, code: StatusCode) {
        self.inner.broken_codes.lock().unwrap().insert(code);
    }

    /// Simulates the object being overwritten after the channel pinned its
    /// generation.
    pub fn bump_generation(&self) {
        self.inner.current_generation.fetch_add(1, Ordering::SeqCst);
    }

    // === Telemetry ===

    pub fn media_requests(&self) -> Vec<MediaRequest> {
        self.inner.media_requests.lock().unwrap().clone()
    }

    pub fn media_request_count(&self) -> usize {
        self.inner.media_requests.lock().unwrap().len()
    }

    pub fn get_object_calls(&self) -> usize {
        self.inner.get_object_calls.load(Ordering::SeqCst)
    }

    pub fn stubs_created(&self) -> usize {
        self.inner.stubs_created.load(Ordering::SeqCst)
    }

    pub fn outstanding_leases(&self) -> usize {
        self.inner.outstanding_leases.load(Ordering::SeqCst)
    }

    pub fn all_streams_cancelled(&self) -> bool {
        self.inner
            .cancel_handles
            .lock()
            .unwrap()
            .iter()
            .all(|handle| handle.is_fired())
    }
}

impl StubProvider for FakeStore {
    fn new_stub(&self) -> Arc<dyn StorageStub> {
        self.inner.stubs_created.fetch_add(1, Ordering::SeqCst);
        Arc::new(FakeStub {
            inner: self.inner.clone(),
        })
    }

    fn is_stub_broken(&self, code: StatusCode) -> bool {
        self.inner.broken_codes.lock().unwrap().contains(&code)
    }
}

struct FakeStub {
    inner: Arc<Inner>,
}

#[async_trait]
impl StorageStub for FakeStub {
    async fn get_object(&self, resource: &ResourceId) -> Result<ObjectMetadata, Status> {
        self.inner.get_object_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(status) = self.inner.metadata_faults.lock().unwrap().pop_front() {
            return Err(status);
        }
        if !self.inner.exists {
            return Err(Status::not_found(format!("object '{}' not found", resource)));
        }

        Ok(ObjectMetadata {
            generation: self.inner.current_generation.load(Ordering::SeqCst),
            size: self.inner.data.len() as u64,
            content_encoding: self.inner.content_encoding.clone(),
        })
    }

    async fn open_media(&self, request: MediaRequest) -> Result<Box<dyn MediaStream>, Status> {
        self.inner
            .media_requests
            .lock()
            .unwrap()
            .push(request.clone());

        if let Some(status) = self.inner.open_faults.lock().unwrap().pop_front() {
            return Err(status);
        }
        if request.generation != self.inner.current_generation.load(Ordering::SeqCst) {
            return Err(Status::not_found(format!(
                "generation {} of '{}' is gone",
                request.generation, request.resource
            )));
        }
        if request.read_offset > self.inner.data.len() as u64 {
            return Err(Status::out_of_range(format!(
                "read offset {} past end of object (size {})",
                request.read_offset,
                self.inner.data.len()
            )));
        }

        let start = request.read_offset as usize;
        let end = match request.read_limit {
            Some(limit) => (start + limit as usize).min(self.inner.data.len()),
            None => self.inner.data.len(),
        };

        let cancel = CancelHandle::new();
        self.inner
            .cancel_handles
            .lock()
            .unwrap()
            .push(cancel.clone());

        let fault = self.inner.stream_faults.lock().unwrap().pop_front();

        Ok(Box::new(FakeMediaStream {
            data: self.inner.data.clone(),
            pos: start,
            end,
            chunk_size: self.inner.chunk_size,
            cancel,
            outstanding: self.inner.outstanding_leases.clone(),
            fault,
            chunks_sent: 0,
            corrupt_crc_at: *self.inner.corrupt_crc_at.lock().unwrap(),
            emit_offsets: self.inner.emit_offsets,
            offset_skew: self.inner.offset_skew,
            stalled: self.inner.stall_streams,
        }))
    }
}

struct FakeMediaStream {
    data: Bytes,
    pos: usize,
    end: usize,
    chunk_size: usize,
    cancel: CancelHandle,
    outstanding: Arc<AtomicUsize>,
    fault: Option<(usize, Status)>,
    chunks_sent: usize,
    corrupt_crc_at: Option<u64>,
    emit_offsets: bool,
    offset_skew: u64,
    stalled: bool,
}

#[async_trait]
impl MediaStream for FakeMediaStream {
    fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    async fn next_chunk(&mut self) -> Option<Result<MediaChunk, Status>> {
        if self.stalled {
            std::future::pending::<()>().await;
        }
        if self.cancel.is_fired() {
            return None;
        }
        if let Some((after_chunks, _)) = &self.fault {
            if self.chunks_sent >= *after_chunks {
                let (_, status) = self.fault.take().expect("fault just matched");
                return Some(Err(status));
            }
        }
        if self.pos >= self.end {
            return None;
        }

        let chunk_end = (self.pos + self.chunk_size).min(self.end);
        let payload = self.data.slice(self.pos..chunk_end);

        let mut crc = crc32c::crc32c(&payload);
        if self.corrupt_crc_at == Some(self.pos as u64) {
            crc ^= 0xffff_ffff;
        }

        let chunk = MediaChunk {
            data: payload,
            crc32c: Some(crc),
            offset: self
                .emit_offsets
                .then(|| self.pos as u64 + self.offset_skew),
            lease: Some(ChunkLease::acquire(self.outstanding.clone())),
        };

        self.pos = chunk_end;
        self.chunks_sent += 1;
        Some(Ok(chunk))
    }
}
