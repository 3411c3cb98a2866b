//! In-memory stream and directory implementations.
//!
//! These back the crate's own tests and give embedders a reference
//! implementation of the collaborator traits. Every storage call and
//! acknowledgment is recorded as a [`StreamEvent`] in arrival order.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicI64, Ordering},
        Arc, Mutex,
    },
};

use crate::{
    buffer::WriteBuffer,
    context::{
        FlushLogContext, FlushMetaContext, TruncateLogContext, TruncatePrefixBlocksContext,
    },
    error::StorageError,
    stream::{LogStream, StreamDirectory, StreamGuard},
    types::{Epoch, LogTimestamp, Lsn, StreamId},
};

/// One recorded stream interaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// `append` was called.
    Append {
        /// Start LSN of the write.
        lsn: Lsn,
        /// Byte length of the buffer.
        len: usize,
        /// Timestamp passed with the write.
        ts: LogTimestamp,
    },
    /// `append_batch` was called.
    AppendBatch {
        /// Start LSNs, in call order.
        lsns: Vec<Lsn>,
        /// Byte length of each buffer.
        lens: Vec<usize>,
        /// Timestamp of each entry.
        timestamps: Vec<LogTimestamp>,
    },
    /// `advance_durable_point` was called.
    Advance(Lsn),
    /// `truncate` was called.
    Truncate(Lsn),
    /// `append_meta` was called with a payload of this length.
    AppendMeta(usize),
    /// `truncate_prefix_blocks` was called.
    TruncatePrefix(Lsn),
    /// The flush acknowledgment hook fired.
    FlushAck(FlushLogContext),
    /// The truncate acknowledgment hook fired.
    TruncateAck(TruncateLogContext),
    /// The meta acknowledgment hook fired.
    MetaAck(FlushMetaContext),
    /// The prefix-truncate acknowledgment hook fired.
    PrefixAck(TruncatePrefixBlocksContext),
}

/// Recording [`LogStream`] with a bumpable epoch and failure injection.
#[derive(Debug)]
pub struct MemStream {
    epoch: AtomicI64,
    durable_point: AtomicI64,
    events: Mutex<Vec<StreamEvent>>,
    fail_append: Mutex<Option<String>>,
}

impl MemStream {
    /// Create a stream at the given epoch.
    pub fn new(epoch: Epoch) -> Self {
        Self {
            epoch: AtomicI64::new(epoch),
            durable_point: AtomicI64::new(0),
            events: Mutex::new(Vec::new()),
            fail_append: Mutex::new(None),
        }
    }

    /// Re-arm the stream: bump the epoch, fencing out in-flight tasks.
    pub fn bump_epoch(&self) -> Epoch {
        self.epoch.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Highest LSN published as durable so far.
    pub fn durable_point(&self) -> Lsn {
        self.durable_point.load(Ordering::SeqCst)
    }

    /// Every recorded interaction, in arrival order.
    pub fn events(&self) -> Vec<StreamEvent> {
        self.events.lock().expect("mem stream mutex poisoned").clone()
    }

    /// Make the next append (single, batched, or meta) fail with `msg`.
    pub fn fail_next_append(&self, msg: impl Into<String>) {
        *self.fail_append.lock().expect("mem stream mutex poisoned") = Some(msg.into());
    }

    fn record(&self, event: StreamEvent) {
        self.events
            .lock()
            .expect("mem stream mutex poisoned")
            .push(event);
    }

    fn take_injected_failure(&self) -> Option<StorageError> {
        self.fail_append
            .lock()
            .expect("mem stream mutex poisoned")
            .take()
            .map(StorageError::new)
    }
}

impl LogStream for MemStream {
    fn epoch(&self) -> Epoch {
        self.epoch.load(Ordering::SeqCst)
    }

    fn append(
        &self,
        lsn: Lsn,
        buffer: &WriteBuffer,
        ts: LogTimestamp,
    ) -> Result<(), StorageError> {
        if let Some(err) = self.take_injected_failure() {
            return Err(err);
        }
        self.record(StreamEvent::Append {
            lsn,
            len: buffer.len(),
            ts,
        });
        Ok(())
    }

    fn append_batch(
        &self,
        lsns: &[Lsn],
        buffers: &[WriteBuffer],
        timestamps: &[LogTimestamp],
    ) -> Result<(), StorageError> {
        if let Some(err) = self.take_injected_failure() {
            return Err(err);
        }
        self.record(StreamEvent::AppendBatch {
            lsns: lsns.to_vec(),
            lens: buffers.iter().map(WriteBuffer::len).collect(),
            timestamps: timestamps.to_vec(),
        });
        Ok(())
    }

    fn advance_durable_point(&self, end_lsn: Lsn) -> Result<(), StorageError> {
        self.durable_point.fetch_max(end_lsn, Ordering::SeqCst);
        self.record(StreamEvent::Advance(end_lsn));
        Ok(())
    }

    fn truncate(&self, new_end_lsn: Lsn) -> Result<(), StorageError> {
        self.record(StreamEvent::Truncate(new_end_lsn));
        Ok(())
    }

    fn append_meta(&self, bytes: &[u8]) -> Result<(), StorageError> {
        if let Some(err) = self.take_injected_failure() {
            return Err(err);
        }
        self.record(StreamEvent::AppendMeta(bytes.len()));
        Ok(())
    }

    fn truncate_prefix_blocks(&self, boundary_lsn: Lsn) -> Result<(), StorageError> {
        self.record(StreamEvent::TruncatePrefix(boundary_lsn));
        Ok(())
    }

    fn on_flush_acknowledged(&self, ctx: FlushLogContext) {
        self.record(StreamEvent::FlushAck(ctx));
    }

    fn on_truncate_acknowledged(&self, ctx: TruncateLogContext) {
        self.record(StreamEvent::TruncateAck(ctx));
    }

    fn on_meta_acknowledged(&self, ctx: FlushMetaContext) {
        self.record(StreamEvent::MetaAck(ctx));
    }

    fn on_prefix_truncated(&self, ctx: TruncatePrefixBlocksContext) {
        self.record(StreamEvent::PrefixAck(ctx));
    }
}

/// In-memory [`StreamDirectory`] over a hash map.
#[derive(Default)]
pub struct MemDirectory {
    streams: Mutex<HashMap<StreamId, Arc<dyn LogStream>>>,
}

impl MemDirectory {
    /// Register a stream under `stream_id`.
    pub fn insert<S: LogStream + 'static>(&self, stream_id: StreamId, stream: Arc<S>) {
        self.streams
            .lock()
            .expect("mem directory mutex poisoned")
            .insert(stream_id, stream);
    }

    /// Tear a stream down; in-flight tasks for it become abandoned.
    pub fn remove(&self, stream_id: StreamId) -> Option<Arc<dyn LogStream>> {
        self.streams
            .lock()
            .expect("mem directory mutex poisoned")
            .remove(&stream_id)
    }
}

impl StreamDirectory for MemDirectory {
    fn resolve(&self, stream_id: StreamId) -> Option<StreamGuard> {
        self.streams
            .lock()
            .expect("mem directory mutex poisoned")
            .get(&stream_id)
            .map(|stream| StreamGuard::new(Arc::clone(stream)))
    }
}
