//! External-collaborator interfaces: the log stream and its directory.
//!
//! The pipeline never owns a stream. It resolves a [`StreamGuard`] from the
//! [`StreamDirectory`] for the duration of each call, so a stream being
//! torn down concurrently stays alive until the guard drops.

use std::{fmt, ops::Deref, sync::Arc};

use crate::{
    buffer::WriteBuffer,
    context::{
        FlushLogContext, FlushMetaContext, TruncateLogContext, TruncatePrefixBlocksContext,
    },
    error::StorageError,
    types::{Epoch, LogTimestamp, Lsn, StreamId},
};

/// Entry points the pipeline calls on one replicated log stream.
///
/// Implementations carry their own internal synchronization; the pipeline's
/// only obligation is to hold a live [`StreamGuard`] for the duration of
/// each call. The `on_*` hooks are fire-and-forget notifications invoked
/// from the callback pool.
pub trait LogStream: Send + Sync {
    /// Current epoch of the stream. Cheap, non-blocking read.
    fn epoch(&self) -> Epoch;

    /// Durably append `buffer` at `lsn`.
    fn append(&self, lsn: Lsn, buffer: &WriteBuffer, ts: LogTimestamp)
        -> Result<(), StorageError>;

    /// Vectorized form of [`LogStream::append`]: one storage call covering
    /// every entry. Slices are parallel and equal-length.
    fn append_batch(
        &self,
        lsns: &[Lsn],
        buffers: &[WriteBuffer],
        timestamps: &[LogTimestamp],
    ) -> Result<(), StorageError>;

    /// Publish that bytes up to `end_lsn` are on disk.
    fn advance_durable_point(&self, end_lsn: Lsn) -> Result<(), StorageError>;

    /// Cut the log back to `new_end_lsn`.
    fn truncate(&self, new_end_lsn: Lsn) -> Result<(), StorageError>;

    /// Durably write a metadata blob.
    fn append_meta(&self, bytes: &[u8]) -> Result<(), StorageError>;

    /// Reclaim on-disk blocks wholly below `boundary_lsn`. Irreversible.
    fn truncate_prefix_blocks(&self, boundary_lsn: Lsn) -> Result<(), StorageError>;

    /// A flush submitted with `ctx` reached durability.
    fn on_flush_acknowledged(&self, ctx: FlushLogContext);

    /// A truncate submitted with `ctx` completed.
    fn on_truncate_acknowledged(&self, ctx: TruncateLogContext);

    /// A metadata flush submitted with `ctx` completed.
    fn on_meta_acknowledged(&self, ctx: FlushMetaContext);

    /// Prefix blocks below `ctx`'s boundary were reclaimed.
    fn on_prefix_truncated(&self, ctx: TruncatePrefixBlocksContext);
}

/// Maps a stream id to its live stream, if any.
pub trait StreamDirectory: Send + Sync {
    /// Resolve `stream_id` to a scoped handle, or `None` when the stream
    /// has been deleted.
    fn resolve(&self, stream_id: StreamId) -> Option<StreamGuard>;
}

/// Scoped, refcounted handle to a live stream.
///
/// Holding the guard keeps the stream alive; dropping it releases the hold.
#[derive(Clone)]
pub struct StreamGuard {
    stream: Arc<dyn LogStream>,
}

impl StreamGuard {
    /// Wrap a shared stream reference.
    pub fn new(stream: Arc<dyn LogStream>) -> Self {
        Self { stream }
    }
}

impl Deref for StreamGuard {
    type Target = dyn LogStream;

    fn deref(&self) -> &Self::Target {
        self.stream.as_ref()
    }
}

impl fmt::Debug for StreamGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamGuard")
            .field("epoch", &self.stream.epoch())
            .finish()
    }
}
