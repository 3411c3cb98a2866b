#![deny(missing_docs)]
//! Log I/O task pipeline for a replicated write-ahead log.
//!
//! The pipeline moves in-memory log records and metadata blobs onto durable
//! storage and notifies the owning stream afterwards, staying correct across
//! leadership changes, stream re-creation, and concurrent truncation.
//!
//! Producers submit four operation kinds (flush, truncate, metadata flush,
//! and prefix-block reclamation) plus vectorized flush batches. Each
//! operation runs in two phases on two fixed thread pools: the write phase
//! on a per-stream-FIFO I/O pool, the acknowledgment phase on a decoupled
//! callback pool. Every phase is fenced by the stream's epoch: a task armed
//! under an older epoch performs no mutation and fires no acknowledgment.
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use logpipe::{
//!     mem::{MemDirectory, MemStream},
//!     LogPipeline, PipelineConfig, WriteBuffer,
//! };
//!
//! let directory = Arc::new(MemDirectory::default());
//! directory.insert(1, Arc::new(MemStream::new(1)));
//!
//! let mut pipeline = LogPipeline::new(directory, PipelineConfig::default());
//! pipeline
//!     .submit_flush(1, 0, WriteBuffer::from(vec![0u8; 64]), 42)
//!     .expect("submit");
//! pipeline.shutdown();
//! ```

mod alloc;
mod buffer;
mod context;
mod error;
mod executor;
mod metrics;
mod observability;
mod pipeline;
mod stream;
mod task;
mod types;

pub mod mem;

pub use buffer::WriteBuffer;
pub use context::{
    FlushLogContext, FlushMetaContext, TruncateLogContext, TruncatePrefixBlocksContext,
};
pub use error::{PipelineError, PipelineResult, StorageError, TaskOutcome};
pub use metrics::{MetricsSnapshot, PipelineMetrics};
pub use pipeline::{BatchBuilder, LogPipeline, PipelineConfig};
pub use stream::{LogStream, StreamDirectory, StreamGuard};
pub use types::{Epoch, LogTimestamp, Lsn, StreamId, INVALID_LSN};
