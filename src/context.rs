//! Immutable descriptors of the four pipeline operations.
//!
//! A context carries only what is needed to perform an operation and later
//! acknowledge it. Contexts are small `Copy` values; an invalid context is
//! rejected at submission time and never reaches the I/O pool.

use crate::types::{LogTimestamp, Lsn};

/// Descriptor of one pending log flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushLogContext {
    /// LSN at which the write begins.
    pub start_lsn: Lsn,
    /// Total byte length of the write.
    pub len: i64,
    /// Timestamp recorded alongside the log records.
    pub ts: LogTimestamp,
}

impl FlushLogContext {
    /// Build a flush descriptor.
    pub fn new(start_lsn: Lsn, len: i64, ts: LogTimestamp) -> Self {
        Self { start_lsn, len, ts }
    }

    /// LSN one past the last byte of the write.
    pub fn end_lsn(&self) -> Lsn {
        self.start_lsn + self.len
    }

    /// A flush is well-formed when its position and length are non-negative
    /// and it covers at least one byte.
    pub fn is_valid(&self) -> bool {
        self.start_lsn >= 0 && self.len > 0 && self.ts >= 0
    }
}

/// Descriptor of one pending log truncation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TruncateLogContext {
    /// New end of the log; everything past it is cut.
    pub new_end_lsn: Lsn,
}

impl TruncateLogContext {
    /// Build a truncate descriptor.
    pub fn new(new_end_lsn: Lsn) -> Self {
        Self { new_end_lsn }
    }

    /// Well-formed when the new end position is non-negative.
    pub fn is_valid(&self) -> bool {
        self.new_end_lsn >= 0
    }
}

/// Descriptor of one pending metadata flush.
///
/// The payload itself lives in the task; the context only identifies which
/// metadata slot was written so the acknowledgment can name it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushMetaContext {
    /// Opaque identifier of the metadata slot.
    pub slot: i64,
}

impl FlushMetaContext {
    /// Build a meta-flush descriptor.
    pub fn new(slot: i64) -> Self {
        Self { slot }
    }

    /// Well-formed when the slot identifier is non-negative.
    pub fn is_valid(&self) -> bool {
        self.slot >= 0
    }
}

/// Descriptor of one pending prefix-block reclamation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TruncatePrefixBlocksContext {
    /// On-disk blocks wholly below this LSN may be reclaimed.
    pub boundary_lsn: Lsn,
}

impl TruncatePrefixBlocksContext {
    /// Build a prefix-truncate descriptor.
    pub fn new(boundary_lsn: Lsn) -> Self {
        Self { boundary_lsn }
    }

    /// Well-formed when the boundary is non-negative.
    pub fn is_valid(&self) -> bool {
        self.boundary_lsn >= 0
    }
}
