//! Scalar identifiers shared across the pipeline.

/// Log sequence number: a monotonically increasing offset into the
/// append-only log. Negative values are reserved for "unset".
pub type Lsn = i64;

/// Generation counter on a log stream, bumped whenever the stream is
/// re-armed for writing. Used as the fencing token for in-flight tasks.
pub type Epoch = i64;

/// Identifier of one replicated log stream (one log group).
pub type StreamId = u64;

/// Wall-clock timestamp attached to a log record at append time.
pub type LogTimestamp = i64;

/// Sentinel for an unset LSN field.
pub const INVALID_LSN: Lsn = -1;
