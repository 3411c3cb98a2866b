//! Error types surfaced by the pipeline.

use thiserror::Error;

use crate::types::{Epoch, StreamId};

/// Result type shared across pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Failure reported by a [`crate::stream::LogStream`] implementation.
///
/// The pipeline treats any storage rejection as fatal for the task that
/// triggered it; the message is carried verbatim for diagnostics.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct StorageError(String);

impl StorageError {
    /// Wrap a storage-engine failure message.
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// Errors surfaced by the log I/O pipeline.
#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    /// A task was initialized twice without going through destroy.
    #[error("task is already initialized")]
    AlreadyInitialized,
    /// A task was executed before being initialized.
    #[error("task is not initialized")]
    NotInitialized,
    /// A context or buffer failed validation at submission time.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    /// The target stream is no longer present in the directory.
    #[error("log stream {0} not found")]
    StreamNotFound(StreamId),
    /// The storage engine rejected a write, truncate, or meta append.
    #[error("log stream storage error: {0}")]
    Storage(#[from] StorageError),
    /// The destination pool is shutting down; the submission was dropped.
    #[error("task pool is shutting down")]
    ShuttingDown,
    /// A batch was fed tasks belonging to two different streams.
    #[error("batch holds stream {expected} but was pushed a task for stream {got}")]
    MixedStreamBatch {
        /// Stream id recorded on the batch's first insert.
        expected: StreamId,
        /// Stream id of the offending push.
        got: StreamId,
    },
}

/// Outcome of one task phase, kept distinguishable from errors.
///
/// Stale drops and abandonment are recoverable scheduler-level conditions,
/// not failures; callers that care (metrics, tests) can still tell them
/// apart from a genuine apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    /// The storage mutation (or acknowledgment) was performed.
    Applied,
    /// The epoch snapshot no longer matches the stream; dropped unapplied.
    Stale {
        /// Epoch captured when the task was armed.
        snapshot: Epoch,
        /// Epoch observed at execution time.
        current: Epoch,
    },
    /// The stream vanished from the directory; the operation is moot.
    Abandoned,
}

impl TaskOutcome {
    /// True when the phase actually took effect.
    pub fn is_applied(&self) -> bool {
        matches!(self, TaskOutcome::Applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_error_message_is_preserved() {
        let err = PipelineError::from(StorageError::new("device full"));
        assert_eq!(err.to_string(), "log stream storage error: device full");
    }

    #[test]
    fn mixed_stream_batch_names_both_streams() {
        let err = PipelineError::MixedStreamBatch {
            expected: 3,
            got: 7,
        };
        assert!(err.to_string().contains("stream 3"));
        assert!(err.to_string().contains("stream 7"));
    }
}
