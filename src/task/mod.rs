//! Single-operation I/O tasks.
//!
//! All four operation kinds share one task shape: an epoch-fenced,
//! use-exactly-once wrapper that applies a storage mutation on the I/O pool
//! and acknowledges it on the callback pool. The vectorized batch flush is
//! a distinct type in [`batch`] since its aggregation semantics differ.

pub(crate) mod batch;
pub(crate) mod ops;

use crate::{
    alloc::Recycle,
    error::{PipelineError, PipelineResult, TaskOutcome},
    metrics::PipelineMetrics,
    observability::{log_error, log_warn},
    stream::{StreamDirectory, StreamGuard},
    types::{Epoch, StreamId},
};

/// Capability implemented by each single-operation kind.
///
/// `apply` runs on the I/O pool and must complete the full storage-side
/// effect; `acknowledge` runs later on the callback pool and is
/// fire-and-forget. Both are called at most once per armed task.
pub(crate) trait Operation: Send + 'static {
    /// Kind tag used in log events.
    const KIND: &'static str;

    /// True when the operation's context and payload are well-formed.
    fn validate(&self) -> bool;

    /// Perform the storage mutation against a live stream.
    fn apply(&mut self, stream: &StreamGuard) -> PipelineResult<()>;

    /// Notify the stream that the mutation reached durability.
    fn acknowledge(&self, stream: &StreamGuard);
}

/// Which phase a fence check is guarding; determines the metric bucket.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Phase {
    /// Write path (`do_task`).
    Io,
    /// Acknowledgment path (`after_consume`).
    Ack,
}

/// Result of resolving a stream under the epoch fence.
pub(crate) enum FenceCheck {
    /// Stream is live and still on the snapshot epoch.
    Live(StreamGuard),
    /// Stream is live but was re-armed since the snapshot was taken.
    Stale {
        /// Epoch observed on the stream.
        current: Epoch,
    },
    /// Stream no longer exists in the directory.
    Gone,
}

/// Resolve `stream_id` and verify the epoch snapshot in one step.
///
/// Both task phases start here; the two calls run on different threads
/// separated by unbounded time, which is why the check happens twice.
pub(crate) fn fenced_resolve(
    directory: &dyn StreamDirectory,
    metrics: &PipelineMetrics,
    kind: &'static str,
    phase: Phase,
    stream_id: StreamId,
    snapshot: Epoch,
) -> FenceCheck {
    let Some(guard) = directory.resolve(stream_id) else {
        log_warn!(
            event = "task_abandoned",
            kind,
            phase = ?phase,
            stream_id,
        );
        metrics.record_abandoned();
        return FenceCheck::Gone;
    };
    let current = guard.epoch();
    if current != snapshot {
        log_warn!(
            event = "stale_task_dropped",
            kind,
            phase = ?phase,
            stream_id,
            snapshot,
            current,
        );
        match phase {
            Phase::Io => metrics.record_stale_io(),
            Phase::Ack => metrics.record_stale_ack(),
        }
        return FenceCheck::Stale { current };
    }
    FenceCheck::Live(guard)
}

struct Armed<O> {
    op: O,
    stream_id: StreamId,
    epoch: Epoch,
}

/// Epoch-fenced wrapper around one [`Operation`].
///
/// Lifecycle: acquired from the arena → `init` → `run_io` on the I/O pool →
/// `run_callback` on the callback pool → dropped back to the arena. A task
/// is used exactly once per arming; re-initializing without `destroy` is an
/// error, and `destroy` is idempotent.
pub(crate) struct IoTask<O> {
    armed: Option<Armed<O>>,
}

impl<O> Default for IoTask<O> {
    fn default() -> Self {
        Self { armed: None }
    }
}

impl<O: Operation> IoTask<O> {
    /// Arm the task with an operation, target stream, and epoch snapshot.
    pub(crate) fn init(
        &mut self,
        op: O,
        stream_id: StreamId,
        epoch: Epoch,
    ) -> PipelineResult<()> {
        if self.armed.is_some() {
            // Caller bug: the previous arming was never consumed.
            log_error!(event = "task_double_init", kind = O::KIND, stream_id);
            return Err(PipelineError::AlreadyInitialized);
        }
        if !op.validate() {
            // `op` drops here, reclaiming any payload it owns.
            return Err(PipelineError::InvalidArgument(O::KIND));
        }
        self.armed = Some(Armed {
            op,
            stream_id,
            epoch,
        });
        Ok(())
    }

    /// True when the task currently holds an armed operation.
    pub(crate) fn is_armed(&self) -> bool {
        self.armed.is_some()
    }

    /// Write phase. Resolves the stream, re-checks the epoch, and applies
    /// the storage mutation.
    ///
    /// Storage rejections are fatal and surface as `Err`; a stale or
    /// vanished stream is a recoverable `Ok` outcome with no side effects.
    /// In every non-`Applied` case the payload is dropped here.
    pub(crate) fn run_io(
        &mut self,
        directory: &dyn StreamDirectory,
        metrics: &PipelineMetrics,
    ) -> PipelineResult<TaskOutcome> {
        let Some(armed) = self.armed.as_mut() else {
            log_error!(event = "task_use_before_init", kind = O::KIND);
            return Err(PipelineError::NotInitialized);
        };
        let guard = match fenced_resolve(
            directory,
            metrics,
            O::KIND,
            Phase::Io,
            armed.stream_id,
            armed.epoch,
        ) {
            FenceCheck::Live(guard) => guard,
            FenceCheck::Stale { current } => {
                let snapshot = armed.epoch;
                self.destroy();
                return Ok(TaskOutcome::Stale { snapshot, current });
            }
            FenceCheck::Gone => {
                self.destroy();
                return Ok(TaskOutcome::Abandoned);
            }
        };
        if let Err(err) = armed.op.apply(&guard) {
            metrics.record_write_failure();
            self.destroy();
            return Err(err);
        }
        metrics.record_applied();
        Ok(TaskOutcome::Applied)
    }

    /// Acknowledgment phase. Re-resolves the stream, re-checks the epoch,
    /// and fires the operation's hook if both still hold.
    ///
    /// The task is consumed either way; the caller's handle drop returns it
    /// to the arena as the very last action.
    pub(crate) fn run_callback(
        &mut self,
        directory: &dyn StreamDirectory,
        metrics: &PipelineMetrics,
    ) -> PipelineResult<TaskOutcome> {
        let Some(armed) = self.armed.take() else {
            log_error!(event = "task_use_before_init", kind = O::KIND);
            return Err(PipelineError::NotInitialized);
        };
        match fenced_resolve(
            directory,
            metrics,
            O::KIND,
            Phase::Ack,
            armed.stream_id,
            armed.epoch,
        ) {
            FenceCheck::Live(guard) => {
                armed.op.acknowledge(&guard);
                metrics.record_ack();
                Ok(TaskOutcome::Applied)
            }
            FenceCheck::Stale { current } => Ok(TaskOutcome::Stale {
                snapshot: armed.epoch,
                current,
            }),
            FenceCheck::Gone => Ok(TaskOutcome::Abandoned),
        }
    }

    /// Drop the armed operation and its payload. Idempotent: a second call
    /// (or a call on a never-armed task) is a no-op.
    pub(crate) fn destroy(&mut self) {
        self.armed = None;
    }
}

impl<O: Operation> Recycle for IoTask<O> {
    fn recycle(&mut self) {
        self.destroy();
    }
}
