//! Pipeline wiring and the producer-facing API.

use std::{sync::Arc, time::Duration};

use crate::{
    alloc::{Pooled, TaskArena},
    buffer::WriteBuffer,
    context::{
        FlushLogContext, FlushMetaContext, TruncateLogContext, TruncatePrefixBlocksContext,
    },
    error::{PipelineError, PipelineResult},
    executor::{CallbackPool, IoPool, Job},
    metrics::{MetricsSnapshot, PipelineMetrics},
    observability::{log_error, log_warn},
    stream::{StreamDirectory, StreamGuard},
    task::{
        batch::{BatchFlushTask, BatchOutcome},
        fenced_resolve,
        ops::{FlushLogOp, FlushMetaOp, TruncateLogOp, TruncatePrefixBlocksOp},
        FenceCheck, IoTask, Operation, Phase,
    },
    types::{Epoch, LogTimestamp, Lsn, StreamId},
};

/// Configuration for one [`LogPipeline`] instance.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Number of I/O shards (one worker thread, one FIFO queue each).
    pub io_shards: usize,
    /// Number of callback workers draining the shared callback queue.
    pub callback_workers: usize,
    /// Capacity of each bounded queue.
    pub queue_depth: usize,
    /// Fixed sleep between retries when a queue is full.
    pub submit_backoff: Duration,
    /// Idle task objects each arena retains for reuse.
    pub arena_capacity: usize,
    /// Constituent capacity pre-reserved on each batch round.
    pub batch_reserve: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            io_shards: 4,
            callback_workers: 2,
            queue_depth: 1024,
            submit_backoff: Duration::from_millis(5),
            arena_capacity: 256,
            batch_reserve: 64,
        }
    }
}

// Everything an in-flight job needs; shared by value-captured Arc so jobs
// outlive the pipeline handle itself if shutdown races a submission.
struct Shared {
    directory: Arc<dyn StreamDirectory>,
    metrics: Arc<PipelineMetrics>,
    callbacks: CallbackPool,
}

/// The log I/O task pipeline.
///
/// Producers hand it contexts and buffers; it writes them durably on the
/// I/O pool and notifies the stream on the callback pool, fencing every
/// phase against epoch changes. Dropping the pipeline drains both pools.
pub struct LogPipeline {
    shared: Arc<Shared>,
    io: IoPool,
    flush_tasks: Arc<TaskArena<IoTask<FlushLogOp>>>,
    truncate_tasks: Arc<TaskArena<IoTask<TruncateLogOp>>>,
    meta_tasks: Arc<TaskArena<IoTask<FlushMetaOp>>>,
    prefix_tasks: Arc<TaskArena<IoTask<TruncatePrefixBlocksOp>>>,
    batch_tasks: Arc<TaskArena<BatchFlushTask>>,
    batch_reserve: usize,
}

impl LogPipeline {
    /// Spawn both pools and wire them to `directory`.
    pub fn new(directory: Arc<dyn StreamDirectory>, cfg: PipelineConfig) -> Self {
        let metrics = Arc::new(PipelineMetrics::default());
        let io = IoPool::new(
            cfg.io_shards,
            cfg.queue_depth,
            cfg.submit_backoff,
            Arc::clone(&metrics),
        );
        let callbacks = CallbackPool::new(
            cfg.callback_workers,
            cfg.queue_depth,
            cfg.submit_backoff,
            Arc::clone(&metrics),
        );
        Self {
            shared: Arc::new(Shared {
                directory,
                metrics,
                callbacks,
            }),
            io,
            flush_tasks: TaskArena::new(cfg.arena_capacity),
            truncate_tasks: TaskArena::new(cfg.arena_capacity),
            meta_tasks: TaskArena::new(cfg.arena_capacity),
            prefix_tasks: TaskArena::new(cfg.arena_capacity),
            batch_tasks: TaskArena::new(cfg.arena_capacity),
            batch_reserve: cfg.batch_reserve,
        }
    }

    /// Point-in-time copy of the pipeline counters.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.shared.metrics.snapshot()
    }

    /// Queue a durable append of `buffer` at `lsn`.
    pub fn submit_flush(
        &self,
        stream_id: StreamId,
        lsn: Lsn,
        buffer: WriteBuffer,
        ts: LogTimestamp,
    ) -> PipelineResult<()> {
        let epoch = self.snapshot_epoch(stream_id)?;
        let ctx = FlushLogContext::new(lsn, buffer.len() as i64, ts);
        let mut task = self.flush_tasks.acquire();
        task.init(FlushLogOp::new(ctx, buffer), stream_id, epoch)?;
        self.dispatch(stream_id, task)
    }

    /// Queue a truncation of the log back to `new_end_lsn`.
    pub fn submit_truncate(&self, stream_id: StreamId, new_end_lsn: Lsn) -> PipelineResult<()> {
        let epoch = self.snapshot_epoch(stream_id)?;
        let mut task = self.truncate_tasks.acquire();
        task.init(
            TruncateLogOp::new(TruncateLogContext::new(new_end_lsn)),
            stream_id,
            epoch,
        )?;
        self.dispatch(stream_id, task)
    }

    /// Queue a durable write of one metadata blob into `slot`.
    pub fn submit_flush_meta(
        &self,
        stream_id: StreamId,
        slot: i64,
        payload: Vec<u8>,
    ) -> PipelineResult<()> {
        let epoch = self.snapshot_epoch(stream_id)?;
        let mut task = self.meta_tasks.acquire();
        task.init(
            FlushMetaOp::new(FlushMetaContext::new(slot), payload),
            stream_id,
            epoch,
        )?;
        self.dispatch(stream_id, task)
    }

    /// Queue reclamation of on-disk blocks below `boundary_lsn`.
    pub fn submit_truncate_prefix(
        &self,
        stream_id: StreamId,
        boundary_lsn: Lsn,
    ) -> PipelineResult<()> {
        let epoch = self.snapshot_epoch(stream_id)?;
        let mut task = self.prefix_tasks.acquire();
        task.init(
            TruncatePrefixBlocksOp::new(TruncatePrefixBlocksContext::new(boundary_lsn)),
            stream_id,
            epoch,
        )?;
        self.dispatch(stream_id, task)
    }

    /// Start a vectorized flush round for `stream_id`.
    pub fn batch(&self, stream_id: StreamId) -> PipelineResult<BatchBuilder<'_>> {
        let guard = self
            .shared
            .directory
            .resolve(stream_id)
            .ok_or(PipelineError::StreamNotFound(stream_id))?;
        let mut batch = self.batch_tasks.acquire();
        batch.ensure_capacity(self.batch_reserve);
        Ok(BatchBuilder {
            pipeline: self,
            stream_id,
            guard,
            batch,
        })
    }

    /// Stop accepting work and drain both pools: queued writes complete,
    /// then their callbacks run.
    pub fn shutdown(&mut self) {
        self.io.shutdown();
        self.shared.callbacks.shutdown();
    }

    fn snapshot_epoch(&self, stream_id: StreamId) -> PipelineResult<Epoch> {
        let guard = self
            .shared
            .directory
            .resolve(stream_id)
            .ok_or(PipelineError::StreamNotFound(stream_id))?;
        Ok(guard.epoch())
    }

    fn dispatch<O: Operation>(
        &self,
        stream_id: StreamId,
        task: Pooled<IoTask<O>>,
    ) -> PipelineResult<()> {
        let shared = Arc::clone(&self.shared);
        self.io
            .submit(stream_id, Box::new(move || execute_task(&shared, task)))
    }
}

impl Drop for LogPipeline {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Stages flush entries for one stream and submits them as a single
/// vectorized write.
///
/// Obtained from [`LogPipeline::batch`]; the held guard keeps the stream
/// alive while entries are staged. Dropping the builder without calling
/// [`BatchBuilder::finalize`] discards the round.
pub struct BatchBuilder<'a> {
    pipeline: &'a LogPipeline,
    stream_id: StreamId,
    guard: StreamGuard,
    batch: Pooled<BatchFlushTask>,
}

impl BatchBuilder<'_> {
    /// Stage one flush entry. The epoch snapshot is taken per entry.
    pub fn push(&mut self, lsn: Lsn, buffer: WriteBuffer, ts: LogTimestamp) -> PipelineResult<()> {
        let ctx = FlushLogContext::new(lsn, buffer.len() as i64, ts);
        if !ctx.is_valid() || !buffer.is_valid() {
            return Err(PipelineError::InvalidArgument("flush_log"));
        }
        self.batch
            .push_back(self.stream_id, ctx, buffer, self.guard.epoch())
    }

    /// Number of staged entries.
    pub fn len(&self) -> usize {
        self.batch.len()
    }

    /// True when nothing has been staged.
    pub fn is_empty(&self) -> bool {
        self.batch.is_empty()
    }

    /// Submit the staged entries as one batch task. A round with no
    /// entries is a no-op.
    pub fn finalize(self) -> PipelineResult<()> {
        let BatchBuilder {
            pipeline,
            stream_id,
            guard: _guard,
            batch,
        } = self;
        if batch.is_empty() {
            return Ok(());
        }
        let shared = Arc::clone(&pipeline.shared);
        pipeline
            .io
            .submit(stream_id, Box::new(move || execute_batch(&shared, batch)))
    }
}

fn execute_task<O: Operation>(shared: &Arc<Shared>, mut task: Pooled<IoTask<O>>) {
    use crate::error::TaskOutcome;

    match task.run_io(shared.directory.as_ref(), &shared.metrics) {
        Ok(TaskOutcome::Applied) => {
            let shared_cb = Arc::clone(shared);
            let job: Job = Box::new(move || {
                let mut task = task;
                if let Err(err) =
                    task.run_callback(shared_cb.directory.as_ref(), &shared_cb.metrics)
                {
                    log_error!(event = "callback_failed", kind = O::KIND, error = %err);
                }
                // The task handle drops here, returning it to its arena as
                // the very last action of the callback phase.
            });
            if let Err(err) = shared.callbacks.submit(job) {
                log_warn!(event = "callback_submit_stopped", kind = O::KIND, error = %err);
            }
        }
        Ok(_) => {
            // Stale or abandoned: already logged and counted; the handle
            // drop reclaims the task.
        }
        Err(err) => {
            log_error!(event = "io_task_failed", kind = O::KIND, error = %err);
        }
    }
}

fn execute_batch(shared: &Arc<Shared>, mut batch: Pooled<BatchFlushTask>) {
    match batch.run_io(shared.directory.as_ref(), &shared.metrics) {
        Ok(BatchOutcome::Applied {
            stream_id,
            epoch,
            acked,
        }) => {
            for ctx in acked {
                let shared_cb = Arc::clone(shared);
                let job: Job = Box::new(move || {
                    acknowledge_flush(&shared_cb, stream_id, epoch, ctx);
                });
                if let Err(err) = shared.callbacks.submit(job) {
                    log_warn!(
                        event = "callback_submit_stopped",
                        kind = "batch_flush",
                        error = %err,
                    );
                    break;
                }
            }
        }
        Ok(BatchOutcome::NothingSurvived) | Ok(BatchOutcome::Abandoned) => {}
        Err(err) => {
            log_error!(event = "batch_flush_failed", error = %err);
        }
    }
}

// Acknowledgment phase of one batch constituent; mirrors
// `IoTask::run_callback` for the standalone flush task.
fn acknowledge_flush(shared: &Shared, stream_id: StreamId, epoch: Epoch, ctx: FlushLogContext) {
    if let FenceCheck::Live(guard) = fenced_resolve(
        shared.directory.as_ref(),
        &shared.metrics,
        "batch_flush",
        Phase::Ack,
        stream_id,
        epoch,
    ) {
        guard.on_flush_acknowledged(ctx);
        shared.metrics.record_ack();
    }
}
