//! Vectorized flush of many pending writes to one stream.
//!
//! Batching amortizes the storage engine's fixed per-call overhead: one
//! `append_batch` and one durable-point advance cover every constituent
//! that survives the epoch filter. Acknowledgment granularity is
//! unchanged: each survivor still gets its own callback-pool entry.

use crate::{
    alloc::Recycle,
    buffer::WriteBuffer,
    context::FlushLogContext,
    error::{PipelineError, PipelineResult},
    metrics::PipelineMetrics,
    observability::{log_error, log_warn},
    stream::StreamDirectory,
    types::{Epoch, LogTimestamp, Lsn, StreamId, INVALID_LSN},
};

struct BatchEntry {
    ctx: FlushLogContext,
    buffer: WriteBuffer,
    epoch: Epoch,
}

/// Result of one batch round.
#[derive(Debug)]
pub(crate) enum BatchOutcome {
    /// The vectorized write landed; each listed context needs its own
    /// acknowledgment callback.
    Applied {
        /// Stream every constituent belongs to.
        stream_id: StreamId,
        /// Epoch the write was fenced against.
        epoch: Epoch,
        /// Contexts of the constituents that were written.
        acked: Vec<FlushLogContext>,
    },
    /// Every constituent was stale (or the batch was empty); nothing was
    /// written.
    NothingSurvived,
    /// The stream vanished; the whole round is moot.
    Abandoned,
}

/// Aggregates flush entries for one stream into a single vectorized write.
///
/// The batch owns each constituent's operation data outright, so every
/// failure path reclaims buffers by plain drop. `reuse` (run automatically
/// when the arena recycles the batch) clears state while keeping the
/// backing arrays, letting one batch object serve round after round.
#[derive(Default)]
pub(crate) struct BatchFlushTask {
    stream_id: Option<StreamId>,
    entries: Vec<BatchEntry>,
    // Parallel arrays handed to the vectorized storage call; cleared and
    // refilled each round.
    lsns: Vec<Lsn>,
    buffers: Vec<WriteBuffer>,
    timestamps: Vec<LogTimestamp>,
}

impl BatchFlushTask {
    /// Pre-reserve room for `n` constituents.
    pub(crate) fn ensure_capacity(&mut self, n: usize) {
        self.entries.reserve(n);
        self.lsns.reserve(n);
        self.buffers.reserve(n);
        self.timestamps.reserve(n);
    }

    /// Append one constituent flush.
    ///
    /// The first insert pins the batch to that stream; pushing a task for
    /// any other stream is a caller bug and is rejected loudly.
    pub(crate) fn push_back(
        &mut self,
        stream_id: StreamId,
        ctx: FlushLogContext,
        buffer: WriteBuffer,
        epoch: Epoch,
    ) -> PipelineResult<()> {
        match self.stream_id {
            None => self.stream_id = Some(stream_id),
            Some(expected) if expected != stream_id => {
                log_error!(
                    event = "mixed_stream_batch_push",
                    expected,
                    got = stream_id,
                );
                return Err(PipelineError::MixedStreamBatch {
                    expected,
                    got: stream_id,
                });
            }
            Some(_) => {}
        }
        self.entries.push(BatchEntry { ctx, buffer, epoch });
        Ok(())
    }

    /// Number of staged constituents.
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no constituents are staged.
    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Write phase: one resolve, one epoch read, one vectorized write.
    ///
    /// Constituents whose epoch snapshot no longer matches are dropped and
    /// logged; the rest go out in a single `append_batch` followed by a
    /// single durable-point advance to the maximum end LSN. A storage
    /// rejection fails every survivor at once: their buffers are freed
    /// here and no acknowledgment is ever scheduled. The pipeline never
    /// retries a failed round.
    pub(crate) fn run_io(
        &mut self,
        directory: &dyn StreamDirectory,
        metrics: &PipelineMetrics,
    ) -> PipelineResult<BatchOutcome> {
        let Some(stream_id) = self.stream_id else {
            return Ok(BatchOutcome::NothingSurvived);
        };
        let Some(guard) = directory.resolve(stream_id) else {
            log_warn!(event = "batch_abandoned", stream_id, entries = self.entries.len());
            metrics.record_abandoned();
            self.reuse();
            return Ok(BatchOutcome::Abandoned);
        };
        let epoch = guard.epoch();

        self.lsns.clear();
        self.buffers.clear();
        self.timestamps.clear();
        let mut acked = Vec::with_capacity(self.entries.len());
        let mut max_end_lsn = INVALID_LSN;

        for entry in self.entries.drain(..) {
            if entry.epoch != epoch {
                log_warn!(
                    event = "stale_batch_entry_dropped",
                    stream_id,
                    lsn = entry.ctx.start_lsn,
                    snapshot = entry.epoch,
                    current = epoch,
                );
                metrics.record_stale_io();
                // The entry's buffer drops here.
                continue;
            }
            max_end_lsn = max_end_lsn.max(entry.ctx.end_lsn());
            self.lsns.push(entry.ctx.start_lsn);
            self.timestamps.push(entry.ctx.ts);
            self.buffers.push(entry.buffer);
            acked.push(entry.ctx);
        }

        if acked.is_empty() {
            self.reuse();
            return Ok(BatchOutcome::NothingSurvived);
        }

        let write = guard
            .append_batch(&self.lsns, &self.buffers, &self.timestamps)
            .and_then(|()| guard.advance_durable_point(max_end_lsn));
        if let Err(err) = write {
            metrics.record_write_failure();
            // Free every surviving buffer before the error leaves the batch.
            self.reuse();
            return Err(err.into());
        }

        metrics.record_batch_round(acked.len() as u64);
        self.reuse();
        Ok(BatchOutcome::Applied {
            stream_id,
            epoch,
            acked,
        })
    }

    /// Clear constituents and the stream pin, keeping array capacity so the
    /// next round allocates nothing.
    pub(crate) fn reuse(&mut self) {
        self.stream_id = None;
        self.entries.clear();
        self.lsns.clear();
        self.buffers.clear();
        self.timestamps.clear();
    }
}

impl Recycle for BatchFlushTask {
    fn recycle(&mut self) {
        self.reuse();
    }
}
