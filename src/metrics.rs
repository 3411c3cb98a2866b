//! Counters exposed to monitoring systems.

use std::sync::atomic::{AtomicU64, Ordering};

/// Collection of pipeline metrics.
///
/// Counters are atomic so I/O workers, callback workers, and producers can
/// record without coordination. [`crate::LogPipeline::metrics`]
/// exposes a point-in-time [`MetricsSnapshot`] of these counters.
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    applied: AtomicU64,
    stale_dropped_io: AtomicU64,
    stale_dropped_ack: AtomicU64,
    abandoned: AtomicU64,
    write_failures: AtomicU64,
    acks_fired: AtomicU64,
    batch_rounds: AtomicU64,
    batch_entries_written: AtomicU64,
    submit_retries: AtomicU64,
}

impl PipelineMetrics {
    /// Record a storage mutation that took effect.
    pub fn record_applied(&self) {
        self.applied.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a task dropped by the write-side epoch guard.
    pub fn record_stale_io(&self) {
        self.stale_dropped_io.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a task dropped by the acknowledgment-side epoch guard.
    pub fn record_stale_ack(&self) {
        self.stale_dropped_ack.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a task abandoned because its stream vanished.
    pub fn record_abandoned(&self) {
        self.abandoned.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a fatal storage rejection.
    pub fn record_write_failure(&self) {
        self.write_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one acknowledgment hook invocation.
    pub fn record_ack(&self) {
        self.acks_fired.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one vectorized batch write with `entries` surviving entries.
    /// Each survivor is a storage mutation that took effect, so `applied`
    /// advances by the same amount.
    pub fn record_batch_round(&self, entries: u64) {
        self.batch_rounds.fetch_add(1, Ordering::Relaxed);
        self.batch_entries_written
            .fetch_add(entries, Ordering::Relaxed);
        self.applied.fetch_add(entries, Ordering::Relaxed);
    }

    /// Record one full-queue retry during submission.
    pub fn record_submit_retry(&self) {
        self.submit_retries.fetch_add(1, Ordering::Relaxed);
    }

    /// Consistent-enough point-in-time copy of every counter.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            applied: self.applied.load(Ordering::Relaxed),
            stale_dropped_io: self.stale_dropped_io.load(Ordering::Relaxed),
            stale_dropped_ack: self.stale_dropped_ack.load(Ordering::Relaxed),
            abandoned: self.abandoned.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
            acks_fired: self.acks_fired.load(Ordering::Relaxed),
            batch_rounds: self.batch_rounds.load(Ordering::Relaxed),
            batch_entries_written: self.batch_entries_written.load(Ordering::Relaxed),
            submit_retries: self.submit_retries.load(Ordering::Relaxed),
        }
    }
}

/// Plain copy of [`PipelineMetrics`] counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Storage mutations that took effect, counting each batch constituent
    /// individually.
    pub applied: u64,
    /// Tasks dropped by the write-side epoch guard.
    pub stale_dropped_io: u64,
    /// Tasks dropped by the acknowledgment-side epoch guard.
    pub stale_dropped_ack: u64,
    /// Tasks abandoned because their stream vanished.
    pub abandoned: u64,
    /// Fatal storage rejections.
    pub write_failures: u64,
    /// Acknowledgment hooks fired.
    pub acks_fired: u64,
    /// Vectorized batch writes issued.
    pub batch_rounds: u64,
    /// Constituents covered by those batch writes.
    pub batch_entries_written: u64,
    /// Full-queue retries during submission.
    pub submit_retries: u64,
}
