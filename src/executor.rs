//! The two fixed thread pools driving the pipeline.
//!
//! The I/O pool is sharded by stream id: each shard is one worker thread
//! draining one bounded queue, so tasks for the same stream execute in
//! submission order. The callback pool is a single shared queue drained by
//! several workers; it carries no ordering guarantee.
//!
//! Submission retries on a full queue with a fixed backoff sleep and stops
//! immediately when the pool is shutting down.

use std::{
    sync::{Arc, Mutex},
    thread::{self, JoinHandle},
    time::Duration,
};

use flume::{Receiver, SendTimeoutError, Sender};

use crate::{
    error::{PipelineError, PipelineResult},
    metrics::PipelineMetrics,
    observability::{log_debug, log_info, log_warn},
    types::StreamId,
};

/// Unit of work executed by a pool worker.
pub(crate) type Job = Box<dyn FnOnce() + Send + 'static>;

fn worker_loop(rx: Receiver<Job>) {
    while let Ok(job) = rx.recv() {
        job();
    }
}

fn submit_with_retry(
    tx: &Sender<Job>,
    mut job: Job,
    backoff: Duration,
    pool: &'static str,
    metrics: &PipelineMetrics,
) -> PipelineResult<()> {
    loop {
        match tx.send_timeout(job, backoff) {
            Ok(()) => return Ok(()),
            Err(SendTimeoutError::Timeout(returned)) => {
                job = returned;
                metrics.record_submit_retry();
                log_debug!(event = "queue_full_retry", pool);
            }
            Err(SendTimeoutError::Disconnected(_)) => {
                log_warn!(event = "pool_shutting_down", pool);
                return Err(PipelineError::ShuttingDown);
            }
        }
    }
}

/// Executes `do_task` phases; FIFO per stream shard.
pub(crate) struct IoPool {
    shards: Vec<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
    backoff: Duration,
    metrics: Arc<PipelineMetrics>,
}

impl IoPool {
    /// Spawn `shards` worker threads, each with a queue of `queue_depth`.
    pub(crate) fn new(
        shards: usize,
        queue_depth: usize,
        backoff: Duration,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        let shards = shards.max(1);
        let mut senders = Vec::with_capacity(shards);
        let mut workers = Vec::with_capacity(shards);
        for index in 0..shards {
            let (tx, rx) = flume::bounded(queue_depth.max(1));
            senders.push(tx);
            let handle = thread::Builder::new()
                .name(format!("logpipe-io-{index}"))
                .spawn(move || worker_loop(rx))
                .expect("spawn io worker");
            workers.push(handle);
        }
        log_info!(event = "io_pool_started", shards, queue_depth);
        Self {
            shards: senders,
            workers,
            backoff,
            metrics,
        }
    }

    /// Enqueue a job on the shard owning `stream_id`.
    pub(crate) fn submit(&self, stream_id: StreamId, job: Job) -> PipelineResult<()> {
        if self.shards.is_empty() {
            log_warn!(event = "pool_shutting_down", pool = "io");
            return Err(PipelineError::ShuttingDown);
        }
        let shard = (stream_id as usize) % self.shards.len();
        submit_with_retry(&self.shards[shard], job, self.backoff, "io", &self.metrics)
    }

    /// Stop accepting work and join every worker once its queue drains.
    pub(crate) fn shutdown(&mut self) {
        self.shards.clear();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

/// Executes `after_consume` phases; decoupled from the write path.
pub(crate) struct CallbackPool {
    // Option so shutdown can drop the last sender while the pool sits
    // behind an Arc shared with in-flight I/O jobs.
    tx: Mutex<Option<Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    backoff: Duration,
    metrics: Arc<PipelineMetrics>,
}

impl CallbackPool {
    /// Spawn `workers` threads draining one shared queue of `queue_depth`.
    pub(crate) fn new(
        workers: usize,
        queue_depth: usize,
        backoff: Duration,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        let (tx, rx) = flume::bounded(queue_depth.max(1));
        let mut handles = Vec::with_capacity(workers.max(1));
        for index in 0..workers.max(1) {
            let rx = rx.clone();
            let handle = thread::Builder::new()
                .name(format!("logpipe-cb-{index}"))
                .spawn(move || worker_loop(rx))
                .expect("spawn callback worker");
            handles.push(handle);
        }
        log_info!(event = "callback_pool_started", workers, queue_depth);
        Self {
            tx: Mutex::new(Some(tx)),
            workers: Mutex::new(handles),
            backoff,
            metrics,
        }
    }

    /// Enqueue an acknowledgment job.
    pub(crate) fn submit(&self, job: Job) -> PipelineResult<()> {
        let tx = self
            .tx
            .lock()
            .expect("callback sender mutex poisoned")
            .clone();
        match tx {
            Some(tx) => submit_with_retry(&tx, job, self.backoff, "callback", &self.metrics),
            None => {
                log_warn!(event = "pool_shutting_down", pool = "callback");
                Err(PipelineError::ShuttingDown)
            }
        }
    }

    /// Stop accepting work and join every worker once the queue drains.
    pub(crate) fn shutdown(&self) {
        self.tx
            .lock()
            .expect("callback sender mutex poisoned")
            .take();
        let mut workers = self.workers.lock().expect("callback worker mutex poisoned");
        for handle in workers.drain(..) {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn io_pool_runs_jobs_in_submission_order_per_stream() {
        let metrics = Arc::new(PipelineMetrics::default());
        let mut pool = IoPool::new(2, 64, Duration::from_millis(1), Arc::clone(&metrics));

        let order = Arc::new(Mutex::new(Vec::new()));
        for n in 0..32u64 {
            let order = Arc::clone(&order);
            pool.submit(7, Box::new(move || order.lock().unwrap().push(n)))
                .expect("submit");
        }
        pool.shutdown();

        let seen = order.lock().unwrap().clone();
        assert_eq!(seen, (0..32).collect::<Vec<_>>());
    }

    #[test]
    fn full_queue_retries_until_drained() {
        let metrics = Arc::new(PipelineMetrics::default());
        let mut pool = IoPool::new(1, 1, Duration::from_millis(1), Arc::clone(&metrics));

        // Park the single worker until the gate channel yields.
        let (gate_tx, gate_rx) = flume::bounded::<()>(1);
        pool.submit(
            0,
            Box::new(move || {
                let _ = gate_rx.recv();
            }),
        )
        .expect("blocker");

        // Fill the depth-1 queue, then submit one more from a side thread;
        // it has to spin on the backoff until the gate opens.
        pool.submit(0, Box::new(|| {})).expect("filler");
        let ran = Arc::new(AtomicUsize::new(0));
        let submitter = {
            let ran = Arc::clone(&ran);
            let tx = pool.shards[0].clone();
            let metrics = Arc::clone(&metrics);
            thread::spawn(move || {
                submit_with_retry(
                    &tx,
                    Box::new(move || {
                        ran.fetch_add(1, Ordering::SeqCst);
                    }),
                    Duration::from_millis(1),
                    "io",
                    &metrics,
                )
            })
        };

        thread::sleep(Duration::from_millis(20));
        gate_tx.send(()).expect("open gate");
        submitter.join().expect("join submitter").expect("submit");
        pool.shutdown();

        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert!(metrics.snapshot().submit_retries >= 1);
    }

    #[test]
    fn callback_pool_rejects_after_shutdown() {
        let metrics = Arc::new(PipelineMetrics::default());
        let pool = CallbackPool::new(2, 8, Duration::from_millis(1), metrics);
        pool.shutdown();
        let err = pool.submit(Box::new(|| {})).unwrap_err();
        assert!(matches!(err, PipelineError::ShuttingDown));
    }
}
