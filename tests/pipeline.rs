//! End-to-end pipeline behavior over in-memory streams.

use std::{
    sync::Arc,
    time::Duration,
};

use logpipe::{
    mem::{MemDirectory, MemStream, StreamEvent},
    FlushLogContext, FlushMetaContext, LogPipeline, LogStream, LogTimestamp, Lsn, PipelineConfig,
    StorageError, TruncateLogContext, TruncatePrefixBlocksContext, WriteBuffer,
};

/// Stream whose `append` blocks until released, for pinning an I/O shard
/// while the test rearranges the world behind it.
struct GateStream {
    release: flume::Receiver<()>,
    inner: MemStream,
}

impl GateStream {
    fn new(epoch: i64) -> (Arc<Self>, flume::Sender<()>) {
        let (tx, rx) = flume::bounded(1);
        (
            Arc::new(Self {
                release: rx,
                inner: MemStream::new(epoch),
            }),
            tx,
        )
    }
}

impl LogStream for GateStream {
    fn epoch(&self) -> i64 {
        self.inner.epoch()
    }

    fn append(
        &self,
        lsn: Lsn,
        buffer: &WriteBuffer,
        ts: LogTimestamp,
    ) -> Result<(), StorageError> {
        let _ = self.release.recv();
        self.inner.append(lsn, buffer, ts)
    }

    fn append_batch(
        &self,
        lsns: &[Lsn],
        buffers: &[WriteBuffer],
        timestamps: &[LogTimestamp],
    ) -> Result<(), StorageError> {
        self.inner.append_batch(lsns, buffers, timestamps)
    }

    fn advance_durable_point(&self, end_lsn: Lsn) -> Result<(), StorageError> {
        self.inner.advance_durable_point(end_lsn)
    }

    fn truncate(&self, new_end_lsn: Lsn) -> Result<(), StorageError> {
        self.inner.truncate(new_end_lsn)
    }

    fn append_meta(&self, bytes: &[u8]) -> Result<(), StorageError> {
        self.inner.append_meta(bytes)
    }

    fn truncate_prefix_blocks(&self, boundary_lsn: Lsn) -> Result<(), StorageError> {
        self.inner.truncate_prefix_blocks(boundary_lsn)
    }

    fn on_flush_acknowledged(&self, ctx: FlushLogContext) {
        self.inner.on_flush_acknowledged(ctx);
    }

    fn on_truncate_acknowledged(&self, ctx: TruncateLogContext) {
        self.inner.on_truncate_acknowledged(ctx);
    }

    fn on_meta_acknowledged(&self, ctx: FlushMetaContext) {
        self.inner.on_meta_acknowledged(ctx);
    }

    fn on_prefix_truncated(&self, ctx: TruncatePrefixBlocksContext) {
        self.inner.on_prefix_truncated(ctx);
    }
}

fn single_shard_config() -> PipelineConfig {
    PipelineConfig {
        io_shards: 1,
        callback_workers: 1,
        queue_depth: 256,
        submit_backoff: Duration::from_millis(1),
        ..PipelineConfig::default()
    }
}

fn payload(len: usize) -> WriteBuffer {
    WriteBuffer::from(vec![0xAB; len])
}

// A flush at the live epoch appends, advances the durable point, and
// acknowledges exactly once.
#[test]
fn flush_applies_and_acknowledges_exactly_once() {
    let directory = Arc::new(MemDirectory::default());
    let stream = Arc::new(MemStream::new(1));
    directory.insert(1, Arc::clone(&stream));

    let mut pipeline = LogPipeline::new(directory, single_shard_config());
    pipeline.submit_flush(1, 100, payload(50), 9).expect("submit");
    pipeline.shutdown();

    let events = stream.events();
    let advances = events
        .iter()
        .filter(|e| matches!(e, StreamEvent::Advance(_)))
        .count();
    let acks = events
        .iter()
        .filter(|e| matches!(e, StreamEvent::FlushAck(_)))
        .count();
    assert_eq!(advances, 1);
    assert_eq!(acks, 1);
    assert_eq!(stream.durable_point(), 150);
}

// Tasks for one stream apply in submission order even with many shards.
#[test]
fn writes_to_one_stream_apply_in_submission_order() {
    let directory = Arc::new(MemDirectory::default());
    let stream = Arc::new(MemStream::new(1));
    directory.insert(7, Arc::clone(&stream));

    let cfg = PipelineConfig {
        io_shards: 3,
        ..PipelineConfig::default()
    };
    let mut pipeline = LogPipeline::new(directory, cfg);

    let mut lsn = 0;
    for _ in 0..200 {
        pipeline.submit_flush(7, lsn, payload(8), 0).expect("submit");
        lsn += 8;
    }
    pipeline.shutdown();

    let appended: Vec<Lsn> = stream
        .events()
        .iter()
        .filter_map(|e| match e {
            StreamEvent::Append { lsn, .. } => Some(*lsn),
            _ => None,
        })
        .collect();
    assert_eq!(appended.len(), 200);
    assert!(appended.windows(2).all(|w| w[0] < w[1]));
}

// An epoch bump between submission and execution fences the write out
// entirely.
#[test]
fn epoch_bump_before_execution_drops_the_write() {
    let directory = Arc::new(MemDirectory::default());
    let (gate_stream, gate) = GateStream::new(1);
    let target = Arc::new(MemStream::new(1));
    // Same shard: io_shards = 1.
    directory.insert(2, Arc::clone(&gate_stream));
    directory.insert(1, Arc::clone(&target));

    let mut pipeline = LogPipeline::new(directory, single_shard_config());

    // Pin the shard behind the gated append, then queue the real flush.
    pipeline.submit_flush(2, 0, payload(4), 0).expect("blocker");
    pipeline.submit_flush(1, 100, payload(50), 0).expect("flush");

    // The flush is sitting in the queue with epoch snapshot 1.
    target.bump_epoch();
    gate.send(()).expect("open gate");
    pipeline.shutdown();

    assert!(target.events().is_empty());
    assert_eq!(target.durable_point(), 0);
}

// Stream deletion between submission and execution abandons the task.
#[test]
fn deleted_stream_abandons_queued_tasks() {
    let directory = Arc::new(MemDirectory::default());
    let (gate_stream, gate) = GateStream::new(1);
    let target = Arc::new(MemStream::new(1));
    directory.insert(2, Arc::clone(&gate_stream));
    directory.insert(1, Arc::clone(&target));

    let mut pipeline = LogPipeline::new(Arc::clone(&directory), single_shard_config());
    pipeline.submit_flush(2, 0, payload(4), 0).expect("blocker");
    pipeline.submit_truncate(1, 40).expect("truncate");

    directory.remove(1);
    gate.send(()).expect("open gate");
    pipeline.shutdown();

    assert!(target.events().is_empty());
    assert_eq!(pipeline.metrics().abandoned, 1);
}

// One vectorized write covers the whole batch, the durable
// point advances to the maximum end LSN, and every constituent gets its
// own acknowledgment.
#[test]
fn batch_flush_writes_once_and_acknowledges_each_entry() {
    let directory = Arc::new(MemDirectory::default());
    let stream = Arc::new(MemStream::new(1));
    directory.insert(1, Arc::clone(&stream));

    let mut pipeline = LogPipeline::new(directory, single_shard_config());
    let mut batch = pipeline.batch(1).expect("batch");
    batch.push(0, payload(10), 1).expect("push");
    batch.push(10, payload(20), 2).expect("push");
    batch.push(30, payload(5), 3).expect("push");
    assert_eq!(batch.len(), 3);
    batch.finalize().expect("finalize");
    pipeline.shutdown();

    let events = stream.events();
    assert_eq!(
        events[0],
        StreamEvent::AppendBatch {
            lsns: vec![0, 10, 30],
            lens: vec![10, 20, 5],
            timestamps: vec![1, 2, 3],
        }
    );
    assert_eq!(events[1], StreamEvent::Advance(35));
    let acks = events
        .iter()
        .filter(|e| matches!(e, StreamEvent::FlushAck(_)))
        .count();
    assert_eq!(acks, 3);
    assert_eq!(stream.durable_point(), 35);
    assert_eq!(pipeline.metrics().batch_rounds, 1);
    assert_eq!(pipeline.metrics().batch_entries_written, 3);
    assert_eq!(pipeline.metrics().applied, 3);
}

// A failed vectorized write acknowledges nothing.
#[test]
fn failed_batch_write_acknowledges_nothing() {
    let directory = Arc::new(MemDirectory::default());
    let stream = Arc::new(MemStream::new(1));
    stream.fail_next_append("simulated media error");
    directory.insert(1, Arc::clone(&stream));

    let mut pipeline = LogPipeline::new(directory, single_shard_config());
    let mut batch = pipeline.batch(1).expect("batch");
    for lsn in [0, 4, 8] {
        batch.push(lsn, payload(4), 0).expect("push");
    }
    batch.finalize().expect("finalize");
    pipeline.shutdown();

    let events = stream.events();
    assert!(!events.iter().any(|e| matches!(e, StreamEvent::FlushAck(_))));
    assert!(!events.iter().any(|e| matches!(e, StreamEvent::Advance(_))));
    assert_eq!(pipeline.metrics().write_failures, 1);
    assert_eq!(pipeline.metrics().acks_fired, 0);
}

// Prefix-block reclamation armed under an old epoch never
// reaches the stream.
#[test]
fn stale_prefix_truncate_never_reclaims() {
    let directory = Arc::new(MemDirectory::default());
    let (gate_stream, gate) = GateStream::new(1);
    let target = Arc::new(MemStream::new(1));
    directory.insert(2, Arc::clone(&gate_stream));
    directory.insert(1, Arc::clone(&target));

    let mut pipeline = LogPipeline::new(directory, single_shard_config());
    pipeline.submit_flush(2, 0, payload(4), 0).expect("blocker");
    pipeline.submit_truncate_prefix(1, 1000).expect("submit");

    target.bump_epoch();
    gate.send(()).expect("open gate");
    pipeline.shutdown();

    assert!(!target
        .events()
        .iter()
        .any(|e| matches!(e, StreamEvent::TruncatePrefix(_))));
    assert_eq!(pipeline.metrics().stale_dropped_io, 1);
}

// Truncate and meta flush ride the same two-phase path.
#[test]
fn truncate_and_meta_flush_round_trip() {
    let directory = Arc::new(MemDirectory::default());
    let stream = Arc::new(MemStream::new(1));
    directory.insert(1, Arc::clone(&stream));

    let mut pipeline = LogPipeline::new(directory, single_shard_config());
    pipeline.submit_truncate(1, 64).expect("truncate");
    pipeline
        .submit_flush_meta(1, 3, b"snapshot-meta".to_vec())
        .expect("meta");
    pipeline.shutdown();

    let events = stream.events();
    assert!(events.contains(&StreamEvent::Truncate(64)));
    assert!(events.contains(&StreamEvent::AppendMeta(13)));
    assert!(events.contains(&StreamEvent::TruncateAck(TruncateLogContext::new(64))));
    assert!(events.contains(&StreamEvent::MetaAck(FlushMetaContext::new(3))));
}

// Randomized interleaving across streams with occasional epoch bumps:
// per-stream LSNs stay strictly increasing and acknowledgments never
// exceed applied writes.
#[test]
fn randomized_multi_stream_interleaving_keeps_per_stream_order() {
    let directory = Arc::new(MemDirectory::default());
    let streams: Vec<Arc<MemStream>> = (0..4).map(|_| Arc::new(MemStream::new(1))).collect();
    for (id, stream) in streams.iter().enumerate() {
        directory.insert(id as u64, Arc::clone(stream));
    }

    let mut pipeline = LogPipeline::new(directory, PipelineConfig::default());
    fastrand::seed(0x7a51);

    let mut next_lsn = [0i64; 4];
    for _ in 0..500 {
        let id = fastrand::usize(..4);
        let stream = &streams[id];
        if fastrand::u8(..) < 16 {
            stream.bump_epoch();
            continue;
        }
        let len = fastrand::i64(1..64);
        pipeline
            .submit_flush(id as u64, next_lsn[id], payload(len as usize), 0)
            .expect("submit");
        next_lsn[id] += len;
    }
    pipeline.shutdown();

    for stream in &streams {
        let appended: Vec<Lsn> = stream
            .events()
            .iter()
            .filter_map(|e| match e {
                StreamEvent::Append { lsn, .. } => Some(*lsn),
                _ => None,
            })
            .collect();
        assert!(appended.windows(2).all(|w| w[0] < w[1]));
    }
    let snap = pipeline.metrics();
    assert!(snap.acks_fired <= snap.applied);
}
