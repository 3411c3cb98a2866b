//! The four single-operation kinds.

use crate::{
    buffer::WriteBuffer,
    context::{
        FlushLogContext, FlushMetaContext, TruncateLogContext, TruncatePrefixBlocksContext,
    },
    error::PipelineResult,
    stream::StreamGuard,
    task::Operation,
};

/// Appends a write buffer at a fixed LSN and advances the durable point.
pub(crate) struct FlushLogOp {
    ctx: FlushLogContext,
    buffer: WriteBuffer,
}

impl FlushLogOp {
    /// Pair a flush context with the buffer it describes.
    pub(crate) fn new(ctx: FlushLogContext, buffer: WriteBuffer) -> Self {
        Self { ctx, buffer }
    }
}

impl Operation for FlushLogOp {
    const KIND: &'static str = "flush_log";

    fn validate(&self) -> bool {
        self.ctx.is_valid()
            && self.buffer.is_valid()
            && self.buffer.len() as i64 == self.ctx.len
    }

    fn apply(&mut self, stream: &StreamGuard) -> PipelineResult<()> {
        stream.append(self.ctx.start_lsn, &self.buffer, self.ctx.ts)?;
        // Readers treat the durable point as a promise that bytes up to it
        // are on disk; it must move only after the append succeeded.
        stream.advance_durable_point(self.ctx.end_lsn())?;
        Ok(())
    }

    fn acknowledge(&self, stream: &StreamGuard) {
        stream.on_flush_acknowledged(self.ctx);
    }
}

/// Cuts the log back to a fixed LSN.
pub(crate) struct TruncateLogOp {
    ctx: TruncateLogContext,
}

impl TruncateLogOp {
    /// Wrap a truncate context.
    pub(crate) fn new(ctx: TruncateLogContext) -> Self {
        Self { ctx }
    }
}

impl Operation for TruncateLogOp {
    const KIND: &'static str = "truncate_log";

    fn validate(&self) -> bool {
        self.ctx.is_valid()
    }

    fn apply(&mut self, stream: &StreamGuard) -> PipelineResult<()> {
        stream.truncate(self.ctx.new_end_lsn)?;
        Ok(())
    }

    fn acknowledge(&self, stream: &StreamGuard) {
        stream.on_truncate_acknowledged(self.ctx);
    }
}

/// Writes one owned metadata blob.
pub(crate) struct FlushMetaOp {
    ctx: FlushMetaContext,
    payload: Vec<u8>,
}

impl FlushMetaOp {
    /// Pair a meta context with the bytes to persist. The task owns the
    /// payload; it is freed exactly once when the task is destroyed.
    pub(crate) fn new(ctx: FlushMetaContext, payload: Vec<u8>) -> Self {
        Self { ctx, payload }
    }
}

impl Operation for FlushMetaOp {
    const KIND: &'static str = "flush_meta";

    fn validate(&self) -> bool {
        self.ctx.is_valid() && !self.payload.is_empty()
    }

    fn apply(&mut self, stream: &StreamGuard) -> PipelineResult<()> {
        stream.append_meta(&self.payload)?;
        Ok(())
    }

    fn acknowledge(&self, stream: &StreamGuard) {
        stream.on_meta_acknowledged(self.ctx);
    }
}

/// Reclaims on-disk blocks below a boundary LSN.
pub(crate) struct TruncatePrefixBlocksOp {
    ctx: TruncatePrefixBlocksContext,
}

impl TruncatePrefixBlocksOp {
    /// Wrap a prefix-truncate context.
    pub(crate) fn new(ctx: TruncatePrefixBlocksContext) -> Self {
        Self { ctx }
    }
}

impl Operation for TruncatePrefixBlocksOp {
    const KIND: &'static str = "truncate_prefix_blocks";

    fn validate(&self) -> bool {
        self.ctx.is_valid()
    }

    fn apply(&mut self, stream: &StreamGuard) -> PipelineResult<()> {
        // Block reclamation is not reversible; the epoch fence upstream is
        // the only thing standing between this call and a newer epoch's
        // still-needed blocks.
        stream.truncate_prefix_blocks(self.ctx.boundary_lsn)?;
        Ok(())
    }

    fn acknowledge(&self, stream: &StreamGuard) {
        stream.on_prefix_truncated(self.ctx);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::mem::{MemStream, StreamEvent};

    fn guard(stream: &Arc<MemStream>) -> StreamGuard {
        StreamGuard::new(Arc::clone(stream) as _)
    }

    #[test]
    fn flush_appends_then_advances_durable_point() {
        let stream = Arc::new(MemStream::new(1));
        let mut op = FlushLogOp::new(
            FlushLogContext::new(100, 5, 7),
            WriteBuffer::from(vec![0u8; 5]),
        );
        op.apply(&guard(&stream)).expect("apply");

        assert_eq!(
            stream.events(),
            vec![
                StreamEvent::Append {
                    lsn: 100,
                    len: 5,
                    ts: 7
                },
                StreamEvent::Advance(105),
            ]
        );
        assert_eq!(stream.durable_point(), 105);
    }

    #[test]
    fn flush_validate_requires_len_match() {
        let op = FlushLogOp::new(
            FlushLogContext::new(100, 5, 7),
            WriteBuffer::from(vec![0u8; 4]),
        );
        assert!(!op.validate());
    }

    #[test]
    fn flush_does_not_advance_on_append_failure() {
        let stream = Arc::new(MemStream::new(1));
        stream.fail_next_append("disk gone");
        let mut op = FlushLogOp::new(
            FlushLogContext::new(0, 3, 1),
            WriteBuffer::from(vec![1u8, 2, 3]),
        );
        op.apply(&guard(&stream)).unwrap_err();
        assert!(!stream
            .events()
            .iter()
            .any(|e| matches!(e, StreamEvent::Advance(_))));
    }

    #[test]
    fn meta_op_requires_payload() {
        assert!(!FlushMetaOp::new(FlushMetaContext::new(0), Vec::new()).validate());
        assert!(FlushMetaOp::new(FlushMetaContext::new(0), vec![1]).validate());
    }

    #[test]
    fn prefix_truncate_reaches_the_stream() {
        let stream = Arc::new(MemStream::new(1));
        let mut op = TruncatePrefixBlocksOp::new(TruncatePrefixBlocksContext::new(1000));
        op.apply(&guard(&stream)).expect("apply");
        assert_eq!(stream.events(), vec![StreamEvent::TruncatePrefix(1000)]);
    }
}
