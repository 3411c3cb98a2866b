//! Segmented write-buffer descriptor handed to flush tasks.

use bytes::Bytes;

/// An opaque, segmented byte-buffer descriptor.
///
/// Segments are reference-counted [`Bytes`] slices, so cloning the
/// descriptor never copies payload bytes. A flush task holds the only
/// pipeline-side reference to its buffer from submission until its
/// callback completes; the backing memory is released when the last
/// handle drops.
#[derive(Debug, Clone, Default)]
pub struct WriteBuffer {
    segments: Vec<Bytes>,
    len: usize,
}

impl WriteBuffer {
    /// Build a buffer from a single contiguous segment.
    pub fn from_bytes(bytes: Bytes) -> Self {
        let len = bytes.len();
        Self {
            segments: vec![bytes],
            len,
        }
    }

    /// Build a buffer from pre-split segments.
    pub fn from_segments(segments: Vec<Bytes>) -> Self {
        let len = segments.iter().map(Bytes::len).sum();
        Self { segments, len }
    }

    /// Append another segment to the descriptor.
    pub fn push_segment(&mut self, segment: Bytes) {
        self.len += segment.len();
        self.segments.push(segment);
    }

    /// Total byte length across all segments.
    pub fn len(&self) -> usize {
        self.len
    }

    /// True when the buffer carries no bytes.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// A buffer is valid for submission when it carries at least one byte.
    pub fn is_valid(&self) -> bool {
        !self.is_empty()
    }

    /// The underlying segments, in write order.
    pub fn segments(&self) -> &[Bytes] {
        &self.segments
    }
}

impl From<Vec<u8>> for WriteBuffer {
    fn from(bytes: Vec<u8>) -> Self {
        Self::from_bytes(Bytes::from(bytes))
    }
}

impl From<&'static [u8]> for WriteBuffer {
    fn from(bytes: &'static [u8]) -> Self {
        Self::from_bytes(Bytes::from_static(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_spans_segments() {
        let mut buf = WriteBuffer::from_bytes(Bytes::from_static(b"hello"));
        buf.push_segment(Bytes::from_static(b" world"));
        assert_eq!(buf.len(), 11);
        assert_eq!(buf.segments().len(), 2);
        assert!(buf.is_valid());
    }

    #[test]
    fn empty_buffer_is_invalid() {
        let buf = WriteBuffer::default();
        assert!(buf.is_empty());
        assert!(!buf.is_valid());
    }

    #[test]
    fn clone_is_shallow() {
        let buf = WriteBuffer::from(vec![1u8, 2, 3]);
        let cloned = buf.clone();
        // Same backing memory, not a copy.
        assert_eq!(
            buf.segments()[0].as_ptr(),
            cloned.segments()[0].as_ptr()
        );
    }
}
