//! Chunk accumulation for an active capture
//!
//! The capture callback appends raw fragments through a `ChunkSink`; the
//! session seals the sink when the stream is released and takes the ordered
//! `ChunkBuffer` to build the artifact.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

/// Append-only, ordered list of non-empty audio fragments.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ChunkBuffer {
    chunks: Vec<Vec<u8>>,
    total_bytes: usize,
}

impl ChunkBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fragment. Empty fragments are ignored and return `false`.
    pub fn push(&mut self, data: Vec<u8>) -> bool {
        if data.is_empty() {
            return false;
        }
        self.total_bytes += data.len();
        self.chunks.push(data);
        true
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    /// All fragments joined in arrival order.
    pub fn concat(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.total_bytes);
        for chunk in &self.chunks {
            out.extend_from_slice(chunk);
        }
        out
    }
}

impl fmt::Debug for ChunkBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChunkBuffer")
            .field("chunks", &self.chunks.len())
            .field("total_bytes", &self.total_bytes)
            .finish()
    }
}

#[derive(Default)]
struct SinkState {
    buffer: ChunkBuffer,
    sealed: bool,
}

/// Write end of a capture's chunk buffer. Cheap to clone; all clones share
/// the same buffer.
#[derive(Clone, Default)]
pub struct ChunkSink {
    shared: Arc<Mutex<SinkState>>,
}

impl ChunkSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fragment. Returns `false` if it was empty or the sink is sealed.
    pub fn push(&self, data: Vec<u8>) -> bool {
        let mut state = self.shared.lock();
        if state.sealed {
            return false;
        }
        state.buffer.push(data)
    }

    /// Close the sink and take everything appended so far.
    /// Later pushes are dropped; sealing twice yields an empty buffer.
    pub fn seal(&self) -> ChunkBuffer {
        let mut state = self.shared.lock();
        state.sealed = true;
        std::mem::take(&mut state.buffer)
    }
}

impl fmt::Debug for ChunkSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.lock();
        f.debug_struct("ChunkSink")
            .field("buffer", &state.buffer)
            .field("sealed", &state.sealed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_fragments_are_skipped() {
        let mut buffer = ChunkBuffer::new();
        assert!(!buffer.push(Vec::new()));
        assert!(buffer.push(vec![1, 2]));
        assert!(!buffer.push(Vec::new()));
        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer.total_bytes(), 2);
    }

    #[test]
    fn concat_preserves_arrival_order() {
        let mut buffer = ChunkBuffer::new();
        buffer.push(vec![1, 1]);
        buffer.push(vec![2]);
        buffer.push(vec![3, 3, 3]);
        assert_eq!(buffer.concat(), vec![1, 1, 2, 3, 3, 3]);

        let mut reordered = ChunkBuffer::new();
        reordered.push(vec![3, 3, 3]);
        reordered.push(vec![1, 1]);
        reordered.push(vec![2]);
        assert_eq!(reordered.total_bytes(), buffer.total_bytes());
        assert_ne!(reordered.concat(), buffer.concat());
    }

    #[test]
    fn sink_clones_share_one_buffer() {
        let sink = ChunkSink::new();
        let writer = sink.clone();
        writer.push(vec![0u8; 10]);
        writer.push(vec![0u8; 20]);
        sink.push(vec![0u8; 5]);
        let taken = sink.seal();
        assert_eq!(taken.len(), 3);
        assert_eq!(taken.total_bytes(), 35);
    }

    #[test]
    fn sealed_sink_drops_late_fragments() {
        let sink = ChunkSink::new();
        sink.push(b"abc".to_vec());
        let taken = sink.seal();
        assert_eq!(taken.concat(), b"abc".to_vec());

        assert!(!sink.push(b"late".to_vec()));
        assert!(sink.seal().is_empty());
    }
}
