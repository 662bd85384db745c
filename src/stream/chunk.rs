//! Raw output fragments read from a supervised process

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Which pipe a fragment came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamSource {
    Stdout,
    Stderr,
}

impl StreamSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamSource::Stdout => "stdout",
            StreamSource::Stderr => "stderr",
        }
    }
}

impl fmt::Display for StreamSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An immutable fragment of process output, tagged with arrival order.
///
/// Produced by a stream reader and consumed exactly once by a decoder, so it
/// is passed by value and never cloned on the hot path.
#[derive(Debug, PartialEq, Eq)]
pub struct RawChunk {
    order: u64,
    source: StreamSource,
    bytes: Vec<u8>,
}

impl RawChunk {
    pub fn new(order: u64, source: StreamSource, bytes: Vec<u8>) -> Self {
        Self {
            order,
            source,
            bytes,
        }
    }

    pub fn order(&self) -> u64 {
        self.order
    }

    pub fn source(&self) -> StreamSource {
        self.source
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// Arrival counter shared by the stdout and stderr readers of one session
#[derive(Debug, Clone, Default)]
pub struct ChunkOrder(Arc<AtomicU64>);

impl ChunkOrder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tag a fragment with the next arrival number
    pub fn tag(&self, source: StreamSource, bytes: Vec<u8>) -> RawChunk {
        let order = self.0.fetch_add(1, Ordering::SeqCst);
        RawChunk::new(order, source, bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_order_is_shared_across_clones() {
        let order = ChunkOrder::new();
        let other = order.clone();

        let a = order.tag(StreamSource::Stdout, b"a".to_vec());
        let b = other.tag(StreamSource::Stderr, b"b".to_vec());
        let c = order.tag(StreamSource::Stdout, b"c".to_vec());

        assert_eq!((a.order(), b.order(), c.order()), (0, 1, 2));
        assert_eq!(b.source(), StreamSource::Stderr);
    }

    #[test]
    fn stream_source_serializes_snake_case() {
        let json = serde_json::to_string(&StreamSource::Stderr).unwrap();
        assert_eq!(json, "\"stderr\"");
        assert_eq!(StreamSource::Stdout.to_string(), "stdout");
    }
}
