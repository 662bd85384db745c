//! Stream framing: raw chunks in, complete frames out

pub mod accumulator;
pub mod chunk;
pub mod decoder;
pub mod framing;

pub use accumulator::{ChunkAccumulator, Frame, PendingFrame};
pub use chunk::{ChunkOrder, RawChunk, StreamSource};
pub use decoder::{Decoded, DecoderOptions, StreamDecoder, DEFAULT_MAX_FRAME_BYTES};
pub use framing::{DetectionWindow, FramingDetector, FramingMode};
