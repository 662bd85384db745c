//! Unified event schema and the per-provider normalizer

pub mod event;
pub mod normalizer;
pub mod text;

pub use event::{EventKind, Payload, SequenceCounter, UnifiedEvent};
pub use normalizer::EventNormalizer;
