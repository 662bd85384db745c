//! Raw chunks in, ordered events out

use std::sync::Arc;

use regex::Regex;

use crate::normalize::{EventNormalizer, SequenceCounter, UnifiedEvent};
use crate::provider::ProviderMapping;
use crate::stream::{Decoded, DecoderOptions, FramingMode, RawChunk, StreamDecoder, StreamSource};

/// Events produced by one step of the pipeline
#[derive(Debug, Default)]
pub struct PipelineOutput {
    /// Set on the step that fixed the stdout framing mode
    pub decided: Option<FramingMode>,
    pub events: Vec<UnifiedEvent>,
}

/// Decoder and normalizer for each stream of one session.
///
/// Stdout framing is detected; stderr is always plain text. Both
/// normalizers draw from the same sequence counter.
pub struct SessionPipeline {
    stdout: StreamDecoder,
    stderr: StreamDecoder,
    stdout_events: EventNormalizer,
    stderr_events: EventNormalizer,
}

impl SessionPipeline {
    pub fn new(
        mapping: Arc<ProviderMapping>,
        ansi: Arc<Regex>,
        options: DecoderOptions,
        counter: SequenceCounter,
    ) -> Self {
        Self {
            stdout: StreamDecoder::detecting(StreamSource::Stdout, mapping.framing_hint, options),
            stderr: StreamDecoder::fixed(StreamSource::Stderr, FramingMode::PlainText, options),
            stdout_events: EventNormalizer::new(
                Arc::clone(&mapping),
                Arc::clone(&ansi),
                StreamSource::Stdout,
                counter.clone(),
            ),
            stderr_events: EventNormalizer::new(mapping, ansi, StreamSource::Stderr, counter),
        }
    }

    /// Framing mode of stdout, once decided
    pub fn framing(&self) -> Option<FramingMode> {
        self.stdout.mode()
    }

    pub fn ingest(&mut self, chunk: RawChunk) -> PipelineOutput {
        match chunk.source() {
            StreamSource::Stdout => {
                let decoded = self.stdout.push(chunk);
                normalize(&mut self.stdout_events, decoded)
            }
            StreamSource::Stderr => {
                let decoded = self.stderr.push(chunk);
                normalize(&mut self.stderr_events, decoded)
            }
        }
    }

    /// Stdout has been quiet; decide framing with whatever has arrived
    pub fn on_idle(&mut self) -> PipelineOutput {
        let decoded = self.stdout.force_decision();
        normalize(&mut self.stdout_events, decoded)
    }

    /// Flush buffered output at session end; partial frames become error events
    pub fn finish(&mut self) -> PipelineOutput {
        let decoded = self.stdout.finish();
        let mut output = normalize(&mut self.stdout_events, decoded);
        output.events.extend(self.stdout_events.finish());

        let decoded = self.stderr.finish();
        output.events.extend(normalize(&mut self.stderr_events, decoded).events);
        output.events.extend(self.stderr_events.finish());
        output
    }
}

fn normalize(normalizer: &mut EventNormalizer, decoded: Decoded) -> PipelineOutput {
    let events = decoded
        .frames
        .into_iter()
        .flat_map(|frame| normalizer.normalize(frame))
        .collect();
    PipelineOutput {
        decided: decoded.decided,
        events,
    }
}
