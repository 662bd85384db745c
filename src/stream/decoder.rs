//! Per-stream decoding: detect the framing mode, then accumulate frames

use tracing::{debug, info};

use super::accumulator::{ChunkAccumulator, Frame};
use super::chunk::{RawChunk, StreamSource};
use super::framing::{DetectionWindow, FramingDetector, FramingMode};

/// Default upper bound on a single buffered frame
pub const DEFAULT_MAX_FRAME_BYTES: usize = 64 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecoderOptions {
    pub window: DetectionWindow,
    pub max_frame_bytes: usize,
}

impl Default for DecoderOptions {
    fn default() -> Self {
        Self {
            window: DetectionWindow::default(),
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        }
    }
}

/// Result of feeding bytes to a decoder
#[derive(Debug, Default, PartialEq)]
pub struct Decoded {
    /// Set on the call that fixed the framing mode
    pub decided: Option<FramingMode>,
    pub frames: Vec<Frame>,
}

#[derive(Debug)]
enum DecoderState {
    Detecting(FramingDetector),
    Framing(ChunkAccumulator),
}

/// Turns the raw chunks of one stream into frames
#[derive(Debug)]
pub struct StreamDecoder {
    source: StreamSource,
    options: DecoderOptions,
    state: DecoderState,
}

impl StreamDecoder {
    /// Decoder that inspects the first output before choosing a mode
    pub fn detecting(source: StreamSource, hint: Option<FramingMode>, options: DecoderOptions) -> Self {
        Self {
            source,
            options,
            state: DecoderState::Detecting(FramingDetector::new(hint, options.window)),
        }
    }

    /// Decoder with a mode known up front
    pub fn fixed(source: StreamSource, mode: FramingMode, options: DecoderOptions) -> Self {
        Self {
            source,
            options,
            state: DecoderState::Framing(ChunkAccumulator::new(mode, options.max_frame_bytes)),
        }
    }

    pub fn source(&self) -> StreamSource {
        self.source
    }

    pub fn mode(&self) -> Option<FramingMode> {
        match &self.state {
            DecoderState::Detecting(_) => None,
            DecoderState::Framing(acc) => Some(acc.mode()),
        }
    }

    pub fn has_partial(&self) -> bool {
        match &self.state {
            DecoderState::Detecting(detector) => detector.buffered_len() > 0,
            DecoderState::Framing(acc) => acc.has_partial(),
        }
    }

    pub fn push(&mut self, chunk: RawChunk) -> Decoded {
        debug_assert_eq!(chunk.source(), self.source);
        match &mut self.state {
            DecoderState::Framing(acc) => Decoded {
                decided: None,
                frames: acc.push(chunk.bytes()),
            },
            DecoderState::Detecting(detector) => match detector.push(chunk.bytes()) {
                Some(mode) => self.switch_to(mode),
                None => Decoded::default(),
            },
        }
    }

    /// Stop waiting for more detection input and decide now
    pub fn force_decision(&mut self) -> Decoded {
        match &mut self.state {
            DecoderState::Detecting(detector) => match detector.force() {
                Some(mode) => {
                    debug!(stream = %self.source, %mode, "framing decided without a full window");
                    self.switch_to(mode)
                }
                None => Decoded::default(),
            },
            DecoderState::Framing(_) => Decoded::default(),
        }
    }

    /// Flush all buffered output at end of stream
    pub fn finish(&mut self) -> Decoded {
        let mut decoded = self.force_decision();
        if let DecoderState::Framing(acc) = &mut self.state {
            decoded.frames.extend(acc.finish());
        }
        decoded
    }

    fn switch_to(&mut self, mode: FramingMode) -> Decoded {
        let buffered = match &mut self.state {
            DecoderState::Detecting(detector) => detector.take_buffer(),
            DecoderState::Framing(_) => Vec::new(),
        };
        info!(stream = %self.source, %mode, "framing mode selected");
        let mut acc = ChunkAccumulator::new(mode, self.options.max_frame_bytes);
        let frames = acc.push(&buffered);
        self.state = DecoderState::Framing(acc);
        Decoded {
            decided: Some(mode),
            frames,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::ChunkOrder;
    use serde_json::json;

    fn small_window() -> DecoderOptions {
        DecoderOptions {
            window: DetectionWindow {
                max_lines: 2,
                max_bytes: 4096,
            },
            max_frame_bytes: 4096,
        }
    }

    #[test]
    fn replays_detection_buffer_into_accumulator() {
        let order = ChunkOrder::new();
        let mut decoder = StreamDecoder::detecting(StreamSource::Stdout, None, small_window());

        let first = decoder.push(order.tag(StreamSource::Stdout, b"{\"n\":1}\n".to_vec()));
        assert_eq!(first, Decoded::default());
        assert_eq!(decoder.mode(), None);

        let second = decoder.push(order.tag(StreamSource::Stdout, b"{\"n\":2}\n".to_vec()));
        assert_eq!(second.decided, Some(FramingMode::LineDelimited));
        assert_eq!(second.frames.len(), 2);
        match &second.frames[0] {
            Frame::Json { value, .. } => assert_eq!(value, &json!({"n": 1})),
            other => panic!("unexpected frame {other:?}"),
        }
    }

    #[test]
    fn finish_decides_and_flushes_short_output() {
        let order = ChunkOrder::new();
        let mut decoder = StreamDecoder::detecting(StreamSource::Stdout, None, small_window());
        decoder.push(order.tag(StreamSource::Stdout, b"{\"only\":true}\n".to_vec()));

        let done = decoder.finish();
        assert_eq!(done.decided, Some(FramingMode::LineDelimited));
        assert_eq!(done.frames.len(), 1);
    }

    #[test]
    fn force_decision_without_output_stays_undecided() {
        let mut decoder = StreamDecoder::detecting(StreamSource::Stdout, None, small_window());
        assert_eq!(decoder.force_decision(), Decoded::default());
        assert_eq!(decoder.mode(), None);
        assert!(!decoder.has_partial());
    }

    #[test]
    fn fixed_decoder_never_reports_a_decision() {
        let order = ChunkOrder::new();
        let mut decoder =
            StreamDecoder::fixed(StreamSource::Stderr, FramingMode::PlainText, small_window());
        let decoded = decoder.push(order.tag(StreamSource::Stderr, b"warning: slow\n".to_vec()));
        assert_eq!(decoded.decided, None);
        assert_eq!(decoded.frames, vec![Frame::Text("warning: slow".to_string())]);
    }
}
