//! Framing mode detection from the first bytes of a stream

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Structural convention of a provider's output stream.
///
/// Chosen once per session and never changed afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FramingMode {
    /// One complete JSON value per line
    LineDelimited,
    /// Pretty-printed JSON values spanning several lines
    BlockDelimited,
    /// Unstructured text, matched line by line
    PlainText,
}

impl FramingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FramingMode::LineDelimited => "line_delimited",
            FramingMode::BlockDelimited => "block_delimited",
            FramingMode::PlainText => "plain_text",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "line" | "line_delimited" | "ndjson" | "jsonl" => Some(FramingMode::LineDelimited),
            "block" | "block_delimited" | "pretty" => Some(FramingMode::BlockDelimited),
            "plain" | "plain_text" | "text" => Some(FramingMode::PlainText),
            _ => None,
        }
    }

    pub fn expects_json(&self) -> bool {
        !matches!(self, FramingMode::PlainText)
    }
}

impl fmt::Display for FramingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bounds on how much output detection may inspect before giving up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectionWindow {
    pub max_lines: usize,
    pub max_bytes: usize,
}

impl Default for DetectionWindow {
    fn default() -> Self {
        Self {
            max_lines: 8,
            max_bytes: 16 * 1024,
        }
    }
}

/// Buffers the start of a stream until its framing mode is known.
///
/// Only complete lines are judged, so the outcome depends on the bytes seen
/// and not on how they were split into reads.
#[derive(Debug)]
pub struct FramingDetector {
    hint: Option<FramingMode>,
    window: DetectionWindow,
    buffer: Vec<u8>,
}

impl FramingDetector {
    pub fn new(hint: Option<FramingMode>, window: DetectionWindow) -> Self {
        Self {
            hint,
            window,
            buffer: Vec::new(),
        }
    }

    /// Feed more bytes; returns the mode once it can be decided
    pub fn push(&mut self, bytes: &[u8]) -> Option<FramingMode> {
        self.buffer.extend_from_slice(bytes);
        if self.hint == Some(FramingMode::PlainText) && !self.buffered_is_blank() {
            return Some(FramingMode::PlainText);
        }
        let exhausted = self.buffer.len() >= self.window.max_bytes;
        self.evaluate(exhausted, false)
    }

    /// Decide with whatever has been buffered, including a trailing partial line.
    ///
    /// Returns `None` only when nothing but whitespace has arrived.
    pub fn force(&mut self) -> Option<FramingMode> {
        if self.buffered_is_blank() {
            return None;
        }
        if self.hint == Some(FramingMode::PlainText) {
            return Some(FramingMode::PlainText);
        }
        self.evaluate(true, true)
    }

    /// Hand the buffered bytes to whoever frames the stream next
    pub fn take_buffer(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.buffer)
    }

    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    fn buffered_is_blank(&self) -> bool {
        self.buffer.iter().all(|b| b.is_ascii_whitespace())
    }

    fn evaluate(&self, exhausted: bool, include_partial: bool) -> Option<FramingMode> {
        let mut pieces: Vec<&[u8]> = self.buffer.split(|b| *b == b'\n').collect();
        // The last piece has no terminator yet.
        let partial = pieces.pop().unwrap_or_default();
        if include_partial {
            pieces.push(partial);
        }

        let mut seen = 0usize;
        let mut json_lines = 0usize;
        for line in pieces {
            let trimmed = line.trim_ascii();
            if trimmed.is_empty() {
                continue;
            }
            seen += 1;
            if seen > self.window.max_lines {
                break;
            }
            if !looks_structural(trimmed) {
                continue;
            }
            if self.hint == Some(FramingMode::BlockDelimited) {
                debug!("provider declares block framing; structured output confirmed");
                return Some(FramingMode::BlockDelimited);
            }
            if serde_json::from_slice::<serde_json::Value>(trimmed).is_err() {
                debug!("structured line did not parse on its own; using block framing");
                return Some(FramingMode::BlockDelimited);
            }
            json_lines += 1;
        }

        let window_full = seen >= self.window.max_lines;
        if !(window_full || exhausted) {
            return None;
        }
        if json_lines > 0 {
            return Some(FramingMode::LineDelimited);
        }
        if !include_partial && looks_structural(partial.trim_ascii()) {
            // An oversized first value still being written.
            debug!("detection window filled mid-value; using block framing");
            return Some(FramingMode::BlockDelimited);
        }
        warn!(
            lines = seen,
            bytes = self.buffer.len(),
            "no structured output within detection window; falling back to plain text"
        );
        Some(FramingMode::PlainText)
    }
}

/// Does this trimmed line open a JSON object or array?
pub(crate) fn looks_structural(line: &[u8]) -> bool {
    matches!(line.first(), Some(b'{') | Some(b'['))
}
