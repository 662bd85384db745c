//! Reassembly of complete frames from arbitrarily split reads

use serde_json::Value;

use super::framing::{looks_structural, FramingMode};
use crate::error::FrameParseError;

/// Largest raw excerpt kept for a frame that overflowed the size limit
const OVERFLOW_EXCERPT_BYTES: usize = 4 * 1024;

/// One complete unit of provider output
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Output seen before the first parsed JSON value, emitted once
    Preamble(String),
    /// A parsed JSON value and the text it was parsed from
    Json { value: Value, raw: String },
    /// A plain-text line
    Text(String),
    /// Text that should have been JSON but was not
    Malformed(FrameParseError),
}

/// Accumulator state for a block-delimited value that has not closed yet
#[derive(Debug, Default)]
pub struct PendingFrame {
    buf: Vec<u8>,
    depth: usize,
    in_string: bool,
    escaped: bool,
    overflowed: bool,
    /// The last byte fed was a newline
    at_line_start: bool,
}

impl PendingFrame {
    fn opened_with(byte: u8) -> Self {
        Self {
            buf: vec![byte],
            depth: 1,
            ..Self::default()
        }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Track one byte; returns true when the value closes.
    ///
    /// Structural bytes are all ASCII, so UTF-8 continuation bytes never
    /// affect the depth count and a character split across reads is simply
    /// carried in `buf` until the value completes.
    fn feed(&mut self, byte: u8, limit: usize) -> bool {
        self.at_line_start = byte == b'\n';
        if self.buf.len() < limit {
            self.buf.push(byte);
        } else {
            self.overflowed = true;
        }

        if self.in_string {
            if self.escaped {
                self.escaped = false;
            } else if byte == b'\\' {
                self.escaped = true;
            } else if byte == b'"' {
                self.in_string = false;
            }
            return false;
        }

        match byte {
            b'"' => self.in_string = true,
            b'{' | b'[' => self.depth += 1,
            b'}' | b']' => {
                self.depth = self.depth.saturating_sub(1);
                return self.depth == 0;
            }
            _ => {}
        }
        false
    }

    /// An opener in column 0 while a value is still open.
    ///
    /// Pretty-printers indent everything nested inside a value, so this can
    /// only be the start of the next top-level value after a broken one.
    fn restarts_at(&self, byte: u8) -> bool {
        self.at_line_start && looks_structural(&[byte])
    }

    fn raw_text(&self) -> String {
        String::from_utf8_lossy(&self.buf).into_owned()
    }
}

/// Splits a stream into candidate frames according to its framing mode
#[derive(Debug)]
pub struct ChunkAccumulator {
    mode: FramingMode,
    max_frame_bytes: usize,
    line_buf: Vec<u8>,
    pending: Option<PendingFrame>,
    preamble: Vec<String>,
    parsed_any: bool,
    preamble_done: bool,
}

impl ChunkAccumulator {
    pub fn new(mode: FramingMode, max_frame_bytes: usize) -> Self {
        Self {
            mode,
            max_frame_bytes: max_frame_bytes.max(1),
            line_buf: Vec::new(),
            pending: None,
            preamble: Vec::new(),
            parsed_any: false,
            preamble_done: false,
        }
    }

    pub fn mode(&self) -> FramingMode {
        self.mode
    }

    /// True while bytes are buffered that have not become a frame yet
    pub fn has_partial(&self) -> bool {
        match self.mode {
            FramingMode::BlockDelimited => self.pending.is_some() || !is_separator(&self.line_buf),
            _ => !self.line_buf.trim_ascii().is_empty(),
        }
    }

    pub fn push(&mut self, bytes: &[u8]) -> Vec<Frame> {
        let mut out = Vec::new();
        match self.mode {
            FramingMode::BlockDelimited => {
                for &byte in bytes {
                    self.push_block_byte(byte, &mut out);
                }
            }
            FramingMode::LineDelimited | FramingMode::PlainText => {
                self.line_buf.extend_from_slice(bytes);
                while let Some(pos) = self.line_buf.iter().position(|b| *b == b'\n') {
                    let line: Vec<u8> = self.line_buf.drain(..=pos).collect();
                    self.handle_line(&line[..line.len() - 1], &mut out);
                }
                if self.line_buf.len() > self.max_frame_bytes {
                    let raw = excerpt(&self.line_buf);
                    self.line_buf.clear();
                    self.reject_oversized(raw, &mut out);
                }
            }
        }
        out
    }

    /// Flush everything still buffered at end of stream.
    ///
    /// An unterminated value becomes a `Malformed` frame rather than being
    /// dropped, and a preamble with no JSON after it is still emitted once.
    pub fn finish(&mut self) -> Vec<Frame> {
        let mut out = Vec::new();

        let trailing = std::mem::take(&mut self.line_buf);
        match self.mode {
            FramingMode::BlockDelimited => self.flush_outside_text(&trailing, &mut out),
            _ => self.handle_line(&trailing, &mut out),
        }

        self.emit_preamble(&mut out);

        if let Some(pending) = self.pending.take() {
            out.push(Frame::Malformed(FrameParseError::new(
                pending.raw_text(),
                "incomplete frame at end of stream",
            )));
        }
        out
    }

    fn handle_line(&mut self, line: &[u8], out: &mut Vec<Frame>) {
        let text = String::from_utf8_lossy(line);
        let text = text.trim_end_matches('\r');
        if text.trim().is_empty() {
            return;
        }
        match self.mode {
            FramingMode::PlainText => out.push(Frame::Text(text.to_string())),
            _ => {
                let trimmed = text.trim();
                match serde_json::from_str::<Value>(trimmed) {
                    Ok(value) => self.accept(value, trimmed.to_string(), out),
                    Err(err) => self.reject(trimmed.to_string(), err.to_string(), out),
                }
            }
        }
    }

    fn push_block_byte(&mut self, byte: u8, out: &mut Vec<Frame>) {
        if self.pending.as_ref().is_some_and(|p| p.restarts_at(byte)) {
            if let Some(abandoned) = self.pending.take() {
                self.abandon_block(abandoned, out);
            }
            self.pending = Some(PendingFrame::opened_with(byte));
            return;
        }

        if let Some(pending) = self.pending.as_mut() {
            if pending.feed(byte, self.max_frame_bytes) {
                if let Some(done) = self.pending.take() {
                    self.complete_block(done, out);
                }
            }
            return;
        }

        if byte == b'\n' {
            let line = std::mem::take(&mut self.line_buf);
            self.flush_outside_text(&line, out);
            return;
        }

        if looks_structural(&[byte]) && is_separator(&self.line_buf) {
            self.line_buf.clear();
            self.pending = Some(PendingFrame::opened_with(byte));
            return;
        }

        self.line_buf.push(byte);
    }

    fn complete_block(&mut self, done: PendingFrame, out: &mut Vec<Frame>) {
        if done.overflowed {
            let raw = excerpt(&done.buf);
            self.reject_oversized(raw, out);
            return;
        }
        let raw = done.raw_text();
        match serde_json::from_str::<Value>(&raw) {
            Ok(value) => self.accept(value, raw, out),
            Err(err) => self.reject(raw, err.to_string(), out),
        }
    }

    /// A value that never closed before the next one started
    fn abandon_block(&mut self, abandoned: PendingFrame, out: &mut Vec<Frame>) {
        if abandoned.overflowed {
            let raw = excerpt(&abandoned.buf);
            self.reject_oversized(raw, out);
            return;
        }
        let raw = abandoned.raw_text();
        self.reject(
            raw.trim_end().to_string(),
            "unterminated value before the next frame".to_string(),
            out,
        );
    }

    fn flush_outside_text(&mut self, line: &[u8], out: &mut Vec<Frame>) {
        if is_separator(line) {
            return;
        }
        let text = String::from_utf8_lossy(line);
        let trimmed = text.trim();
        self.reject(
            trimmed.to_string(),
            "text outside a JSON value".to_string(),
            out,
        );
    }

    fn accept(&mut self, value: Value, raw: String, out: &mut Vec<Frame>) {
        if !self.parsed_any {
            self.parsed_any = true;
            self.emit_preamble(out);
        }
        out.push(Frame::Json { value, raw });
    }

    fn reject(&mut self, raw: String, reason: String, out: &mut Vec<Frame>) {
        if !self.parsed_any && !self.preamble_done {
            self.preamble.push(raw);
        } else {
            out.push(Frame::Malformed(FrameParseError::new(raw, reason)));
        }
    }

    fn reject_oversized(&mut self, raw: String, out: &mut Vec<Frame>) {
        let reason = format!("frame exceeds {} bytes", self.max_frame_bytes);
        out.push(Frame::Malformed(FrameParseError::new(raw, reason)));
    }

    fn emit_preamble(&mut self, out: &mut Vec<Frame>) {
        if self.preamble_done {
            return;
        }
        self.preamble_done = true;
        if !self.preamble.is_empty() {
            out.push(Frame::Preamble(self.preamble.join("\n")));
            self.preamble.clear();
        }
    }
}

/// Whitespace and commas left between values of a pretty-printed sequence
fn is_separator(bytes: &[u8]) -> bool {
    bytes.iter().all(|b| *b == b',' || b.is_ascii_whitespace())
}

fn excerpt(bytes: &[u8]) -> String {
    let end = bytes.len().min(OVERFLOW_EXCERPT_BYTES);
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}
