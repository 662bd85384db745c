//! Table-driven mapping of frames to unified events

use std::sync::Arc;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde_json::Value;

use super::event::{EventKind, Payload, SequenceCounter, UnifiedEvent};
use super::text::{clean_terminal_line, discriminator_text, flatten_into, lookup, parse_timestamp, scalarize};
use crate::provider::{DeltaMode, DeltaSpec, KindRule, ProviderMapping, RuleAction};
use crate::stream::{Frame, StreamSource};

/// Streaming text waiting to be coalesced into one message
#[derive(Debug)]
struct PendingDelta {
    native: String,
    turn: Option<String>,
    text: String,
    chunks: u64,
    timestamp: DateTime<Utc>,
}

/// Maps the frames of one stream to events using a provider's mapping table
pub struct EventNormalizer {
    mapping: Arc<ProviderMapping>,
    ansi: Arc<Regex>,
    source: StreamSource,
    counter: SequenceCounter,
    pending: Option<PendingDelta>,
}

impl EventNormalizer {
    pub fn new(
        mapping: Arc<ProviderMapping>,
        ansi: Arc<Regex>,
        source: StreamSource,
        counter: SequenceCounter,
    ) -> Self {
        Self {
            mapping,
            ansi,
            source,
            counter,
            pending: None,
        }
    }

    pub fn source(&self) -> StreamSource {
        self.source
    }

    /// True while streaming deltas are held back waiting for the turn to end
    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn normalize(&mut self, frame: Frame) -> Vec<UnifiedEvent> {
        let mut events = Vec::new();
        match frame {
            Frame::Preamble(text) => {
                let cleaned: Vec<String> = text
                    .lines()
                    .map(|line| clean_terminal_line(&self.ansi, line))
                    .collect();
                let mut payload = Payload::new();
                payload.insert("text".to_string(), Value::String(cleaned.join("\n")));
                self.emit(&mut events, EventKind::Preamble, payload, Utc::now());
            }
            Frame::Malformed(err) => {
                let mut payload = Payload::new();
                payload.insert("reason".to_string(), Value::String(err.reason));
                payload.insert("raw".to_string(), Value::String(err.raw));
                self.emit(&mut events, EventKind::Error, payload, Utc::now());
            }
            Frame::Text(line) => self.normalize_line(&line, &mut events),
            Frame::Json { value, .. } => self.normalize_value(value, &mut events),
        }
        events
    }

    /// Flush any coalesced message still pending
    pub fn finish(&mut self) -> Vec<UnifiedEvent> {
        let mut events = Vec::new();
        self.flush(&mut events);
        events
    }

    fn normalize_line(&mut self, line: &str, events: &mut Vec<UnifiedEvent>) {
        let line = clean_terminal_line(&self.ansi, line);
        let trimmed = line.trim();
        if trimmed.is_empty() || self.mapping.text_noise.iter().any(|re| re.is_match(trimmed)) {
            return;
        }

        let mut payload = Payload::new();
        let mut kind = EventKind::Message;
        let matched = self
            .mapping
            .text_patterns
            .iter()
            .find_map(|pattern| pattern.regex.captures(trimmed).map(|caps| (pattern, caps)));
        match matched {
            Some((pattern, caps)) => {
                kind = pattern.kind;
                for name in pattern.regex.capture_names().flatten() {
                    if let Some(m) = caps.name(name).filter(|m| !m.as_str().is_empty()) {
                        payload.insert(name.to_string(), Value::String(m.as_str().to_string()));
                    }
                }
                for (key, value) in &pattern.fixed {
                    payload.insert(key.clone(), Value::String(value.clone()));
                }
                payload.insert("line".to_string(), Value::String(trimmed.to_string()));
            }
            None => {
                payload.insert("text".to_string(), Value::String(trimmed.to_string()));
            }
        }
        self.emit(events, kind, payload, Utc::now());
    }

    fn normalize_value(&mut self, value: Value, events: &mut Vec<UnifiedEvent>) {
        match value {
            Value::Object(_) => self.normalize_object(&value, events),
            // A whole array is still one frame, so it stays one event
            other => {
                let mut payload = Payload::new();
                payload.insert("value".to_string(), scalarize(&other));
                let kind = self.mapping.fallback_kind;
                self.emit(events, kind, payload, Utc::now());
            }
        }
    }

    fn normalize_object(&mut self, value: &Value, events: &mut Vec<UnifiedEvent>) {
        let mapping = Arc::clone(&self.mapping);
        let native = mapping.discriminator(value);
        let rule = native.as_deref().and_then(|n| mapping.rule_for(n));
        let timestamp = self.timestamp_of(value);

        match rule.map(|r| &r.action) {
            Some(RuleAction::Noise) => {}
            Some(RuleAction::Delta(spec)) => {
                let native = native.unwrap_or_default();
                self.push_delta(spec, native, value, timestamp, events);
            }
            Some(RuleAction::Emit(kind)) => {
                let payload = self.payload_for(value, rule, native);
                self.emit(events, *kind, payload, timestamp);
            }
            None => {
                let payload = self.payload_for(value, None, native);
                let kind = mapping.fallback_kind;
                self.emit(events, kind, payload, timestamp);
            }
        }
    }

    fn payload_for(&self, value: &Value, rule: Option<&KindRule>, native: Option<String>) -> Payload {
        let mut payload = Payload::new();
        flatten_into(&mut payload, "", value);
        if let Some(rule) = rule {
            for alias in &rule.aliases {
                if let Some(found) = lookup(value, &alias.from) {
                    payload.insert(alias.to.clone(), scalarize(found));
                }
            }
        }
        if let Some(native) = native {
            payload.insert("native_type".to_string(), Value::String(native));
        }
        payload
    }

    fn push_delta(
        &mut self,
        spec: &DeltaSpec,
        native: String,
        value: &Value,
        timestamp: DateTime<Utc>,
        events: &mut Vec<UnifiedEvent>,
    ) {
        let text = match lookup(value, &spec.text_path) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        };
        let turn = spec
            .turn_path
            .as_deref()
            .and_then(|path| lookup(value, path))
            .and_then(discriminator_text);

        let same_turn = self
            .pending
            .as_ref()
            .is_some_and(|p| p.turn == turn && p.native == native);
        if !same_turn {
            self.flush(events);
        }

        let pending = self.pending.get_or_insert_with(|| PendingDelta {
            native,
            turn,
            text: String::new(),
            chunks: 0,
            timestamp,
        });
        match spec.mode {
            DeltaMode::Append => pending.text.push_str(&text),
            DeltaMode::Replace => pending.text = text,
        }
        pending.chunks += 1;
    }

    fn flush(&mut self, events: &mut Vec<UnifiedEvent>) {
        let Some(pending) = self.pending.take() else {
            return;
        };
        let mut payload = Payload::new();
        payload.insert("text".to_string(), Value::String(pending.text));
        payload.insert("delta_count".to_string(), Value::from(pending.chunks));
        payload.insert("native_type".to_string(), Value::String(pending.native));
        if let Some(turn) = pending.turn {
            payload.insert("turn_id".to_string(), Value::String(turn));
        }
        events.push(self.build(EventKind::Message, payload, pending.timestamp));
    }

    /// Emit one event, flushing coalesced text first so order is preserved
    fn emit(&mut self, events: &mut Vec<UnifiedEvent>, kind: EventKind, payload: Payload, timestamp: DateTime<Utc>) {
        self.flush(events);
        events.push(self.build(kind, payload, timestamp));
    }

    fn build(&self, kind: EventKind, payload: Payload, timestamp: DateTime<Utc>) -> UnifiedEvent {
        UnifiedEvent {
            sequence: self.counter.next(),
            kind,
            timestamp,
            payload,
            source_stream: self.source,
        }
    }

    fn timestamp_of(&self, value: &Value) -> DateTime<Utc> {
        self.mapping
            .timestamp_paths
            .iter()
            .filter_map(|path| lookup(value, path))
            .find_map(parse_timestamp)
            .unwrap_or_else(Utc::now)
    }
}
