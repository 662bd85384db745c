//! The unified event schema every provider is normalized into

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::stream::StreamSource;

/// Kind-specific fields; values are always JSON scalars
pub type Payload = BTreeMap<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Preamble,
    Message,
    ToolUse,
    ToolResult,
    FileOperation,
    GitCommit,
    Completion,
    Error,
}

impl EventKind {
    pub const ALL: [EventKind; 8] = [
        EventKind::Preamble,
        EventKind::Message,
        EventKind::ToolUse,
        EventKind::ToolResult,
        EventKind::FileOperation,
        EventKind::GitCommit,
        EventKind::Completion,
        EventKind::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Preamble => "preamble",
            EventKind::Message => "message",
            EventKind::ToolUse => "tool_use",
            EventKind::ToolResult => "tool_result",
            EventKind::FileOperation => "file_operation",
            EventKind::GitCommit => "git_commit",
            EventKind::Completion => "completion",
            EventKind::Error => "error",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == s)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One normalized entry in a session's activity timeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnifiedEvent {
    /// Strictly increasing within a session
    pub sequence: u64,
    pub kind: EventKind,
    /// From the payload when the provider supplies one, else arrival time
    pub timestamp: DateTime<Utc>,
    pub payload: Payload,
    pub source_stream: StreamSource,
}

impl UnifiedEvent {
    /// String value of a payload field
    pub fn text(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(Value::as_str)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }
}

/// Session-wide event sequence shared by every normalizer in the session
#[derive(Debug, Clone)]
pub struct SequenceCounter(Arc<AtomicU64>);

impl SequenceCounter {
    pub fn new() -> Self {
        Self(Arc::new(AtomicU64::new(1)))
    }

    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst)
    }

    /// Value the next call to `next` will return
    pub fn peek(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

impl Default for SequenceCounter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn kind_round_trips_through_str() {
        for kind in EventKind::ALL {
            assert_eq!(EventKind::from_str(kind.as_str()), Some(kind));
        }
        assert_eq!(EventKind::from_str("thinking"), None);
    }

    #[test]
    fn sequence_counter_is_shared() {
        let counter = SequenceCounter::new();
        let clone = counter.clone();
        assert_eq!(counter.next(), 1);
        assert_eq!(clone.next(), 2);
        assert_eq!(counter.peek(), 3);
    }

    #[test]
    fn event_serializes_with_snake_case_kind() {
        let mut payload = Payload::new();
        payload.insert("name".to_string(), json!("bash"));
        let event = UnifiedEvent {
            sequence: 4,
            kind: EventKind::ToolUse,
            timestamp: Utc::now(),
            payload,
            source_stream: StreamSource::Stdout,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["kind"], "tool_use");
        assert_eq!(value["source_stream"], "stdout");
        assert_eq!(event.text("name"), Some("bash"));
        assert_eq!(event.text("missing"), None);
    }
}
