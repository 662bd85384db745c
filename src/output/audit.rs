//! Serializable audit record of a finished session

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::normalize::UnifiedEvent;
use crate::session::{AgentCommand, SessionRecord, SessionState, TerminationReason};
use crate::stream::FramingMode;

/// Session metadata without the event list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditHeader {
    pub session_id: Uuid,
    pub provider: String,
    pub command: Option<AgentCommand>,
    pub state: SessionState,
    pub framing: Option<FramingMode>,
    pub termination_reason: Option<TerminationReason>,
    pub exit_code: Option<i32>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_ms: u64,
    pub event_counts: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    #[serde(flatten)]
    pub header: AuditHeader,
    pub events: Vec<UnifiedEvent>,
}

impl AuditRecord {
    pub fn from_record(record: &SessionRecord, command: Option<&AgentCommand>) -> Self {
        let mut event_counts = BTreeMap::new();
        for event in &record.events {
            *event_counts.entry(event.kind.to_string()).or_insert(0) += 1;
        }
        Self {
            header: AuditHeader {
                session_id: record.id,
                provider: record.provider.clone(),
                command: command.cloned(),
                state: record.state,
                framing: record.framing,
                termination_reason: record.termination_reason,
                exit_code: record.exit_code,
                started_at: record.started_at,
                finished_at: record.finished_at,
                duration_ms: record.duration_ms,
                event_counts,
            },
            events: record.events.clone(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Header on the first line, then one event per line
    pub fn to_json_lines(&self) -> serde_json::Result<String> {
        let mut out = serde_json::to_string(&self.header)?;
        out.push('\n');
        for event in &self.events {
            out.push_str(&serde_json::to_string(event)?);
            out.push('\n');
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::{EventKind, Payload};
    use crate::session::Session;
    use crate::stream::StreamSource;

    fn record() -> SessionRecord {
        let mut session = Session::new("codex");
        session.set_framing(FramingMode::LineDelimited);
        for (sequence, kind) in [(1, EventKind::Message), (2, EventKind::Message), (3, EventKind::Completion)] {
            session.push_event(UnifiedEvent {
                sequence,
                kind,
                timestamp: Utc::now(),
                payload: Payload::new(),
                source_stream: StreamSource::Stdout,
            });
        }
        session.terminate(TerminationReason::Exited, Some(0));
        session.into_record()
    }

    #[test]
    fn audit_counts_events_by_kind() {
        let command = AgentCommand::new("codex").args(["exec", "--json"]);
        let audit = AuditRecord::from_record(&record(), Some(&command));
        assert_eq!(audit.header.event_counts["message"], 2);
        assert_eq!(audit.header.event_counts["completion"], 1);

        let value: serde_json::Value = serde_json::from_str(&audit.to_json().unwrap()).unwrap();
        assert_eq!(value["provider"], "codex");
        assert_eq!(value["framing"], "line_delimited");
        assert_eq!(value["command"]["args"][1], "--json");
        assert_eq!(value["events"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn json_lines_put_header_first() {
        let audit = AuditRecord::from_record(&record(), None);
        let text = audit.to_json_lines().unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        let header: AuditHeader = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(header.termination_reason, Some(TerminationReason::Exited));
        let last: UnifiedEvent = serde_json::from_str(lines[3]).unwrap();
        assert_eq!(last.kind, EventKind::Completion);
    }
}
