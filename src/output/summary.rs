//! Human-readable rendering of events and sessions

use std::collections::BTreeSet;
use std::fmt::Write as _;

use crate::normalize::{EventKind, UnifiedEvent};
use crate::session::SessionRecord;

const MAX_LINE_TEXT: usize = 120;

fn truncate(text: &str, max: usize) -> String {
    let first_line = text.lines().next().unwrap_or("");
    if first_line.chars().count() <= max && first_line.len() == text.trim_end().len() {
        return first_line.to_string();
    }
    let mut out: String = first_line.chars().take(max).collect();
    out.push_str("...");
    out
}

/// Value of the first present key, rendered as text
fn field(event: &UnifiedEvent, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match event.get(key)? {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::String(_) | serde_json::Value::Null => None,
        other => Some(other.to_string()),
    })
}

/// One-line description of an event for progress display
pub fn render_event_line(event: &UnifiedEvent) -> String {
    let detail = match event.kind {
        EventKind::Preamble | EventKind::Message => field(event, &["text", "native_type"]),
        EventKind::ToolUse => match (field(event, &["name", "tool"]), field(event, &["command", "path"])) {
            (Some(name), Some(arg)) => Some(format!("{name}: {arg}")),
            (name, arg) => name.or(arg),
        },
        EventKind::ToolResult => field(event, &["output", "text", "exit_code"]),
        EventKind::FileOperation => match (field(event, &["operation"]), field(event, &["path"])) {
            (Some(op), Some(path)) => Some(format!("{op} {path}")),
            (op, path) => path.or(op),
        },
        EventKind::GitCommit => match (field(event, &["hash"]), field(event, &["message"])) {
            (Some(hash), Some(msg)) => Some(format!("{hash} {msg}")),
            (hash, msg) => hash.or(msg),
        },
        EventKind::Completion => field(event, &["status", "text", "usage"]),
        EventKind::Error => field(event, &["message", "reason", "text", "line"]),
    };
    let mut line = format!("#{} [{}]", event.sequence, event.kind);
    if let Some(detail) = detail {
        line.push(' ');
        line.push_str(&truncate(&detail, MAX_LINE_TEXT));
    }
    line
}

/// Multi-line summary of a finished session
pub fn render_summary(record: &SessionRecord) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "session {} ({})", record.id, record.provider);
    if let Some(framing) = record.framing {
        let _ = writeln!(out, "  framing:  {framing}");
    }

    let reason = record
        .termination_reason
        .map(|r| r.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    let code = record
        .exit_code
        .map(|c| c.to_string())
        .unwrap_or_else(|| "none".to_string());
    let _ = writeln!(
        out,
        "  result:   {reason} (exit code {code}) after {:.1}s",
        record.duration_ms as f64 / 1000.0
    );

    let counts: Vec<String> = EventKind::ALL
        .iter()
        .map(|kind| (kind, record.count(*kind)))
        .filter(|(_, n)| *n > 0)
        .map(|(kind, n)| format!("{kind} {n}"))
        .collect();
    let _ = write!(out, "  events:   {}", record.events.len());
    if !counts.is_empty() {
        let _ = write!(out, " ({})", counts.join(", "));
    }
    out.push('\n');

    let commits: Vec<String> = record
        .events_of(EventKind::GitCommit)
        .filter_map(|e| field(e, &["hash"]))
        .collect();
    if !commits.is_empty() {
        let _ = writeln!(out, "  commits:  {}", commits.join(", "));
    }

    let files: BTreeSet<String> = record
        .events_of(EventKind::FileOperation)
        .filter_map(|e| field(e, &["path"]))
        .collect();
    if !files.is_empty() {
        let files: Vec<String> = files.into_iter().collect();
        let _ = writeln!(out, "  files:    {}", files.join(", "));
    }

    if let Some(last) = record.events_of(EventKind::Error).last() {
        let _ = writeln!(out, "  last error: {}", render_event_line(last));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::Payload;
    use crate::session::{Session, TerminationReason};
    use crate::stream::StreamSource;
    use chrono::Utc;
    use serde_json::json;

    fn event(sequence: u64, kind: EventKind, fields: &[(&str, serde_json::Value)]) -> UnifiedEvent {
        let payload: Payload = fields
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        UnifiedEvent {
            sequence,
            kind,
            timestamp: Utc::now(),
            payload,
            source_stream: StreamSource::Stdout,
        }
    }

    #[test]
    fn event_lines_pick_the_useful_fields() {
        let tool = event(3, EventKind::ToolUse, &[("name", json!("Bash")), ("command", json!("cargo test"))]);
        assert_eq!(render_event_line(&tool), "#3 [tool_use] Bash: cargo test");

        let commit = event(4, EventKind::GitCommit, &[("hash", json!("a1b2c3d"))]);
        assert_eq!(render_event_line(&commit), "#4 [git_commit] a1b2c3d");

        let result = event(5, EventKind::ToolResult, &[("exit_code", json!(0))]);
        assert_eq!(render_event_line(&result), "#5 [tool_result] 0");

        let bare = event(6, EventKind::Completion, &[]);
        assert_eq!(render_event_line(&bare), "#6 [completion]");
    }

    #[test]
    fn long_text_is_truncated_to_one_line() {
        let text = format!("{}\nsecond line", "x".repeat(200));
        let msg = event(1, EventKind::Message, &[("text", json!(text))]);
        let line = render_event_line(&msg);
        assert!(line.ends_with("..."));
        assert!(!line.contains('\n'));
    }

    #[test]
    fn summary_lists_counts_commits_and_files() {
        let mut session = Session::new("aider");
        session.push_event(event(1, EventKind::Message, &[("text", json!("hi"))]));
        session.push_event(event(2, EventKind::FileOperation, &[("path", json!("src/lib.rs"))]));
        session.push_event(event(3, EventKind::FileOperation, &[("path", json!("src/lib.rs"))]));
        session.push_event(event(4, EventKind::GitCommit, &[("hash", json!("a1b2c3d"))]));
        session.terminate(TerminationReason::Exited, Some(0));
        let summary = render_summary(&session.into_record());

        assert!(summary.contains("(aider)"));
        assert!(summary.contains("exited (exit code 0)"));
        assert!(summary.contains("events:   4 (message 1, file_operation 2, git_commit 1)"));
        assert!(summary.contains("commits:  a1b2c3d"));
        assert!(summary.contains("files:    src/lib.rs\n"));
        assert!(!summary.contains("last error"));
    }
}
