//! Helpers for turning raw provider values into payload fields

use chrono::{DateTime, TimeZone, Utc};
use regex::Regex;
use serde_json::Value;

use super::event::Payload;

/// Nested objects deeper than this are kept as compact JSON text
const MAX_FLATTEN_DEPTH: usize = 4;

/// Remove ANSI escape sequences and resolve carriage-return overwrites.
///
/// Terminal progress output rewrites a line with `\r`; only the final
/// rendering is kept.
pub fn clean_terminal_line(ansi: &Regex, line: &str) -> String {
    let visible = line.rsplit('\r').find(|segment| !segment.trim().is_empty()).unwrap_or("");
    ansi.replace_all(visible, "").into_owned()
}

/// Pattern matching CSI and OSC escape sequences
pub fn ansi_pattern() -> Result<Regex, regex::Error> {
    Regex::new(r"\x1b\[[0-9;?]*[ -/]*[@-~]|\x1b\][^\x07\x1b]*(?:\x07|\x1b\\)|\x1b[@-Z\\-_]")
}

/// Look up a dotted path such as `message.content.0.text`.
///
/// Numeric segments index into arrays.
pub fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(value, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Render a value as the discriminator text used by mapping rules
pub fn discriminator_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Convert any value into a payload scalar; containers become compact JSON
pub fn scalarize(value: &Value) -> Value {
    match value {
        Value::Array(_) | Value::Object(_) => Value::String(value.to_string()),
        scalar => scalar.clone(),
    }
}

/// Flatten an object into dotted keys with scalar values.
///
/// Values are copied verbatim, so usage and cost counters keep the numbers
/// the provider reported.
pub fn flatten_into(payload: &mut Payload, prefix: &str, value: &Value) {
    flatten_at(payload, prefix, value, 0);
}

fn flatten_at(payload: &mut Payload, prefix: &str, value: &Value, depth: usize) {
    match value {
        Value::Object(map) if depth < MAX_FLATTEN_DEPTH => {
            for (key, inner) in map {
                let key = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                flatten_at(payload, &key, inner, depth + 1);
            }
        }
        other if !prefix.is_empty() => {
            payload.insert(prefix.to_string(), scalarize(other));
        }
        _ => {}
    }
}

/// Best-effort timestamp from a provider value.
///
/// Accepts RFC 3339 strings and integer epochs in seconds or milliseconds.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
            .or_else(|| s.parse::<i64>().ok().and_then(from_epoch)),
        Value::Number(n) => n.as_i64().and_then(from_epoch),
        _ => None,
    }
}

fn from_epoch(raw: i64) -> Option<DateTime<Utc>> {
    // Anything past year 5138 in seconds is taken to be milliseconds.
    if raw.abs() >= 100_000_000_000 {
        Utc.timestamp_millis_opt(raw).single()
    } else {
        Utc.timestamp_opt(raw, 0).single()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strips_color_codes_and_keeps_last_overwrite() {
        let ansi = ansi_pattern().unwrap();
        assert_eq!(
            clean_terminal_line(&ansi, "\x1b[32mCommitted\x1b[0m abc1234"),
            "Committed abc1234"
        );
        assert_eq!(clean_terminal_line(&ansi, "10%\r50%\r100% done"), "100% done");
        assert_eq!(clean_terminal_line(&ansi, "\x1b]0;title\x07Edited a.rs"), "Edited a.rs");
    }

    #[test]
    fn lookup_walks_objects_and_arrays() {
        let value = json!({"message": {"content": [{"type": "text", "text": "hi"}]}});
        assert_eq!(lookup(&value, "message.content.0.text"), Some(&json!("hi")));
        assert_eq!(lookup(&value, "message.content.1.text"), None);
        assert_eq!(lookup(&value, "message.missing"), None);
    }

    #[test]
    fn flatten_keeps_usage_numbers_verbatim() {
        let mut payload = Payload::new();
        let value = json!({
            "status": "ok",
            "usage": {"input_tokens": 1200, "cost_usd": 0.0425},
            "files": ["a.rs", "b.rs"]
        });
        flatten_into(&mut payload, "", &value);
        assert_eq!(payload["status"], json!("ok"));
        assert_eq!(payload["usage.input_tokens"], json!(1200));
        assert_eq!(payload["usage.cost_usd"], json!(0.0425));
        assert_eq!(payload["files"], json!("[\"a.rs\",\"b.rs\"]"));
    }

    #[test]
    fn flatten_stops_at_depth_limit() {
        let mut payload = Payload::new();
        let value = json!({"a": {"b": {"c": {"d": {"e": 1}}}}});
        flatten_into(&mut payload, "", &value);
        assert_eq!(payload["a.b.c.d"], json!("{\"e\":1}"));
    }

    #[test]
    fn parses_rfc3339_and_epoch_timestamps() {
        let rfc = parse_timestamp(&json!("2025-01-02T03:04:05Z")).unwrap();
        assert_eq!(rfc.timestamp(), 1_735_787_045);

        let millis = parse_timestamp(&json!(1_735_787_045_123i64)).unwrap();
        assert_eq!(millis.timestamp_millis(), 1_735_787_045_123);

        let secs = parse_timestamp(&json!("1735787045")).unwrap();
        assert_eq!(secs.timestamp(), 1_735_787_045);

        assert!(parse_timestamp(&json!("yesterday")).is_none());
    }

    #[test]
    fn discriminator_text_ignores_empty_and_containers() {
        assert_eq!(discriminator_text(&json!("say")), Some("say".to_string()));
        assert_eq!(discriminator_text(&json!(true)), Some("true".to_string()));
        assert_eq!(discriminator_text(&json!("")), None);
        assert_eq!(discriminator_text(&json!({"a": 1})), None);
    }
}
