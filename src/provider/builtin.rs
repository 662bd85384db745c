//! Mapping tables for the agent CLIs supported out of the box

use regex::Regex;

use super::mapping::{DeltaSpec, ProviderMapping, TextPattern};
use crate::normalize::event::EventKind;
use crate::stream::FramingMode;

/// Text markers every registered provider recognizes on plain-text lines
fn with_common_patterns(mapping: ProviderMapping) -> Result<ProviderMapping, regex::Error> {
    Ok(mapping
        .pattern(TextPattern::new(
            r"^Committed (?P<hash>[0-9a-f]{7,40})\b\s*(?P<message>.*)$",
            EventKind::GitCommit,
        )?)
        .pattern(
            TextPattern::new(r"^Edited (?P<path>\S.*)$", EventKind::FileOperation)?
                .with_field("operation", "edit"),
        )
        .pattern(
            TextPattern::new(r"^Created (?P<path>\S.*)$", EventKind::FileOperation)?
                .with_field("operation", "create"),
        )
        .pattern(TextPattern::new(
            r"(?i)^(?:error|fatal):\s*(?P<message>.+)$",
            EventKind::Error,
        )?))
}

/// Canonical NDJSON: `type` already names the unified kind
pub fn generic() -> Result<ProviderMapping, regex::Error> {
    with_common_patterns(
        ProviderMapping::new("generic")
            .discriminate(&["type"])
            .emit("message", EventKind::Message)
            .emit("assistant", EventKind::Message)
            .emit("tool_use", EventKind::ToolUse)
            .emit("tool_call", EventKind::ToolUse)
            .emit("tool_result", EventKind::ToolResult)
            .emit("file_operation", EventKind::FileOperation)
            .emit("file_edit", EventKind::FileOperation)
            .emit("git_commit", EventKind::GitCommit)
            .emit("commit", EventKind::GitCommit)
            .emit("completion", EventKind::Completion)
            .emit("result", EventKind::Completion)
            .emit("error", EventKind::Error)
            .delta("delta", DeltaSpec::append("text").keyed_by("turn_id"))
            .noise(&["heartbeat", "ping"])
            .timestamps(&["timestamp", "ts", "time"]),
    )
}

/// `claude -p --output-format stream-json`
pub fn claude() -> Result<ProviderMapping, regex::Error> {
    with_common_patterns(
        ProviderMapping::new("claude")
            .discriminate(&["type", "message.content.0.type", "event.type", "event.delta.type"])
            .noise(&["system", "user", "assistant:thinking", "stream_event"])
            .emit_with(
                "assistant:text",
                EventKind::Message,
                &[("message.content.0.text", "text"), ("message.id", "message_id")],
            )
            .emit_with(
                "assistant:tool_use",
                EventKind::ToolUse,
                &[
                    ("message.content.0.name", "name"),
                    ("message.content.0.id", "tool_use_id"),
                    ("message.content.0.input", "input"),
                    ("message.content.0.input.command", "command"),
                    ("message.content.0.input.file_path", "path"),
                ],
            )
            .emit_with(
                "user:tool_result",
                EventKind::ToolResult,
                &[
                    ("message.content.0.tool_use_id", "tool_use_id"),
                    ("message.content.0.content", "output"),
                    ("message.content.0.is_error", "is_error"),
                ],
            )
            .emit_with(
                "result",
                EventKind::Completion,
                &[("subtype", "status"), ("result", "text")],
            )
            .delta(
                "stream_event:content_block_delta:text_delta",
                DeltaSpec::append("event.delta.text").keyed_by("event.index"),
            )
            .timestamps(&["timestamp"])
            .state_dir("~/.claude/projects/{project}"),
    )
}

/// `codex exec --json`
pub fn codex() -> Result<ProviderMapping, regex::Error> {
    with_common_patterns(
        ProviderMapping::new("codex")
            .discriminate(&["type", "item.type"])
            .noise(&[
                "thread.started",
                "turn.started",
                "item.started",
                "item.updated",
                "item.completed:reasoning",
                "item.completed:todo_list",
            ])
            .emit_with(
                "item.started:command_execution",
                EventKind::ToolUse,
                &[("item.id", "item_id"), ("item.command", "command")],
            )
            .emit_with(
                "item.completed:command_execution",
                EventKind::ToolResult,
                &[
                    ("item.id", "item_id"),
                    ("item.command", "command"),
                    ("item.aggregated_output", "output"),
                    ("item.exit_code", "exit_code"),
                ],
            )
            .emit_with(
                "item.started:mcp_tool_call",
                EventKind::ToolUse,
                &[("item.id", "item_id"), ("item.tool", "name")],
            )
            .emit_with(
                "item.completed:mcp_tool_call",
                EventKind::ToolResult,
                &[("item.id", "item_id"), ("item.tool", "name")],
            )
            .emit_with(
                "item.completed:agent_message",
                EventKind::Message,
                &[("item.text", "text")],
            )
            .emit_with(
                "item.completed:file_change",
                EventKind::FileOperation,
                &[("item.changes.0.path", "path"), ("item.changes.0.kind", "operation")],
            )
            .emit_with(
                "item.completed:error",
                EventKind::Error,
                &[("item.message", "message")],
            )
            .emit("turn.completed", EventKind::Completion)
            .emit_with("turn.failed", EventKind::Error, &[("error.message", "message")])
            .emit("error", EventKind::Error)
            .state_dir("~/.codex/sessions"),
    )
}

/// `gemini --output-format stream-json`
pub fn gemini() -> Result<ProviderMapping, regex::Error> {
    with_common_patterns(
        ProviderMapping::new("gemini")
            .discriminate(&["type", "role", "delta"])
            .noise(&["init", "message:user"])
            .delta("message:assistant:true", DeltaSpec::append("content"))
            .emit_with("message:assistant", EventKind::Message, &[("content", "text")])
            .emit_with(
                "tool_use",
                EventKind::ToolUse,
                &[("tool_name", "name"), ("tool_id", "tool_use_id")],
            )
            .emit_with("tool_result", EventKind::ToolResult, &[("tool_id", "tool_use_id")])
            .emit("error", EventKind::Error)
            .emit("result", EventKind::Completion)
            .timestamps(&["timestamp"])
            .state_dir("~/.gemini/tmp/{project_hash}"),
    )
}

/// Cline CLI JSON output: pretty-printed `say`/`ask` blocks
pub fn cline() -> Result<ProviderMapping, regex::Error> {
    with_common_patterns(
        ProviderMapping::new("cline")
            .framing(FramingMode::BlockDelimited)
            .discriminate(&["type", "say", "ask", "partial"])
            .noise(&[
                "say:task",
                "say:api_req_started",
                "say:api_req_finished",
                "say:checkpoint_created",
                "say:reasoning",
                "say:user_feedback",
                "ask:resume_task",
            ])
            .delta("say:text:true", DeltaSpec::replace("text").keyed_by("ts"))
            .emit("say:text", EventKind::Message)
            .emit("ask:followup", EventKind::Message)
            .emit_with("say:command", EventKind::ToolUse, &[("text", "command")])
            .emit_with("ask:command", EventKind::ToolUse, &[("text", "command")])
            .emit_with("say:command_output", EventKind::ToolResult, &[("text", "output")])
            .emit("say:tool", EventKind::ToolUse)
            .emit("ask:tool", EventKind::ToolUse)
            .emit("say:completion_result", EventKind::Completion)
            .emit("ask:completion_result", EventKind::Completion)
            .emit("say:error", EventKind::Error)
            .emit("ask:api_req_failed", EventKind::Error)
            .timestamps(&["ts"]),
    )
}

/// Aider's terminal output; it has no structured mode
pub fn aider() -> Result<ProviderMapping, regex::Error> {
    let mapping = ProviderMapping::new("aider")
        .framing(FramingMode::PlainText)
        .discriminate(&[])
        .pattern(TextPattern::new(
            r"^Commit (?P<hash>[0-9a-f]{7,40}) (?P<message>.+)$",
            EventKind::GitCommit,
        )?)
        .pattern(
            TextPattern::new(r"^Applied edit to (?P<path>\S.*)$", EventKind::FileOperation)?
                .with_field("operation", "edit"),
        )
        .pattern(TextPattern::new(r"^Tokens: (?P<usage>.+)$", EventKind::Completion)?)
        .text_noise(Regex::new(r"^[─━-]{3,}$")?)
        .text_noise(Regex::new(r"^>\s*$")?)
        .state_dir(".")
        .watch(&[".aider.chat.history.md", ".aider.input.history"]);
    with_common_patterns(mapping)
}

pub fn all() -> Result<Vec<ProviderMapping>, regex::Error> {
    Ok(vec![generic()?, claude()?, codex()?, gemini()?, cline()?, aider()?])
}
