//! Command and tool correlation
//!
//! Every long-running unit of work gets exactly one transcript entry at its
//! begin event; the matching end event patches that same entry in place with
//! a status-annotated title and the captured output. Shell commands use the
//! single in-flight slot; patch applies, MCP calls and web searches are
//! matched by call id. An end without an open begin is a logged no-op —
//! the begin may have been dropped by the session filter.

use std::collections::HashMap;
use std::path::PathBuf;

use gantry_protocol::{new_id, FileChange, MessageKind, MessagePatch, Role, TranscriptMessage};
use tracing::{debug, warn};

use crate::approvals::{confirm_executed, summarize_changes};
use crate::context::{InFlightCommand, OpenCall, SessionContext};
use crate::effect::Effect;

/// Join an argv into its display form.
pub(crate) fn shell_display(command: &[String]) -> String {
    command.join(" ")
}

/// Wrap captured output for fixed-width display.
pub(crate) fn render_output(stdout: &str, stderr: &str) -> String {
    let mut combined = String::new();
    if !stdout.trim().is_empty() {
        combined.push_str(stdout.trim_end());
    }
    if !stderr.trim().is_empty() {
        if !combined.is_empty() {
            combined.push('\n');
        }
        combined.push_str(stderr.trim_end());
    }
    if combined.is_empty() {
        combined.push_str("(no output)");
    }
    format!("```text\n{}\n```", combined)
}

fn render_json(value: &serde_json::Value) -> String {
    let pretty = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
    format!("```json\n{}\n```", pretty)
}

// ---------------------------------------------------------------------------
// Shell commands — single in-flight slot
// ---------------------------------------------------------------------------

pub(crate) fn handle_exec_command_begin(
    ctx: &mut SessionContext,
    call_id: String,
    command: Vec<String>,
    cwd: String,
    now: &str,
) -> Vec<Effect> {
    let session_id = ctx.session_id().to_string();
    let display = shell_display(&command);
    let mut effects = confirm_executed(ctx, &call_id);

    if let Some(prev) = &ctx.in_flight_command {
        // The slot holds one command at a time; an overlapping begin
        // orphans the previous entry's end correlation.
        warn!(
            component = "commands",
            event = "commands.overlapping_begin",
            session_id = %session_id,
            previous_call_id = %prev.call_id,
            call_id = %call_id,
            "Command begin while another command is open"
        );
    }

    let message_id = new_id();
    effects.push(Effect::append(TranscriptMessage {
        id: message_id.clone(),
        session_id,
        role: Role::System,
        kind: MessageKind::Exec,
        title: Some(format!("$ {}", display)),
        content: String::new(),
        timestamp: now.to_string(),
        is_streaming: false,
        event_type: Some("exec_command_begin".to_string()),
        approval: None,
        plan: None,
    }));
    ctx.in_flight_command = Some(InFlightCommand {
        call_id,
        message_id,
        command: display,
        cwd,
    });
    effects
}

pub(crate) fn handle_exec_command_end(
    ctx: &mut SessionContext,
    call_id: &str,
    exit_code: i32,
    stdout: &str,
    stderr: &str,
) -> Vec<Effect> {
    let Some(open) = ctx.in_flight_command.take() else {
        debug!(
            component = "commands",
            event = "commands.end_without_begin",
            session_id = %ctx.session_id(),
            call_id = %call_id,
            "Command end with no open command"
        );
        return Vec::new();
    };
    // The stored reference wins over the id carried by the end event.
    if open.call_id != call_id {
        warn!(
            component = "commands",
            event = "commands.call_id_mismatch",
            session_id = %ctx.session_id(),
            open_call_id = %open.call_id,
            end_call_id = %call_id,
            "Command end id differs from the open command"
        );
    }

    let title = if exit_code == 0 {
        format!("✓ {}", open.command)
    } else {
        format!("✗ {} (exit {})", open.command, exit_code)
    };
    vec![Effect::patch(
        open.message_id,
        MessagePatch {
            title: Some(title),
            content: Some(render_output(stdout, stderr)),
            ..Default::default()
        },
    )]
}

// ---------------------------------------------------------------------------
// Patch applies, MCP tool calls, web searches — matched by call id
// ---------------------------------------------------------------------------

fn take_open_call(ctx: &mut SessionContext, call_id: &str) -> Option<OpenCall> {
    let index = ctx.open_calls.iter().position(|c| c.call_id == call_id)?;
    Some(ctx.open_calls.remove(index))
}

pub(crate) fn handle_patch_apply_begin(
    ctx: &mut SessionContext,
    call_id: String,
    auto_approved: bool,
    changes: &HashMap<PathBuf, FileChange>,
    now: &str,
) -> Vec<Effect> {
    let session_id = ctx.session_id().to_string();
    let mut effects = confirm_executed(ctx, &call_id);

    let title = if auto_approved {
        "Applying patch (auto-approved)".to_string()
    } else {
        "Applying patch".to_string()
    };
    let message_id = new_id();
    effects.push(Effect::append(TranscriptMessage {
        id: message_id.clone(),
        session_id,
        role: Role::System,
        kind: MessageKind::Patch,
        title: Some(title),
        content: format!("```text\n{}\n```", summarize_changes(changes, None)),
        timestamp: now.to_string(),
        is_streaming: false,
        event_type: Some("patch_apply_begin".to_string()),
        approval: None,
        plan: None,
    }));
    ctx.open_calls.push(OpenCall {
        call_id,
        message_id,
        label: "Patch".to_string(),
    });
    effects
}

pub(crate) fn handle_patch_apply_end(
    ctx: &mut SessionContext,
    call_id: &str,
    success: bool,
    stdout: &str,
    stderr: &str,
) -> Vec<Effect> {
    let Some(open) = take_open_call(ctx, call_id) else {
        debug!(
            component = "commands",
            event = "commands.end_without_begin",
            session_id = %ctx.session_id(),
            call_id = %call_id,
            "Patch end with no open patch apply"
        );
        return Vec::new();
    };
    let title = if success {
        format!("✓ {} applied", open.label)
    } else {
        format!("✗ {} failed", open.label)
    };
    vec![Effect::patch(
        open.message_id,
        MessagePatch {
            title: Some(title),
            content: Some(render_output(stdout, stderr)),
            ..Default::default()
        },
    )]
}

pub(crate) fn handle_mcp_tool_call_begin(
    ctx: &mut SessionContext,
    call_id: String,
    server: &str,
    tool: &str,
    arguments: Option<&serde_json::Value>,
    now: &str,
) -> Vec<Effect> {
    let session_id = ctx.session_id().to_string();
    let label = format!("{}:{}", server, tool);
    let message_id = new_id();
    let effects = vec![Effect::append(TranscriptMessage {
        id: message_id.clone(),
        session_id,
        role: Role::System,
        kind: MessageKind::McpTool,
        title: Some(label.clone()),
        content: arguments.map(render_json).unwrap_or_default(),
        timestamp: now.to_string(),
        is_streaming: false,
        event_type: Some("mcp_tool_call_begin".to_string()),
        approval: None,
        plan: None,
    })];
    ctx.open_calls.push(OpenCall {
        call_id,
        message_id,
        label,
    });
    effects
}

pub(crate) fn handle_mcp_tool_call_end(
    ctx: &mut SessionContext,
    call_id: &str,
    success: bool,
    result: Option<&serde_json::Value>,
) -> Vec<Effect> {
    let Some(open) = take_open_call(ctx, call_id) else {
        debug!(
            component = "commands",
            event = "commands.end_without_begin",
            session_id = %ctx.session_id(),
            call_id = %call_id,
            "MCP end with no open tool call"
        );
        return Vec::new();
    };
    let title = if success {
        format!("✓ {}", open.label)
    } else {
        format!("✗ {}", open.label)
    };
    let content = result
        .map(render_json)
        .unwrap_or_else(|| "(no result)".to_string());
    vec![Effect::patch(
        open.message_id,
        MessagePatch {
            title: Some(title),
            content: Some(content),
            ..Default::default()
        },
    )]
}

pub(crate) fn handle_web_search_begin(
    ctx: &mut SessionContext,
    call_id: String,
    now: &str,
) -> Vec<Effect> {
    let session_id = ctx.session_id().to_string();
    let message_id = new_id();
    let effects = vec![Effect::append(TranscriptMessage {
        id: message_id.clone(),
        session_id,
        role: Role::System,
        kind: MessageKind::WebSearch,
        title: Some("Searching the web".to_string()),
        content: String::new(),
        timestamp: now.to_string(),
        is_streaming: false,
        event_type: Some("web_search_begin".to_string()),
        approval: None,
        plan: None,
    })];
    ctx.open_calls.push(OpenCall {
        call_id,
        message_id,
        label: "Web search".to_string(),
    });
    effects
}

pub(crate) fn handle_web_search_end(
    ctx: &mut SessionContext,
    call_id: &str,
    query: &str,
) -> Vec<Effect> {
    let Some(open) = take_open_call(ctx, call_id) else {
        debug!(
            component = "commands",
            event = "commands.end_without_begin",
            session_id = %ctx.session_id(),
            call_id = %call_id,
            "Web search end with no open search"
        );
        return Vec::new();
    };
    vec![Effect::patch(
        open.message_id,
        MessagePatch {
            title: Some(format!("✓ Searched: {}", query)),
            ..Default::default()
        },
    )]
}
