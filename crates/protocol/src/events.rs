//! The backend event feed
//!
//! Events arrive as a single ordered stream per backend connection. The
//! union is closed and versioned on the backend side; this crate mirrors it
//! and collapses discriminants it does not know into [`EventMsg::Unknown`]
//! so a newer backend never breaks deserialization of the feed.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::approvals::{FileChange, PlanUpdate};
use crate::transcript::TokenUsage;

/// One event from the backend, optionally scoped to a session.
///
/// A missing `session_id` marks a broadcast event: it applies to whichever
/// session pipeline it is delivered to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(flatten)]
    pub msg: EventMsg,
}

impl AgentEvent {
    /// A session-agnostic (broadcast) event.
    pub fn broadcast(msg: EventMsg) -> Self {
        Self {
            session_id: None,
            msg,
        }
    }

    /// An event addressed to one session.
    pub fn for_session(session_id: impl Into<String>, msg: EventMsg) -> Self {
        Self {
            session_id: Some(session_id.into()),
            msg,
        }
    }
}

/// The event union, keyed by a `type` discriminant on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventMsg {
    // -- Session / turn lifecycle -----------------------------------------
    TaskStarted,
    TaskComplete {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        last_agent_message: Option<String>,
    },
    TurnComplete,
    TurnAborted {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    Error {
        message: String,
    },
    ShutdownComplete,
    /// Backend-assigned identifiers needed to resume this session later.
    SessionConfigured {
        session_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        model: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        history_entry_count: Option<u64>,
    },

    // -- Messages and reasoning -------------------------------------------
    UserMessage {
        message: String,
    },
    AgentMessage {
        message: String,
    },
    AgentMessageDelta {
        delta: String,
    },
    AgentReasoning {
        text: String,
    },
    AgentReasoningDelta {
        delta: String,
    },
    AgentReasoningSectionBreak,

    // -- Commands and tools ------------------------------------------------
    ExecCommandBegin {
        call_id: String,
        command: Vec<String>,
        cwd: String,
    },
    ExecCommandEnd {
        call_id: String,
        exit_code: i32,
        #[serde(default)]
        stdout: String,
        #[serde(default)]
        stderr: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        duration_ms: Option<u64>,
    },
    PatchApplyBegin {
        call_id: String,
        #[serde(default)]
        auto_approved: bool,
        changes: HashMap<PathBuf, FileChange>,
    },
    PatchApplyEnd {
        call_id: String,
        success: bool,
        #[serde(default)]
        stdout: String,
        #[serde(default)]
        stderr: String,
    },
    McpToolCallBegin {
        call_id: String,
        server: String,
        tool: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        arguments: Option<serde_json::Value>,
    },
    McpToolCallEnd {
        call_id: String,
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<serde_json::Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        duration_ms: Option<u64>,
    },
    WebSearchBegin {
        call_id: String,
    },
    WebSearchEnd {
        call_id: String,
        query: String,
    },

    // -- Approvals ----------------------------------------------------------
    ExecApprovalRequest {
        call_id: String,
        command: Vec<String>,
        cwd: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    PatchApprovalRequest {
        call_id: String,
        patch: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        files: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    ApplyPatchApprovalRequest {
        call_id: String,
        changes: HashMap<PathBuf, FileChange>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        grant_root: Option<PathBuf>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },

    // -- Turn metadata -------------------------------------------------------
    TurnDiff {
        unified_diff: String,
    },
    PlanUpdate(PlanUpdate),
    TokenCount(TokenUsage),

    /// Any discriminant this version does not know.
    #[serde(other)]
    Unknown,
}

impl EventMsg {
    /// The wire discriminant, for diagnostics and transcript tagging.
    pub fn name(&self) -> &'static str {
        match self {
            EventMsg::TaskStarted => "task_started",
            EventMsg::TaskComplete { .. } => "task_complete",
            EventMsg::TurnComplete => "turn_complete",
            EventMsg::TurnAborted { .. } => "turn_aborted",
            EventMsg::Error { .. } => "error",
            EventMsg::ShutdownComplete => "shutdown_complete",
            EventMsg::SessionConfigured { .. } => "session_configured",
            EventMsg::UserMessage { .. } => "user_message",
            EventMsg::AgentMessage { .. } => "agent_message",
            EventMsg::AgentMessageDelta { .. } => "agent_message_delta",
            EventMsg::AgentReasoning { .. } => "agent_reasoning",
            EventMsg::AgentReasoningDelta { .. } => "agent_reasoning_delta",
            EventMsg::AgentReasoningSectionBreak => "agent_reasoning_section_break",
            EventMsg::ExecCommandBegin { .. } => "exec_command_begin",
            EventMsg::ExecCommandEnd { .. } => "exec_command_end",
            EventMsg::PatchApplyBegin { .. } => "patch_apply_begin",
            EventMsg::PatchApplyEnd { .. } => "patch_apply_end",
            EventMsg::McpToolCallBegin { .. } => "mcp_tool_call_begin",
            EventMsg::McpToolCallEnd { .. } => "mcp_tool_call_end",
            EventMsg::WebSearchBegin { .. } => "web_search_begin",
            EventMsg::WebSearchEnd { .. } => "web_search_end",
            EventMsg::ExecApprovalRequest { .. } => "exec_approval_request",
            EventMsg::PatchApprovalRequest { .. } => "patch_approval_request",
            EventMsg::ApplyPatchApprovalRequest { .. } => "apply_patch_approval_request",
            EventMsg::TurnDiff { .. } => "turn_diff",
            EventMsg::PlanUpdate(_) => "plan_update",
            EventMsg::TokenCount(_) => "token_count",
            EventMsg::Unknown => "unknown",
        }
    }
}
