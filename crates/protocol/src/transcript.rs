//! Transcript data model
//!
//! The engine only appends messages and patches them by id; the store that
//! holds them (and the UI reading it) lives outside this crate.

use serde::{Deserialize, Serialize};

use crate::approvals::{ApprovalRequest, PlanUpdate};

/// Who a transcript entry speaks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
    Approval,
}

/// What kind of content an entry carries, for styling and filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Text,
    Reasoning,
    Exec,
    Patch,
    McpTool,
    WebSearch,
    Diff,
    Plan,
    Approval,
    Error,
}

/// One entry in the conversation transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptMessage {
    pub id: String,
    pub session_id: String,
    pub role: Role,
    pub kind: MessageKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub content: String,
    pub timestamp: String,
    #[serde(default)]
    pub is_streaming: bool,
    /// Wire discriminant of the event that produced this entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval: Option<ApprovalRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<PlanUpdate>,
}

/// Fields to merge into an existing transcript entry.
///
/// `None` means "leave unchanged". Clearing a field is not expressible on
/// purpose: the engine only ever replaces content, never erases it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessagePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_streaming: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval: Option<ApprovalRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<PlanUpdate>,
}

impl TranscriptMessage {
    /// Merge a patch into this entry.
    pub fn apply(&mut self, patch: &MessagePatch) {
        if let Some(title) = &patch.title {
            self.title = Some(title.clone());
        }
        if let Some(content) = &patch.content {
            self.content = content.clone();
        }
        if let Some(is_streaming) = patch.is_streaming {
            self.is_streaming = is_streaming;
        }
        if let Some(approval) = &patch.approval {
            self.approval = Some(approval.clone());
        }
        if let Some(plan) = &patch.plan {
            self.plan = Some(plan.clone());
        }
    }
}

/// Cumulative token accounting reported by the backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cached_tokens: u64,
    pub context_window: u64,
}

impl TokenUsage {
    /// Context fill percentage, zero when the window is unknown.
    pub fn context_fill_percent(&self) -> f64 {
        if self.context_window == 0 {
            return 0.0;
        }
        (self.input_tokens as f64 / self.context_window as f64) * 100.0
    }
}
