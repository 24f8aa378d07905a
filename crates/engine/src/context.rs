//! Per-session mutable state
//!
//! One `SessionContext` exists per attached session. It is owned by that
//! session's pipeline task and passed `&mut` into every handler — nothing
//! here is shared or locked. Observers read the immutable
//! [`ContextSnapshot`] the pipeline publishes instead.

use gantry_protocol::{ApprovalRequest, TokenUsage};

use crate::streaming::{StreamAssembler, StreamKind};

/// The one shell command whose begin/end pair is currently open.
///
/// At most one command is open per session at a time. That holds by
/// construction of the current backend protocol, not by contract; other
/// tool kinds use [`SessionContext::open_calls`] instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InFlightCommand {
    pub call_id: String,
    pub message_id: String,
    pub command: String,
    pub cwd: String,
}

/// A non-exec unit of work (patch apply, MCP call, web search) awaiting
/// its end event, matched by call id.
#[derive(Debug, Clone)]
pub struct OpenCall {
    pub call_id: String,
    pub message_id: String,
    /// Short label reused in the end event's status title.
    pub label: String,
}

/// A surfaced manual-approval entry that has not been confirmed executed.
#[derive(Debug, Clone)]
pub struct PendingApproval {
    pub message_id: String,
    pub request: ApprovalRequest,
}

/// All mutable state for one session's event pipeline.
pub struct SessionContext {
    session_id: String,
    /// Session policy: resolve approval requests without human input.
    pub auto_approve: bool,
    /// True between a turn-start event and its terminal event.
    pub loading: bool,
    /// Assistant-answer stream slot.
    pub answer: StreamAssembler,
    /// Reasoning stream slot.
    pub reasoning: StreamAssembler,
    pub in_flight_command: Option<InFlightCommand>,
    pub open_calls: Vec<OpenCall>,
    pub pending_approvals: Vec<PendingApproval>,
    /// Most recent unified diff, for duplicate-notification suppression.
    pub last_turn_diff: Option<String>,
    /// Plan entry patched in place across updates within a turn.
    pub plan_message_id: Option<String>,
    /// Identifier the backend assigned to this session, needed for resume.
    pub backend_session_id: Option<String>,
    pub resume_path: Option<String>,
    pub token_usage: TokenUsage,
    pub turn_count: u64,
}

impl SessionContext {
    pub fn new(session_id: impl Into<String>, auto_approve: bool) -> Self {
        Self {
            session_id: session_id.into(),
            auto_approve,
            loading: false,
            answer: StreamAssembler::new(StreamKind::Answer),
            reasoning: StreamAssembler::new(StreamKind::Reasoning),
            in_flight_command: None,
            open_calls: Vec::new(),
            pending_approvals: Vec::new(),
            last_turn_diff: None,
            plan_message_id: None,
            backend_session_id: None,
            resume_path: None,
            token_usage: TokenUsage::default(),
            turn_count: 0,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Whether an inbound event belongs to this session.
    ///
    /// Events without a session id are broadcast and always match. Ids may
    /// carry a transport scheme prefix, so both sides are compared raw and
    /// normalized.
    pub fn matches_session(&self, event_session: Option<&str>) -> bool {
        let Some(id) = event_session else {
            return true;
        };
        id == self.session_id
            || normalize_session_id(id) == normalize_session_id(&self.session_id)
    }

    /// Hard reset of everything a new turn must not inherit.
    ///
    /// Idempotent: calling it twice leaves the context identical to one
    /// call. Leftover partials from an ill-terminated prior turn are
    /// dropped, not committed.
    pub fn reset_for_new_turn(&mut self) {
        self.answer.clear_all();
        self.reasoning.clear_all();
        self.plan_message_id = None;
        self.loading = true;
    }

    pub fn snapshot(&self) -> ContextSnapshot {
        ContextSnapshot {
            session_id: self.session_id.clone(),
            loading: self.loading,
            streaming_message_id: self.answer.message_id().map(String::from),
            reasoning_message_id: self.reasoning.message_id().map(String::from),
            in_flight_command: self.in_flight_command.clone(),
            open_call_count: self.open_calls.len(),
            pending_approval_count: self.pending_approvals.len(),
            last_turn_diff: self.last_turn_diff.clone(),
            backend_session_id: self.backend_session_id.clone(),
            resume_path: self.resume_path.clone(),
            token_usage: self.token_usage.clone(),
            turn_count: self.turn_count,
        }
    }
}

/// Read-only view of a session context, published via `ArcSwap`.
#[derive(Debug, Clone)]
pub struct ContextSnapshot {
    pub session_id: String,
    pub loading: bool,
    pub streaming_message_id: Option<String>,
    pub reasoning_message_id: Option<String>,
    pub in_flight_command: Option<InFlightCommand>,
    pub open_call_count: usize,
    pub pending_approval_count: usize,
    pub last_turn_diff: Option<String>,
    pub backend_session_id: Option<String>,
    pub resume_path: Option<String>,
    pub token_usage: TokenUsage,
    pub turn_count: u64,
}

impl ContextSnapshot {
    pub fn empty(session_id: impl Into<String>) -> Self {
        SessionContext::new(session_id, false).snapshot()
    }
}

/// Strip a transport scheme prefix (`"<scheme>:<id>"`) from a session id.
pub fn normalize_session_id(id: &str) -> &str {
    match id.split_once(':') {
        Some((scheme, rest)) if !scheme.is_empty() && !rest.is_empty() => rest,
        _ => id,
    }
}
