//! Streaming text assembly
//!
//! Deltas can arrive at high frequency; patching the store on every one
//! would flood subscribers. The assembler accumulates the full text and
//! commits in batches, so arrival rate is decoupled from update rate.
//! Every pushed delta is eventually committed: `finalize` flushes the
//! remainder on any exit path, and `clear_all` guarantees nothing leaks
//! into the next turn.

use gantry_protocol::{new_id, MessageKind, MessagePatch, Role, TranscriptMessage};
use tracing::debug;

use crate::context::SessionContext;
use crate::effect::Effect;

/// Uncommitted tail size at which a delta triggers a store patch.
pub(crate) const FLUSH_THRESHOLD: usize = 256;

/// Which transcript slot this assembler feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Answer,
    Reasoning,
}

impl StreamKind {
    fn message_kind(self) -> MessageKind {
        match self {
            StreamKind::Answer => MessageKind::Text,
            StreamKind::Reasoning => MessageKind::Reasoning,
        }
    }

    fn event_type(self) -> &'static str {
        match self {
            StreamKind::Answer => "agent_message_delta",
            StreamKind::Reasoning => "agent_reasoning_delta",
        }
    }
}

/// Batched assembly of one open streaming transcript entry.
#[derive(Debug)]
pub struct StreamAssembler {
    kind: StreamKind,
    message_id: Option<String>,
    content: String,
    pending: usize,
}

impl StreamAssembler {
    pub fn new(kind: StreamKind) -> Self {
        Self {
            kind,
            message_id: None,
            content: String::new(),
            pending: 0,
        }
    }

    pub fn is_open(&self) -> bool {
        self.message_id.is_some()
    }

    pub fn message_id(&self) -> Option<&str> {
        self.message_id.as_deref()
    }

    /// Append a delta, opening the stream on first use.
    ///
    /// The first delta commits immediately so the entry appears as soon as
    /// streaming starts; afterwards the uncommitted tail is held until it
    /// reaches [`FLUSH_THRESHOLD`] bytes.
    pub fn push(&mut self, session_id: &str, delta: &str, now: &str) -> Vec<Effect> {
        match &self.message_id {
            None => {
                let id = new_id();
                self.message_id = Some(id.clone());
                self.content = delta.to_string();
                self.pending = 0;
                vec![Effect::append(TranscriptMessage {
                    id,
                    session_id: session_id.to_string(),
                    role: Role::Assistant,
                    kind: self.kind.message_kind(),
                    title: None,
                    content: self.content.clone(),
                    timestamp: now.to_string(),
                    is_streaming: true,
                    event_type: Some(self.kind.event_type().to_string()),
                    approval: None,
                    plan: None,
                })]
            }
            Some(id) => {
                self.content.push_str(delta);
                self.pending += delta.len();
                if self.pending < FLUSH_THRESHOLD {
                    return Vec::new();
                }
                self.pending = 0;
                vec![Effect::patch(
                    id.clone(),
                    MessagePatch {
                        content: Some(self.content.clone()),
                        ..Default::default()
                    },
                )]
            }
        }
    }

    /// Append a paragraph separator and commit immediately.
    ///
    /// Section breaks are structural, not content, so they bypass the
    /// batching threshold. Without an open stream this is a no-op.
    pub fn section_break(&mut self) -> Vec<Effect> {
        let Some(id) = &self.message_id else {
            debug!(
                component = "streaming",
                event = "streaming.section_break_without_stream",
                "Section break with no open stream"
            );
            return Vec::new();
        };
        self.content.push_str("\n\n");
        self.pending = 0;
        vec![Effect::patch(
            id.clone(),
            MessagePatch {
                content: Some(self.content.clone()),
                ..Default::default()
            },
        )]
    }

    /// Close the stream: flush the remainder when `commit` is set and clear
    /// the streaming flag. Idempotent — a closed assembler does nothing.
    pub fn finalize(&mut self, commit: bool) -> Vec<Effect> {
        let Some(id) = self.message_id.take() else {
            return Vec::new();
        };
        let changes = if commit {
            MessagePatch {
                content: Some(std::mem::take(&mut self.content)),
                is_streaming: Some(false),
                ..Default::default()
            }
        } else {
            self.content.clear();
            MessagePatch {
                is_streaming: Some(false),
                ..Default::default()
            }
        };
        self.pending = 0;
        vec![Effect::patch(id, changes)]
    }

    /// Replace the accumulated text with the backend's authoritative full
    /// message and close the stream. Opens a complete, non-streaming entry
    /// when no stream was in progress.
    pub fn replace_and_finalize(&mut self, session_id: &str, text: String, now: &str) -> Vec<Effect> {
        match self.message_id.take() {
            Some(id) => {
                self.content.clear();
                self.pending = 0;
                vec![Effect::patch(
                    id,
                    MessagePatch {
                        content: Some(text),
                        is_streaming: Some(false),
                        ..Default::default()
                    },
                )]
            }
            None => vec![Effect::append(TranscriptMessage {
                id: new_id(),
                session_id: session_id.to_string(),
                role: Role::Assistant,
                kind: self.kind.message_kind(),
                title: None,
                content: text,
                timestamp: now.to_string(),
                is_streaming: false,
                event_type: Some(self.kind.event_type().to_string()),
                approval: None,
                plan: None,
            })],
        }
    }

    /// Hard reset with no commits. Used at turn start so residue from an
    /// ill-terminated turn cannot leak into a new one.
    pub fn clear_all(&mut self) {
        self.message_id = None;
        self.content.clear();
        self.pending = 0;
    }
}

// ---------------------------------------------------------------------------
// Message and reasoning handlers
// ---------------------------------------------------------------------------

pub(crate) fn handle_user_message(
    ctx: &mut SessionContext,
    message: String,
    now: &str,
) -> Vec<Effect> {
    let session_id = ctx.session_id().to_string();
    vec![Effect::append(TranscriptMessage {
        id: new_id(),
        session_id,
        role: Role::User,
        kind: MessageKind::Text,
        title: None,
        content: message,
        timestamp: now.to_string(),
        is_streaming: false,
        event_type: Some("user_message".to_string()),
        approval: None,
        plan: None,
    })]
}

pub(crate) fn handle_agent_message_delta(
    ctx: &mut SessionContext,
    delta: &str,
    now: &str,
) -> Vec<Effect> {
    let session_id = ctx.session_id().to_string();
    let mut effects = Vec::new();
    // An answer stream opening while reasoning is still streaming closes
    // the reasoning entry first.
    if !ctx.answer.is_open() {
        effects.extend(ctx.reasoning.finalize(true));
    }
    effects.extend(ctx.answer.push(&session_id, delta, now));
    effects
}

pub(crate) fn handle_agent_message(
    ctx: &mut SessionContext,
    message: String,
    now: &str,
) -> Vec<Effect> {
    let session_id = ctx.session_id().to_string();
    let mut effects = ctx.reasoning.finalize(true);
    effects.extend(ctx.answer.replace_and_finalize(&session_id, message, now));
    effects
}

pub(crate) fn handle_agent_reasoning_delta(
    ctx: &mut SessionContext,
    delta: &str,
    now: &str,
) -> Vec<Effect> {
    let session_id = ctx.session_id().to_string();
    let mut effects = Vec::new();
    if !ctx.reasoning.is_open() {
        effects.extend(ctx.answer.finalize(true));
    }
    effects.extend(ctx.reasoning.push(&session_id, delta, now));
    effects
}

pub(crate) fn handle_agent_reasoning(
    ctx: &mut SessionContext,
    text: String,
    now: &str,
) -> Vec<Effect> {
    let session_id = ctx.session_id().to_string();
    ctx.reasoning.replace_and_finalize(&session_id, text, now)
}

pub(crate) fn handle_reasoning_section_break(ctx: &mut SessionContext) -> Vec<Effect> {
    ctx.reasoning.section_break()
}
