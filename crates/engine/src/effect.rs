//! Effects
//!
//! Handlers never perform IO. They describe it: transcript mutations,
//! backend RPCs to detach, and environment callbacks. The pipeline
//! executes the list in order.

use gantry_protocol::{MessagePatch, ReviewDecision, TranscriptMessage};

#[derive(Debug, Clone)]
pub enum Effect {
    Transcript(TranscriptOp),
    /// Fire-and-forget backend call; the handler has already returned by
    /// the time it resolves.
    Rpc(RpcCall),
    /// Ask the environment to stop any client-side streaming playback.
    StopStream,
}

#[derive(Debug, Clone)]
pub enum TranscriptOp {
    Append(Box<TranscriptMessage>),
    Patch {
        message_id: String,
        changes: MessagePatch,
    },
    SetLoading(bool),
}

#[derive(Debug, Clone)]
pub enum RpcCall {
    ApproveExec {
        request_id: String,
        decision: ReviewDecision,
    },
    ApprovePatch {
        request_id: String,
        decision: ReviewDecision,
    },
    ApproveApplyPatch {
        request_id: String,
        decision: ReviewDecision,
    },
    ResolveResumePath {
        backend_session_id: String,
    },
}

impl Effect {
    pub fn append(message: TranscriptMessage) -> Self {
        Effect::Transcript(TranscriptOp::Append(Box::new(message)))
    }

    pub fn patch(message_id: impl Into<String>, changes: MessagePatch) -> Self {
        Effect::Transcript(TranscriptOp::Patch {
            message_id: message_id.into(),
            changes,
        })
    }

    pub fn set_loading(loading: bool) -> Self {
        Effect::Transcript(TranscriptOp::SetLoading(loading))
    }
}
