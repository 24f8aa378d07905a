//! Gantry Protocol
//!
//! Shared types for the Gantry transcript engine: the event feed emitted by
//! an agent backend, and the transcript/approval data model read by
//! embedders. Everything here is plain serializable data.

use uuid::Uuid;

pub mod approvals;
pub mod events;
pub mod transcript;

pub use approvals::{
    ApprovalKind, ApprovalRequest, ApprovalStatus, FileChange, PlanStep, PlanUpdate,
    ReviewDecision, StepStatus,
};
pub use events::{AgentEvent, EventMsg};
pub use transcript::{MessageKind, MessagePatch, Role, TokenUsage, TranscriptMessage};

/// Generate a new unique ID
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}
