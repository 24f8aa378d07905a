//! Gantry Engine
//!
//! The event-stream processor behind the Gantry shell. It consumes the
//! ordered event feed of one agent backend session and incrementally
//! reconstructs the user-visible transcript: token-by-token streaming
//! assembly, reasoning/answer separation, command begin-end correlation,
//! approval gating, and turn lifecycle tracking.
//!
//! The core is a pure routing function (`process_event`) that mutates a
//! per-session [`SessionContext`] and returns [`Effect`]s; the
//! [`SessionPipeline`] actor owns the context, executes effects against the
//! embedder's [`TranscriptStore`] and [`BackendRpc`], and publishes
//! lock-free snapshots.

pub mod approvals;
pub mod commands;
pub mod context;
pub mod effect;
pub mod lifecycle;
pub mod pipeline;
pub mod registry;
pub mod router;
pub mod rpc;
pub mod store;
pub mod streaming;

pub use context::{ContextSnapshot, InFlightCommand, SessionContext};
pub use effect::{Effect, RpcCall, TranscriptOp};
pub use pipeline::{PipelineConfig, PipelineHandle, SessionPipeline, StopStreamFn};
pub use registry::Registry;
pub use router::process_event;
pub use rpc::{BackendRpc, RpcError};
pub use store::{MemoryTranscript, TranscriptStore};
