//! Backend RPC seam
//!
//! Everything the engine asks of the backend is asynchronous and may fail.
//! Calls are issued fire-and-forget from handlers (via [`crate::effect::RpcCall`]);
//! failures come back as transcript system messages or log lines, never as
//! errors through the router.

use futures::future::BoxFuture;
use gantry_protocol::ReviewDecision;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error("request rejected by backend: {0}")]
    Rejected(String),

    #[error("transport error: {0}")]
    Transport(String),
}

/// The remote surface of the agent backend.
///
/// Session ids passed here are already prefix-normalized by the caller.
pub trait BackendRpc: Send + Sync {
    /// Start (or resume) a turn with the given user prompt.
    fn start_turn(&self, session_id: &str, prompt: String)
        -> BoxFuture<'static, Result<(), RpcError>>;

    /// Interrupt the running turn.
    fn interrupt_turn(&self, session_id: &str) -> BoxFuture<'static, Result<(), RpcError>>;

    fn approve_exec(
        &self,
        session_id: &str,
        request_id: &str,
        decision: ReviewDecision,
    ) -> BoxFuture<'static, Result<(), RpcError>>;

    fn approve_patch(
        &self,
        session_id: &str,
        request_id: &str,
        decision: ReviewDecision,
    ) -> BoxFuture<'static, Result<(), RpcError>>;

    fn approve_apply_patch(
        &self,
        session_id: &str,
        request_id: &str,
        decision: ReviewDecision,
    ) -> BoxFuture<'static, Result<(), RpcError>>;

    /// Look up the path this session can later be resumed from.
    fn resolve_resume_path(
        &self,
        backend_session_id: &str,
    ) -> BoxFuture<'static, Result<Option<String>, RpcError>>;
}
