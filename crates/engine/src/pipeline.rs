//! Session pipeline actor
//!
//! Each attached session runs as an independent tokio task that owns its
//! `SessionContext`. External callers talk to it through a cheap-clone
//! [`PipelineHandle`]; lock-free state reads go through `ArcSwap`. The task
//! routes each inbound event, executes the resulting effects against the
//! transcript store, and detaches backend RPCs so no handler ever blocks
//! the feed. RPC completions re-enter the pipeline as `Apply` closures.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use arc_swap::ArcSwap;
use gantry_protocol::{new_id, AgentEvent, MessageKind, Role, TranscriptMessage};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::context::{normalize_session_id, ContextSnapshot, SessionContext};
use crate::effect::{Effect, RpcCall, TranscriptOp};
use crate::router;
use crate::rpc::{BackendRpc, RpcError};
use crate::store::TranscriptStore;

/// Environment callback invoked when an aborted turn must stop any
/// client-side streaming playback.
pub type StopStreamFn = Arc<dyn Fn(&str) + Send + Sync>;

pub struct PipelineConfig {
    pub session_id: String,
    /// Resolve approval requests without human input.
    pub auto_approve: bool,
    pub on_stream_stop: Option<StopStreamFn>,
}

impl PipelineConfig {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            auto_approve: false,
            on_stream_stop: None,
        }
    }
}

enum PipelineMsg {
    Event(Box<AgentEvent>),
    Apply(Box<dyn FnOnce(&mut SessionContext) + Send>),
}

/// Handle to a running session pipeline (cheap to Clone).
#[derive(Clone)]
pub struct PipelineHandle {
    session_id: String,
    tx: mpsc::Sender<PipelineMsg>,
    snapshot: Arc<ArcSwap<ContextSnapshot>>,
}

impl PipelineHandle {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Feed one inbound event (fire-and-forget).
    pub async fn send_event(&self, event: AgentEvent) {
        if self
            .tx
            .send(PipelineMsg::Event(Box::new(event)))
            .await
            .is_err()
        {
            warn!(
                component = "pipeline",
                event = "pipeline.channel_closed",
                session_id = %self.session_id,
                "Pipeline channel closed, event dropped"
            );
        }
    }

    /// Run a closure against the owned context (fire-and-forget).
    pub async fn apply(&self, mutate: impl FnOnce(&mut SessionContext) + Send + 'static) {
        if self
            .tx
            .send(PipelineMsg::Apply(Box::new(mutate)))
            .await
            .is_err()
        {
            warn!(
                component = "pipeline",
                event = "pipeline.channel_closed",
                session_id = %self.session_id,
                "Pipeline channel closed, apply dropped"
            );
        }
    }

    /// Lock-free snapshot read.
    pub fn snapshot(&self) -> Arc<ContextSnapshot> {
        self.snapshot.load_full()
    }
}

pub struct SessionPipeline;

impl SessionPipeline {
    /// Spawn the pipeline task for one session and return its handle.
    pub fn spawn(
        config: PipelineConfig,
        store: Arc<dyn TranscriptStore>,
        backend: Arc<dyn BackendRpc>,
    ) -> PipelineHandle {
        let ctx = SessionContext::new(config.session_id.clone(), config.auto_approve);
        let snapshot = Arc::new(ArcSwap::from_pointee(ctx.snapshot()));
        let (tx, rx) = mpsc::channel(256);

        let handle = PipelineHandle {
            session_id: config.session_id,
            tx: tx.clone(),
            snapshot: snapshot.clone(),
        };

        // The loop holds only a weak sender for RPC re-entry; dropping every
        // handle closes the channel and ends the task.
        let reply = tx.downgrade();
        drop(tx);
        tokio::spawn(pipeline_loop(
            ctx,
            rx,
            reply,
            store,
            backend,
            snapshot,
            config.on_stream_stop,
        ));
        handle
    }
}

async fn pipeline_loop(
    mut ctx: SessionContext,
    mut rx: mpsc::Receiver<PipelineMsg>,
    reply: mpsc::WeakSender<PipelineMsg>,
    store: Arc<dyn TranscriptStore>,
    backend: Arc<dyn BackendRpc>,
    snapshot: Arc<ArcSwap<ContextSnapshot>>,
    on_stream_stop: Option<StopStreamFn>,
) {
    while let Some(msg) = rx.recv().await {
        match msg {
            PipelineMsg::Event(event) => {
                let now = now_timestamp();
                let effects = router::process_event(*event, &mut ctx, &now);
                execute_effects(
                    effects,
                    &ctx,
                    &reply,
                    &store,
                    &backend,
                    on_stream_stop.as_ref(),
                );
            }
            PipelineMsg::Apply(mutate) => mutate(&mut ctx),
        }
        // Unconditional refresh — observers always see the latest state.
        snapshot.store(Arc::new(ctx.snapshot()));
    }

    info!(
        component = "pipeline",
        event = "pipeline.detached",
        session_id = %ctx.session_id(),
        "Session pipeline ended"
    );
}

fn execute_effects(
    effects: Vec<Effect>,
    ctx: &SessionContext,
    reply: &mpsc::WeakSender<PipelineMsg>,
    store: &Arc<dyn TranscriptStore>,
    backend: &Arc<dyn BackendRpc>,
    on_stream_stop: Option<&StopStreamFn>,
) {
    for effect in effects {
        match effect {
            Effect::Transcript(op) => apply_transcript_op(op, ctx.session_id(), store),
            Effect::StopStream => {
                if let Some(callback) = on_stream_stop {
                    callback(ctx.session_id());
                }
            }
            Effect::Rpc(call) => spawn_rpc(
                call,
                ctx.session_id().to_string(),
                store.clone(),
                backend.clone(),
                reply.clone(),
            ),
        }
    }
}

fn apply_transcript_op(op: TranscriptOp, session_id: &str, store: &Arc<dyn TranscriptStore>) {
    match op {
        TranscriptOp::Append(message) => store.append(*message),
        TranscriptOp::Patch {
            message_id,
            changes,
        } => store.patch(session_id, &message_id, changes),
        TranscriptOp::SetLoading(loading) => store.set_loading(session_id, loading),
    }
}

/// Detach one backend call. The handler that produced it has already
/// returned; completion only ever appends diagnostics or re-enters the
/// pipeline as an `Apply` closure.
fn spawn_rpc(
    call: RpcCall,
    session_id: String,
    store: Arc<dyn TranscriptStore>,
    backend: Arc<dyn BackendRpc>,
    reply: mpsc::WeakSender<PipelineMsg>,
) {
    let normalized = normalize_session_id(&session_id).to_string();
    tokio::spawn(async move {
        match call {
            RpcCall::ApproveExec {
                request_id,
                decision,
            } => {
                let result = backend.approve_exec(&normalized, &request_id, decision).await;
                report_approval_outcome(result, "exec", &request_id, &session_id, &store);
            }
            RpcCall::ApprovePatch {
                request_id,
                decision,
            } => {
                let result = backend
                    .approve_patch(&normalized, &request_id, decision)
                    .await;
                report_approval_outcome(result, "patch", &request_id, &session_id, &store);
            }
            RpcCall::ApproveApplyPatch {
                request_id,
                decision,
            } => {
                let result = backend
                    .approve_apply_patch(&normalized, &request_id, decision)
                    .await;
                report_approval_outcome(result, "apply_patch", &request_id, &session_id, &store);
            }
            RpcCall::ResolveResumePath { backend_session_id } => {
                match backend.resolve_resume_path(&backend_session_id).await {
                    Ok(Some(path)) => {
                        if let Some(tx) = reply.upgrade() {
                            let _ = tx
                                .send(PipelineMsg::Apply(Box::new(move |ctx| {
                                    ctx.resume_path = Some(path);
                                })))
                                .await;
                        }
                    }
                    Ok(None) => {}
                    // Lookup failures never block the session.
                    Err(error) => debug!(
                        component = "pipeline",
                        event = "pipeline.resume_path_failed",
                        session_id = %session_id,
                        error = %error,
                        "Resume path lookup failed"
                    ),
                }
            }
        }
    });
}

/// A failed auto-approval must leave a visible diagnostic: exactly one
/// system entry per failure.
fn report_approval_outcome(
    result: Result<(), RpcError>,
    family: &str,
    request_id: &str,
    session_id: &str,
    store: &Arc<dyn TranscriptStore>,
) {
    let Err(error) = result else {
        return;
    };
    error!(
        component = "pipeline",
        event = "pipeline.auto_approval_failed",
        session_id = %session_id,
        request_id = %request_id,
        error = %error,
        "Auto-approval RPC failed"
    );
    store.append(TranscriptMessage {
        id: new_id(),
        session_id: session_id.to_string(),
        role: Role::System,
        kind: MessageKind::Error,
        title: Some("Auto-approval failed".to_string()),
        content: format!(
            "Could not deliver the {} approval for request {}: {}",
            family, request_id, error
        ),
        timestamp: now_timestamp(),
        is_streaming: false,
        event_type: Some("auto_approval_failed".to_string()),
        approval: None,
        plan: None,
    });
}

/// Current time as a transcript timestamp.
fn now_timestamp() -> String {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    format!("{}Z", secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryTranscript;
    use gantry_protocol::{EventMsg, ReviewDecision};
    use std::sync::Mutex;
    use std::time::Duration;

    use futures::future::BoxFuture;
    use futures::FutureExt;

    /// Records calls; fails approvals on demand.
    #[derive(Default)]
    struct StubBackend {
        calls: Mutex<Vec<String>>,
        fail_approvals: bool,
        resume_path: Option<String>,
    }

    impl StubBackend {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }

        fn approval_result(&self) -> Result<(), RpcError> {
            if self.fail_approvals {
                Err(RpcError::Unavailable("backend offline".to_string()))
            } else {
                Ok(())
            }
        }
    }

    impl BackendRpc for StubBackend {
        fn start_turn(
            &self,
            session_id: &str,
            _prompt: String,
        ) -> BoxFuture<'static, Result<(), RpcError>> {
            self.record(format!("start_turn:{}", session_id));
            async { Ok(()) }.boxed()
        }

        fn interrupt_turn(&self, session_id: &str) -> BoxFuture<'static, Result<(), RpcError>> {
            self.record(format!("interrupt_turn:{}", session_id));
            async { Ok(()) }.boxed()
        }

        fn approve_exec(
            &self,
            session_id: &str,
            request_id: &str,
            _decision: ReviewDecision,
        ) -> BoxFuture<'static, Result<(), RpcError>> {
            self.record(format!("approve_exec:{}:{}", session_id, request_id));
            let result = self.approval_result();
            async move { result }.boxed()
        }

        fn approve_patch(
            &self,
            session_id: &str,
            request_id: &str,
            _decision: ReviewDecision,
        ) -> BoxFuture<'static, Result<(), RpcError>> {
            self.record(format!("approve_patch:{}:{}", session_id, request_id));
            let result = self.approval_result();
            async move { result }.boxed()
        }

        fn approve_apply_patch(
            &self,
            session_id: &str,
            request_id: &str,
            _decision: ReviewDecision,
        ) -> BoxFuture<'static, Result<(), RpcError>> {
            self.record(format!("approve_apply_patch:{}:{}", session_id, request_id));
            let result = self.approval_result();
            async move { result }.boxed()
        }

        fn resolve_resume_path(
            &self,
            backend_session_id: &str,
        ) -> BoxFuture<'static, Result<Option<String>, RpcError>> {
            self.record(format!("resolve_resume_path:{}", backend_session_id));
            let path = self.resume_path.clone();
            async move { Ok(path) }.boxed()
        }
    }

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    async fn settle() {
        // Let the pipeline task and any detached RPC tasks run.
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    fn spawn_pipeline(
        session_id: &str,
        auto_approve: bool,
        backend: Arc<StubBackend>,
    ) -> (PipelineHandle, Arc<MemoryTranscript>) {
        let store = Arc::new(MemoryTranscript::new());
        let handle = SessionPipeline::spawn(
            PipelineConfig {
                session_id: session_id.to_string(),
                auto_approve,
                on_stream_stop: None,
            },
            store.clone(),
            backend,
        );
        (handle, store)
    }

    #[tokio::test]
    async fn events_land_in_store_in_arrival_order() {
        init_tracing();
        let backend = Arc::new(StubBackend::default());
        let (handle, store) = spawn_pipeline("s-1", false, backend);

        handle.send_event(AgentEvent::broadcast(EventMsg::TaskStarted)).await;
        handle
            .send_event(AgentEvent::broadcast(EventMsg::AgentMessageDelta {
                delta: "Hel".to_string(),
            }))
            .await;
        handle
            .send_event(AgentEvent::broadcast(EventMsg::AgentMessageDelta {
                delta: "lo".to_string(),
            }))
            .await;
        handle
            .send_event(AgentEvent::broadcast(EventMsg::TaskComplete {
                last_agent_message: None,
            }))
            .await;
        settle().await;

        let messages = store.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, "Hello");
        assert!(!messages[0].is_streaming);
        assert!(!store.is_loading("s-1"));
        assert!(!handle.snapshot().loading);
    }

    #[tokio::test]
    async fn snapshot_reflects_running_turn() {
        let backend = Arc::new(StubBackend::default());
        let (handle, _store) = spawn_pipeline("s-1", false, backend);

        handle.send_event(AgentEvent::broadcast(EventMsg::TaskStarted)).await;
        settle().await;

        let snapshot = handle.snapshot();
        assert!(snapshot.loading);
        assert_eq!(snapshot.turn_count, 1);
    }

    #[tokio::test]
    async fn auto_approval_uses_normalized_session_id() {
        let backend = Arc::new(StubBackend::default());
        let (handle, store) = spawn_pipeline("agent:s-1", true, backend.clone());

        handle
            .send_event(AgentEvent::broadcast(EventMsg::ExecApprovalRequest {
                call_id: "req-1".to_string(),
                command: vec!["ls".to_string()],
                cwd: "/tmp".to_string(),
                reason: None,
            }))
            .await;
        settle().await;

        assert_eq!(backend.calls(), vec!["approve_exec:s-1:req-1".to_string()]);
        // Approval resolved silently — nothing in the transcript.
        assert!(store.messages().is_empty());
    }

    #[tokio::test]
    async fn failed_auto_approval_appends_one_diagnostic() {
        let backend = Arc::new(StubBackend {
            fail_approvals: true,
            ..Default::default()
        });
        let (handle, store) = spawn_pipeline("s-1", true, backend);

        handle
            .send_event(AgentEvent::broadcast(EventMsg::ExecApprovalRequest {
                call_id: "req-1".to_string(),
                command: vec!["ls".to_string()],
                cwd: "/tmp".to_string(),
                reason: None,
            }))
            .await;
        settle().await;

        let messages = store.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].title.as_deref(), Some("Auto-approval failed"));
        assert!(messages[0].content.contains("req-1"));
    }

    #[tokio::test]
    async fn resume_path_resolution_reenters_the_pipeline() {
        let backend = Arc::new(StubBackend {
            resume_path: Some("/sessions/backend-77.jsonl".to_string()),
            ..Default::default()
        });
        let (handle, _store) = spawn_pipeline("s-1", false, backend.clone());

        handle
            .send_event(AgentEvent::broadcast(EventMsg::SessionConfigured {
                session_id: "backend-77".to_string(),
                model: None,
                history_entry_count: None,
            }))
            .await;
        settle().await;

        let snapshot = handle.snapshot();
        assert_eq!(snapshot.backend_session_id.as_deref(), Some("backend-77"));
        assert_eq!(
            snapshot.resume_path.as_deref(),
            Some("/sessions/backend-77.jsonl")
        );
        assert_eq!(
            backend.calls(),
            vec!["resolve_resume_path:backend-77".to_string()]
        );
    }

    #[tokio::test]
    async fn abort_invokes_stop_stream_callback() {
        let stopped: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let recorded = stopped.clone();
        let backend = Arc::new(StubBackend::default());
        let store = Arc::new(MemoryTranscript::new());
        let handle = SessionPipeline::spawn(
            PipelineConfig {
                session_id: "s-1".to_string(),
                auto_approve: false,
                on_stream_stop: Some(Arc::new(move |session_id: &str| {
                    recorded.lock().unwrap().push(session_id.to_string());
                })),
            },
            store,
            backend,
        );

        handle.send_event(AgentEvent::broadcast(EventMsg::TaskStarted)).await;
        handle
            .send_event(AgentEvent::broadcast(EventMsg::TurnAborted { reason: None }))
            .await;
        settle().await;

        assert_eq!(stopped.lock().unwrap().as_slice(), ["s-1"]);
    }

    #[tokio::test]
    async fn foreign_session_events_do_not_touch_the_store() {
        let backend = Arc::new(StubBackend::default());
        let (handle, store) = spawn_pipeline("s-1", false, backend);

        handle
            .send_event(AgentEvent::for_session(
                "s-2",
                EventMsg::AgentMessageDelta {
                    delta: "other".to_string(),
                },
            ))
            .await;
        settle().await;

        assert!(store.messages().is_empty());
        assert!(handle.snapshot().streaming_message_id.is_none());
    }
}
