//! Session and turn lifecycle
//!
//! The turn state machine: Idle → Running → {Completed, Aborted, Errored}
//! → Idle. Every terminal handler is idempotent — clearing cleared state is
//! a no-op, and a terminal signal may arrive without a matching start.

use gantry_protocol::{new_id, MessageKind, MessagePatch, PlanUpdate, Role, StepStatus, TokenUsage, TranscriptMessage};
use tracing::{debug, info};

use crate::approvals::sweep_pending;
use crate::context::SessionContext;
use crate::effect::{Effect, RpcCall};

pub(crate) fn handle_task_started(ctx: &mut SessionContext) -> Vec<Effect> {
    // Leftover partials from an ill-terminated prior turn are dropped, not
    // committed; the new turn starts from a clean slate.
    ctx.reset_for_new_turn();
    ctx.turn_count += 1;
    vec![Effect::set_loading(true)]
}

/// `task_complete` and `turn_complete` are equivalent success terminals.
pub(crate) fn handle_turn_complete(ctx: &mut SessionContext) -> Vec<Effect> {
    let mut effects = finalize_streams(ctx);
    effects.extend(sweep_pending(ctx));
    ctx.loading = false;
    effects.push(Effect::set_loading(false));
    effects
}

pub(crate) fn handle_error(ctx: &mut SessionContext, message: &str, now: &str) -> Vec<Effect> {
    // Finalize open streams before the error entry so transcript order
    // reflects causality.
    let mut effects = finalize_streams(ctx);
    effects.extend(sweep_pending(ctx));
    effects.push(Effect::append(system_note(
        ctx,
        MessageKind::Error,
        "Error",
        message.to_string(),
        "error",
        now,
    )));
    ctx.loading = false;
    effects.push(Effect::set_loading(false));
    effects
}

pub(crate) fn handle_turn_aborted(
    ctx: &mut SessionContext,
    reason: Option<&str>,
    now: &str,
) -> Vec<Effect> {
    let mut effects = finalize_streams(ctx);
    // An aborted turn cannot still be running a command.
    ctx.in_flight_command = None;
    effects.extend(sweep_pending(ctx));
    effects.push(Effect::append(system_note(
        ctx,
        MessageKind::Error,
        "Turn interrupted",
        reason.unwrap_or("The turn was aborted.").to_string(),
        "turn_aborted",
        now,
    )));
    effects.push(Effect::StopStream);
    ctx.loading = false;
    effects.push(Effect::set_loading(false));
    effects
}

/// The session is going away; clear everything but append nothing — a
/// user-visible entry would be orphaned.
pub(crate) fn handle_shutdown_complete(ctx: &mut SessionContext) -> Vec<Effect> {
    let mut effects = finalize_streams(ctx);
    effects.extend(sweep_pending(ctx));
    ctx.loading = false;
    effects.push(Effect::set_loading(false));
    effects
}

pub(crate) fn handle_session_configured(
    ctx: &mut SessionContext,
    backend_session_id: String,
    model: Option<&str>,
) -> Vec<Effect> {
    info!(
        component = "lifecycle",
        event = "lifecycle.session_configured",
        session_id = %ctx.session_id(),
        backend_session_id = %backend_session_id,
        model = ?model,
        "Recorded backend session"
    );
    ctx.backend_session_id = Some(backend_session_id.clone());
    // Resolving the resumable path is fire-and-forget; failures are
    // swallowed without blocking the transition.
    vec![Effect::Rpc(RpcCall::ResolveResumePath { backend_session_id })]
}

pub(crate) fn handle_turn_diff(
    ctx: &mut SessionContext,
    unified_diff: String,
    now: &str,
) -> Vec<Effect> {
    if ctx.last_turn_diff.as_deref() == Some(unified_diff.as_str()) {
        debug!(
            component = "lifecycle",
            event = "lifecycle.duplicate_turn_diff",
            session_id = %ctx.session_id(),
            "Suppressing duplicate turn diff"
        );
        return Vec::new();
    }
    let content = format!("```diff\n{}\n```", unified_diff.trim_end());
    ctx.last_turn_diff = Some(unified_diff);
    vec![Effect::append(system_note(
        ctx,
        MessageKind::Diff,
        "Changes this turn",
        content,
        "turn_diff",
        now,
    ))]
}

pub(crate) fn handle_plan_update(
    ctx: &mut SessionContext,
    plan: PlanUpdate,
    now: &str,
) -> Vec<Effect> {
    let content = render_plan(&plan);
    match &ctx.plan_message_id {
        Some(message_id) => vec![Effect::patch(
            message_id.clone(),
            MessagePatch {
                content: Some(content),
                plan: Some(plan),
                ..Default::default()
            },
        )],
        None => {
            let message_id = new_id();
            ctx.plan_message_id = Some(message_id.clone());
            vec![Effect::append(TranscriptMessage {
                id: message_id,
                session_id: ctx.session_id().to_string(),
                role: Role::Assistant,
                kind: MessageKind::Plan,
                title: Some("Plan".to_string()),
                content,
                timestamp: now.to_string(),
                is_streaming: false,
                event_type: Some("plan_update".to_string()),
                approval: None,
                plan: Some(plan),
            })]
        }
    }
}

/// Context-only metadata; no transcript effect.
pub(crate) fn handle_token_count(ctx: &mut SessionContext, usage: TokenUsage) -> Vec<Effect> {
    ctx.token_usage = usage;
    Vec::new()
}

fn finalize_streams(ctx: &mut SessionContext) -> Vec<Effect> {
    let mut effects = ctx.answer.finalize(true);
    effects.extend(ctx.reasoning.finalize(true));
    effects
}

fn system_note(
    ctx: &SessionContext,
    kind: MessageKind,
    title: &str,
    content: String,
    event_type: &str,
    now: &str,
) -> TranscriptMessage {
    TranscriptMessage {
        id: new_id(),
        session_id: ctx.session_id().to_string(),
        role: Role::System,
        kind,
        title: Some(title.to_string()),
        content,
        timestamp: now.to_string(),
        is_streaming: false,
        event_type: Some(event_type.to_string()),
        approval: None,
        plan: None,
    }
}

fn render_plan(plan: &PlanUpdate) -> String {
    let mut lines = Vec::new();
    if let Some(explanation) = &plan.explanation {
        lines.push(explanation.clone());
        if !plan.steps.is_empty() {
            lines.push(String::new());
        }
    }
    for step in &plan.steps {
        let marker = match step.status {
            StepStatus::Completed => "[x]",
            StepStatus::InProgress => "[~]",
            StepStatus::Pending => "[ ]",
        };
        lines.push(format!("{} {}", marker, step.step));
    }
    lines.join("\n")
}
