//! Approval gate
//!
//! Three request families (run a shell command, apply a single patch, apply
//! a structured multi-file patch) share one policy: with auto-approve on,
//! the decision RPC is issued immediately and the request never reaches the
//! transcript; with it off, a human-readable approval entry carrying the
//! structured payload is appended and the UI resolves it through the same
//! RPC later. Auto-approval failures are always surfaced — the backend
//! must never be left hanging without a visible diagnostic.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use gantry_protocol::{
    new_id, ApprovalKind, ApprovalRequest, ApprovalStatus, FileChange, MessageKind, MessagePatch,
    ReviewDecision, Role, TranscriptMessage,
};
use tracing::info;

use crate::context::{PendingApproval, SessionContext};
use crate::effect::{Effect, RpcCall};

pub(crate) fn handle_exec_approval_request(
    ctx: &mut SessionContext,
    call_id: String,
    command: &[String],
    cwd: String,
    reason: Option<String>,
    now: &str,
) -> Vec<Effect> {
    let display = command.join(" ");
    if ctx.auto_approve {
        return auto_approve(ctx, &call_id, |request_id| RpcCall::ApproveExec {
            request_id,
            decision: ReviewDecision::Approved,
        });
    }

    let request = ApprovalRequest {
        id: call_id,
        kind: ApprovalKind::Exec,
        status: ApprovalStatus::Pending,
        command: Some(display.clone()),
        cwd: Some(cwd.clone()),
        patch: None,
        files: Vec::new(),
        summary: None,
        reason,
    };
    let content = format!("$ {}\ncwd: {}", display, cwd);
    surface_request(ctx, request, "Approval required: run command", content, now)
}

pub(crate) fn handle_patch_approval_request(
    ctx: &mut SessionContext,
    call_id: String,
    patch: String,
    files: Vec<String>,
    reason: Option<String>,
    now: &str,
) -> Vec<Effect> {
    if ctx.auto_approve {
        return auto_approve(ctx, &call_id, |request_id| RpcCall::ApprovePatch {
            request_id,
            decision: ReviewDecision::Approved,
        });
    }

    let content = format!("```diff\n{}\n```", patch.trim_end());
    let request = ApprovalRequest {
        id: call_id,
        kind: ApprovalKind::Patch,
        status: ApprovalStatus::Pending,
        command: None,
        cwd: None,
        patch: Some(patch),
        files,
        summary: None,
        reason,
    };
    surface_request(ctx, request, "Approval required: apply patch", content, now)
}

pub(crate) fn handle_apply_patch_approval_request(
    ctx: &mut SessionContext,
    call_id: String,
    changes: &HashMap<PathBuf, FileChange>,
    grant_root: Option<&Path>,
    reason: Option<String>,
    now: &str,
) -> Vec<Effect> {
    if ctx.auto_approve {
        return auto_approve(ctx, &call_id, |request_id| RpcCall::ApproveApplyPatch {
            request_id,
            decision: ReviewDecision::Approved,
        });
    }

    let summary = summarize_changes(changes, grant_root);
    let files = sorted_paths(changes)
        .into_iter()
        .map(|path| display_path(path, grant_root))
        .collect();
    let request = ApprovalRequest {
        id: call_id,
        kind: ApprovalKind::ApplyPatch,
        status: ApprovalStatus::Pending,
        command: None,
        cwd: None,
        patch: None,
        files,
        summary: Some(summary.clone()),
        reason,
    };
    let content = format!("```text\n{}\n```", summary);
    surface_request(ctx, request, "Approval required: apply changes", content, now)
}

fn auto_approve(
    ctx: &SessionContext,
    request_id: &str,
    call: impl FnOnce(String) -> RpcCall,
) -> Vec<Effect> {
    info!(
        component = "approvals",
        event = "approvals.auto_approved",
        session_id = %ctx.session_id(),
        request_id = %request_id,
        "Auto-approving request"
    );
    vec![Effect::Rpc(call(request_id.to_string()))]
}

fn surface_request(
    ctx: &mut SessionContext,
    request: ApprovalRequest,
    title: &str,
    content: String,
    now: &str,
) -> Vec<Effect> {
    let message_id = new_id();
    ctx.pending_approvals.push(PendingApproval {
        message_id: message_id.clone(),
        request: request.clone(),
    });
    vec![Effect::append(TranscriptMessage {
        id: message_id,
        session_id: ctx.session_id().to_string(),
        role: Role::Approval,
        kind: MessageKind::Approval,
        title: Some(title.to_string()),
        content,
        timestamp: now.to_string(),
        is_streaming: false,
        event_type: Some(match request.kind {
            ApprovalKind::Exec => "exec_approval_request".to_string(),
            ApprovalKind::Patch => "patch_approval_request".to_string(),
            ApprovalKind::ApplyPatch => "apply_patch_approval_request".to_string(),
        }),
        approval: Some(request),
        plan: None,
    })]
}

/// A begin event for the same call id confirms the backend executed the
/// approved work; the surfaced entry moves to `completed`.
pub(crate) fn confirm_executed(ctx: &mut SessionContext, call_id: &str) -> Vec<Effect> {
    let Some(index) = ctx
        .pending_approvals
        .iter()
        .position(|p| p.request.id == call_id)
    else {
        return Vec::new();
    };
    let pending = ctx.pending_approvals.remove(index);
    let mut request = pending.request;
    request.status = ApprovalStatus::Completed;
    vec![Effect::patch(
        pending.message_id,
        MessagePatch {
            approval: Some(request),
            ..Default::default()
        },
    )]
}

/// Terminal-event housekeeping: anything still pending when the turn ends
/// is swept to `completed` so no entry stays actionable forever.
pub(crate) fn sweep_pending(ctx: &mut SessionContext) -> Vec<Effect> {
    let mut effects = Vec::new();
    for pending in ctx.pending_approvals.drain(..) {
        let mut request = pending.request;
        request.status = ApprovalStatus::Completed;
        effects.push(Effect::patch(
            pending.message_id,
            MessagePatch {
                approval: Some(request),
                ..Default::default()
            },
        ));
    }
    effects
}

// ---------------------------------------------------------------------------
// Multi-file change summaries
// ---------------------------------------------------------------------------

fn sorted_paths(changes: &HashMap<PathBuf, FileChange>) -> Vec<&PathBuf> {
    let mut paths: Vec<&PathBuf> = changes.keys().collect();
    paths.sort();
    paths
}

fn display_path(path: &Path, grant_root: Option<&Path>) -> String {
    match grant_root.and_then(|root| path.strip_prefix(root).ok()) {
        Some(relative) => relative.display().to_string(),
        None => path.display().to_string(),
    }
}

/// Render a multi-file change set as readable per-file blocks.
pub(crate) fn summarize_changes(
    changes: &HashMap<PathBuf, FileChange>,
    grant_root: Option<&Path>,
) -> String {
    let mut blocks = Vec::new();
    for path in sorted_paths(changes) {
        let shown = display_path(path, grant_root);
        let block = match &changes[path] {
            FileChange::Add { content } => {
                let body: Vec<String> = content.lines().map(|l| format!("+{}", l)).collect();
                format!("Add {}\n{}", shown, body.join("\n"))
            }
            FileChange::Remove { content } => {
                let body: Vec<String> = content.lines().map(|l| format!("-{}", l)).collect();
                format!("Remove {}\n{}", shown, body.join("\n"))
            }
            FileChange::Modify { unified_diff } => {
                format!("Modify {}\n{}", shown, unified_diff.trim_end())
            }
            FileChange::Update {
                unified_diff,
                move_path,
            } => {
                let header = match move_path {
                    Some(target) => {
                        format!("Update {} -> {}", shown, display_path(target, grant_root))
                    }
                    None => format!("Update {}", shown),
                };
                format!("{}\n{}", header, unified_diff.trim_end())
            }
        };
        blocks.push(block);
    }
    blocks.join("\n\n")
}
