//! Event router
//!
//! `process_event` is the single entry point of the core: filter by
//! session ownership, dispatch on the event discriminant, and never fail.
//! Routing has no side effects of its own — it only delegates — and an
//! unknown event type is a logged no-op, never a crash.

use gantry_protocol::{AgentEvent, EventMsg};
use tracing::debug;

use crate::context::SessionContext;
use crate::effect::Effect;
use crate::{approvals, commands, lifecycle, streaming};

pub fn process_event(event: AgentEvent, ctx: &mut SessionContext, now: &str) -> Vec<Effect> {
    if !ctx.matches_session(event.session_id.as_deref()) {
        debug!(
            component = "router",
            event = "router.session_mismatch",
            session_id = %ctx.session_id(),
            event_session = ?event.session_id,
            event_type = %event.msg.name(),
            "Dropping event addressed to another session"
        );
        return Vec::new();
    }

    match event.msg {
        // -- Lifecycle --------------------------------------------------------
        EventMsg::TaskStarted => lifecycle::handle_task_started(ctx),
        EventMsg::TaskComplete { .. } | EventMsg::TurnComplete => {
            lifecycle::handle_turn_complete(ctx)
        }
        EventMsg::TurnAborted { reason } => {
            lifecycle::handle_turn_aborted(ctx, reason.as_deref(), now)
        }
        EventMsg::Error { message } => lifecycle::handle_error(ctx, &message, now),
        EventMsg::ShutdownComplete => lifecycle::handle_shutdown_complete(ctx),
        EventMsg::SessionConfigured {
            session_id, model, ..
        } => lifecycle::handle_session_configured(ctx, session_id, model.as_deref()),

        // -- Messages and reasoning -------------------------------------------
        EventMsg::UserMessage { message } => streaming::handle_user_message(ctx, message, now),
        EventMsg::AgentMessage { message } => streaming::handle_agent_message(ctx, message, now),
        EventMsg::AgentMessageDelta { delta } => {
            streaming::handle_agent_message_delta(ctx, &delta, now)
        }
        EventMsg::AgentReasoning { text } => streaming::handle_agent_reasoning(ctx, text, now),
        EventMsg::AgentReasoningDelta { delta } => {
            streaming::handle_agent_reasoning_delta(ctx, &delta, now)
        }
        EventMsg::AgentReasoningSectionBreak => streaming::handle_reasoning_section_break(ctx),

        // -- Commands and tools ------------------------------------------------
        EventMsg::ExecCommandBegin {
            call_id,
            command,
            cwd,
        } => commands::handle_exec_command_begin(ctx, call_id, command, cwd, now),
        EventMsg::ExecCommandEnd {
            call_id,
            exit_code,
            stdout,
            stderr,
            ..
        } => commands::handle_exec_command_end(ctx, &call_id, exit_code, &stdout, &stderr),
        EventMsg::PatchApplyBegin {
            call_id,
            auto_approved,
            changes,
        } => commands::handle_patch_apply_begin(ctx, call_id, auto_approved, &changes, now),
        EventMsg::PatchApplyEnd {
            call_id,
            success,
            stdout,
            stderr,
        } => commands::handle_patch_apply_end(ctx, &call_id, success, &stdout, &stderr),
        EventMsg::McpToolCallBegin {
            call_id,
            server,
            tool,
            arguments,
        } => commands::handle_mcp_tool_call_begin(ctx, call_id, &server, &tool, arguments.as_ref(), now),
        EventMsg::McpToolCallEnd {
            call_id,
            success,
            result,
            ..
        } => commands::handle_mcp_tool_call_end(ctx, &call_id, success, result.as_ref()),
        EventMsg::WebSearchBegin { call_id } => commands::handle_web_search_begin(ctx, call_id, now),
        EventMsg::WebSearchEnd { call_id, query } => {
            commands::handle_web_search_end(ctx, &call_id, &query)
        }

        // -- Approvals ----------------------------------------------------------
        EventMsg::ExecApprovalRequest {
            call_id,
            command,
            cwd,
            reason,
        } => approvals::handle_exec_approval_request(ctx, call_id, &command, cwd, reason, now),
        EventMsg::PatchApprovalRequest {
            call_id,
            patch,
            files,
            reason,
        } => approvals::handle_patch_approval_request(ctx, call_id, patch, files, reason, now),
        EventMsg::ApplyPatchApprovalRequest {
            call_id,
            changes,
            grant_root,
            reason,
        } => approvals::handle_apply_patch_approval_request(
            ctx,
            call_id,
            &changes,
            grant_root.as_deref(),
            reason,
            now,
        ),

        // -- Turn metadata -------------------------------------------------------
        EventMsg::TurnDiff { unified_diff } => lifecycle::handle_turn_diff(ctx, unified_diff, now),
        EventMsg::PlanUpdate(plan) => lifecycle::handle_plan_update(ctx, plan, now),
        EventMsg::TokenCount(usage) => lifecycle::handle_token_count(ctx, usage),

        EventMsg::Unknown => {
            debug!(
                component = "router",
                event = "router.unknown_event_type",
                session_id = %ctx.session_id(),
                "Ignoring event with unknown discriminant"
            );
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effect::TranscriptOp;
    use crate::store::{MemoryTranscript, TranscriptStore};
    use gantry_protocol::{MessageKind, Role};

    fn ev(msg: EventMsg) -> AgentEvent {
        AgentEvent::broadcast(msg)
    }

    fn ev_for(session: &str, msg: EventMsg) -> AgentEvent {
        AgentEvent::for_session(session, msg)
    }

    /// Route a batch of events and apply their transcript effects, the way
    /// the pipeline would.
    fn run(ctx: &mut SessionContext, store: &MemoryTranscript, events: Vec<AgentEvent>) {
        for event in events {
            for effect in process_event(event, ctx, "0Z") {
                if let Effect::Transcript(op) = effect {
                    match op {
                        TranscriptOp::Append(message) => store.append(*message),
                        TranscriptOp::Patch {
                            message_id,
                            changes,
                        } => store.patch(ctx.session_id(), &message_id, changes),
                        TranscriptOp::SetLoading(loading) => {
                            store.set_loading(ctx.session_id(), loading)
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn mismatched_session_is_dropped_without_side_effects() {
        let mut ctx = SessionContext::new("s-1", false);
        let effects = process_event(ev_for("s-2", EventMsg::TaskStarted), &mut ctx, "0Z");

        assert!(effects.is_empty());
        assert!(!ctx.loading);
        assert_eq!(ctx.turn_count, 0);
    }

    #[test]
    fn prefixed_session_id_is_accepted() {
        let mut ctx = SessionContext::new("s-1", false);
        let effects = process_event(ev_for("agent:s-1", EventMsg::TaskStarted), &mut ctx, "0Z");

        assert!(!effects.is_empty());
        assert!(ctx.loading);
    }

    #[test]
    fn broadcast_event_is_processed() {
        let mut ctx = SessionContext::new("s-1", false);
        let effects = process_event(ev(EventMsg::TaskStarted), &mut ctx, "0Z");
        assert!(!effects.is_empty());
        assert!(ctx.loading);
    }

    #[test]
    fn unknown_event_type_is_a_noop() {
        let mut ctx = SessionContext::new("s-1", false);
        let event: AgentEvent =
            serde_json::from_str(r#"{"type":"quantum_entanglement_report"}"#).unwrap();
        assert!(process_event(event, &mut ctx, "0Z").is_empty());
    }

    #[test]
    fn streamed_answer_lands_as_one_complete_message() {
        let mut ctx = SessionContext::new("s-1", false);
        let store = MemoryTranscript::new();

        run(
            &mut ctx,
            &store,
            vec![
                ev(EventMsg::TaskStarted),
                ev(EventMsg::AgentMessageDelta {
                    delta: "Hel".to_string(),
                }),
                ev(EventMsg::AgentMessageDelta {
                    delta: "lo".to_string(),
                }),
                ev(EventMsg::TaskComplete {
                    last_agent_message: None,
                }),
            ],
        );

        let messages = store.messages();
        let assistant: Vec<_> = messages
            .iter()
            .filter(|m| m.role == Role::Assistant)
            .collect();
        assert_eq!(assistant.len(), 1);
        assert_eq!(assistant[0].content, "Hello");
        assert!(!assistant[0].is_streaming);
        assert!(!store.is_loading("s-1"));
    }

    #[test]
    fn reasoning_with_section_break_keeps_paragraphs() {
        let mut ctx = SessionContext::new("s-1", false);
        let store = MemoryTranscript::new();

        run(
            &mut ctx,
            &store,
            vec![
                ev(EventMsg::TaskStarted),
                ev(EventMsg::AgentReasoningDelta {
                    delta: "think".to_string(),
                }),
                ev(EventMsg::AgentReasoningSectionBreak),
                ev(EventMsg::AgentReasoningDelta {
                    delta: "more".to_string(),
                }),
                ev(EventMsg::TaskComplete {
                    last_agent_message: None,
                }),
            ],
        );

        let messages = store.messages();
        let reasoning: Vec<_> = messages
            .iter()
            .filter(|m| m.kind == MessageKind::Reasoning)
            .collect();
        assert_eq!(reasoning.len(), 1);
        assert_eq!(reasoning[0].content, "think\n\nmore");
        assert!(!reasoning[0].is_streaming);
    }

    #[test]
    fn no_stream_survives_any_terminal_event() {
        let terminals = vec![
            EventMsg::TaskComplete {
                last_agent_message: None,
            },
            EventMsg::TurnComplete,
            EventMsg::Error {
                message: "boom".to_string(),
            },
            EventMsg::TurnAborted { reason: None },
            EventMsg::ShutdownComplete,
        ];

        for terminal in terminals {
            let mut ctx = SessionContext::new("s-1", false);
            let store = MemoryTranscript::new();
            let name = terminal.name();

            run(
                &mut ctx,
                &store,
                vec![
                    ev(EventMsg::TaskStarted),
                    ev(EventMsg::AgentReasoningDelta {
                        delta: "hmm".to_string(),
                    }),
                    ev(EventMsg::AgentMessageDelta {
                        delta: "partial".to_string(),
                    }),
                    ev(terminal),
                ],
            );

            for message in store.messages() {
                assert!(
                    !message.is_streaming,
                    "stream left open after {}: {:?}",
                    name, message.id
                );
            }
            assert!(!store.is_loading("s-1"), "loading stuck after {}", name);
        }
    }

    #[test]
    fn failed_command_transcript_carries_exit_and_stderr() {
        let mut ctx = SessionContext::new("s-1", false);
        let store = MemoryTranscript::new();

        run(
            &mut ctx,
            &store,
            vec![
                ev(EventMsg::ExecCommandBegin {
                    call_id: "c1".to_string(),
                    command: vec!["ls".to_string()],
                    cwd: "/tmp".to_string(),
                }),
                ev(EventMsg::ExecCommandEnd {
                    call_id: "c1".to_string(),
                    exit_code: 1,
                    stdout: String::new(),
                    stderr: "no such dir".to_string(),
                    duration_ms: Some(12),
                }),
            ],
        );

        let messages = store.messages();
        assert_eq!(messages.len(), 1);
        let entry = &messages[0];
        assert_eq!(entry.role, Role::System);
        let title = entry.title.as_deref().unwrap();
        assert!(title.contains("ls"));
        assert!(title.contains("exit 1"));
        assert!(entry.content.contains("no such dir"));
    }

    #[test]
    fn stale_delta_after_abort_opens_a_fresh_stream() {
        let mut ctx = SessionContext::new("s-1", false);
        let store = MemoryTranscript::new();

        run(
            &mut ctx,
            &store,
            vec![
                ev(EventMsg::TaskStarted),
                ev(EventMsg::AgentMessageDelta {
                    delta: "old turn ".to_string(),
                }),
                ev(EventMsg::TurnAborted { reason: None }),
                ev(EventMsg::AgentMessageDelta {
                    delta: "new text".to_string(),
                }),
            ],
        );

        let assistant: Vec<_> = store
            .messages()
            .into_iter()
            .filter(|m| m.role == Role::Assistant)
            .collect();
        // The aborted stream was closed; the stale-looking delta cannot
        // resurrect it and gets a fresh entry instead.
        assert_eq!(assistant.len(), 2);
        assert!(!assistant[0].is_streaming);
        assert_eq!(assistant[1].content, "new text");
    }
}
