//! Transcript store seam
//!
//! The engine appends entries and patches them by id; it never reads its
//! own writes back, so embedders are free to put anything behind this
//! trait — an in-process UI model, a database task, a test recorder.

use std::collections::HashMap;
use std::sync::Mutex;

use gantry_protocol::{MessagePatch, TranscriptMessage};
use tracing::debug;

pub trait TranscriptStore: Send + Sync {
    /// Add a new transcript entry. Ids are globally unique strings.
    fn append(&self, message: TranscriptMessage);

    /// Merge fields into an existing entry. Unknown ids are a silent no-op.
    fn patch(&self, session_id: &str, message_id: &str, changes: MessagePatch);

    /// Toggle the turn-running indicator for a session.
    fn set_loading(&self, session_id: &str, loading: bool);
}

/// In-memory reference store, used by tests and simple embedders.
#[derive(Default)]
pub struct MemoryTranscript {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    messages: Vec<TranscriptMessage>,
    loading: HashMap<String, bool>,
}

impl MemoryTranscript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<TranscriptMessage> {
        self.inner.lock().unwrap().messages.clone()
    }

    pub fn message(&self, message_id: &str) -> Option<TranscriptMessage> {
        self.inner
            .lock()
            .unwrap()
            .messages
            .iter()
            .find(|m| m.id == message_id)
            .cloned()
    }

    pub fn is_loading(&self, session_id: &str) -> bool {
        self.inner
            .lock()
            .unwrap()
            .loading
            .get(session_id)
            .copied()
            .unwrap_or(false)
    }
}

impl TranscriptStore for MemoryTranscript {
    fn append(&self, message: TranscriptMessage) {
        self.inner.lock().unwrap().messages.push(message);
    }

    fn patch(&self, session_id: &str, message_id: &str, changes: MessagePatch) {
        let mut inner = self.inner.lock().unwrap();
        match inner.messages.iter_mut().find(|m| m.id == message_id) {
            Some(message) => message.apply(&changes),
            None => debug!(
                component = "store",
                event = "store.patch_unknown_id",
                session_id = %session_id,
                message_id = %message_id,
                "Patch for unknown message id"
            ),
        }
    }

    fn set_loading(&self, session_id: &str, loading: bool) {
        let mut inner = self.inner.lock().unwrap();
        inner.loading.insert(session_id.to_string(), loading);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_protocol::{MessageKind, Role};

    fn message(id: &str) -> TranscriptMessage {
        TranscriptMessage {
            id: id.to_string(),
            session_id: "s-1".to_string(),
            role: Role::System,
            kind: MessageKind::Text,
            title: None,
            content: "before".to_string(),
            timestamp: "0Z".to_string(),
            is_streaming: false,
            event_type: None,
            approval: None,
            plan: None,
        }
    }

    #[test]
    fn patch_merges_into_existing_entry() {
        let store = MemoryTranscript::new();
        store.append(message("m-1"));
        store.patch(
            "s-1",
            "m-1",
            MessagePatch {
                content: Some("after".to_string()),
                ..Default::default()
            },
        );
        assert_eq!(store.message("m-1").unwrap().content, "after");
    }

    #[test]
    fn patch_for_unknown_id_is_silent() {
        let store = MemoryTranscript::new();
        store.patch(
            "s-1",
            "nope",
            MessagePatch {
                content: Some("x".to_string()),
                ..Default::default()
            },
        );
        assert!(store.messages().is_empty());
    }

    #[test]
    fn loading_defaults_to_false() {
        let store = MemoryTranscript::new();
        assert!(!store.is_loading("s-1"));
        store.set_loading("s-1", true);
        assert!(store.is_loading("s-1"));
    }
}
