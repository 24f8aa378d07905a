//! Attached-session registry
//!
//! Maps session ids to their pipeline handles. Detaching removes the map
//! entry; once every clone of the handle is dropped the pipeline channel
//! closes and its task ends.

use std::collections::HashMap;

use crate::pipeline::PipelineHandle;

#[derive(Default)]
pub struct Registry {
    pipelines: HashMap<String, PipelineHandle>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pipeline, returning any handle it replaced.
    pub fn attach(&mut self, handle: PipelineHandle) -> Option<PipelineHandle> {
        self.pipelines
            .insert(handle.session_id().to_string(), handle)
    }

    pub fn get(&self, session_id: &str) -> Option<&PipelineHandle> {
        self.pipelines.get(session_id)
    }

    pub fn detach(&mut self, session_id: &str) -> Option<PipelineHandle> {
        self.pipelines.remove(session_id)
    }

    pub fn session_ids(&self) -> Vec<String> {
        self.pipelines.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }
}
