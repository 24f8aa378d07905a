//! Approval and change-set types

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Which kind of work an approval gates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalKind {
    Exec,
    Patch,
    ApplyPatch,
}

/// Lifecycle of one approval request.
///
/// `Pending` until a decision RPC succeeds, then `Approved`/`Rejected`;
/// `Completed` once a matching begin/end confirms the backend executed it,
/// or when turn-end housekeeping sweeps it up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
    Completed,
}

/// The decision sent back to the backend for a pending request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDecision {
    Approved,
    ApprovedForSession,
    Denied,
    Abort,
}

/// A structured approval request surfaced into the transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ApprovalKind,
    pub status: ApprovalStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patch: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<String>,
    /// Rendered per-file summary for multi-file change sets.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// One file's change inside a structured multi-file patch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileChange {
    Add {
        content: String,
    },
    Remove {
        content: String,
    },
    Modify {
        unified_diff: String,
    },
    Update {
        unified_diff: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        move_path: Option<PathBuf>,
    },
}

/// Status of one plan step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    pub step: String,
    pub status: StepStatus,
}

/// The agent's current plan for the turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    #[serde(default)]
    pub steps: Vec<PlanStep>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_change_round_trips_move_path() {
        let change = FileChange::Update {
            unified_diff: "@@ -1 +1 @@\n-a\n+b".to_string(),
            move_path: Some(PathBuf::from("/repo/new_name.rs")),
        };
        let json = serde_json::to_string(&change).unwrap();
        let back: FileChange = serde_json::from_str(&json).unwrap();
        assert_eq!(back, change);
    }

    #[test]
    fn approval_request_serializes_kind_as_type() {
        let request = ApprovalRequest {
            id: "req-1".to_string(),
            kind: ApprovalKind::Exec,
            status: ApprovalStatus::Pending,
            command: Some("ls -la".to_string()),
            cwd: Some("/tmp".to_string()),
            patch: None,
            files: Vec::new(),
            summary: None,
            reason: None,
        };
        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains(r#""type":"exec""#));
        assert!(json.contains(r#""status":"pending""#));
    }
}
