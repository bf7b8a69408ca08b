// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session: the running instance of a submitted coding-agent task, its
//! configuration, and its lifecycle state machine.

use crate::id::SessionId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Lifecycle state of a Session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Queued,
    Provisioning,
    Running,
    Pausing,
    Paused,
    Resuming,
    Stopping,
    Stopped,
    Completed,
    Failed,
    Cancelled,
}

impl SessionStatus {
    /// Terminal states are absorbing: no further transition is legal.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionStatus::Stopped
                | SessionStatus::Completed
                | SessionStatus::Failed
                | SessionStatus::Cancelled
        )
    }

    /// The exhaustive transition table. Anything not listed
    /// here is `ConflictingState`.
    pub fn can_transition_to(&self, to: SessionStatus) -> bool {
        use SessionStatus::*;
        matches!(
            (self, to),
            (Queued, Provisioning)
                | (Queued, Cancelled)
                | (Provisioning, Running)
                | (Provisioning, Failed)
                | (Provisioning, Cancelled)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Pausing)
                | (Pausing, Paused)
                | (Running, Stopping) // covers both `stop` and `delete` (force) while running
                | (Stopping, Stopped)
                | (Stopping, Cancelled) // delete path / grace expiry to cancelled
                | (Paused, Resuming)
                | (Resuming, Running)
                | (Paused, Stopping)
        )
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SessionStatus::Queued => "queued",
            SessionStatus::Provisioning => "provisioning",
            SessionStatus::Running => "running",
            SessionStatus::Pausing => "pausing",
            SessionStatus::Paused => "paused",
            SessionStatus::Resuming => "resuming",
            SessionStatus::Stopping => "stopping",
            SessionStatus::Stopped => "stopped",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
            SessionStatus::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// `{type, version, settings}` — settings is forwarded to the supervisor
/// unaltered, validated at task creation against a per-type schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSpec {
    #[serde(rename = "type")]
    pub agent_type: String,
    pub version: Option<String>,
    #[serde(default)]
    pub settings: HashMap<String, serde_json::Value>,
}

/// Runtime isolation mode for the workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeType {
    Devcontainer,
    Local,
    Disabled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceLimits {
    pub cpu: Option<f64>,
    pub memory_mi_b: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeSpec {
    #[serde(rename = "type")]
    pub runtime_type: RuntimeType,
    pub devcontainer_path: Option<String>,
    pub resources: Option<ResourceLimits>,
}

/// Repository origin mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepoMode {
    Git,
    Upload,
    None,
}

/// `{mode, url?, branch?, commit?}`; `commit` is resolved to an immutable
/// hash before provisioning starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoSpec {
    pub mode: RepoMode,
    pub url: Option<String>,
    pub branch: Option<String>,
    pub commit: Option<String>,
}

/// Delivery mode for the agent's output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    Pr,
    Branch,
    Patch,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliverySpec {
    pub mode: DeliveryMode,
    pub target_branch: Option<String>,
}

/// The task prompt, labels, and attachment metadata the agent was asked to act on.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskSpec {
    pub prompt: String,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    #[serde(default)]
    pub attachments: Vec<AttachmentMeta>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachmentMeta {
    pub name: String,
    pub content_type: Option<String>,
    pub size_bytes: Option<u64>,
}

/// Resolved provisioning result, recorded on the Session once the
/// Workspace Provisioner succeeds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceResult {
    pub snapshot_provider: String,
    pub mount_path: String,
    pub execution_host_id: Option<String>,
    pub snapshot_id: Option<String>,
}

/// Aggregate of `file_edit` events, computed lazily once a Session reaches
/// a terminal state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChangesSummary {
    pub files_changed: u64,
    pub lines_added: u64,
    pub lines_removed: u64,
}

/// The persistent Session record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub tenant_id: Option<String>,
    pub project_id: Option<String>,

    pub task: TaskSpec,
    pub agent: AgentSpec,
    pub runtime: RuntimeSpec,
    pub repo: RepoSpec,
    pub delivery: DeliverySpec,

    pub workspace: Option<WorkspaceResult>,

    pub status: SessionStatus,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,

    pub error_kind: Option<crate::error::ErrorKind>,
    pub error_detail: Option<String>,

    /// Number of provisioning/start attempts made so far, used by the
    /// Session Manager's bounded-retry policy for Transient errors.
    #[serde(default)]
    pub attempt_count: u32,

    /// Set by `delete`/terminal cleanup: the Session record itself is kept
    /// (never deleted) but workspace and cache
    /// resources should be released once true.
    #[serde(default)]
    pub cleanup_requested: bool,
}

impl Session {
    /// Whether this Session is immutable except for event attachments.
    pub fn is_immutable(&self) -> bool {
        matches!(
            self.status,
            SessionStatus::Completed | SessionStatus::Failed | SessionStatus::Cancelled
        )
    }

    pub fn changes_summary_is_available(&self) -> bool {
        self.status.is_terminal()
    }
}
