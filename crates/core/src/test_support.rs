// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test helpers for use across crates.
//!
//! Gated behind `#[cfg(any(test, feature = "test-support"))]`.

use crate::id::SessionId;
use crate::session::{
    AgentSpec, DeliveryMode, DeliverySpec, RepoMode, RepoSpec, RuntimeSpec, RuntimeType, Session,
    SessionStatus, TaskSpec,
};
use chrono::Utc;

/// Builds a minimal valid `Session` for tests, with sensible defaults that
/// callers override field-by-field.
pub struct SessionBuilder {
    session: Session,
}

impl SessionBuilder {
    pub fn new(id: &str) -> Self {
        let now = Utc::now();
        Self {
            session: Session {
                id: SessionId::new(id),
                tenant_id: None,
                project_id: None,
                task: TaskSpec {
                    prompt: "do the thing".into(),
                    labels: Default::default(),
                    attachments: Vec::new(),
                },
                agent: AgentSpec {
                    agent_type: "test-agent".into(),
                    version: None,
                    settings: Default::default(),
                },
                runtime: RuntimeSpec {
                    runtime_type: RuntimeType::Local,
                    devcontainer_path: None,
                    resources: None,
                },
                repo: RepoSpec {
                    mode: RepoMode::Git,
                    url: Some("https://example.com/repo.git".into()),
                    branch: Some("main".into()),
                    commit: None,
                },
                delivery: DeliverySpec {
                    mode: DeliveryMode::Pr,
                    target_branch: None,
                },
                workspace: None,
                status: SessionStatus::Queued,
                created_at: now,
                updated_at: now,
                started_at: None,
                ended_at: None,
                error_kind: None,
                error_detail: None,
                attempt_count: 0,
                cleanup_requested: false,
            },
        }
    }

    pub fn status(mut self, status: SessionStatus) -> Self {
        self.session.status = status;
        self
    }

    pub fn commit(mut self, commit: &str) -> Self {
        self.session.repo.commit = Some(commit.into());
        self
    }

    pub fn build(self) -> Session {
        self.session
    }
}
