// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Draft: a saved, never-executed task configuration.

use crate::id::DraftId;
use crate::session::{AgentSpec, DeliverySpec, RepoSpec, RuntimeSpec};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Draft {
    pub id: DraftId,
    pub owner_scope: String,
    pub prompt: Option<String>,
    pub repo: Option<RepoSpec>,
    pub agent: Option<AgentSpec>,
    pub runtime: Option<RuntimeSpec>,
    pub delivery: Option<DeliverySpec>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
