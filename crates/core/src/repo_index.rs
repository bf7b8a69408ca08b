// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! RepositoryIndex entry: a minimal catalog used by request-building UIs.

use crate::id::RepositoryId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryIndexEntry {
    pub id: RepositoryId,
    pub display_name: String,
    pub scm_provider: String,
    pub remote_url: String,
    pub default_branch: String,
    pub last_used_at: Option<DateTime<Utc>>,
}
