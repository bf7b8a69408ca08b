// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! SnapshotCacheEntry: metadata for a cached (repository, commit) snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Key identifying a cached snapshot: a repository URL and an immutable commit hash.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SnapshotKey {
    pub repo_url: String,
    pub commit_hash: String,
}

impl SnapshotKey {
    pub fn new(repo_url: impl Into<String>, commit_hash: impl Into<String>) -> Self {
        Self {
            repo_url: repo_url.into(),
            commit_hash: commit_hash.into(),
        }
    }
}

impl std::fmt::Display for SnapshotKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.repo_url, self.commit_hash)
    }
}

/// A named snapshot-filesystem backend capable of producing a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Zfs,
    Btrfs,
    Overlay,
    Copy,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ProviderKind::Zfs => "zfs",
            ProviderKind::Btrfs => "btrfs",
            ProviderKind::Overlay => "overlay",
            ProviderKind::Copy => "copy",
        };
        write!(f, "{s}")
    }
}

/// Persisted metadata for a resident cache entry. `ref_count` is owned
/// exclusively by the Snapshot Cache; the Repository Layer only durably
/// records values the cache tells it to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotCacheEntry {
    pub key: SnapshotKey,
    pub snapshot_id: String,
    pub provider: ProviderKind,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
    pub last_access_at: DateTime<Utc>,
    pub ref_count: u32,
}

impl SnapshotCacheEntry {
    pub fn is_eviction_eligible(&self) -> bool {
        self.ref_count == 0
    }
}
