// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The fully materialized, in-memory view of everything the Repository
//! Layer persists. Rebuilt at startup from the last checkpoint plus
//! journal replay; mutated only through [`crate::mutation::Mutation`] so
//! every change is both durable and deterministic to replay.

use crate::mutation::Mutation;
use chrono::{DateTime, Utc};
use forge_core::{
    Draft, DraftId, Event, EventRecord, RepositoryId, RepositoryIndexEntry, Session, SessionId,
    SessionStatus, SnapshotCacheEntry, SnapshotKey,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    pub session_id: SessionId,
    pub request_fingerprint: String,
    pub expires_at_epoch_ms: i64,
}

/// The complete materialized state at a point in time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MaterializedState {
    pub sessions: HashMap<SessionId, Session>,
    pub events: HashMap<SessionId, Vec<EventRecord>>,
    pub sequences: HashMap<SessionId, u64>,
    pub idempotency: HashMap<String, IdempotencyRecord>,
    pub snapshot_entries: HashMap<SnapshotKey, SnapshotCacheEntry>,
    pub drafts: HashMap<DraftId, Draft>,
    pub repo_index: HashMap<RepositoryId, RepositoryIndexEntry>,
}

impl MaterializedState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a single mutation. Deterministic: replaying the same sequence
    /// of mutations from an empty state always yields the same result.
    pub fn apply(&mut self, mutation: &Mutation) {
        match mutation {
            Mutation::InsertSession { session } => {
                self.sessions.insert(session.id.clone(), (**session).clone());
            }
            Mutation::UpdateSessionStatus {
                id,
                to,
                error_kind,
                error_detail,
                at_epoch_ms,
                ..
            } => {
                if let Some(session) = self.sessions.get_mut(id) {
                    session.status = *to;
                    session.updated_at = epoch_ms_to_datetime(*at_epoch_ms);
                    if *to == SessionStatus::Running && session.started_at.is_none() {
                        session.started_at = Some(session.updated_at);
                    }
                    if to.is_terminal() {
                        session.ended_at = Some(session.updated_at);
                    }
                    session.error_kind = *error_kind;
                    session.error_detail = error_detail.clone();
                }
            }
            Mutation::SetSessionWorkspace {
                id,
                workspace,
                at_epoch_ms,
            } => {
                if let Some(session) = self.sessions.get_mut(id) {
                    session.workspace = Some((**workspace).clone());
                    session.updated_at = epoch_ms_to_datetime(*at_epoch_ms);
                }
            }
            Mutation::SetSessionResolvedCommit {
                id,
                commit,
                at_epoch_ms,
            } => {
                if let Some(session) = self.sessions.get_mut(id) {
                    session.repo.commit = Some(commit.clone());
                    session.updated_at = epoch_ms_to_datetime(*at_epoch_ms);
                }
            }
            Mutation::IncrementAttemptCount { id } => {
                if let Some(session) = self.sessions.get_mut(id) {
                    session.attempt_count += 1;
                }
            }
            Mutation::AppendEvent {
                session_id,
                event,
                at_epoch_ms,
            } => {
                let seq = self.sequences.entry(session_id.clone()).or_insert(0);
                *seq += 1;
                let record = EventRecord {
                    session_id: session_id.clone(),
                    sequence: *seq,
                    ts: epoch_ms_to_datetime(*at_epoch_ms),
                    recorded_at: epoch_ms_to_datetime(*at_epoch_ms),
                    event: (**event).clone(),
                };
                self.events
                    .entry(session_id.clone())
                    .or_default()
                    .push(record);
            }
            Mutation::PutIdempotencyRecord {
                key,
                session_id,
                request_fingerprint,
                expires_at_epoch_ms,
            } => {
                self.idempotency.insert(
                    key.clone(),
                    IdempotencyRecord {
                        session_id: session_id.clone(),
                        request_fingerprint: request_fingerprint.clone(),
                        expires_at_epoch_ms: *expires_at_epoch_ms,
                    },
                );
            }
            Mutation::ReserveSnapshotEntry { key, at_epoch_ms } => {
                self.snapshot_entries
                    .entry(key.clone())
                    .or_insert_with(|| SnapshotCacheEntry {
                        key: key.clone(),
                        snapshot_id: String::new(),
                        provider: forge_core::ProviderKind::Copy,
                        size_bytes: 0,
                        created_at: epoch_ms_to_datetime(*at_epoch_ms),
                        last_access_at: epoch_ms_to_datetime(*at_epoch_ms),
                        ref_count: 1,
                    });
            }
            Mutation::CompleteSnapshotEntry {
                key,
                snapshot_id,
                provider,
                size_bytes,
            } => {
                if let Some(entry) = self.snapshot_entries.get_mut(key) {
                    entry.snapshot_id = snapshot_id.clone();
                    entry.provider = *provider;
                    entry.size_bytes = *size_bytes;
                }
            }
            Mutation::TouchSnapshotEntry { key, at_epoch_ms } => {
                if let Some(entry) = self.snapshot_entries.get_mut(key) {
                    entry.last_access_at = epoch_ms_to_datetime(*at_epoch_ms);
                }
            }
            Mutation::SetSnapshotRefCount { key, ref_count } => {
                if let Some(entry) = self.snapshot_entries.get_mut(key) {
                    entry.ref_count = *ref_count;
                }
            }
            Mutation::EvictSnapshotEntry { key } => {
                self.snapshot_entries.remove(key);
            }
            Mutation::PurgeSessionEvents { id } => {
                // Keep the sequence counter so any later event attachment
                // continues the dense 1..N range instead of restarting it.
                self.events.remove(id);
                if let Some(session) = self.sessions.get_mut(id) {
                    session.cleanup_requested = true;
                }
            }
            Mutation::PutDraft { draft } => {
                self.drafts.insert(draft.id.clone(), (**draft).clone());
            }
            Mutation::DeleteDraft { id } => {
                self.drafts.remove(id);
            }
            Mutation::PutRepositoryIndexEntry { entry } => {
                self.repo_index.insert(entry.id.clone(), (**entry).clone());
            }
        }
    }

    pub fn recent_events(&self, id: &SessionId, n: usize) -> Vec<EventRecord> {
        self.events
            .get(id)
            .map(|events| {
                let start = events.len().saturating_sub(n);
                events[start..].to_vec()
            })
            .unwrap_or_default()
    }

    pub fn events_from(&self, id: &SessionId, from_sequence: u64) -> Vec<EventRecord> {
        self.events
            .get(id)
            .map(|events| {
                events
                    .iter()
                    .filter(|e| e.sequence > from_sequence)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

pub fn epoch_ms_to_datetime(epoch_ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(epoch_ms).unwrap_or_else(Utc::now)
}
