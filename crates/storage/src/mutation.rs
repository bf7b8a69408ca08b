// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The closed set of durable mutations applied to [`crate::state::MaterializedState`].
//!
//! Every Repository Layer write is represented as one
//! `Mutation` so the journal can record it once and replay it
//! deterministically during recovery, mirroring how the event log itself
//! is the durable record of Session activity.

use forge_core::{
    CoreError, Draft, DraftId, Event, ProviderKind, RepositoryIndexEntry, Session, SessionId,
    SessionStatus, SnapshotCacheEntry, SnapshotKey, WorkspaceResult,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Mutation {
    InsertSession {
        session: Box<Session>,
    },
    UpdateSessionStatus {
        id: SessionId,
        from: SessionStatus,
        to: SessionStatus,
        error_kind: Option<forge_core::ErrorKind>,
        error_detail: Option<String>,
        at_epoch_ms: i64,
    },
    SetSessionWorkspace {
        id: SessionId,
        workspace: Box<WorkspaceResult>,
        at_epoch_ms: i64,
    },
    /// Pin `repo.commit` to the immutable hash the branch resolved to on
    /// entry to provisioning.
    SetSessionResolvedCommit {
        id: SessionId,
        commit: String,
        at_epoch_ms: i64,
    },
    IncrementAttemptCount {
        id: SessionId,
    },
    AppendEvent {
        session_id: SessionId,
        event: Box<Event>,
        at_epoch_ms: i64,
    },
    PutIdempotencyRecord {
        key: String,
        session_id: SessionId,
        request_fingerprint: String,
        expires_at_epoch_ms: i64,
    },
    ReserveSnapshotEntry {
        key: SnapshotKey,
        at_epoch_ms: i64,
    },
    CompleteSnapshotEntry {
        key: SnapshotKey,
        snapshot_id: String,
        provider: ProviderKind,
        size_bytes: u64,
    },
    TouchSnapshotEntry {
        key: SnapshotKey,
        at_epoch_ms: i64,
    },
    SetSnapshotRefCount {
        key: SnapshotKey,
        ref_count: u32,
    },
    EvictSnapshotEntry {
        key: SnapshotKey,
    },
    /// Drop a terminal Session's event log and flag the record for
    /// cleanup. The Session row itself is never deleted.
    PurgeSessionEvents {
        id: SessionId,
    },
    PutDraft {
        draft: Box<Draft>,
    },
    DeleteDraft {
        id: DraftId,
    },
    PutRepositoryIndexEntry {
        entry: Box<RepositoryIndexEntry>,
    },
}

/// Either branch of a snapshot-entry reservation: a caller either created a
/// fresh reservation, or observed one that already existed.
#[derive(Debug, Clone)]
pub enum Reservation {
    Created(SnapshotCacheEntry),
    Existing(SnapshotCacheEntry),
}

pub type Result<T> = std::result::Result<T, CoreError>;
