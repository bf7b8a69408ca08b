// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The Repository Layer port: durable, transactional persistence for
//! everything the orchestration core owns.
//!
//! Every write goes through a [`Mutation`], appended to the segmented
//! [`Journal`] and then folded into the in-memory [`MaterializedState`]
//! under a single `parking_lot::Mutex`. Reads never touch disk. A
//! background checkpoint (driven by the daemon) periodically compresses
//! the state to disk and prunes redundant journal segments;
//! `FileSessionRepository` exposes the hooks a caller needs to drive that
//! loop (`checkpoint_sync`, `prune_journal`) without owning the
//! scheduling itself.

use crate::checkpoint::{CheckpointError, CheckpointResult, CheckpointStore};
use crate::error::StorageError;
use crate::journal::Journal;
use crate::mutation::{Mutation, Reservation};
use crate::state::MaterializedState;
use forge_core::{
    Clock, Draft, DraftId, Event, EventRecord, ProviderKind, RepositoryId, RepositoryIndexEntry,
    Session, SessionId, SessionStatus, SnapshotCacheEntry, SnapshotKey,
};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};

pub type Result<T> = std::result::Result<T, StorageError>;

/// Paths the repository owns on disk, rooted at a single state directory.
pub struct RepositoryPaths {
    pub journal_dir: PathBuf,
    pub checkpoint_path: PathBuf,
}

impl RepositoryPaths {
    pub fn under(state_dir: &Path) -> Self {
        Self {
            journal_dir: state_dir.join("journal"),
            checkpoint_path: state_dir.join("state.zst"),
        }
    }
}

/// File-backed, crash-recoverable implementation of the Repository Layer.
///
/// Generic over `C: Clock` (rather than `Arc<dyn Clock>`) because `Clock`
/// requires `Clone`, which is not object-safe.
pub struct FileSessionRepository<C: Clock = forge_core::SystemClock> {
    state: Mutex<MaterializedState>,
    journal: Mutex<Journal>,
    checkpoints: CheckpointStore,
    clock: C,
}

impl<C: Clock> FileSessionRepository<C> {
    /// Open (or create) the repository at `paths`, replaying the journal
    /// tail on top of the last durable checkpoint.
    pub fn open(paths: &RepositoryPaths, clock: C) -> Result<Self> {
        let checkpoints = CheckpointStore::new(paths.checkpoint_path.clone());
        let (mut state, committed_seq) = match checkpoints
            .load()
            .map_err(|e| StorageError::Internal(e.to_string()))?
        {
            Some(saved) => (saved.state, saved.seq),
            None => (MaterializedState::new(), 0),
        };

        let (journal, pending) = Journal::open(&paths.journal_dir, committed_seq)
            .map_err(|e| StorageError::Internal(e.to_string()))?;
        for record in pending {
            state.apply(&record.mutation);
        }

        Ok(Self {
            state: Mutex::new(state),
            journal: Mutex::new(journal),
            checkpoints,
            clock,
        })
    }

    fn now_epoch_ms(&self) -> i64 {
        self.clock.now().timestamp_millis()
    }

    /// Append-then-apply: durable before it is ever visible to readers.
    /// The journal lock is held across the apply (journal before state,
    /// same order as `checkpoint_sync`) so a concurrent checkpoint never
    /// observes a sequence the state doesn't yet reflect.
    fn commit(&self, mutation: Mutation) -> Result<()> {
        let mut journal = self.journal.lock();
        journal
            .append(&mutation)
            .map_err(|e| StorageError::Internal(e.to_string()))?;
        self.state.lock().apply(&mutation);
        Ok(())
    }

    // ---- Sessions ----

    pub fn insert_session(&self, session: Session) -> Result<()> {
        if self.state.lock().sessions.contains_key(&session.id) {
            return Err(StorageError::Conflict(format!(
                "session {} already exists",
                session.id
            )));
        }
        self.commit(Mutation::InsertSession {
            session: Box::new(session),
        })
    }

    pub fn get_session(&self, id: &SessionId) -> Option<Session> {
        self.state.lock().sessions.get(id).cloned()
    }

    pub fn list_sessions(&self) -> Vec<Session> {
        let state = self.state.lock();
        let mut sessions: Vec<Session> = state.sessions.values().cloned().collect();
        sessions.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        sessions
    }

    /// Transition a Session's status, enforcing the state machine before
    /// committing. Returns `ConflictingState` for an illegal transition
    /// and `NotFound` for an unknown session.
    pub fn update_session_status(
        &self,
        id: &SessionId,
        to: SessionStatus,
        error_kind: Option<forge_core::ErrorKind>,
        error_detail: Option<String>,
    ) -> Result<()> {
        let from = {
            let state = self.state.lock();
            let session = state
                .sessions
                .get(id)
                .ok_or_else(|| StorageError::NotFound(format!("session {id}")))?;
            session.status
        };

        if !from.can_transition_to(to) {
            return Err(StorageError::Conflict(format!(
                "illegal transition {from} -> {to}"
            )));
        }

        self.commit(Mutation::UpdateSessionStatus {
            id: id.clone(),
            from,
            to,
            error_kind,
            error_detail,
            at_epoch_ms: self.now_epoch_ms(),
        })
    }

    /// Record the Workspace Provisioner's result on a Session.
    pub fn set_session_workspace(&self, id: &SessionId, workspace: forge_core::WorkspaceResult) -> Result<()> {
        if !self.state.lock().sessions.contains_key(id) {
            return Err(StorageError::NotFound(format!("session {id}")));
        }
        self.commit(Mutation::SetSessionWorkspace {
            id: id.clone(),
            workspace: Box::new(workspace),
            at_epoch_ms: self.now_epoch_ms(),
        })
    }

    /// Pin the immutable commit hash a Session's branch resolved to.
    pub fn set_session_resolved_commit(&self, id: &SessionId, commit: &str) -> Result<()> {
        if !self.state.lock().sessions.contains_key(id) {
            return Err(StorageError::NotFound(format!("session {id}")));
        }
        self.commit(Mutation::SetSessionResolvedCommit {
            id: id.clone(),
            commit: commit.to_string(),
            at_epoch_ms: self.now_epoch_ms(),
        })
    }

    /// Bump a Session's provisioning/start attempt counter, used by the
    /// Session Manager's bounded-retry policy.
    pub fn increment_attempt_count(&self, id: &SessionId) -> Result<()> {
        if !self.state.lock().sessions.contains_key(id) {
            return Err(StorageError::NotFound(format!("session {id}")));
        }
        self.commit(Mutation::IncrementAttemptCount { id: id.clone() })
    }

    // ---- Events ----

    pub fn append_event(&self, session_id: &SessionId, event: Event) -> Result<()> {
        if !self.state.lock().sessions.contains_key(session_id) {
            return Err(StorageError::NotFound(format!("session {session_id}")));
        }
        self.commit(Mutation::AppendEvent {
            session_id: session_id.clone(),
            event: Box::new(event),
            at_epoch_ms: self.now_epoch_ms(),
        })
    }

    pub fn recent_events(&self, session_id: &SessionId, n: usize) -> Vec<EventRecord> {
        self.state.lock().recent_events(session_id, n)
    }

    pub fn events_from(&self, session_id: &SessionId, from_sequence: u64) -> Vec<EventRecord> {
        self.state.lock().events_from(session_id, from_sequence)
    }

    /// Drop a terminal Session's events (retention policy). Rejected with
    /// `Conflict` while the Session is still live, since live Sessions
    /// need their backlog for `subscribe`.
    pub fn purge_session_events(&self, id: &SessionId) -> Result<()> {
        let status = {
            let state = self.state.lock();
            state
                .sessions
                .get(id)
                .ok_or_else(|| StorageError::NotFound(format!("session {id}")))?
                .status
        };
        if !status.is_terminal() {
            return Err(StorageError::Conflict(format!(
                "session {id} is still {status}; events can only be purged once terminal"
            )));
        }
        self.commit(Mutation::PurgeSessionEvents { id: id.clone() })
    }

    // ---- Idempotency ----

    pub fn idempotency_lookup(&self, key: &str) -> Option<SessionId> {
        self.idempotency_lookup_with_fingerprint(key).map(|(id, _)| id)
    }

    /// Same as [`Self::idempotency_lookup`], but also returns the stored
    /// request fingerprint so a caller can detect `IdempotencyConflict`
    /// (same key, different request body).
    pub fn idempotency_lookup_with_fingerprint(&self, key: &str) -> Option<(SessionId, String)> {
        let state = self.state.lock();
        let record = state.idempotency.get(key)?;
        if record.expires_at_epoch_ms <= self.now_epoch_ms() {
            return None;
        }
        Some((record.session_id.clone(), record.request_fingerprint.clone()))
    }

    pub fn put_idempotency_record(
        &self,
        key: &str,
        session_id: &SessionId,
        request_fingerprint: &str,
        ttl_ms: i64,
    ) -> Result<()> {
        self.commit(Mutation::PutIdempotencyRecord {
            key: key.to_string(),
            session_id: session_id.clone(),
            request_fingerprint: request_fingerprint.to_string(),
            expires_at_epoch_ms: self.now_epoch_ms() + ttl_ms,
        })
    }

    // ---- Snapshot cache entries (ownership lives in forge-cache; this is
    //      durable bookkeeping only) ----

    pub fn get_snapshot_entry(&self, key: &SnapshotKey) -> Option<SnapshotCacheEntry> {
        self.state.lock().snapshot_entries.get(key).cloned()
    }

    pub fn list_snapshot_entries(&self) -> Vec<SnapshotCacheEntry> {
        self.state.lock().snapshot_entries.values().cloned().collect()
    }

    /// Reserve an entry for `key`, returning whether one already existed.
    /// Atomic: callers use this for single-flight provisioning.
    pub fn reserve_snapshot_entry(&self, key: &SnapshotKey) -> Result<Reservation> {
        let existing = self.state.lock().snapshot_entries.get(key).cloned();
        if let Some(entry) = existing {
            return Ok(Reservation::Existing(entry));
        }
        self.commit(Mutation::ReserveSnapshotEntry {
            key: key.clone(),
            at_epoch_ms: self.now_epoch_ms(),
        })?;
        let entry = self
            .state
            .lock()
            .snapshot_entries
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::Internal("reservation vanished".into()))?;
        Ok(Reservation::Created(entry))
    }

    pub fn complete_snapshot_entry(
        &self,
        key: &SnapshotKey,
        snapshot_id: &str,
        provider: ProviderKind,
        size_bytes: u64,
    ) -> Result<()> {
        self.commit(Mutation::CompleteSnapshotEntry {
            key: key.clone(),
            snapshot_id: snapshot_id.to_string(),
            provider,
            size_bytes,
        })
    }

    pub fn touch_snapshot_entry(&self, key: &SnapshotKey) -> Result<()> {
        self.commit(Mutation::TouchSnapshotEntry {
            key: key.clone(),
            at_epoch_ms: self.now_epoch_ms(),
        })
    }

    pub fn set_snapshot_ref_count(&self, key: &SnapshotKey, ref_count: u32) -> Result<()> {
        self.commit(Mutation::SetSnapshotRefCount {
            key: key.clone(),
            ref_count,
        })
    }

    pub fn evict_snapshot_entry(&self, key: &SnapshotKey) -> Result<()> {
        self.commit(Mutation::EvictSnapshotEntry { key: key.clone() })
    }

    // ---- Drafts ----

    pub fn put_draft(&self, draft: Draft) -> Result<()> {
        self.commit(Mutation::PutDraft {
            draft: Box::new(draft),
        })
    }

    pub fn get_draft(&self, id: &DraftId) -> Option<Draft> {
        self.state.lock().drafts.get(id).cloned()
    }

    pub fn list_drafts(&self) -> Vec<Draft> {
        self.state.lock().drafts.values().cloned().collect()
    }

    pub fn delete_draft(&self, id: &DraftId) -> Result<()> {
        self.commit(Mutation::DeleteDraft { id: id.clone() })
    }

    // ---- Repository catalog ----

    pub fn put_repository_index_entry(&self, entry: RepositoryIndexEntry) -> Result<()> {
        self.commit(Mutation::PutRepositoryIndexEntry {
            entry: Box::new(entry),
        })
    }

    pub fn list_repository_index(&self) -> Vec<RepositoryIndexEntry> {
        self.state.lock().repo_index.values().cloned().collect()
    }

    pub fn get_repository_index_entry(&self, id: &RepositoryId) -> Option<RepositoryIndexEntry> {
        self.state.lock().repo_index.get(id).cloned()
    }

    // ---- Checkpointing hooks, driven by the daemon's background loop ----

    /// Snapshot the state together with the journal sequence it reflects.
    /// Locks journal before state, the same order `commit` uses, so the
    /// pair is always consistent.
    pub fn checkpoint_sync(&self) -> std::result::Result<CheckpointResult, CheckpointError> {
        let (state, seq) = {
            let journal = self.journal.lock();
            let seq = journal.last_seq();
            (self.state.lock().clone(), seq)
        };
        self.checkpoints.save(seq, &state)
    }

    /// Drop journal segments fully covered by a checkpoint at
    /// `through_seq`. Only call with a sequence a successful
    /// [`Self::checkpoint_sync`] returned.
    pub fn prune_journal(&self, through_seq: u64) -> Result<()> {
        self.journal
            .lock()
            .prune_through(through_seq)
            .map_err(|e| StorageError::Internal(e.to_string()))
    }
}
