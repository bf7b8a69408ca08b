// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The durable-bookkeeping seam the Snapshot Cache needs from the
//! Repository Layer. Kept as a small local
//! trait rather than depending on `forge_storage::FileSessionRepository`
//! directly so the cache's concurrency and eviction logic can be tested
//! against an in-memory fake.

use forge_core::{ProviderKind, SnapshotCacheEntry, SnapshotKey};
use forge_storage::{FileSessionRepository, Reservation, StorageError};

pub trait SnapshotLedger: Send + Sync {
    fn reserve_snapshot_entry(&self, key: &SnapshotKey) -> Result<Reservation, StorageError>;
    fn complete_snapshot_entry(
        &self,
        key: &SnapshotKey,
        snapshot_id: &str,
        provider: ProviderKind,
        size_bytes: u64,
    ) -> Result<(), StorageError>;
    fn touch_snapshot_entry(&self, key: &SnapshotKey) -> Result<(), StorageError>;
    fn set_snapshot_ref_count(&self, key: &SnapshotKey, ref_count: u32) -> Result<(), StorageError>;
    fn evict_snapshot_entry(&self, key: &SnapshotKey) -> Result<(), StorageError>;
    fn get_snapshot_entry(&self, key: &SnapshotKey) -> Option<SnapshotCacheEntry>;
    fn list_snapshot_entries(&self) -> Vec<SnapshotCacheEntry>;
}

impl<C: forge_core::Clock> SnapshotLedger for FileSessionRepository<C> {
    fn reserve_snapshot_entry(&self, key: &SnapshotKey) -> Result<Reservation, StorageError> {
        FileSessionRepository::reserve_snapshot_entry(self, key)
    }

    fn complete_snapshot_entry(
        &self,
        key: &SnapshotKey,
        snapshot_id: &str,
        provider: ProviderKind,
        size_bytes: u64,
    ) -> Result<(), StorageError> {
        FileSessionRepository::complete_snapshot_entry(self, key, snapshot_id, provider, size_bytes)
    }

    fn touch_snapshot_entry(&self, key: &SnapshotKey) -> Result<(), StorageError> {
        FileSessionRepository::touch_snapshot_entry(self, key)
    }

    fn set_snapshot_ref_count(&self, key: &SnapshotKey, ref_count: u32) -> Result<(), StorageError> {
        FileSessionRepository::set_snapshot_ref_count(self, key, ref_count)
    }

    fn evict_snapshot_entry(&self, key: &SnapshotKey) -> Result<(), StorageError> {
        FileSessionRepository::evict_snapshot_entry(self, key)
    }

    fn get_snapshot_entry(&self, key: &SnapshotKey) -> Option<SnapshotCacheEntry> {
        FileSessionRepository::get_snapshot_entry(self, key)
    }

    fn list_snapshot_entries(&self) -> Vec<SnapshotCacheEntry> {
        FileSessionRepository::list_snapshot_entries(self)
    }
}
