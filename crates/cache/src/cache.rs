// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `SnapshotCache::acquire` — single-flight admission plus LRU-by-quota
//! eviction. Single-flight is coordinated with a `tokio::sync::watch`
//! channel per in-flight key: the first caller to observe a key absent from
//! the in-flight map becomes the winner and actually runs the provisioning
//! closure; every other concurrent caller for the same key subscribes to
//! the same channel and shares the winner's eventual result or error.

use crate::error::CacheError;
use crate::ledger::SnapshotLedger;
use forge_core::{ProviderKind, SnapshotCacheEntry, SnapshotKey};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::warn;

/// What a caller-supplied provisioning closure hands back to `acquire` on
/// success: the snapshot id, the backend that registered it, and its
/// measured size.
#[derive(Debug, Clone)]
pub struct ProvisionedSnapshot {
    pub snapshot_id: String,
    pub provider: ProviderKind,
    pub size_bytes: u64,
}

pub type ProvisionOutcome = Result<ProvisionedSnapshot, CacheError>;

#[derive(Debug, Clone, Copy)]
pub struct QuotaConfig {
    pub global_bytes: u64,
    pub per_repo_bytes: Option<u64>,
}

/// A leased reference to a resident snapshot. Dropping it (or calling
/// `release` explicitly) decrements the entry's `refCount`; the entry
/// becomes eviction-eligible only once the count reaches zero.
pub struct SnapshotHandle<L: SnapshotLedger> {
    key: SnapshotKey,
    ledger: Arc<L>,
    pub snapshot_id: String,
    pub provider: ProviderKind,
    pub size_bytes: u64,
    released: AtomicBool,
}

impl<L: SnapshotLedger> std::fmt::Debug for SnapshotHandle<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotHandle")
            .field("key", &self.key)
            .field("snapshot_id", &self.snapshot_id)
            .field("provider", &self.provider)
            .field("size_bytes", &self.size_bytes)
            .field("released", &self.released)
            .finish()
    }
}

impl<L: SnapshotLedger> SnapshotHandle<L> {
    pub fn key(&self) -> &SnapshotKey {
        &self.key
    }

    /// Release the lease early. Equivalent to dropping the handle; calling
    /// this and then letting the handle drop is a no-op the second time.
    pub fn release(self) {
        self.release_inner();
    }

    fn release_inner(&self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(entry) = self.ledger.get_snapshot_entry(&self.key) {
            let new_count = entry.ref_count.saturating_sub(1);
            if let Err(e) = self.ledger.set_snapshot_ref_count(&self.key, new_count) {
                warn!(key = %self.key, error = %e, "failed to record snapshot release");
            }
        }
    }
}

impl<L: SnapshotLedger> Drop for SnapshotHandle<L> {
    fn drop(&mut self) {
        self.release_inner();
    }
}

type InflightMap = HashMap<SnapshotKey, watch::Sender<Option<ProvisionOutcome>>>;

pub struct SnapshotCache<L: SnapshotLedger> {
    ledger: Arc<L>,
    quota: QuotaConfig,
    inflight: Mutex<InflightMap>,
}

impl<L: SnapshotLedger> SnapshotCache<L> {
    pub fn new(ledger: Arc<L>, quota: QuotaConfig) -> Self {
        Self {
            ledger,
            quota,
            inflight: Mutex::new(HashMap::new()),
        }
    }

    /// Acquire a lease on `key`, running `provision` at most once across all
    /// concurrent callers for that key.
    pub async fn acquire<F, Fut>(
        &self,
        key: SnapshotKey,
        provision: F,
    ) -> Result<SnapshotHandle<L>, CacheError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ProvisionOutcome>,
    {
        let (is_winner, mut rx) = {
            let mut inflight = self.inflight.lock();
            if let Some(tx) = inflight.get(&key) {
                (false, tx.subscribe())
            } else {
                let (tx, rx) = watch::channel(None);
                inflight.insert(key.clone(), tx);
                (true, rx)
            }
        };

        if !is_winner {
            loop {
                if let Some(outcome) = rx.borrow_and_update().clone() {
                    return self.finish_waiter(&key, outcome);
                }
                if rx.changed().await.is_err() {
                    return Err(CacheError::ProvisioningFailed(
                        "provisioning coordinator dropped before completion".into(),
                    ));
                }
            }
        }

        let outcome = self.run_reservation_and_provision(&key, provision).await;

        if let Some(tx) = self.inflight.lock().remove(&key) {
            let _ = tx.send(Some(outcome.clone()));
        }

        self.finish_winner(&key, outcome)
    }

    async fn run_reservation_and_provision<F, Fut>(
        &self,
        key: &SnapshotKey,
        provision: F,
    ) -> ProvisionOutcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ProvisionOutcome>,
    {
        let reservation = self.ledger.reserve_snapshot_entry(key).map_err(CacheError::from)?;

        match reservation {
            forge_storage::Reservation::Existing(entry) => {
                self.ledger
                    .set_snapshot_ref_count(key, entry.ref_count + 1)
                    .map_err(CacheError::from)?;
                self.ledger.touch_snapshot_entry(key).map_err(CacheError::from)?;
                Ok(ProvisionedSnapshot {
                    snapshot_id: entry.snapshot_id,
                    provider: entry.provider,
                    size_bytes: entry.size_bytes,
                })
            }
            forge_storage::Reservation::Created(_placeholder) => {
                let built = match provision().await {
                    Ok(b) => b,
                    Err(e) => {
                        let _ = self.ledger.evict_snapshot_entry(key);
                        return Err(e);
                    }
                };

                if let Err(e) = self.ensure_capacity(key, built.size_bytes) {
                    let _ = self.ledger.evict_snapshot_entry(key);
                    return Err(e);
                }

                self.ledger
                    .complete_snapshot_entry(key, &built.snapshot_id, built.provider, built.size_bytes)
                    .map_err(CacheError::from)?;
                self.ledger.set_snapshot_ref_count(key, 1).map_err(CacheError::from)?;
                Ok(built)
            }
        }
    }

    fn finish_waiter(&self, key: &SnapshotKey, outcome: ProvisionOutcome) -> Result<SnapshotHandle<L>, CacheError> {
        outcome?;
        let entry = self.ledger.get_snapshot_entry(key).cloned_or_missing()?;
        self.ledger
            .set_snapshot_ref_count(key, entry.ref_count + 1)
            .map_err(CacheError::from)?;
        self.ledger.touch_snapshot_entry(key).map_err(CacheError::from)?;
        let entry = self.ledger.get_snapshot_entry(key).cloned_or_missing()?;
        Ok(self.handle_from_entry(key, entry))
    }

    fn finish_winner(&self, key: &SnapshotKey, outcome: ProvisionOutcome) -> Result<SnapshotHandle<L>, CacheError> {
        outcome?;
        let entry = self.ledger.get_snapshot_entry(key).cloned_or_missing()?;
        Ok(self.handle_from_entry(key, entry))
    }

    fn handle_from_entry(&self, key: &SnapshotKey, entry: SnapshotCacheEntry) -> SnapshotHandle<L> {
        SnapshotHandle {
            key: key.clone(),
            ledger: self.ledger.clone(),
            snapshot_id: entry.snapshot_id,
            provider: entry.provider,
            size_bytes: entry.size_bytes,
            released: AtomicBool::new(false),
        }
    }

    /// Evict eviction-eligible entries, ascending `lastAccessAt` then
    /// ascending `sizeBytes` then ascending `createdAt`, until admitting
    /// `needed_bytes` for `key` would not exceed the global or per-repo
    /// quota. Fails with `Capacity` if there is not enough eligible space
    /// even after evicting everything it can.
    fn ensure_capacity(&self, key: &SnapshotKey, needed_bytes: u64) -> Result<(), CacheError> {
        let entries = self.ledger.list_snapshot_entries();

        let global_used: u64 = entries.iter().filter(|e| &e.key != key).map(|e| e.size_bytes).sum();
        let repo_used: u64 = entries
            .iter()
            .filter(|e| &e.key != key && e.key.repo_url == key.repo_url)
            .map(|e| e.size_bytes)
            .sum();

        let global_over = (global_used + needed_bytes).saturating_sub(self.quota.global_bytes);
        let repo_over = self
            .quota
            .per_repo_bytes
            .map(|q| (repo_used + needed_bytes).saturating_sub(q))
            .unwrap_or(0);

        if global_over == 0 && repo_over == 0 {
            return Ok(());
        }

        let mut eligible: Vec<SnapshotCacheEntry> = entries
            .into_iter()
            .filter(|e| &e.key != key && e.is_eviction_eligible())
            .collect();
        eligible.sort_by(|a, b| {
            a.last_access_at
                .cmp(&b.last_access_at)
                .then(a.size_bytes.cmp(&b.size_bytes))
                .then(a.created_at.cmp(&b.created_at))
        });

        let mut freed_global = 0u64;
        let mut freed_repo = 0u64;
        let mut to_evict = Vec::new();

        for entry in eligible {
            if freed_global >= global_over && freed_repo >= repo_over {
                break;
            }
            let same_repo = entry.key.repo_url == key.repo_url;
            if freed_global < global_over || (same_repo && freed_repo < repo_over) {
                freed_global += entry.size_bytes;
                if same_repo {
                    freed_repo += entry.size_bytes;
                }
                to_evict.push(entry.key);
            }
        }

        if freed_global < global_over || freed_repo < repo_over {
            return Err(CacheError::Capacity { needed_bytes });
        }

        for evicted_key in to_evict {
            let _ = self.ledger.evict_snapshot_entry(&evicted_key);
        }
        Ok(())
    }
}

trait OptionEntryExt {
    fn cloned_or_missing(self) -> Result<SnapshotCacheEntry, CacheError>;
}

impl OptionEntryExt for Option<SnapshotCacheEntry> {
    fn cloned_or_missing(self) -> Result<SnapshotCacheEntry, CacheError> {
        self.ok_or_else(|| CacheError::Storage("snapshot entry vanished mid-acquire".into()))
    }
}
