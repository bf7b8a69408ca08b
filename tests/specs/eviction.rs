//! Eviction safety against the
//! real Repository Layer as the cache's durable ledger.

use forge_cache::{CacheError, ProvisionedSnapshot, QuotaConfig, SnapshotCache};
use forge_core::{ProviderKind, SnapshotKey, SystemClock};
use forge_storage::{FileSessionRepository, RepositoryPaths};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

fn open_cache(
    dir: &std::path::Path,
    global_bytes: u64,
) -> (
    Arc<FileSessionRepository<SystemClock>>,
    SnapshotCache<FileSessionRepository<SystemClock>>,
) {
    let repo = Arc::new(
        FileSessionRepository::open(&RepositoryPaths::under(dir), SystemClock).expect("open"),
    );
    let cache = SnapshotCache::new(
        repo.clone(),
        QuotaConfig {
            global_bytes,
            per_repo_bytes: None,
        },
    );
    (repo, cache)
}

fn snapshot(id: &str, size_bytes: u64) -> ProvisionedSnapshot {
    ProvisionedSnapshot {
        snapshot_id: id.into(),
        provider: ProviderKind::Copy,
        size_bytes,
    }
}

const MIB: u64 = 1024 * 1024;

#[tokio::test]
async fn leased_entry_is_never_evicted_even_under_pressure() {
    let tmp = tempfile::tempdir().expect("tmp");
    let (repo, cache) = open_cache(tmp.path(), 100 * MIB);

    // 80 MiB resident, pinned by a live lease.
    let busy = cache
        .acquire(SnapshotKey::new("u", "c1"), || async {
            Ok(snapshot("snap-80", 80 * MIB))
        })
        .await
        .expect("acquire busy");

    // A 40 MiB unrelated entry cannot fit: the resident is ineligible.
    let err = cache
        .acquire(SnapshotKey::new("v", "c2"), || async {
            Ok(snapshot("snap-40", 40 * MIB))
        })
        .await
        .unwrap_err();
    assert!(matches!(err, CacheError::Capacity { .. }));
    assert!(
        repo.get_snapshot_entry(&SnapshotKey::new("u", "c1")).is_some(),
        "pinned entry survives the capacity failure"
    );

    // Owning session terminates; the same request now evicts the 80 MiB entry.
    drop(busy);
    let handle = cache
        .acquire(SnapshotKey::new("v", "c2"), || async {
            Ok(snapshot("snap-40", 40 * MIB))
        })
        .await
        .expect("acquire after release");
    assert_eq!(handle.snapshot_id, "snap-40");
    assert!(repo.get_snapshot_entry(&SnapshotKey::new("u", "c1")).is_none());
}

#[tokio::test]
async fn failed_provisioning_releases_reservation_for_a_rerun() {
    let tmp = tempfile::tempdir().expect("tmp");
    let (repo, cache) = open_cache(tmp.path(), 100 * MIB);
    let runs = Arc::new(AtomicU32::new(0));

    // A cancelled checkout surfaces as a provisioning failure; the
    // reservation must not linger.
    let err = cache
        .acquire(SnapshotKey::new("u", "c1"), || async {
            Err(CacheError::ProvisioningFailed("checkout cancelled".into()))
        })
        .await
        .unwrap_err();
    assert!(matches!(err, CacheError::ProvisioningFailed(_)));
    assert!(repo.get_snapshot_entry(&SnapshotKey::new("u", "c1")).is_none());

    // The next acquire for the same key re-runs provisioning from scratch.
    let runs_for_closure = runs.clone();
    let handle = cache
        .acquire(SnapshotKey::new("u", "c1"), move || {
            let runs = runs_for_closure;
            async move {
                runs.fetch_add(1, Ordering::SeqCst);
                Ok(snapshot("snap-1", MIB))
            }
        })
        .await
        .expect("second acquire");
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(handle.snapshot_id, "snap-1");
}

#[tokio::test]
async fn quota_exactly_met_admits_entry_without_eviction() {
    let tmp = tempfile::tempdir().expect("tmp");
    let (repo, cache) = open_cache(tmp.path(), 100 * MIB);

    let first = cache
        .acquire(SnapshotKey::new("u", "c1"), || async {
            Ok(snapshot("snap-60", 60 * MIB))
        })
        .await
        .expect("acquire first");
    drop(first);

    // 60 + 40 == 100: fits exactly, nothing needs evicting.
    let _second = cache
        .acquire(SnapshotKey::new("u", "c2"), || async {
            Ok(snapshot("snap-40", 40 * MIB))
        })
        .await
        .expect("acquire second");
    assert!(repo.get_snapshot_entry(&SnapshotKey::new("u", "c1")).is_some());
    assert!(repo.get_snapshot_entry(&SnapshotKey::new("u", "c2")).is_some());
}
