// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workspace provisioner: resolves a Session's repository
//! reference to an immutable commit, acquires a cached snapshot for that
//! `(repoUrl, commitHash)` pair, and mounts it writable into a per-session
//! workspace directory.

use crate::error::{from_cache, from_provider, from_vcs};
use forge_adapters::{SnapshotProvider, VcsAdapter};
use forge_cache::{ProvisionedSnapshot, SnapshotCache, SnapshotLedger};
use forge_core::{CoreError, ErrorKind, RepoSpec, SessionId, SnapshotKey, WorkspaceResult};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub struct WorkspaceProvisioner<L: SnapshotLedger> {
    cache: Arc<SnapshotCache<L>>,
    vcs: Arc<dyn VcsAdapter>,
    providers: Vec<Arc<dyn SnapshotProvider>>,
    checkouts_root: PathBuf,
    workspaces_root: PathBuf,
}

impl<L: SnapshotLedger + 'static> WorkspaceProvisioner<L> {
    pub fn new(
        cache: Arc<SnapshotCache<L>>,
        vcs: Arc<dyn VcsAdapter>,
        providers: Vec<Arc<dyn SnapshotProvider>>,
        checkouts_root: PathBuf,
        workspaces_root: PathBuf,
    ) -> Self {
        Self {
            cache,
            vcs,
            providers,
            checkouts_root,
            workspaces_root,
        }
    }

    /// Provision a writable workspace for `session_id` from `repo`,
    /// returning the resolved mount path/provider metadata to record on the
    /// Session plus the cache lease backing it. The caller owns the lease
    /// for as long as the workspace is mounted — dropping or releasing it
    /// lets the entry become eviction-eligible again.
    pub async fn provision(
        &self,
        session_id: &SessionId,
        repo: &RepoSpec,
    ) -> Result<(WorkspaceResult, forge_cache::SnapshotHandle<L>), CoreError> {
        let repo_url = repo
            .url
            .as_deref()
            .ok_or_else(|| CoreError::validation("repo.url is required for git-mode sessions"))?;

        let commit_hash = match &repo.commit {
            Some(commit) => commit.clone(),
            None => {
                let reference = repo.branch.as_deref().unwrap_or("HEAD");
                self.vcs
                    .resolve_commit(repo_url, reference)
                    .await
                    .map_err(from_vcs)?
            }
        };

        let key = SnapshotKey::new(repo_url, &commit_hash);
        let providers = self.providers.clone();
        let vcs = self.vcs.clone();
        let checkouts_root = self.checkouts_root.clone();
        let repo_url_owned = repo_url.to_string();
        let commit_for_closure = commit_hash.clone();

        let handle = self
            .cache
            .acquire(key, move || {
                let providers = providers.clone();
                let vcs = vcs.clone();
                let checkouts_root = checkouts_root.clone();
                let repo_url = repo_url_owned.clone();
                let commit_hash = commit_for_closure.clone();
                async move {
                    build_snapshot(&vcs, &providers, &checkouts_root, &repo_url, &commit_hash).await
                }
            })
            .await
            .map_err(from_cache)?;

        let provider = self
            .providers
            .iter()
            .find(|p| p.kind() == handle.provider)
            .ok_or_else(|| CoreError::new(ErrorKind::NoProvider, "no provider matches cached snapshot kind"))?
            .clone();

        let mount_path = self.workspaces_root.join(session_id.as_str());
        let snapshot_id = handle.snapshot_id.clone();
        let mount_path_for_blocking = mount_path.clone();
        tokio::task::spawn_blocking(move || provider.mount(&snapshot_id, &mount_path_for_blocking))
            .await
            .map_err(|e| CoreError::internal(e.to_string()))?
            .map_err(from_provider)?;

        let result = WorkspaceResult {
            snapshot_provider: handle.provider.to_string(),
            mount_path: mount_path.to_string_lossy().into_owned(),
            execution_host_id: None,
            snapshot_id: Some(handle.snapshot_id.clone()),
        };
        Ok((result, handle))
    }
}

async fn build_snapshot(
    vcs: &Arc<dyn VcsAdapter>,
    providers: &[Arc<dyn SnapshotProvider>],
    checkouts_root: &Path,
    repo_url: &str,
    commit_hash: &str,
) -> Result<ProvisionedSnapshot, forge_cache::CacheError> {
    let checkout_dir = checkouts_root.join(commit_hash);
    vcs.checkout(repo_url, commit_hash, &checkout_dir)
        .await
        .map_err(|e| forge_cache::CacheError::RepoUnavailable(e.to_string()))?;

    let provider =
        forge_adapters::provider::first_available(providers).ok_or(forge_cache::CacheError::NoProvider)?;

    let snapshot_id = format!("{}-{}", provider.kind(), commit_hash);
    let provider_kind = provider.kind();
    let checkout_dir_for_blocking = checkout_dir.clone();
    let snapshot_id_for_blocking = snapshot_id.clone();
    let created = tokio::task::spawn_blocking(move || {
        provider.create(&checkout_dir_for_blocking, &snapshot_id_for_blocking)
    })
    .await
    .map_err(|e| forge_cache::CacheError::ProvisioningFailed(e.to_string()))?
    .map_err(|e| forge_cache::CacheError::ProvisioningFailed(e.to_string()))?;

    Ok(ProvisionedSnapshot {
        snapshot_id: created.snapshot_id,
        provider: provider_kind,
        size_bytes: created.size_bytes,
    })
}
