// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The VCS collaborator the Workspace Provisioner drives to resolve a
//! branch/ref to an immutable commit hash and to populate a working
//! checkout. A trait object so provisioner tests can
//! substitute a fake instead of shelling out to `git`.

use crate::subprocess::{run_with_timeout, GIT_CHECKOUT_TIMEOUT};
use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;
use tokio::process::Command;

#[derive(Debug, Error)]
pub enum VcsError {
    #[error("reference not found: {0}")]
    RefNotFound(String),
    #[error("checkout failed: {0}")]
    CheckoutFailed(String),
    #[error("repository unreachable: {0}")]
    Unreachable(String),
}

#[async_trait]
pub trait VcsAdapter: Send + Sync {
    /// Resolve `reference` (a branch, tag, or commit-ish) on `repo_url` to
    /// an immutable commit hash, without requiring a local checkout.
    async fn resolve_commit(&self, repo_url: &str, reference: &str) -> Result<String, VcsError>;

    /// Populate `dest` with a checkout of `repo_url` at `commit_hash`.
    async fn checkout(&self, repo_url: &str, commit_hash: &str, dest: &Path) -> Result<(), VcsError>;
}

/// Production implementation: shells out to the system `git` binary.
#[derive(Debug, Clone, Copy, Default)]
pub struct GitVcsAdapter;

#[async_trait]
impl VcsAdapter for GitVcsAdapter {
    async fn resolve_commit(&self, repo_url: &str, reference: &str) -> Result<String, VcsError> {
        let mut cmd = Command::new("git");
        cmd.args(["ls-remote", repo_url, reference]);
        let output = run_with_timeout(cmd, GIT_CHECKOUT_TIMEOUT, "git ls-remote")
            .await
            .map_err(VcsError::Unreachable)?;

        if !output.status.success() {
            return Err(VcsError::Unreachable(
                String::from_utf8_lossy(&output.stderr).into_owned(),
            ));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        stdout
            .lines()
            .next()
            .and_then(|line| line.split_whitespace().next())
            .map(str::to_string)
            .ok_or_else(|| VcsError::RefNotFound(reference.to_string()))
    }

    async fn checkout(&self, repo_url: &str, commit_hash: &str, dest: &Path) -> Result<(), VcsError> {
        tokio::fs::create_dir_all(dest)
            .await
            .map_err(|e| VcsError::CheckoutFailed(e.to_string()))?;

        let mut init = Command::new("git");
        init.arg("init").arg("--quiet").current_dir(dest);
        run_with_timeout(init, GIT_CHECKOUT_TIMEOUT, "git init")
            .await
            .map_err(VcsError::CheckoutFailed)?;

        let mut fetch = Command::new("git");
        fetch
            .args(["fetch", "--depth=1", "--quiet", repo_url, commit_hash])
            .current_dir(dest);
        let output = run_with_timeout(fetch, GIT_CHECKOUT_TIMEOUT, "git fetch")
            .await
            .map_err(VcsError::CheckoutFailed)?;
        if !output.status.success() {
            return Err(VcsError::CheckoutFailed(
                String::from_utf8_lossy(&output.stderr).into_owned(),
            ));
        }

        let mut checkout = Command::new("git");
        checkout
            .args(["checkout", "--quiet", "FETCH_HEAD"])
            .current_dir(dest);
        let output = run_with_timeout(checkout, GIT_CHECKOUT_TIMEOUT, "git checkout")
            .await
            .map_err(VcsError::CheckoutFailed)?;
        if !output.status.success() {
            return Err(VcsError::CheckoutFailed(
                String::from_utf8_lossy(&output.stderr).into_owned(),
            ));
        }

        Ok(())
    }
}

#[cfg(any(test, feature = "test-support"))]
pub mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    /// Deterministic stand-in for [`VcsAdapter`]: resolves references from a
    /// fixed table and records which commits were checked out where.
    #[derive(Default)]
    pub struct FakeVcsAdapter {
        refs: HashMap<(String, String), String>,
        pub checkouts: Mutex<Vec<(String, String)>>,
        pub fail_checkout: bool,
    }

    impl FakeVcsAdapter {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_ref(mut self, repo_url: &str, reference: &str, commit_hash: &str) -> Self {
            self.refs
                .insert((repo_url.to_string(), reference.to_string()), commit_hash.to_string());
            self
        }
    }

    #[async_trait]
    impl VcsAdapter for FakeVcsAdapter {
        async fn resolve_commit(&self, repo_url: &str, reference: &str) -> Result<String, VcsError> {
            self.refs
                .get(&(repo_url.to_string(), reference.to_string()))
                .cloned()
                .ok_or_else(|| VcsError::RefNotFound(reference.to_string()))
        }

        async fn checkout(&self, repo_url: &str, commit_hash: &str, dest: &Path) -> Result<(), VcsError> {
            if self.fail_checkout {
                return Err(VcsError::CheckoutFailed("forced failure".into()));
            }
            self.checkouts
                .lock()
                .push((repo_url.to_string(), commit_hash.to_string()));
            tokio::fs::create_dir_all(dest)
                .await
                .map_err(|e| VcsError::CheckoutFailed(e.to_string()))?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fake::FakeVcsAdapter;
    use super::*;

    #[tokio::test]
    async fn fake_resolves_known_ref() {
        let vcs = FakeVcsAdapter::new().with_ref("https://example.com/r.git", "main", "abc123");
        let commit = vcs
            .resolve_commit("https://example.com/r.git", "main")
            .await
            .expect("resolve");
        assert_eq!(commit, "abc123");
    }

    #[tokio::test]
    async fn fake_reports_unknown_ref() {
        let vcs = FakeVcsAdapter::new();
        let err = vcs
            .resolve_commit("https://example.com/r.git", "main")
            .await
            .unwrap_err();
        assert!(matches!(err, VcsError::RefNotFound(_)));
    }

    #[tokio::test]
    async fn fake_checkout_records_destination() {
        let dir = tempfile::tempdir().expect("tempdir");
        let vcs = FakeVcsAdapter::new();
        vcs.checkout("https://example.com/r.git", "abc123", dir.path())
            .await
            .expect("checkout");
        assert_eq!(
            vcs.checkouts.lock().as_slice(),
            &[("https://example.com/r.git".to_string(), "abc123".to_string())]
        );
    }
}
