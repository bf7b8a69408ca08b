// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Snapshot-filesystem provider boundary. Only the trait is
//! implemented for real: `zfs`/`btrfs` backends shell out to their
//! respective CLI tools and degrade to `Copy` when the tool is
//! unavailable on the host. The snapshot primitives themselves belong to
//! the filesystem tooling; only this boundary is ours.

use forge_core::ProviderKind;
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider unavailable on this host: {0}")]
    Unavailable(String),
    #[error("snapshot operation failed: {0}")]
    Failed(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct CreatedSnapshot {
    pub snapshot_id: String,
    pub size_bytes: u64,
}

/// A snapshot-filesystem backend capable of producing, mounting, and
/// releasing a point-in-time copy of a working checkout. Synchronous: the
/// Workspace Provisioner runs these through `tokio::task::spawn_blocking`
/// since the underlying tools (`zfs`, `btrfs`, `cp --reflink`) are
/// themselves blocking subprocess calls.
pub trait SnapshotProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Whether the backing tool is present and usable on this host.
    fn is_available(&self) -> bool;

    /// Snapshot `source_checkout` into a new, independently addressable
    /// snapshot identified by `snapshot_id`.
    fn create(&self, source_checkout: &Path, snapshot_id: &str) -> Result<CreatedSnapshot, ProviderError>;

    /// Mount (or copy) `snapshot_id` writable at `dest`.
    fn mount(&self, snapshot_id: &str, dest: &Path) -> Result<(), ProviderError>;

    /// Release all resources held by `snapshot_id`.
    fn release(&self, snapshot_id: &str) -> Result<(), ProviderError>;

    fn size_bytes(&self, snapshot_id: &str) -> Result<u64, ProviderError>;
}

fn dir_size_bytes(path: &Path) -> std::io::Result<u64> {
    let mut total = 0u64;
    if path.is_file() {
        return Ok(path.metadata()?.len());
    }
    for entry in std::fs::read_dir(path)? {
        let entry = entry?;
        let meta = entry.metadata()?;
        if meta.is_dir() {
            total += dir_size_bytes(&entry.path())?;
        } else {
            total += meta.len();
        }
    }
    Ok(total)
}

/// Fallback provider: plain recursive copy (`cp --reflink=auto` where
/// supported, falling back to a full copy). Always available.
pub struct CopyProvider {
    store_dir: PathBuf,
}

impl CopyProvider {
    pub fn new(store_dir: PathBuf) -> Self {
        Self { store_dir }
    }

    fn snapshot_path(&self, snapshot_id: &str) -> PathBuf {
        self.store_dir.join(snapshot_id)
    }
}

impl SnapshotProvider for CopyProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Copy
    }

    fn is_available(&self) -> bool {
        true
    }

    fn create(&self, source_checkout: &Path, snapshot_id: &str) -> Result<CreatedSnapshot, ProviderError> {
        let dest = self.snapshot_path(snapshot_id);
        std::fs::create_dir_all(&self.store_dir)?;

        let status = Command::new("cp")
            .arg("--reflink=auto")
            .arg("-r")
            .arg(source_checkout)
            .arg(&dest)
            .status()?;
        if !status.success() {
            return Err(ProviderError::Failed(format!(
                "cp exited with {status}"
            )));
        }

        let size_bytes = dir_size_bytes(&dest)?;
        Ok(CreatedSnapshot {
            snapshot_id: snapshot_id.to_string(),
            size_bytes,
        })
    }

    fn mount(&self, snapshot_id: &str, dest: &Path) -> Result<(), ProviderError> {
        let source = self.snapshot_path(snapshot_id);
        let status = Command::new("cp")
            .arg("--reflink=auto")
            .arg("-r")
            .arg(&source)
            .arg(dest)
            .status()?;
        if !status.success() {
            return Err(ProviderError::Failed(format!("cp exited with {status}")));
        }
        Ok(())
    }

    fn release(&self, snapshot_id: &str) -> Result<(), ProviderError> {
        let path = self.snapshot_path(snapshot_id);
        if path.exists() {
            std::fs::remove_dir_all(path)?;
        }
        Ok(())
    }

    fn size_bytes(&self, snapshot_id: &str) -> Result<u64, ProviderError> {
        Ok(dir_size_bytes(&self.snapshot_path(snapshot_id))?)
    }
}

/// `zfs` snapshot-backed provider. Degrades to unavailable (so the
/// caller's preference list falls through to the next provider) when the
/// `zfs` binary is not on `PATH`.
pub struct ZfsProvider {
    dataset: String,
}

impl ZfsProvider {
    pub fn new(dataset: impl Into<String>) -> Self {
        Self { dataset: dataset.into() }
    }
}

impl SnapshotProvider for ZfsProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Zfs
    }

    fn is_available(&self) -> bool {
        Command::new("zfs").arg("version").output().map(|o| o.status.success()).unwrap_or(false)
    }

    fn create(&self, _source_checkout: &Path, snapshot_id: &str) -> Result<CreatedSnapshot, ProviderError> {
        let snap = format!("{}@{snapshot_id}", self.dataset);
        let status = Command::new("zfs").args(["snapshot", &snap]).status()?;
        if !status.success() {
            return Err(ProviderError::Failed(format!("zfs snapshot exited with {status}")));
        }
        let size_bytes = zfs_used_bytes(&snap).unwrap_or(0);
        Ok(CreatedSnapshot {
            snapshot_id: snapshot_id.to_string(),
            size_bytes,
        })
    }

    fn mount(&self, snapshot_id: &str, dest: &Path) -> Result<(), ProviderError> {
        let snap = format!("{}@{snapshot_id}", self.dataset);
        let status = Command::new("zfs")
            .args(["clone", &snap, &dest.to_string_lossy()])
            .status()?;
        if !status.success() {
            return Err(ProviderError::Failed(format!("zfs clone exited with {status}")));
        }
        Ok(())
    }

    fn release(&self, snapshot_id: &str) -> Result<(), ProviderError> {
        let snap = format!("{}@{snapshot_id}", self.dataset);
        let status = Command::new("zfs").args(["destroy", &snap]).status()?;
        if !status.success() {
            return Err(ProviderError::Failed(format!("zfs destroy exited with {status}")));
        }
        Ok(())
    }

    fn size_bytes(&self, snapshot_id: &str) -> Result<u64, ProviderError> {
        let snap = format!("{}@{snapshot_id}", self.dataset);
        zfs_used_bytes(&snap).ok_or_else(|| ProviderError::Failed("zfs get used failed".into()))
    }
}

fn zfs_used_bytes(snapshot: &str) -> Option<u64> {
    let output = Command::new("zfs")
        .args(["get", "-Hp", "-o", "value", "used", snapshot])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    String::from_utf8_lossy(&output.stdout).trim().parse().ok()
}

/// `btrfs` subvolume-snapshot-backed provider, same availability-degrade
/// shape as [`ZfsProvider`].
pub struct BtrfsProvider {
    subvolumes_root: PathBuf,
}

impl BtrfsProvider {
    pub fn new(subvolumes_root: PathBuf) -> Self {
        Self { subvolumes_root }
    }

    fn snapshot_path(&self, snapshot_id: &str) -> PathBuf {
        self.subvolumes_root.join(snapshot_id)
    }
}

impl SnapshotProvider for BtrfsProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Btrfs
    }

    fn is_available(&self) -> bool {
        Command::new("btrfs")
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn create(&self, source_checkout: &Path, snapshot_id: &str) -> Result<CreatedSnapshot, ProviderError> {
        std::fs::create_dir_all(&self.subvolumes_root)?;
        let dest = self.snapshot_path(snapshot_id);
        let status = Command::new("btrfs")
            .args(["subvolume", "snapshot"])
            .arg(source_checkout)
            .arg(&dest)
            .status()?;
        if !status.success() {
            return Err(ProviderError::Failed(format!(
                "btrfs subvolume snapshot exited with {status}"
            )));
        }
        let size_bytes = dir_size_bytes(&dest)?;
        Ok(CreatedSnapshot {
            snapshot_id: snapshot_id.to_string(),
            size_bytes,
        })
    }

    fn mount(&self, snapshot_id: &str, dest: &Path) -> Result<(), ProviderError> {
        let source = self.snapshot_path(snapshot_id);
        let status = Command::new("btrfs")
            .args(["subvolume", "snapshot"])
            .arg(&source)
            .arg(dest)
            .status()?;
        if !status.success() {
            return Err(ProviderError::Failed(format!(
                "btrfs subvolume snapshot (mount) exited with {status}"
            )));
        }
        Ok(())
    }

    fn release(&self, snapshot_id: &str) -> Result<(), ProviderError> {
        let path = self.snapshot_path(snapshot_id);
        let status = Command::new("btrfs")
            .args(["subvolume", "delete"])
            .arg(&path)
            .status()?;
        if !status.success() {
            return Err(ProviderError::Failed(format!(
                "btrfs subvolume delete exited with {status}"
            )));
        }
        Ok(())
    }

    fn size_bytes(&self, snapshot_id: &str) -> Result<u64, ProviderError> {
        Ok(dir_size_bytes(&self.snapshot_path(snapshot_id))?)
    }
}

/// Overlay-filesystem-backed provider: snapshots are read-only lower
/// directories; `mount` layers a writable upper/work dir via the kernel
/// `overlay` filesystem.
pub struct OverlayProvider {
    lowers_root: PathBuf,
    upper_root: PathBuf,
}

impl OverlayProvider {
    pub fn new(lowers_root: PathBuf, upper_root: PathBuf) -> Self {
        Self {
            lowers_root,
            upper_root,
        }
    }

    fn lower_path(&self, snapshot_id: &str) -> PathBuf {
        self.lowers_root.join(snapshot_id)
    }
}

impl SnapshotProvider for OverlayProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Overlay
    }

    fn is_available(&self) -> bool {
        Command::new("mount")
            .arg("-t")
            .arg("overlay")
            .arg("--help")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn create(&self, source_checkout: &Path, snapshot_id: &str) -> Result<CreatedSnapshot, ProviderError> {
        std::fs::create_dir_all(&self.lowers_root)?;
        let dest = self.lower_path(snapshot_id);
        let status = Command::new("cp")
            .arg("--reflink=auto")
            .arg("-r")
            .arg(source_checkout)
            .arg(&dest)
            .status()?;
        if !status.success() {
            return Err(ProviderError::Failed(format!("cp exited with {status}")));
        }
        let size_bytes = dir_size_bytes(&dest)?;
        Ok(CreatedSnapshot {
            snapshot_id: snapshot_id.to_string(),
            size_bytes,
        })
    }

    fn mount(&self, snapshot_id: &str, dest: &Path) -> Result<(), ProviderError> {
        let lower = self.lower_path(snapshot_id);
        let upper = self.upper_root.join(format!("{snapshot_id}-upper"));
        let work = self.upper_root.join(format!("{snapshot_id}-work"));
        std::fs::create_dir_all(&upper)?;
        std::fs::create_dir_all(&work)?;
        std::fs::create_dir_all(dest)?;

        let opts = format!(
            "lowerdir={},upperdir={},workdir={}",
            lower.display(),
            upper.display(),
            work.display()
        );
        let status = Command::new("mount")
            .args(["-t", "overlay", "overlay", "-o", &opts])
            .arg(dest)
            .status()?;
        if !status.success() {
            return Err(ProviderError::Failed(format!("mount overlay exited with {status}")));
        }
        Ok(())
    }

    fn release(&self, snapshot_id: &str) -> Result<(), ProviderError> {
        let lower = self.lower_path(snapshot_id);
        if lower.exists() {
            std::fs::remove_dir_all(lower)?;
        }
        Ok(())
    }

    fn size_bytes(&self, snapshot_id: &str) -> Result<u64, ProviderError> {
        Ok(dir_size_bytes(&self.lower_path(snapshot_id))?)
    }
}

/// Pick the first available provider from a preference list: snapshots
/// are registered with the first backend that reports availability.
pub fn first_available(
    candidates: &[std::sync::Arc<dyn SnapshotProvider>],
) -> Option<std::sync::Arc<dyn SnapshotProvider>> {
    candidates.iter().find(|p| p.is_available()).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_provider_round_trips_create_mount_release() {
        let store = tempfile::tempdir().expect("store");
        let source = tempfile::tempdir().expect("source");
        std::fs::write(source.path().join("a.txt"), b"hello").expect("write");

        let provider = CopyProvider::new(store.path().join("snapshots"));
        assert!(provider.is_available());

        let created = provider.create(source.path(), "snap-1").expect("create");
        assert!(created.size_bytes > 0);

        let dest = tempfile::tempdir().expect("dest");
        let mount_dest = dest.path().join("workspace");
        provider.mount("snap-1", &mount_dest).expect("mount");
        assert!(mount_dest.join("a.txt").exists());

        provider.release("snap-1").expect("release");
        assert!(!store.path().join("snapshots").join("snap-1").exists());
    }

    #[test]
    fn first_available_skips_unavailable_providers() {
        struct AlwaysUnavailable;
        impl SnapshotProvider for AlwaysUnavailable {
            fn kind(&self) -> ProviderKind {
                ProviderKind::Zfs
            }
            fn is_available(&self) -> bool {
                false
            }
            fn create(&self, _: &Path, _: &str) -> Result<CreatedSnapshot, ProviderError> {
                unreachable!()
            }
            fn mount(&self, _: &str, _: &Path) -> Result<(), ProviderError> {
                unreachable!()
            }
            fn release(&self, _: &str) -> Result<(), ProviderError> {
                unreachable!()
            }
            fn size_bytes(&self, _: &str) -> Result<u64, ProviderError> {
                unreachable!()
            }
        }

        let store = tempfile::tempdir().expect("store");
        let candidates: Vec<std::sync::Arc<dyn SnapshotProvider>> = vec![
            std::sync::Arc::new(AlwaysUnavailable),
            std::sync::Arc::new(CopyProvider::new(store.path().to_path_buf())),
        ];
        let chosen = first_available(&candidates).expect("one available");
        assert_eq!(chosen.kind(), ProviderKind::Copy);
    }
}
