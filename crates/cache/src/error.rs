// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Snapshot cache failure semantics.

use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum CacheError {
    #[error("evicting down to quota still leaves insufficient space for a {needed_bytes}-byte entry")]
    Capacity { needed_bytes: u64 },
    #[error("repository checkout unavailable: {0}")]
    RepoUnavailable(String),
    #[error("provisioning failed: {0}")]
    ProvisioningFailed(String),
    #[error("no snapshot provider available")]
    NoProvider,
    #[error("repository layer error: {0}")]
    Storage(String),
}

impl From<forge_storage::StorageError> for CacheError {
    fn from(err: forge_storage::StorageError) -> Self {
        CacheError::Storage(err.to_string())
    }
}

impl From<&CacheError> for forge_core::ErrorKind {
    fn from(err: &CacheError) -> Self {
        match err {
            CacheError::Capacity { .. } => forge_core::ErrorKind::Capacity,
            CacheError::RepoUnavailable(_) => forge_core::ErrorKind::RepoUnavailable,
            CacheError::ProvisioningFailed(_) => forge_core::ErrorKind::ProvisioningFailed,
            CacheError::NoProvider => forge_core::ErrorKind::NoProvider,
            CacheError::Storage(_) => forge_core::ErrorKind::Internal,
        }
    }
}
