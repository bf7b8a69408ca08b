// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Conversions from every collaborator's error type into `forge_core::CoreError`,
//! so the Session Manager's public contract returns the closed error
//! taxonomy regardless of which layer failed.

use forge_core::{CoreError, ErrorKind};

pub fn from_storage(err: forge_storage::StorageError) -> CoreError {
    match err {
        forge_storage::StorageError::Conflict(detail) => CoreError::new(ErrorKind::ConflictingState, detail),
        forge_storage::StorageError::NotFound(detail) => CoreError::new(ErrorKind::NotFound, detail),
        forge_storage::StorageError::Transient(detail) => CoreError::new(ErrorKind::Transient, detail),
        forge_storage::StorageError::Internal(detail) => CoreError::new(ErrorKind::Internal, detail),
    }
}

pub fn from_cache(err: forge_cache::CacheError) -> CoreError {
    let kind = ErrorKind::from(&err);
    CoreError::new(kind, err.to_string())
}

pub fn from_vcs(err: forge_adapters::VcsError) -> CoreError {
    use forge_adapters::VcsError::*;
    match &err {
        RefNotFound(_) => CoreError::new(ErrorKind::RepoUnavailable, err.to_string()),
        CheckoutFailed(_) => CoreError::new(ErrorKind::ProvisioningFailed, err.to_string()),
        Unreachable(_) => CoreError::new(ErrorKind::Transient, err.to_string()),
    }
}

pub fn from_provider(err: forge_adapters::ProviderError) -> CoreError {
    CoreError::new(ErrorKind::ProvisioningFailed, err.to_string())
}

pub fn from_launcher(err: forge_adapters::LauncherError) -> CoreError {
    CoreError::new(ErrorKind::ProvisioningFailed, err.to_string())
}
