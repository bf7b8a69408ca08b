// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Repository layer failure semantics: transient backend
//! errors, constraint violations, and everything else.

use forge_core::ErrorKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("transient storage error: {0}")]
    Transient(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("internal storage error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind as IoKind;
        match err.kind() {
            IoKind::Interrupted | IoKind::WouldBlock | IoKind::TimedOut => {
                StorageError::Transient(err.to_string())
            }
            _ => StorageError::Internal(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Internal(format!("serialization error: {err}"))
    }
}

impl From<StorageError> for forge_core::CoreError {
    fn from(err: StorageError) -> Self {
        let kind = match &err {
            StorageError::Transient(_) => ErrorKind::Transient,
            StorageError::Conflict(_) => ErrorKind::ConflictingState,
            StorageError::NotFound(_) => ErrorKind::NotFound,
            StorageError::Internal(_) => ErrorKind::Internal,
        };
        forge_core::CoreError::new(kind, err.to_string())
    }
}
