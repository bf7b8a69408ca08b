// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The closed set of error kinds and the error type that carries one.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed set of error kinds. Each maps 1:1 to a Problem+JSON `type` at the
/// adapter boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ValidationFailed,
    ConflictingState,
    NotFound,
    RepoUnavailable,
    ProvisioningFailed,
    NoProvider,
    Capacity,
    Transient,
    Internal,
    BackpressureLost,
    IdempotencyConflict,
}

impl ErrorKind {
    /// Whether the Session Manager should retry this error with backoff
    /// instead of failing the Session outright.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Transient)
    }

    /// The Problem+JSON `type` URI suffix for this kind.
    pub fn problem_type(&self) -> &'static str {
        match self {
            ErrorKind::ValidationFailed => "validation-failed",
            ErrorKind::ConflictingState => "conflicting-state",
            ErrorKind::NotFound => "not-found",
            ErrorKind::RepoUnavailable => "repo-unavailable",
            ErrorKind::ProvisioningFailed => "provisioning-failed",
            ErrorKind::NoProvider => "no-provider",
            ErrorKind::Capacity => "capacity",
            ErrorKind::Transient => "transient",
            ErrorKind::Internal => "internal",
            ErrorKind::BackpressureLost => "backpressure-lost",
            ErrorKind::IdempotencyConflict => "idempotency-conflict",
        }
    }

    /// Conventional HTTP status an adapter would use for this kind.
    pub fn http_status(&self) -> u16 {
        match self {
            ErrorKind::ValidationFailed => 400,
            ErrorKind::ConflictingState => 409,
            ErrorKind::NotFound => 404,
            ErrorKind::RepoUnavailable => 502,
            ErrorKind::ProvisioningFailed => 500,
            ErrorKind::NoProvider => 503,
            ErrorKind::Capacity => 507,
            ErrorKind::Transient => 503,
            ErrorKind::Internal => 500,
            ErrorKind::BackpressureLost => 499,
            ErrorKind::IdempotencyConflict => 409,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.problem_type())
    }
}

/// A core-level error: one of the closed [`ErrorKind`]s plus a human-readable
/// detail message.
#[derive(Debug, Clone, thiserror::Error, Serialize, Deserialize)]
#[error("{kind}: {detail}")]
pub struct CoreError {
    pub kind: ErrorKind,
    pub detail: String,
}

impl CoreError {
    pub fn new(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    pub fn validation(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::ValidationFailed, detail)
    }

    pub fn conflicting_state(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::ConflictingState, detail)
    }

    pub fn not_found(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, detail)
    }

    pub fn transient(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transient, detail)
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, detail)
    }
}

/// Problem+JSON error body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Problem {
    #[serde(rename = "type")]
    pub problem_type: String,
    pub title: String,
    pub status: u16,
    pub detail: String,
    #[serde(default, skip_serializing_if = "std::collections::HashMap::is_empty")]
    pub errors: std::collections::HashMap<String, Vec<String>>,
}

impl From<&CoreError> for Problem {
    fn from(err: &CoreError) -> Self {
        Problem {
            problem_type: format!("https://forge.dev/problems/{}", err.kind.problem_type()),
            title: err.kind.to_string(),
            status: err.kind.http_status(),
            detail: err.detail.clone(),
            errors: Default::default(),
        }
    }
}
