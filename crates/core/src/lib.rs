// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! forge-core: shared data model for the session orchestration core.

pub mod clock;
pub mod draft;
pub mod error;
pub mod event;
pub mod id;
pub mod repo_index;
pub mod session;
pub mod snapshot;
pub mod time_fmt;
pub mod wire;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use clock::{Clock, FakeClock, SystemClock};
pub use draft::Draft;
pub use error::{CoreError, ErrorKind, Problem};
pub use event::{Event, EventRecord, FleetPayload, LogLevel, ToolStatus};
pub use id::{DraftId, IdGen, RepositoryId, SessionId, ToolExecutionId, UuidIdGen};
pub use repo_index::RepositoryIndexEntry;
pub use session::{
    AgentSpec, ChangesSummary, DeliveryMode, DeliverySpec, RepoMode, RepoSpec, ResourceLimits,
    RuntimeSpec, RuntimeType, Session, SessionStatus, TaskSpec, WorkspaceResult,
};
pub use snapshot::{ProviderKind, SnapshotCacheEntry, SnapshotKey};
pub use wire::{Page, PageRequest, SessionView};
