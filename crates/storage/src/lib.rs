// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! forge-storage: the repository layer, durable storage for
//! Sessions, Events, the Snapshot Cache's bookkeeping, Drafts, and the
//! Repository Catalog, backed by a segmented mutation journal plus
//! periodic zstd-compressed checkpoints.

mod checkpoint;
mod error;
mod journal;
mod migration;
mod mutation;
mod repository;
mod state;

pub use checkpoint::{
    CheckpointError, CheckpointResult, CheckpointStore, SavedState, STATE_FORMAT_VERSION,
};
pub use error::StorageError;
pub use journal::{Journal, JournalError, JournalRecord};
pub use migration::UpgradeError;
pub use mutation::{Mutation, Reservation};
pub use repository::{FileSessionRepository, RepositoryPaths};
pub use state::{IdempotencyRecord, MaterializedState};
