// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable state checkpoints.
//!
//! A checkpoint is a zstd-compressed JSON envelope holding the full
//! materialized state plus the journal sequence it reflects. Saving is
//! write-to-temp, sync, rename, sync-directory, in that order; a caller
//! may prune the journal through the envelope's sequence only after
//! `save` returns. Loading runs any schema upgrades registered in
//! [`crate::migration`] before deserializing.

use crate::migration::{self, UpgradeError};
use crate::state::MaterializedState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Version tag written into every envelope; bump together with a new
/// upgrade step in [`crate::migration`].
pub const STATE_FORMAT_VERSION: u32 = 1;

/// zstd level: the state compresses well at the cheap end of the scale.
const COMPRESSION_LEVEL: i32 = 3;

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("checkpoint io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("checkpoint encode error: {0}")]
    Encode(#[from] serde_json::Error),
    #[error(transparent)]
    Upgrade(#[from] UpgradeError),
}

#[derive(Serialize, Deserialize)]
struct Envelope {
    v: u32,
    seq: u64,
    taken_at: DateTime<Utc>,
    state: MaterializedState,
}

#[derive(Debug, Clone)]
pub struct CheckpointResult {
    pub seq: u64,
    pub size_bytes: u64,
}

/// What a successful load hands back: the state and the journal sequence
/// it already reflects.
pub struct SavedState {
    pub seq: u64,
    pub state: MaterializedState,
}

/// One checkpoint file at a fixed path, atomically replaced on each save.
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn save(
        &self,
        seq: u64,
        state: &MaterializedState,
    ) -> Result<CheckpointResult, CheckpointError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let staging = self.path.with_extension("staging");

        {
            let file = File::create(&staging)?;
            let mut encoder = zstd::stream::write::Encoder::new(file, COMPRESSION_LEVEL)?;
            serde_json::to_writer(
                &mut encoder,
                &Envelope {
                    v: STATE_FORMAT_VERSION,
                    seq,
                    taken_at: Utc::now(),
                    state: state.clone(),
                },
            )?;
            encoder.finish()?.sync_all()?;
        }

        std::fs::rename(&staging, &self.path)?;
        if let Some(parent) = self.path.parent() {
            File::open(parent)?.sync_all()?;
        }

        let size_bytes = std::fs::metadata(&self.path)?.len();
        Ok(CheckpointResult { seq, size_bytes })
    }

    /// `None` when no checkpoint has ever been taken.
    pub fn load(&self) -> Result<Option<SavedState>, CheckpointError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let decoder = zstd::stream::read::Decoder::new(File::open(&self.path)?)?;
        let raw: serde_json::Value = serde_json::from_reader(decoder)?;
        let upgraded = migration::upgrade(raw, STATE_FORMAT_VERSION)?;
        let envelope: Envelope = serde_json::from_value(upgraded)?;
        Ok(Some(SavedState {
            seq: envelope.seq,
            state: envelope.state,
        }))
    }
}
