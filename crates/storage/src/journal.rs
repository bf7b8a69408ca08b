// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Segmented mutation journal.
//!
//! One JSON record per line, one file per segment, all under a journal
//! directory. A segment is named by the sequence number of its first
//! record (zero-padded so lexicographic order is sequence order), and a
//! new segment is started once the active one crosses a size threshold.
//! Two consequences fall out of that layout:
//!
//! - pruning after a checkpoint deletes whole files rather than
//!   rewriting the log in place, and
//! - the only place a torn write can land is the tail of the newest
//!   segment, which is repaired on open by truncating the file back to
//!   its last intact record.
//!
//! Every append is synced before it returns; a mutation the repository
//! has applied is always recoverable.

use crate::mutation::Mutation;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

/// Roll to a new segment once the active one grows past this.
const SEGMENT_ROLL_BYTES: u64 = 8 * 1024 * 1024;

const SEGMENT_SUFFIX: &str = ".wal";

#[derive(Debug, Error)]
pub enum JournalError {
    #[error("journal io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("journal encode error: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("segment {segment} is corrupt before its end (record {seq} expected next)")]
    Corrupt { segment: String, seq: u64 },
}

/// One durable line of the journal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalRecord {
    pub seq: u64,
    pub mutation: Mutation,
}

fn segment_name(first_seq: u64) -> String {
    format!("{first_seq:020}{SEGMENT_SUFFIX}")
}

fn parse_segment_name(name: &str) -> Option<u64> {
    name.strip_suffix(SEGMENT_SUFFIX)?.parse().ok()
}

/// Sorted `(first_seq, path)` list of the segments currently on disk.
fn list_segments(dir: &Path) -> Result<Vec<(u64, PathBuf)>, JournalError> {
    let mut segments = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        if let Some(first_seq) = name.to_str().and_then(parse_segment_name) {
            segments.push((first_seq, entry.path()));
        }
    }
    segments.sort_by_key(|(first_seq, _)| *first_seq);
    Ok(segments)
}

/// Outcome of scanning one segment: the records it held, the byte length
/// of its intact prefix, and whether anything after that prefix had to be
/// discarded.
struct SegmentScan {
    records: Vec<JournalRecord>,
    intact_len: u64,
    torn: bool,
}

fn scan_segment(path: &Path) -> Result<SegmentScan, JournalError> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut records = Vec::new();
    let mut intact_len = 0u64;
    let mut line = Vec::new();

    loop {
        line.clear();
        let n = reader.read_until(b'\n', &mut line)?;
        if n == 0 {
            return Ok(SegmentScan {
                records,
                intact_len,
                torn: false,
            });
        }
        // A line without its newline, or one that doesn't decode, is a
        // torn tail: everything before it is intact.
        if line.last() != Some(&b'\n') {
            return Ok(SegmentScan {
                records,
                intact_len,
                torn: true,
            });
        }
        match serde_json::from_slice::<JournalRecord>(&line) {
            Ok(record) => {
                records.push(record);
                intact_len += n as u64;
            }
            Err(_) => {
                return Ok(SegmentScan {
                    records,
                    intact_len,
                    torn: true,
                });
            }
        }
    }
}

/// Append-only, segment-per-file mutation log.
pub struct Journal {
    dir: PathBuf,
    active: File,
    active_path: PathBuf,
    active_len: u64,
    last_seq: u64,
}

impl Journal {
    /// Open (or create) the journal under `dir`, repair a torn tail in
    /// the newest segment, and return the records strictly after
    /// `committed_seq` so the caller can replay them onto its state.
    ///
    /// Corruption anywhere but the newest segment's tail means records
    /// the journal promised were durable are unreadable; that is
    /// surfaced as an error rather than silently skipped.
    pub fn open(dir: &Path, committed_seq: u64) -> Result<(Self, Vec<JournalRecord>), JournalError> {
        fs::create_dir_all(dir)?;
        let segments = list_segments(dir)?;

        let mut pending = Vec::new();
        let mut last_seq = committed_seq;

        for (index, (first_seq, path)) in segments.iter().enumerate() {
            let newest = index == segments.len() - 1;
            let scan = scan_segment(path)?;

            if scan.torn {
                if !newest {
                    return Err(JournalError::Corrupt {
                        segment: segment_name(*first_seq),
                        seq: last_seq + 1,
                    });
                }
                warn!(
                    segment = %segment_name(*first_seq),
                    kept_records = scan.records.len(),
                    "torn tail in newest journal segment, truncating to last intact record",
                );
                let file = OpenOptions::new().write(true).open(path)?;
                file.set_len(scan.intact_len)?;
                file.sync_all()?;
            }

            for record in scan.records {
                last_seq = last_seq.max(record.seq);
                if record.seq > committed_seq {
                    pending.push(record);
                }
            }
        }

        // Reuse the newest segment if it has room; otherwise (or when the
        // directory is empty) the next append starts a fresh one.
        let (active_path, active_len) = match segments.last() {
            Some((_, path)) => {
                let len = fs::metadata(path)?.len();
                (path.clone(), len)
            }
            None => {
                let path = dir.join(segment_name(last_seq + 1));
                (path, 0)
            }
        };
        let active = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&active_path)?;

        Ok((
            Self {
                dir: dir.to_owned(),
                active,
                active_path,
                active_len,
                last_seq,
            },
            pending,
        ))
    }

    /// Sequence of the most recently appended record (or the committed
    /// floor the journal was opened with, while still empty).
    pub fn last_seq(&self) -> u64 {
        self.last_seq
    }

    /// Durably append one mutation. The assigned sequence is returned
    /// only after the record and its segment are synced.
    pub fn append(&mut self, mutation: &Mutation) -> Result<u64, JournalError> {
        if self.active_len >= SEGMENT_ROLL_BYTES {
            self.roll()?;
        }

        let seq = self.last_seq + 1;
        let mut line = serde_json::to_vec(&JournalRecord {
            seq,
            mutation: mutation.clone(),
        })?;
        line.push(b'\n');

        self.active.write_all(&line)?;
        self.active.sync_data()?;
        self.active_len += line.len() as u64;
        self.last_seq = seq;
        Ok(seq)
    }

    fn roll(&mut self) -> Result<(), JournalError> {
        self.active.sync_all()?;
        let path = self.dir.join(segment_name(self.last_seq + 1));
        self.active = OpenOptions::new().create(true).append(true).open(&path)?;
        self.active_path = path;
        self.active_len = 0;
        Ok(())
    }

    /// Drop segments made fully redundant by a checkpoint at `seq`: a
    /// segment is deleted when every record in it is at or below `seq`,
    /// which holds exactly when the *next* segment starts at or below
    /// `seq + 1`. The active segment is always kept.
    pub fn prune_through(&mut self, seq: u64) -> Result<(), JournalError> {
        let segments = list_segments(&self.dir)?;
        for window in segments.windows(2) {
            let (_, ref path) = window[0];
            let (next_first_seq, _) = window[1];
            if next_first_seq <= seq + 1 && *path != self.active_path {
                fs::remove_file(path)?;
            } else {
                break;
            }
        }
        Ok(())
    }

    /// Every record strictly after `seq` currently on disk. Recovery uses
    /// the copy returned by [`Journal::open`]; this re-read exists for
    /// tests and diagnostics.
    pub fn records_after(&self, seq: u64) -> Result<Vec<JournalRecord>, JournalError> {
        let mut records = Vec::new();
        for (_, path) in list_segments(&self.dir)? {
            let scan = scan_segment(&path)?;
            records.extend(scan.records.into_iter().filter(|r| r.seq > seq));
        }
        Ok(records)
    }
}
