// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! On-wire shapes shared by every adapter: the Session read
//! model and pagination envelope. Kept separate from the persisted
//! [`crate::session::Session`] so adding a wire-only field never touches
//! the Repository Layer's schema.

use crate::event::EventRecord;
use crate::session::{ChangesSummary, Session};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Session object (read model): every Session field plus adapter-filled
/// links, a short recent-events tail, and (when terminal) the changes aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionView {
    #[serde(flatten)]
    pub session: Session,
    pub links: HashMap<String, String>,
    pub recent_events: Vec<EventRecord>,
    pub changes: Option<ChangesSummary>,
}

impl SessionView {
    pub fn from_session(session: Session, recent_events: Vec<EventRecord>) -> Self {
        let changes = if session.status.is_terminal() {
            Some(compute_changes(&recent_events))
        } else {
            None
        };
        Self {
            session,
            links: HashMap::new(),
            recent_events: if changes.is_some() {
                Vec::new()
            } else {
                recent_events
            },
            changes,
        }
    }
}

/// Compute `{files_changed, lines_added, lines_removed}` from `file_edit` events.
pub fn compute_changes(events: &[EventRecord]) -> ChangesSummary {
    let mut files = std::collections::HashSet::new();
    let mut added = 0u64;
    let mut removed = 0u64;
    for record in events {
        if let crate::event::Event::FileEdit {
            file_path,
            lines_added,
            lines_removed,
            ..
        } = &record.event
        {
            files.insert(file_path.clone());
            added += lines_added;
            removed += lines_removed;
        }
    }
    ChangesSummary {
        files_changed: files.len() as u64,
        lines_added: added,
        lines_removed: removed,
    }
}

/// Pagination input: `page`, `perPage`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PageRequest {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
}

fn default_page() -> u32 {
    1
}

fn default_per_page() -> u32 {
    50
}

pub const MAX_PER_PAGE: u32 = 200;

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: default_page(),
            per_page: default_per_page(),
        }
    }
}

impl PageRequest {
    /// Clamp `per_page` to the documented [1, 200] range.
    pub fn clamped(self) -> Self {
        Self {
            page: self.page.max(1),
            per_page: self.per_page.clamp(1, MAX_PER_PAGE),
        }
    }

    pub fn offset(&self) -> usize {
        ((self.page.saturating_sub(1)) as usize) * (self.per_page as usize)
    }
}

/// Pagination output: `total`, `nextPage`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub next_page: Option<u32>,
}
