// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! IPC protocol between the `forge` CLI (and other local port adapters)
//! and the daemon.
//!
//! Wire format: one JSON object per LF-terminated line. Most requests get
//! exactly one response; `Subscribe` streams one `Event` frame per
//! session event and closes with `StreamEnd`.

use forge_core::{Draft, EventRecord, Problem, RepositoryIndexEntry, SessionView};
use forge_engine::CreateTaskRequest;
use serde::{Deserialize, Serialize};

#[path = "protocol_wire.rs"]
mod wire;
pub use wire::{
    read_request, recv_frame, send_frame, write_response, WireError, DEFAULT_TIMEOUT,
    MAX_FRAME_BYTES, PROTOCOL_VERSION,
};

/// Request from a port adapter to the daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Request {
    /// Health check ping
    Ping,

    /// Version handshake
    Hello { version: String },

    /// Create a Session from a task request
    CreateTask {
        request: Box<CreateTaskRequest>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        idempotency_key: Option<String>,
    },

    /// Lifecycle signals; each returns after the first persisted transition
    Pause { id: String },
    Resume { id: String },
    Stop { id: String },
    Cancel { id: String },

    /// Stream a Session's events live, starting after `from_sequence`
    /// (or from a synthetic frame carrying the current status)
    Subscribe {
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from_sequence: Option<u64>,
    },

    /// Read daemon state
    Query { query: Query },

    /// Create a draft task configuration
    DraftCreate { draft: Box<DraftBody> },

    /// Update an existing draft in place
    DraftUpdate { id: String, draft: Box<DraftBody> },

    /// Hard-delete a draft
    DraftDelete { id: String },

    /// Register a repository in the catalog without running a task
    RepoImport {
        remote_url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        display_name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        default_branch: Option<String>,
    },

    /// Request daemon shutdown
    Shutdown,
}

/// The mutable part of a Draft; the daemon assigns id and timestamps.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DraftBody {
    #[serde(default)]
    pub owner_scope: String,
    pub prompt: Option<String>,
    pub repo: Option<forge_core::RepoSpec>,
    pub agent: Option<forge_core::AgentSpec>,
    pub runtime: Option<forge_core::RuntimeSpec>,
    pub delivery: Option<forge_core::DeliverySpec>,
}

/// Read queries against the Session Manager's read model.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Query {
    ListSessions {
        #[serde(default)]
        status: Option<String>,
        #[serde(default)]
        tenant_id: Option<String>,
        #[serde(default)]
        project_id: Option<String>,
        #[serde(default)]
        page: Option<u32>,
        #[serde(default)]
        per_page: Option<u32>,
    },
    GetSession {
        id: String,
    },
    /// Last `n` events for an active Session; empty once terminal
    RecentEvents {
        id: String,
        n: usize,
    },
    ListDrafts,
    GetDraft {
        id: String,
    },
    ListRepositories,
    Status,
}

/// Response from the daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Response {
    Ok,
    Pong,
    Hello { version: String },
    ShuttingDown,

    SessionCreated { id: String },

    Session { session: Option<Box<SessionView>> },
    Sessions {
        sessions: Vec<SessionView>,
        total: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        next_page: Option<u32>,
    },

    Events { events: Vec<EventRecord> },
    /// One streamed frame of a `Subscribe` response
    Event { event: Box<EventRecord> },
    /// Normal end of a `Subscribe` stream
    StreamEnd,

    Draft { draft: Option<Box<Draft>> },
    Drafts { drafts: Vec<Draft> },

    Repositories { repositories: Vec<RepositoryIndexEntry> },

    Status {
        version: String,
        uptime_secs: u64,
        sessions_active: usize,
        sessions_total: usize,
        cache_entries: usize,
        cache_bytes: u64,
    },

    /// Any failure, as the same Problem+JSON body an HTTP adapter would
    /// serve
    Problem { problem: Box<Problem> },
}

impl Response {
    pub fn problem(err: &forge_core::CoreError) -> Self {
        Response::Problem {
            problem: Box::new(Problem::from(err)),
        }
    }
}
