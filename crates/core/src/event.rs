// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event: append-only records belonging to a Session.

use crate::id::{SessionId, ToolExecutionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Started,
    Completed,
    Failed,
}

/// The closed set of event variants. The fleet-originated kinds
/// (`fenceStarted`, `hostLog`, ...) are treated opaquely by the core but
/// validated for shape: a `type` tag plus a JSON payload object, never
/// raw scalars or arrays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    #[serde(rename = "status")]
    Status { status: crate::session::SessionStatus },

    #[serde(rename = "log")]
    Log { level: LogLevel, message: String },

    #[serde(rename = "thought")]
    Thought {
        thought: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reasoning: Option<String>,
    },

    #[serde(rename = "tool_use")]
    ToolUse {
        tool_name: String,
        tool_args: serde_json::Value,
        tool_execution_id: ToolExecutionId,
        #[serde(default = "default_started")]
        status: ToolStatus,
    },

    #[serde(rename = "tool_result")]
    ToolResult {
        tool_name: String,
        tool_output: serde_json::Value,
        tool_execution_id: ToolExecutionId,
        status: ToolStatus,
    },

    #[serde(rename = "file_edit")]
    FileEdit {
        file_path: String,
        lines_added: u64,
        lines_removed: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },

    #[serde(rename = "moment")]
    Moment {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        snapshot_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        note: Option<String>,
    },

    #[serde(rename = "delivery")]
    Delivery {
        mode: crate::session::DeliveryMode,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
    },

    /// Fleet-originated variants, treated opaquely by the core but
    /// validated for shape (a JSON object, never a scalar or array).
    #[serde(rename = "fenceStarted")]
    FenceStarted(FleetPayload),
    #[serde(rename = "fenceResult")]
    FenceResult(FleetPayload),
    #[serde(rename = "hostStarted")]
    HostStarted(FleetPayload),
    #[serde(rename = "hostLog")]
    HostLog(FleetPayload),
    #[serde(rename = "hostExited")]
    HostExited(FleetPayload),
    #[serde(rename = "summary")]
    Summary(FleetPayload),
    #[serde(rename = "followersCatalog")]
    FollowersCatalog(FleetPayload),
    #[serde(rename = "note")]
    Note(FleetPayload),
}

fn default_started() -> ToolStatus {
    ToolStatus::Started
}

/// Opaque payload carried by fleet-originated events: any JSON object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FleetPayload(pub serde_json::Map<String, serde_json::Value>);

impl Event {
    /// The on-wire `type` discriminant.
    pub fn type_tag(&self) -> &'static str {
        match self {
            Event::Status { .. } => "status",
            Event::Log { .. } => "log",
            Event::Thought { .. } => "thought",
            Event::ToolUse { .. } => "tool_use",
            Event::ToolResult { .. } => "tool_result",
            Event::FileEdit { .. } => "file_edit",
            Event::Moment { .. } => "moment",
            Event::Delivery { .. } => "delivery",
            Event::FenceStarted(_) => "fenceStarted",
            Event::FenceResult(_) => "fenceResult",
            Event::HostStarted(_) => "hostStarted",
            Event::HostLog(_) => "hostLog",
            Event::HostExited(_) => "hostExited",
            Event::Summary(_) => "summary",
            Event::FollowersCatalog(_) => "followersCatalog",
            Event::Note(_) => "note",
        }
    }

    pub fn tool_execution_id(&self) -> Option<&ToolExecutionId> {
        match self {
            Event::ToolUse {
                tool_execution_id, ..
            }
            | Event::ToolResult {
                tool_execution_id, ..
            } => Some(tool_execution_id),
            _ => None,
        }
    }
}

/// A persisted Event with its session-scoped sequence number and receipt time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub session_id: SessionId,
    /// Monotonic within session, starting at 1, dense with no gaps.
    pub sequence: u64,
    /// Event-reported wall-clock time, monotonic non-decreasing per session.
    pub ts: DateTime<Utc>,
    /// Server receipt time; diagnostics only, never used for ordering.
    pub recorded_at: DateTime<Utc>,
    pub event: Event,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_tag_matches_wire_shape() {
        let e = Event::FileEdit {
            file_path: "src/lib.rs".into(),
            lines_added: 3,
            lines_removed: 1,
            description: None,
        };
        assert_eq!(e.type_tag(), "file_edit");
        let json = serde_json::to_value(&e).expect("serializes");
        assert_eq!(json["type"], "file_edit");
    }

    #[test]
    fn tool_use_and_result_share_execution_id() {
        let id = ToolExecutionId::new("exec-1");
        let start = Event::ToolUse {
            tool_name: "grep".into(),
            tool_args: serde_json::json!({"pattern": "foo"}),
            tool_execution_id: id.clone(),
            status: ToolStatus::Started,
        };
        let result = Event::ToolResult {
            tool_name: "grep".into(),
            tool_output: serde_json::json!({"matches": 2}),
            tool_execution_id: id.clone(),
            status: ToolStatus::Completed,
        };
        assert_eq!(start.tool_execution_id(), Some(&id));
        assert_eq!(result.tool_execution_id(), Some(&id));
    }

    #[test]
    fn fleet_event_roundtrips_opaque_payload() {
        let raw = serde_json::json!({
            "type": "hostLog",
            "line": "booting",
            "hostId": "h-1",
        });
        let event: Event = serde_json::from_value(raw).expect("deserializes");
        assert_eq!(event.type_tag(), "hostLog");
    }
}
