// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Incremental parser turning an agent's newline-delimited JSON stdout
//! into `forge_core::Event`s. Incremental because
//! the launcher feeds it whatever a single `read_line` call returns,
//! which may be a partial line when the agent flushes mid-write; the
//! parser buffers until a full line is available.
//!
//! Recorders are allowed to omit `tool_execution_id` on a `tool_use`/
//! `tool_result` pair; the parser synthesizes one for the `tool_use` and
//! hands the same id to the next id-less `tool_result` with a matching
//! tool name. An id-less result with no outstanding use is dropped.

use forge_core::Event;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("malformed event line: {0}")]
    Malformed(String),
}

/// Buffers partial writes and yields one [`Event`] per complete,
/// well-formed JSON line. Malformed lines are logged and skipped rather
/// than treated as fatal — a single corrupt line from a misbehaving agent
/// must not take down the whole monitor.
#[derive(Default)]
pub struct LineParser {
    buffer: String,
    /// Per tool name, synthesized ids of started executions whose result
    /// has not yet arrived.
    pending_executions: HashMap<String, VecDeque<String>>,
    next_execution: u64,
}

impl LineParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one already-newline-delimited line (the common case when
    /// reading via `AsyncBufReadExt::lines`).
    pub fn feed_line(&mut self, line: &str) -> Vec<Event> {
        match self.parse_one(line) {
            Ok(event) => vec![event],
            Err(e) => {
                tracing::warn!(error = %e, line, "skipping malformed agent output line");
                Vec::new()
            }
        }
    }

    /// Feed a raw chunk of bytes that may contain zero, one, or several
    /// newline-terminated lines plus a trailing partial line, used when
    /// reading from a raw socket rather than a line-oriented reader.
    pub fn feed_chunk(&mut self, chunk: &str) -> Vec<Event> {
        self.buffer.push_str(chunk);
        let mut events = Vec::new();
        while let Some(pos) = self.buffer.find('\n') {
            let line = self.buffer[..pos].to_string();
            self.buffer.drain(..=pos);
            events.extend(self.feed_line(&line));
        }
        events
    }

    fn parse_one(&mut self, line: &str) -> Result<Event, ParseError> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Err(ParseError::Malformed("empty line".into()));
        }
        let mut value: Value =
            serde_json::from_str(trimmed).map_err(|e| ParseError::Malformed(e.to_string()))?;
        self.assign_execution_id(&mut value)?;
        serde_json::from_value(value).map_err(|e| ParseError::Malformed(e.to_string()))
    }

    /// Fill in `tool_execution_id` when the recorder omitted it, pairing a
    /// `tool_result` with the oldest unmatched `tool_use` of the same tool.
    /// A `tool_result` with no id and no unmatched `tool_use` would break
    /// the started-before-finished ordering of the event log, so it is
    /// rejected like any other malformed line.
    fn assign_execution_id(&mut self, value: &mut Value) -> Result<(), ParseError> {
        let Some(obj) = value.as_object_mut() else {
            return Ok(());
        };
        let variant = obj.get("type").and_then(Value::as_str).unwrap_or_default();
        if obj.get("tool_execution_id").is_some_and(|id| !id.is_null()) {
            return Ok(());
        }
        let tool_name = obj
            .get("tool_name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        match variant {
            "tool_use" => {
                self.next_execution += 1;
                let id = format!("exec-{}", self.next_execution);
                self.pending_executions
                    .entry(tool_name)
                    .or_default()
                    .push_back(id.clone());
                obj.insert("tool_execution_id".into(), Value::String(id));
            }
            "tool_result" => {
                let Some(id) = self
                    .pending_executions
                    .get_mut(&tool_name)
                    .and_then(VecDeque::pop_front)
                else {
                    return Err(ParseError::Malformed(format!(
                        "tool_result for `{tool_name}` with no matching tool_use"
                    )));
                };
                obj.insert("tool_execution_id".into(), Value::String(id));
            }
            _ => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forge_core::ToolExecutionId;

    #[test]
    fn feed_line_parses_well_formed_event() {
        let mut parser = LineParser::new();
        let events = parser.feed_line(r#"{"type":"log","level":"info","message":"hi"}"#);
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn feed_line_skips_malformed_json_without_panicking() {
        let mut parser = LineParser::new();
        let events = parser.feed_line("not json");
        assert!(events.is_empty());
    }

    #[test]
    fn feed_chunk_splits_multiple_lines_and_buffers_partial_tail() {
        let mut parser = LineParser::new();
        let chunk = "{\"type\":\"log\",\"level\":\"info\",\"message\":\"a\"}\n{\"type\":\"log\",\"level\":\"info\",\"message\":\"b\"}\n{\"type\":\"log\"";
        let events = parser.feed_chunk(chunk);
        assert_eq!(events.len(), 2);

        let rest = parser.feed_chunk(",\"level\":\"info\",\"message\":\"c\"}\n");
        assert_eq!(rest.len(), 1);
    }

    fn execution_id(event: &Event) -> ToolExecutionId {
        event.tool_execution_id().cloned().expect("execution id assigned")
    }

    #[test]
    fn omitted_execution_id_is_synthesized_and_pairs_use_with_result() {
        let mut parser = LineParser::new();
        let started = parser
            .feed_line(r#"{"type":"tool_use","tool_name":"grep","tool_args":{},"status":"started"}"#)
            .pop()
            .expect("tool_use parses");
        let finished = parser
            .feed_line(r#"{"type":"tool_result","tool_name":"grep","tool_output":{},"status":"completed"}"#)
            .pop()
            .expect("tool_result parses");
        assert_eq!(execution_id(&started), execution_id(&finished));
    }

    #[test]
    fn interleaved_tools_pair_by_tool_name_in_order() {
        let mut parser = LineParser::new();
        let grep_use = parser
            .feed_line(r#"{"type":"tool_use","tool_name":"grep","tool_args":{},"status":"started"}"#)
            .pop()
            .expect("parses");
        let edit_use = parser
            .feed_line(r#"{"type":"tool_use","tool_name":"edit","tool_args":{},"status":"started"}"#)
            .pop()
            .expect("parses");
        let edit_result = parser
            .feed_line(r#"{"type":"tool_result","tool_name":"edit","tool_output":{},"status":"completed"}"#)
            .pop()
            .expect("parses");
        let grep_result = parser
            .feed_line(r#"{"type":"tool_result","tool_name":"grep","tool_output":{},"status":"completed"}"#)
            .pop()
            .expect("parses");

        assert_eq!(execution_id(&grep_use), execution_id(&grep_result));
        assert_eq!(execution_id(&edit_use), execution_id(&edit_result));
        assert_ne!(execution_id(&grep_use), execution_id(&edit_use));
    }

    #[test]
    fn orphan_tool_result_is_skipped_not_invented() {
        let mut parser = LineParser::new();
        let events = parser.feed_line(
            r#"{"type":"tool_result","tool_name":"grep","tool_output":{},"status":"completed"}"#,
        );
        assert!(events.is_empty(), "a result with no started use is dropped");

        // The parser keeps working after the bad line.
        let ok = parser
            .feed_line(r#"{"type":"tool_use","tool_name":"grep","tool_args":{},"status":"started"}"#);
        assert_eq!(ok.len(), 1);
    }

    #[test]
    fn explicit_execution_id_is_preserved() {
        let mut parser = LineParser::new();
        let event = parser
            .feed_line(
                r#"{"type":"tool_use","tool_name":"grep","tool_args":{},"tool_execution_id":"given-1","status":"started"}"#,
            )
            .pop()
            .expect("parses");
        assert_eq!(execution_id(&event).as_str(), "given-1");
    }
}
