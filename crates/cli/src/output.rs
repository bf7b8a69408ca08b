// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Human-readable rendering for CLI output. Every command also supports
//! `--json`, which bypasses this module entirely.

use chrono::Utc;
use forge_core::time_fmt::format_elapsed;
use forge_core::{Draft, Event, EventRecord, RepositoryIndexEntry, SessionView};

/// One session per line: short id, status, age, prompt excerpt.
pub fn session_line(view: &SessionView) -> String {
    let session = &view.session;
    let age = (Utc::now() - session.created_at).num_seconds().max(0) as u64;
    format!(
        "{:<10} {:<12} {:>6}  {}",
        session.id.short(8),
        session.status.to_string(),
        format_elapsed(age),
        excerpt(&session.task.prompt, 60),
    )
}

pub fn session_detail(view: &SessionView) -> String {
    let session = &view.session;
    let mut out = String::new();
    out.push_str(&format!("id:      {}\n", session.id));
    out.push_str(&format!("status:  {}\n", session.status));
    if let Some(tenant) = &session.tenant_id {
        out.push_str(&format!("tenant:  {tenant}\n"));
    }
    if let Some(url) = &session.repo.url {
        let commit = session.repo.commit.as_deref().unwrap_or("<unresolved>");
        out.push_str(&format!("repo:    {url} @ {commit}\n"));
    }
    if let Some(workspace) = &session.workspace {
        out.push_str(&format!(
            "mount:   {} ({})\n",
            workspace.mount_path, workspace.snapshot_provider
        ));
    }
    if let Some(kind) = &session.error_kind {
        let detail = session.error_detail.as_deref().unwrap_or("");
        out.push_str(&format!("error:   {kind}: {detail}\n"));
    }
    if let Some(changes) = &view.changes {
        out.push_str(&format!(
            "changes: {} file(s), +{} -{}\n",
            changes.files_changed, changes.lines_added, changes.lines_removed
        ));
    }
    out.push_str(&format!("prompt:  {}", excerpt(&session.task.prompt, 120)));
    out
}

/// One event per line, the shape `forge task watch` streams.
pub fn event_line(record: &EventRecord) -> String {
    let body = match &record.event {
        Event::Status { status } => format!("status: {status}"),
        Event::Log { level, message } => format!("log[{level:?}]: {message}"),
        Event::Thought { thought, .. } => format!("thought: {}", excerpt(thought, 100)),
        Event::ToolUse { tool_name, .. } => format!("tool_use: {tool_name}"),
        Event::ToolResult {
            tool_name, status, ..
        } => format!("tool_result: {tool_name} ({status:?})"),
        Event::FileEdit {
            file_path,
            lines_added,
            lines_removed,
            ..
        } => format!("file_edit: {file_path} +{lines_added} -{lines_removed}"),
        Event::Moment { note, .. } => {
            format!("moment: {}", note.as_deref().unwrap_or(""))
        }
        Event::Delivery { mode, url } => format!(
            "delivery: {mode:?} {}",
            url.as_deref().unwrap_or("")
        ),
        other => other.type_tag().to_string(),
    };
    format!("{:>5}  {}", record.sequence, body)
}

pub fn draft_line(draft: &Draft) -> String {
    format!(
        "{:<10} {:<16} {}",
        draft.id.short(8),
        excerpt(&draft.owner_scope, 16),
        excerpt(draft.prompt.as_deref().unwrap_or(""), 60),
    )
}

pub fn repository_line(entry: &RepositoryIndexEntry) -> String {
    let last_used = entry
        .last_used_at
        .map(|t| {
            let age = (Utc::now() - t).num_seconds().max(0) as u64;
            format!("{} ago", format_elapsed(age))
        })
        .unwrap_or_else(|| "never".into());
    format!(
        "{:<24} {:<10} {:<48} {}",
        excerpt(&entry.display_name, 24),
        entry.scm_provider,
        excerpt(&entry.remote_url, 48),
        last_used,
    )
}

fn excerpt(text: &str, max: usize) -> String {
    let flat = text.replace('\n', " ");
    let trimmed = flat.trim();
    if trimmed.chars().count() <= max {
        trimmed.to_string()
    } else {
        let cut: String = trimmed.chars().take(max.saturating_sub(1)).collect();
        format!("{cut}…")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use forge_core::test_support::SessionBuilder;
    use forge_core::SessionId;

    #[test]
    fn session_line_contains_id_and_status() {
        let view = SessionView::from_session(SessionBuilder::new("abcdef1234").build(), vec![]);
        let line = session_line(&view);
        assert!(line.contains("abcdef12"));
        assert!(line.contains("queued"));
    }

    #[test]
    fn event_line_formats_file_edit() {
        let record = EventRecord {
            session_id: SessionId::new("s1"),
            sequence: 7,
            ts: Utc::now(),
            recorded_at: Utc::now(),
            event: Event::FileEdit {
                file_path: "src/lib.rs".into(),
                lines_added: 3,
                lines_removed: 1,
                description: None,
            },
        };
        let line = event_line(&record);
        assert!(line.starts_with("    7"));
        assert!(line.contains("src/lib.rs +3 -1"));
    }

    #[test]
    fn excerpt_truncates_long_text_with_ellipsis() {
        let long = "x".repeat(200);
        let short = excerpt(&long, 10);
        assert!(short.chars().count() <= 10);
        assert!(short.ends_with('…'));
    }

    #[test]
    fn excerpt_flattens_newlines() {
        assert_eq!(excerpt("a\nb", 10), "a b");
    }
}
