//! Happy path for a single task, from `queued` through
//! `completed`, with the cache lease pinned while running and released at
//! the end.

use crate::prelude::*;
use forge_core::{Event, LogLevel, SessionStatus, SnapshotKey};

fn agent_script() -> Vec<Event> {
    vec![
        Event::Thought {
            thought: "reading the failing test".into(),
            reasoning: None,
        },
        Event::Thought {
            thought: "the fixture path is stale".into(),
            reasoning: None,
        },
        Event::FileEdit {
            file_path: "tests/fixtures.rs".into(),
            lines_added: 4,
            lines_removed: 1,
            description: Some("refresh fixture path".into()),
        },
    ]
}

#[tokio::test]
async fn happy_path_single_task_completes_with_changes() {
    let harness = Harness::new(2, completing_launcher(agent_script()));

    let id = harness
        .manager
        .create_task(request("fix the failing test"), None)
        .await
        .expect("create");

    let session = harness.wait_for_status(&id, SessionStatus::Completed).await;
    assert!(session.workspace.is_some());
    assert_eq!(
        session.repo.commit.as_deref(),
        Some(COMMIT),
        "branch resolved to an immutable commit on the record"
    );

    // Terminal read model: recent_events empty, changes aggregated from
    // the file_edit events.
    assert!(harness.manager.recent_events(&id, 3).is_empty());
    let view = harness.manager.get_session_view(&id).expect("view");
    let changes = view.changes.expect("changes present once terminal");
    assert_eq!(changes.files_changed, 1);
    assert_eq!(changes.lines_added, 4);
    assert_eq!(changes.lines_removed, 1);
    assert!(view.recent_events.is_empty());

    // Cache lease released: refCount back to 0, entry still resident.
    let entry = harness
        .repo
        .get_snapshot_entry(&SnapshotKey::new(REPO_URL, COMMIT))
        .expect("cache entry resident");
    assert_eq!(entry.ref_count, 0);
}

#[tokio::test]
async fn status_events_form_a_legal_dense_sequence() {
    let harness = Harness::new(2, completing_launcher(agent_script()));

    let id = harness
        .manager
        .create_task(request("fix the failing test"), None)
        .await
        .expect("create");
    harness.wait_for_status(&id, SessionStatus::Completed).await;

    let events = harness.repo.events_from(&id, 0);
    let sequences: Vec<u64> = events.iter().map(|e| e.sequence).collect();
    let expected: Vec<u64> = (1..=events.len() as u64).collect();
    assert_eq!(sequences, expected, "sequence is dense 1..N");

    let statuses: Vec<SessionStatus> = events
        .iter()
        .filter_map(|record| match &record.event {
            Event::Status { status } => Some(*status),
            _ => None,
        })
        .collect();
    assert_eq!(
        statuses,
        vec![
            SessionStatus::Provisioning,
            SessionStatus::Running,
            SessionStatus::Completed,
        ]
    );

    // The agent's own activity landed between running and completed.
    let log_like = events
        .iter()
        .filter(|record| {
            matches!(
                record.event,
                Event::Thought { .. } | Event::FileEdit { .. } | Event::Log { .. }
            )
        })
        .count();
    assert_eq!(log_like, 3);
}

#[tokio::test]
async fn running_session_pins_cache_entry_against_release() {
    let harness = Harness::new(2, long_running_launcher());

    let id = harness
        .manager
        .create_task(request("long running work"), None)
        .await
        .expect("create");
    harness.wait_for_status(&id, SessionStatus::Running).await;

    let entry = harness
        .repo
        .get_snapshot_entry(&SnapshotKey::new(REPO_URL, COMMIT))
        .expect("cache entry resident");
    assert_eq!(entry.ref_count, 1, "running session holds the lease");

    harness.manager.stop(&id).await.expect("stop");
    let entry = harness
        .repo
        .get_snapshot_entry(&SnapshotKey::new(REPO_URL, COMMIT))
        .expect("cache entry resident");
    assert_eq!(entry.ref_count, 0, "stop releases the lease");
}

#[tokio::test]
async fn agent_failure_surfaces_exit_code_in_terminal_status() {
    use forge_adapters::launcher::fake::FakeAgentLauncher;
    use std::sync::Arc;

    let launcher = Arc::new(FakeAgentLauncher::new(vec![]).with_exit_code(9));
    let harness = Harness::new(2, launcher);

    let id = harness
        .manager
        .create_task(request("doomed work"), None)
        .await
        .expect("create");
    let session = harness.wait_for_status(&id, SessionStatus::Failed).await;
    assert!(session
        .error_detail
        .expect("detail carries exit code")
        .contains("9"));

    // The failure reached the event log as a final status event, not a
    // silent disconnect.
    let last = harness.repo.events_from(&id, 0).pop().expect("events exist");
    assert!(matches!(
        last.event,
        Event::Status {
            status: SessionStatus::Failed
        }
    ));
}
