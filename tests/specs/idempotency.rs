//! Idempotent task creation. The same key and body always map
//! to the same Session; the same key with a different body is a conflict.

use crate::prelude::*;
use forge_core::{ErrorKind, PageRequest, SessionStatus};
use forge_engine::SessionFilter;

#[tokio::test]
async fn simultaneous_creates_with_same_key_share_one_session() {
    let harness = Harness::new(2, completing_launcher(vec![]));

    let manager_a = harness.manager.clone();
    let manager_b = harness.manager.clone();
    let (first, second) = tokio::join!(
        manager_a.create_task(request("deduped work"), Some("key-1".into())),
        manager_b.create_task(request("deduped work"), Some("key-1".into())),
    );
    let first = first.expect("first create");
    let second = second.expect("second create");
    assert_eq!(first, second);

    let page = harness
        .manager
        .list_sessions(&SessionFilter::default(), PageRequest::default());
    assert_eq!(page.total, 1, "exactly one session row exists");

    harness.wait_for_status(&first, SessionStatus::Completed).await;
    assert_eq!(
        harness.checkout_count(),
        1,
        "provisioning ran once for the deduplicated pair"
    );
}

#[tokio::test]
async fn same_key_different_body_is_an_idempotency_conflict() {
    let harness = Harness::new(2, completing_launcher(vec![]));

    harness
        .manager
        .create_task(request("original work"), Some("key-1".into()))
        .await
        .expect("create");

    let err = harness
        .manager
        .create_task(request("different work"), Some("key-1".into()))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::IdempotencyConflict);
}

#[tokio::test]
async fn replay_after_completion_returns_the_terminal_session() {
    let harness = Harness::new(2, completing_launcher(vec![]));

    let id = harness
        .manager
        .create_task(request("one-shot work"), Some("key-1".into()))
        .await
        .expect("create");
    harness.wait_for_status(&id, SessionStatus::Completed).await;

    let replayed = harness
        .manager
        .create_task(request("one-shot work"), Some("key-1".into()))
        .await
        .expect("replay");
    assert_eq!(replayed, id);
    assert_eq!(
        harness.manager.get_session(&replayed).expect("session").status,
        SessionStatus::Completed,
        "replay returns the prior result without scheduling new work"
    );
}
