//! A second task for the same (repo, commit) reuses the cached
//! snapshot instead of checking out again.

use crate::prelude::*;
use forge_core::SessionStatus;

#[tokio::test]
async fn second_task_for_same_commit_skips_checkout() {
    let harness = Harness::new(2, completing_launcher(vec![]));

    let first = harness
        .manager
        .create_task(request("first pass"), None)
        .await
        .expect("create first");
    harness.wait_for_status(&first, SessionStatus::Completed).await;
    assert_eq!(harness.checkout_count(), 1);

    let second = harness
        .manager
        .create_task(request("second pass"), None)
        .await
        .expect("create second");
    harness
        .wait_for_status(&second, SessionStatus::Completed)
        .await;

    assert_eq!(
        harness.checkout_count(),
        1,
        "same branch resolves to the same commit; no second checkout"
    );

    let first_session = harness.manager.get_session(&first).expect("first");
    let second_session = harness.manager.get_session(&second).expect("second");
    assert_eq!(
        first_session.workspace.expect("workspace").snapshot_id,
        second_session.workspace.expect("workspace").snapshot_id,
        "both sessions mount the same snapshot"
    );
}

#[tokio::test]
async fn different_repositories_provision_independently() {
    let harness = Harness::new(2, completing_launcher(vec![]));

    let first = harness
        .manager
        .create_task(request("work on repo"), None)
        .await
        .expect("create first");
    harness.wait_for_status(&first, SessionStatus::Completed).await;

    let mut other = request("work on other repo");
    other.repo.url = Some("https://example.com/other.git".into());
    let second = harness
        .manager
        .create_task(other, None)
        .await
        .expect("create second");
    harness
        .wait_for_status(&second, SessionStatus::Completed)
        .await;

    assert_eq!(harness.checkout_count(), 2);
}
