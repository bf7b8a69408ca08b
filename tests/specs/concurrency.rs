//! The global concurrency cap. With `C_max = 2`, a third task
//! stays `queued` until one of the running sessions terminates.

use crate::prelude::*;
use forge_core::SessionStatus;
use std::time::Duration;

#[tokio::test]
async fn third_task_queues_until_a_slot_frees() {
    let harness = Harness::new(2, long_running_launcher());

    let a = harness
        .manager
        .create_task(request("task a"), None)
        .await
        .expect("create a");
    let b = harness
        .manager
        .create_task(request("task b"), None)
        .await
        .expect("create b");
    harness.wait_for_status(&a, SessionStatus::Running).await;
    harness.wait_for_status(&b, SessionStatus::Running).await;

    let c = harness
        .manager
        .create_task(request("task c"), None)
        .await
        .expect("create c");

    // Give the background workflow ample opportunity to (incorrectly)
    // admit the third task.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(
        harness.manager.get_session(&c).expect("session c").status,
        SessionStatus::Queued,
        "third task must wait for a slot"
    );

    harness.manager.stop(&a).await.expect("stop a");
    harness.wait_for_status(&a, SessionStatus::Stopped).await;

    // C is admitted as soon as A's permit is released.
    harness.wait_for_status(&c, SessionStatus::Running).await;

    harness.manager.stop(&b).await.expect("stop b");
    harness.manager.stop(&c).await.expect("stop c");
}

#[tokio::test]
async fn queued_task_can_still_be_cancelled() {
    let harness = Harness::new(1, long_running_launcher());

    let a = harness
        .manager
        .create_task(request("task a"), None)
        .await
        .expect("create a");
    harness.wait_for_status(&a, SessionStatus::Running).await;

    let b = harness
        .manager
        .create_task(request("task b"), None)
        .await
        .expect("create b");
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(
        harness.manager.get_session(&b).expect("session b").status,
        SessionStatus::Queued
    );

    harness.manager.cancel(&b).await.expect("cancel b");
    assert_eq!(
        harness.manager.get_session(&b).expect("session b").status,
        SessionStatus::Cancelled
    );

    // The cancelled task never consumes the freed slot.
    harness.manager.stop(&a).await.expect("stop a");
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(
        harness.manager.get_session(&b).expect("session b").status,
        SessionStatus::Cancelled
    );
}
