//! Subscribe resumption. A subscriber that disconnects and
//! re-subscribes with the last sequence it saw receives exactly the
//! events it missed, with no duplicates and no gaps.

use crate::prelude::*;
use forge_core::SessionStatus;
use tokio_stream::StreamExt;

#[tokio::test]
async fn resubscribing_with_last_sequence_yields_exactly_the_missed_events() {
    let harness = Harness::new(2, long_running_launcher());

    let id = harness
        .manager
        .create_task(request("streamed work"), None)
        .await
        .expect("create");
    harness.wait_for_status(&id, SessionStatus::Running).await;

    // Pad the log to exactly 10 events: 2 status events from startup plus
    // 8 agent log lines.
    for i in 0..8 {
        harness
            .repo
            .append_event(
                &id,
                forge_core::Event::Log {
                    level: forge_core::LogLevel::Info,
                    message: format!("line {i}"),
                },
            )
            .expect("append");
    }

    let first_batch: Vec<u64> = harness
        .manager
        .subscribe(&id, Some(0))
        .take(10)
        .map(|record| record.sequence)
        .collect()
        .await;
    assert_eq!(first_batch, (1..=10).collect::<Vec<u64>>());

    // Subscriber disconnects; ten more events land (two pause/resume
    // round trips and one final pause, four + four + two status events).
    harness.manager.pause(&id).await.expect("pause");
    harness.manager.resume(&id).await.expect("resume");
    harness.manager.pause(&id).await.expect("pause");
    harness.manager.resume(&id).await.expect("resume");
    harness.manager.pause(&id).await.expect("pause");

    let second_batch: Vec<u64> = harness
        .manager
        .subscribe(&id, Some(10))
        .take(10)
        .map(|record| record.sequence)
        .collect()
        .await;
    assert_eq!(second_batch, (11..=20).collect::<Vec<u64>>());
}

#[tokio::test]
async fn live_subscriber_sees_events_published_after_subscribing() {
    let harness = Harness::new(2, long_running_launcher());

    let id = harness
        .manager
        .create_task(request("streamed work"), None)
        .await
        .expect("create");
    harness.wait_for_status(&id, SessionStatus::Running).await;

    let head = harness
        .repo
        .recent_events(&id, 1)
        .last()
        .map(|e| e.sequence)
        .unwrap_or(0);
    let stream = harness.manager.subscribe(&id, Some(head));
    tokio::pin!(stream);

    harness.manager.pause(&id).await.expect("pause");

    let next = stream.next().await.expect("live event");
    assert_eq!(next.sequence, head + 1);
    assert!(matches!(
        next.event,
        forge_core::Event::Status {
            status: SessionStatus::Pausing
        }
    ));
}

#[tokio::test]
async fn backlog_and_live_concatenation_has_no_gaps_or_duplicates() {
    let harness = Harness::new(2, long_running_launcher());

    let id = harness
        .manager
        .create_task(request("streamed work"), None)
        .await
        .expect("create");
    harness.wait_for_status(&id, SessionStatus::Running).await;

    // Subscribe from the very beginning while new events keep arriving.
    let stream = harness.manager.subscribe(&id, Some(0));
    harness.manager.pause(&id).await.expect("pause");
    harness.manager.resume(&id).await.expect("resume");

    let sequences: Vec<u64> = stream.take(6).map(|record| record.sequence).collect().await;
    assert_eq!(sequences, (1..=6).collect::<Vec<u64>>());
}
