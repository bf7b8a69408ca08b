// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event bus: fans out `EventRecord`s to live subscribers over
//! bounded per-subscriber channels. A slow subscriber never blocks the
//! publisher or the other subscribers — a full channel disconnects just
//! that one subscriber rather than applying backpressure to the producer.

use forge_core::{EventRecord, SessionId};
use parking_lot::Mutex;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error)]
pub enum BusError {
    #[error("subscriber channel disconnected due to backpressure")]
    BackpressureLost,
}

struct Subscriber {
    id: u64,
    tx: mpsc::Sender<EventRecord>,
}

/// Per-session fan-out of published events to bounded subscriber channels.
pub struct EventBus {
    capacity: usize,
    next_subscriber_id: Mutex<u64>,
    subscribers: Mutex<HashMap<SessionId, Vec<Subscriber>>>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            next_subscriber_id: Mutex::new(0),
            subscribers: Mutex::new(HashMap::new()),
        }
    }

    /// Subscribe to live events for `session_id`. The returned receiver
    /// yields events published from this point forward; backlog replay is
    /// the caller's responsibility (the Session Manager's `subscribe`
    /// merges this with the Repository's backlog).
    pub fn subscribe(&self, session_id: &SessionId) -> mpsc::Receiver<EventRecord> {
        let (tx, rx) = mpsc::channel(self.capacity);
        let id = {
            let mut next = self.next_subscriber_id.lock();
            *next += 1;
            *next
        };
        self.subscribers
            .lock()
            .entry(session_id.clone())
            .or_default()
            .push(Subscriber { id, tx });
        rx
    }

    /// Publish a record to every live subscriber of its session. A
    /// subscriber whose channel is full is dropped (its receiver observes
    /// the channel close) rather than blocking this call.
    pub fn publish(&self, record: EventRecord) {
        let mut subscribers = self.subscribers.lock();
        let Some(subs) = subscribers.get_mut(&record.session_id) else {
            return;
        };

        subs.retain(|sub| match sub.tx.try_send(record.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(
                    session_id = %record.session_id,
                    subscriber_id = sub.id,
                    "dropping subscriber: event bus channel full"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });

        if subs.is_empty() {
            subscribers.remove(&record.session_id);
        }
    }

    /// Number of live subscribers for `session_id`, for diagnostics/tests.
    pub fn subscriber_count(&self, session_id: &SessionId) -> usize {
        self.subscribers
            .lock()
            .get(session_id)
            .map(Vec::len)
            .unwrap_or(0)
    }
}
