//! Inbound `user_events` queue consumer.
//!
//! Polls in batches and commits the offset only after the whole batch has
//! been processed, so a crash mid-batch causes at-least-once redelivery.
//! Processing is idempotent: the notifier dedups on `event_id`.

use tracing::{info, warn};

use crate::db::DatabaseError;

use super::{NotificationIntent, Notifier};

/// One message from the `user_events` topic.
#[derive(Debug, Clone)]
pub struct UserEvent {
    pub event_id: String,
    pub user_id: String,
    /// Recipient address when an email leg is wanted.
    pub email: Option<String>,
    pub message: String,
    pub notification_type: String,
}

/// Source of queued events. `poll` must not remove messages; `commit`
/// acknowledges the first `count` messages of the last poll.
pub trait EventSource: Send {
    fn poll(&self, max: usize) -> Vec<UserEvent>;
    fn commit(&self, count: usize);
}

pub struct QueueConsumer {
    source: Box<dyn EventSource>,
    notifier: Notifier,
    batch_size: usize,
}

impl QueueConsumer {
    pub fn new(source: Box<dyn EventSource>, notifier: Notifier, batch_size: usize) -> Self {
        Self {
            source,
            notifier,
            batch_size,
        }
    }

    /// Processes one batch. Returns the number of messages handled, or the
    /// first database error — in which case the offset is NOT committed and
    /// the batch will be redelivered.
    pub fn run_once(&self) -> Result<usize, DatabaseError> {
        let batch = self.source.poll(self.batch_size);
        if batch.is_empty() {
            return Ok(0);
        }

        for event in &batch {
            self.notifier.deliver(&NotificationIntent {
                event_id: event.event_id.clone(),
                user_id: event.user_id.clone(),
                email: event.email.clone(),
                subject: "Notification".to_string(),
                message: event.message.clone(),
                notification_type: event.notification_type.clone(),
            })?;
        }

        self.source.commit(batch.len());
        info!(count = batch.len(), "Committed notification batch");
        Ok(batch.len())
    }

    /// Drains the source until a poll comes back empty. Errors are logged
    /// and stop the drain; the uncommitted batch stays queued.
    pub fn drain(&self) -> usize {
        let mut total = 0;
        loop {
            match self.run_once() {
                Ok(0) => return total,
                Ok(n) => total += n,
                Err(e) => {
                    warn!("Notification batch failed, leaving offset uncommitted: {}", e);
                    return total;
                }
            }
        }
    }
}

/// Simple in-process source backed by a queue. Used for tests and as the
/// default wiring when no external broker is configured.
#[derive(Default)]
pub struct InMemoryQueue {
    events: std::sync::Mutex<std::collections::VecDeque<UserEvent>>,
}

impl InMemoryQueue {
    pub fn push(&self, event: UserEvent) {
        self.events.lock().unwrap().push_back(event);
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EventSource for std::sync::Arc<InMemoryQueue> {
    fn poll(&self, max: usize) -> Vec<UserEvent> {
        let events = self.events.lock().unwrap();
        events.iter().take(max).cloned().collect()
    }

    fn commit(&self, count: usize) {
        let mut events = self.events.lock().unwrap();
        for _ in 0..count {
            events.pop_front();
        }
    }
}
