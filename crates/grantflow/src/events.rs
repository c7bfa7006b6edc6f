//! Post-commit event dispatch.
//!
//! Services collect audit entries and notification intents into
//! [`PendingEvents`] while their transaction is open, then hand the batch to
//! the [`EventDispatcher`] after the commit. Nothing here can roll the
//! transaction back; failures are logged and swallowed.

use tracing::warn;

use crate::audit::{AuditEntry, AuditRecorder};
use crate::notify::{NotificationIntent, Notifier};

/// Side effects accumulated during a mutating operation, dispatched only if
/// the operation commits.
#[derive(Debug, Default)]
pub struct PendingEvents {
    pub audit: Vec<AuditEntry>,
    pub notifications: Vec<NotificationIntent>,
}

impl PendingEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_audit(&mut self, entry: AuditEntry) {
        self.audit.push(entry);
    }

    pub fn push_notification(&mut self, intent: NotificationIntent) {
        self.notifications.push(intent);
    }

    pub fn is_empty(&self) -> bool {
        self.audit.is_empty() && self.notifications.is_empty()
    }
}

#[derive(Clone)]
pub struct EventDispatcher {
    audit: AuditRecorder,
    notifier: Notifier,
}

impl EventDispatcher {
    pub fn new(audit: AuditRecorder, notifier: Notifier) -> Self {
        Self { audit, notifier }
    }

    /// Flushes audit first (cheap, local), then delivers notifications.
    /// Never raises.
    pub fn dispatch(&self, events: PendingEvents) {
        self.audit.flush(events.audit);
        for intent in &events.notifications {
            if let Err(e) = self.notifier.deliver(intent) {
                warn!(
                    event_id = %intent.event_id,
                    "Notification delivery failed (swallowed): {}",
                    e
                );
            }
        }
    }
}
