//! Notification sidecar — in-app records plus best-effort email.
//!
//! Delivery is idempotent on an externally supplied event id so the
//! at-least-once queue path and the in-process stage-change path can share
//! one code path.

pub mod consumer;
pub mod mailer;

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::db::{notification_repo, Database, DatabaseError};

pub use consumer::{EventSource, InMemoryQueue, QueueConsumer, UserEvent};
pub use mailer::{LogMailer, Mailer};

/// A notification waiting to be delivered.
#[derive(Debug, Clone)]
pub struct NotificationIntent {
    /// Idempotency key. Unique per logical event.
    pub event_id: String,
    pub user_id: String,
    /// Recipient address; `None` skips the email leg.
    pub email: Option<String>,
    pub subject: String,
    pub message: String,
    pub notification_type: String,
}

/// Outcome of a delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    /// The event id was seen before; nothing was written or sent.
    Duplicate,
}

/// Writes the in-app record and sends the email.
///
/// The in-app insert is the only part that can fail the call; the email leg
/// is fire-and-forget (logged on failure, `Delivered` is still returned).
#[derive(Clone)]
pub struct Notifier {
    db: Database,
    mailer: Arc<dyn Mailer>,
    from: String,
}

impl Notifier {
    pub fn new(db: Database, mailer: Arc<dyn Mailer>, from: impl Into<String>) -> Self {
        Self {
            db,
            mailer,
            from: from.into(),
        }
    }

    pub fn deliver(&self, intent: &NotificationIntent) -> Result<DeliveryOutcome, DatabaseError> {
        let row = notification_repo::NotificationRow {
            id: Uuid::new_v4().to_string(),
            event_id: intent.event_id.clone(),
            user_id: intent.user_id.clone(),
            message: intent.message.clone(),
            notification_type: intent.notification_type.clone(),
            emailed: false,
            created_at: Utc::now().to_rfc3339(),
        };

        let inserted = self
            .db
            .with_conn(|conn| notification_repo::insert_unique(conn, &row))?;
        if !inserted {
            debug!(event_id = %intent.event_id, "Duplicate notification event, skipping");
            return Ok(DeliveryOutcome::Duplicate);
        }

        if let Some(ref email) = intent.email {
            match self
                .mailer
                .send(&self.from, email, &intent.subject, &intent.message)
            {
                Ok(()) => {
                    if let Err(e) = self
                        .db
                        .with_conn(|conn| notification_repo::mark_emailed(conn, &row.id))
                    {
                        warn!("Failed to mark notification '{}' emailed: {}", row.id, e);
                    }
                }
                Err(e) => {
                    warn!(
                        event_id = %intent.event_id,
                        "Mail delivery failed (swallowed): {}",
                        e
                    );
                }
            }
        }

        Ok(DeliveryOutcome::Delivered)
    }
}
