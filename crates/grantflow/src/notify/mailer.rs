//! Mail delivery collaborator.
//!
//! Real SMTP lives outside the crate; the engine only needs a trait to hand
//! plaintext status messages to.

use tracing::info;

use crate::error::InfraError;

pub trait Mailer: Send + Sync {
    fn send(&self, from: &str, to: &str, subject: &str, body: &str) -> Result<(), InfraError>;
}

/// Default mailer: logs the message instead of sending it.
pub struct LogMailer;

impl Mailer for LogMailer {
    fn send(&self, from: &str, to: &str, subject: &str, _body: &str) -> Result<(), InfraError> {
        info!(from, to, subject, "Mail (log only)");
        Ok(())
    }
}

#[cfg(test)]
pub mod testing {
    use std::sync::Mutex;

    use super::*;

    /// Captures sent mail for assertions; optionally fails every send.
    #[derive(Default)]
    pub struct RecordingMailer {
        pub sent: Mutex<Vec<(String, String)>>,
        pub fail: bool,
    }

    impl Mailer for RecordingMailer {
        fn send(&self, _from: &str, to: &str, subject: &str, _body: &str) -> Result<(), InfraError> {
            if self.fail {
                return Err(InfraError::MailFailed("simulated outage".to_string()));
            }
            self.sent
                .lock()
                .unwrap()
                .push((to.to_string(), subject.to_string()));
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::testing::RecordingMailer;
    use super::*;
    use crate::db::Database;
    use crate::notify::{DeliveryOutcome, NotificationIntent, Notifier};

    fn intent(event_id: &str) -> NotificationIntent {
        NotificationIntent {
            event_id: event_id.to_string(),
            user_id: "u1".to_string(),
            email: Some("a@example.org".to_string()),
            subject: "Proposal update".to_string(),
            message: "Your proposal moved to Submitted".to_string(),
            notification_type: "stage_change".to_string(),
        }
    }

    #[test]
    fn test_deliver_sends_mail_and_records() {
        let db = Database::open_in_memory().unwrap();
        let mailer = Arc::new(RecordingMailer::default());
        let notifier = Notifier::new(db.clone(), mailer.clone(), "noreply@grantflow.local");

        let outcome = notifier.deliver(&intent("evt-1")).unwrap();
        assert_eq!(outcome, DeliveryOutcome::Delivered);
        assert_eq!(mailer.sent.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_duplicate_event_skips_mail() {
        let db = Database::open_in_memory().unwrap();
        let mailer = Arc::new(RecordingMailer::default());
        let notifier = Notifier::new(db.clone(), mailer.clone(), "noreply@grantflow.local");

        notifier.deliver(&intent("evt-1")).unwrap();
        let outcome = notifier.deliver(&intent("evt-1")).unwrap();
        assert_eq!(outcome, DeliveryOutcome::Duplicate);
        assert_eq!(mailer.sent.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_mail_failure_is_swallowed() {
        let db = Database::open_in_memory().unwrap();
        let mailer = Arc::new(RecordingMailer {
            fail: true,
            ..Default::default()
        });
        let notifier = Notifier::new(db.clone(), mailer, "noreply@grantflow.local");

        // Mail outage must not fail delivery; the in-app record still lands.
        let outcome = notifier.deliver(&intent("evt-1")).unwrap();
        assert_eq!(outcome, DeliveryOutcome::Delivered);

        db.with_conn(|conn| {
            let rows = crate::db::notification_repo::list_for_user(conn, "u1")?;
            assert_eq!(rows.len(), 1);
            assert!(!rows[0].emailed);
            Ok(())
        })
        .unwrap();
    }
}
