//! Post-commit audit writer.

use chrono::Utc;
use tracing::warn;
use uuid::Uuid;

use crate::context::ActorContext;
use crate::db::{audit_repo, Database, DatabaseError};

use super::{is_skip_listed, AuditAction, AuditEntry};

/// Writes audit entries after the owning transaction has committed.
///
/// Failures are logged and swallowed: the primary operation must never fail
/// because of the diagnostic side effect.
#[derive(Clone)]
pub struct AuditRecorder {
    db: Database,
}

impl AuditRecorder {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Flushes a batch of entries. Never raises.
    pub fn flush(&self, entries: Vec<AuditEntry>) {
        for entry in entries {
            if is_skip_listed(entry.entity_type) {
                continue;
            }
            if let Err(e) = self.write(&entry) {
                warn!(
                    entity_type = entry.entity_type,
                    entity_id = %entry.entity_id,
                    action = entry.action.as_str(),
                    "Audit write failed (swallowed): {}",
                    e
                );
            }
        }
    }

    /// Records a login event for the given actor. Never raises.
    pub fn record_login(&self, ctx: &ActorContext) {
        self.flush(vec![AuditEntry::new(
            ctx,
            AuditAction::Login,
            "user",
            ctx.actor_id.clone(),
            ctx.display_name.clone(),
            serde_json::json!({ "role": ctx.role }),
        )]);
    }

    fn write(&self, entry: &AuditEntry) -> Result<(), DatabaseError> {
        let row = audit_repo::AuditRow {
            id: Uuid::new_v4().to_string(),
            actor_id: entry.actor_id.clone(),
            actor_name: entry.actor_name.clone(),
            action: entry.action.as_str().to_string(),
            entity_type: entry.entity_type.to_string(),
            entity_id: entry.entity_id.clone(),
            label: entry.label.clone(),
            snapshot: entry.snapshot.to_string(),
            created_at: Utc::now().to_rfc3339(),
        };
        self.db.with_conn(|conn| audit_repo::insert(conn, &row))
    }
}
