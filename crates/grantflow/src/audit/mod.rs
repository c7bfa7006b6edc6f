//! Audit sidecar — immutable record of every create/update/delete/login.
//!
//! Entries are collected by services while their transaction is open and
//! flushed by the [`recorder::AuditRecorder`] only after the commit. A flush
//! never raises; audit is diagnostic, not transactional-correctness-critical.

pub mod recorder;

use serde::{Deserialize, Serialize};

use crate::context::ActorContext;

pub use recorder::AuditRecorder;

/// Kind of audited action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Create,
    Update,
    Delete,
    Login,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Create => "create",
            AuditAction::Update => "update",
            AuditAction::Delete => "delete",
            AuditAction::Login => "login",
        }
    }
}

/// Entity types that never produce audit records: the audit infrastructure
/// itself and auth/session bookkeeping.
const SKIP_LIST: &[&str] = &["audit_log", "notification", "session", "auth_token", "content_type"];

pub fn is_skip_listed(entity_type: &str) -> bool {
    SKIP_LIST.contains(&entity_type)
}

/// A pending audit record, built inside the mutating transaction and
/// persisted after it commits.
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub actor_id: Option<String>,
    pub actor_name: String,
    pub action: AuditAction,
    pub entity_type: &'static str,
    pub entity_id: String,
    /// Human-readable label for the entity, e.g. the proposal code.
    pub label: String,
    /// Field-level snapshot: foreign keys resolved to display strings,
    /// datetimes ISO-formatted, file fields reduced to their URL.
    pub snapshot: serde_json::Value,
}

impl AuditEntry {
    pub fn new(
        ctx: &ActorContext,
        action: AuditAction,
        entity_type: &'static str,
        entity_id: impl Into<String>,
        label: impl Into<String>,
        snapshot: serde_json::Value,
    ) -> Self {
        Self {
            actor_id: Some(ctx.actor_id.clone()),
            actor_name: ctx.display_name.clone(),
            action,
            entity_type,
            entity_id: entity_id.into(),
            label: label.into(),
            snapshot,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skip_list_covers_audit_infra() {
        assert!(is_skip_listed("audit_log"));
        assert!(is_skip_listed("session"));
        assert!(!is_skip_listed("proposal"));
        assert!(!is_skip_listed("milestone"));
    }

    #[test]
    fn test_action_labels() {
        assert_eq!(AuditAction::Create.as_str(), "create");
        assert_eq!(AuditAction::Login.as_str(), "login");
    }
}
