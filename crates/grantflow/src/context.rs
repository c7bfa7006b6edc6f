//! Explicit actor context passed into every mutating call.
//!
//! Replaces the ambient "current request user" pattern: audit records and
//! role checks consume the context handed to them by the caller, so there is
//! no hidden thread-local state and no coupling to a per-request thread model.

use serde::{Deserialize, Serialize};

use crate::error::StateConflictError;

/// Role of the acting principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    Applicant,
    Admin,
    Evaluator,
    /// Implementation-agency reviewer; first approver of the finance chain.
    ImplementationReviewer,
    /// Finance reviewer; approves payment claims.
    FinanceReviewer,
    /// Finance sanctioning officer; the only role that may move a sanction.
    SanctioningOfficer,
    /// Internal jobs (queue consumer, render retries).
    System,
}

/// Identity of the caller, carried explicitly through every service call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorContext {
    pub actor_id: String,
    pub display_name: String,
    pub role: ActorRole,
}

impl ActorContext {
    pub fn new(actor_id: impl Into<String>, display_name: impl Into<String>, role: ActorRole) -> Self {
        Self {
            actor_id: actor_id.into(),
            display_name: display_name.into(),
            role,
        }
    }

    /// Context for internal background work.
    pub fn system() -> Self {
        Self::new("system", "System", ActorRole::System)
    }

    pub fn is_admin(&self) -> bool {
        self.role == ActorRole::Admin
    }

    /// Fails with `RoleNotPermitted` unless the actor holds `role`.
    pub fn require_role(
        &self,
        role: ActorRole,
        operation: &'static str,
    ) -> Result<(), StateConflictError> {
        if self.role == role {
            Ok(())
        } else {
            Err(StateConflictError::RoleNotPermitted {
                role: self.role,
                operation,
            })
        }
    }
}
