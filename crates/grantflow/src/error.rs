use thiserror::Error;

use crate::context::ActorRole;
use crate::workflow::Stage;

#[derive(Error, Debug)]
pub enum GrantflowError {
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("State conflict: {0}")]
    StateConflict(#[from] StateConflictError),

    #[error("Not found: {0}")]
    NotFound(#[from] NotFoundError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("Infrastructure error: {0}")]
    Infra(#[from] InfraError),
}

/// Malformed or missing input, uniqueness conflicts, out-of-window submissions.
/// Reported synchronously with field-level detail; never silently recovered.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Field '{field}': {message}")]
    Field { field: &'static str, message: String },

    #[error("Required sections incomplete: {missing:?}")]
    SectionsIncomplete { missing: Vec<String> },

    #[error("Template '{template}' is not accepting submissions yet")]
    WindowNotOpen { template: String },

    #[error("Submission window for template '{template}' has closed")]
    WindowClosed { template: String },

    #[error("Duplicate {field} '{value}' among submitted proposals in cohort '{cohort}'")]
    CohortDuplicate {
        field: &'static str,
        value: String,
        cohort: String,
    },

    #[error("Exactly one of 'milestone_id' and 'sub_milestone_id' must be set")]
    ExclusiveReference,
}

impl ValidationError {
    /// The offending field, when the error is attributable to a single one.
    pub fn field(&self) -> Option<&'static str> {
        match self {
            ValidationError::Field { field, .. } => Some(field),
            ValidationError::CohortDuplicate { field, .. } => Some(field),
            ValidationError::ExclusiveReference => Some("milestone_id"),
            _ => None,
        }
    }
}

/// Attempted transition that violates the stage or finance-chain state
/// machine. The underlying record is left unchanged.
#[derive(Error, Debug)]
pub enum StateConflictError {
    #[error("Illegal stage transition {from} -> {to}")]
    IllegalTransition { from: Stage, to: Stage },

    #[error("Transition {from} -> {to} blocked: {reason}")]
    GuardFailed {
        from: Stage,
        to: Stage,
        reason: String,
    },

    #[error("Proposal '{proposal}' is finalized and can no longer be edited")]
    FinalizedSubmission { proposal: String },

    #[error("Proposal '{proposal}' has been submitted and cannot be deleted")]
    SubmittedNotDeletable { proposal: String },

    #[error("Finance request '{request}' is not approved; a claim cannot be raised")]
    RequestNotApproved { request: String },

    #[error("Payment claim '{claim}' is not approved; a sanction cannot be created")]
    ClaimNotApproved { claim: String },

    #[error("Illegal {entity} status change {from} -> {to}")]
    IllegalStatusChange {
        entity: &'static str,
        from: String,
        to: String,
    },

    #[error("Role {role:?} may not perform '{operation}'")]
    RoleNotPermitted {
        role: ActorRole,
        operation: &'static str,
    },
}

/// Referenced entity does not exist or is not owned by the caller.
#[derive(Error, Debug)]
pub enum NotFoundError {
    #[error("{entity} '{id}' not found")]
    Entity { entity: &'static str, id: String },

    #[error("{entity} '{id}' is not owned by actor '{actor}'")]
    NotOwned {
        entity: &'static str,
        id: String,
        actor: String,
    },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },
}

/// Failures in PDF rendering, mail delivery, or audit logging.
///
/// These never abort the primary transaction; they are logged and/or retried
/// out-of-band. Correctness of the proposal record takes priority over the
/// side artifacts.
#[derive(Error, Debug)]
pub enum InfraError {
    #[error("PDF render failed: {0}")]
    RenderFailed(String),

    #[error("PDF render timed out after {seconds}s")]
    RenderTimeout { seconds: u64 },

    #[error("Mail delivery failed: {0}")]
    MailFailed(String),

    #[error("Audit write failed: {0}")]
    AuditFailed(String),

    #[error("Artifact store failed for '{path}': {source}")]
    ArtifactWrite {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, GrantflowError>;
