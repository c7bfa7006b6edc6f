//! Draft authoring service.
//!
//! Everything here operates on drafts (and, while the submission window is
//! still open, on submitted proposals). The stage machine itself lives in
//! [`crate::workflow::engine::WorkflowEngine`].

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::audit::{AuditAction, AuditEntry};
use crate::context::{ActorContext, ActorRole};
use crate::db::{proposal_repo, template_repo, Database};
use crate::error::{NotFoundError, Result, StateConflictError, ValidationError};
use crate::events::{EventDispatcher, PendingEvents};
use crate::sanitize::normalize_registration;
use crate::workflow::Stage;

use proposal_repo::{CollaboratorRow, ProposalRow, SectionRow, StageHistoryRow};

#[derive(Clone)]
pub struct ProposalService {
    db: Database,
    dispatcher: EventDispatcher,
}

impl ProposalService {
    pub fn new(db: Database, dispatcher: EventDispatcher) -> Self {
        Self { db, dispatcher }
    }

    /// Creates a draft against the template identified by `template_code`.
    pub fn create_draft(
        &self,
        ctx: &ActorContext,
        template_code: &str,
        cohort: &str,
        applicant_email: &str,
    ) -> Result<ProposalRow> {
        ctx.require_role(ActorRole::Applicant, "create_draft")?;

        if cohort.trim().is_empty() {
            return Err(ValidationError::Field {
                field: "cohort",
                message: "cohort must not be empty".to_string(),
            }
            .into());
        }

        let mut events = PendingEvents::new();
        let row = self.db.with_tx(|tx| {
            let template = template_repo::find_by_code(tx, template_code)?.ok_or(
                NotFoundError::Entity {
                    entity: "template",
                    id: template_code.to_string(),
                },
            )?;

            let now = Utc::now().to_rfc3339();
            let row = ProposalRow {
                id: Uuid::new_v4().to_string(),
                template_id: template.id.clone(),
                applicant_id: ctx.actor_id.clone(),
                applicant_name: ctx.display_name.clone(),
                applicant_email: applicant_email.to_string(),
                cohort: cohort.to_string(),
                stage: Stage::Draft.as_str().to_string(),
                code: None,
                pdf_path: None,
                created_at: now.clone(),
                updated_at: now,
            };
            proposal_repo::insert(tx, &row)?;

            events.push_audit(AuditEntry::new(
                ctx,
                AuditAction::Create,
                "proposal",
                row.id.clone(),
                format!("draft ({})", template.code),
                serde_json::json!({
                    "template": template.code,
                    "cohort": row.cohort,
                    "stage": row.stage,
                }),
            ));
            Ok::<_, crate::error::GrantflowError>(row)
        })?;
        self.dispatcher.dispatch(events);

        info!(proposal_id = %row.id, template = template_code, "Draft created");
        Ok(row)
    }

    /// Writes a section payload. A completed section goes back to incomplete
    /// when its content changes.
    pub fn update_section(
        &self,
        ctx: &ActorContext,
        proposal_id: &str,
        name: &str,
        payload: &serde_json::Value,
    ) -> Result<()> {
        let mut events = PendingEvents::new();
        self.db.with_tx(|tx| {
            let proposal = load_owned(tx, ctx, proposal_id)?;
            ensure_editable(tx, &proposal)?;

            proposal_repo::upsert_section(
                tx,
                &SectionRow {
                    proposal_id: proposal.id.clone(),
                    name: name.to_string(),
                    payload: payload.to_string(),
                    completed: false,
                    updated_at: Utc::now().to_rfc3339(),
                },
            )?;

            events.push_audit(AuditEntry::new(
                ctx,
                AuditAction::Update,
                "proposal_section",
                format!("{}:{}", proposal.id, name),
                label_of(&proposal),
                serde_json::json!({ "section": name }),
            ));
            Ok::<_, crate::error::GrantflowError>(())
        })?;
        self.dispatcher.dispatch(events);
        Ok(())
    }

    /// Marks an existing section complete. Submission requires every section
    /// named by the template to be complete.
    pub fn mark_section_complete(
        &self,
        ctx: &ActorContext,
        proposal_id: &str,
        name: &str,
    ) -> Result<()> {
        let mut events = PendingEvents::new();
        self.db.with_tx(|tx| {
            let proposal = load_owned(tx, ctx, proposal_id)?;
            ensure_editable(tx, &proposal)?;

            let mut section = proposal_repo::find_section(tx, &proposal.id, name)?.ok_or(
                NotFoundError::Entity {
                    entity: "proposal_section",
                    id: name.to_string(),
                },
            )?;
            section.completed = true;
            section.updated_at = Utc::now().to_rfc3339();
            proposal_repo::upsert_section(tx, &section)?;

            events.push_audit(AuditEntry::new(
                ctx,
                AuditAction::Update,
                "proposal_section",
                format!("{}:{}", proposal.id, name),
                label_of(&proposal),
                serde_json::json!({ "section": name, "completed": true }),
            ));
            Ok::<_, crate::error::GrantflowError>(())
        })?;
        self.dispatcher.dispatch(events);
        Ok(())
    }

    /// Declares a collaborating organization. The registration number is
    /// stored in canonical form so cohort uniqueness is insensitive to
    /// punctuation and case.
    pub fn add_collaborator(
        &self,
        ctx: &ActorContext,
        proposal_id: &str,
        organization_name: &str,
        registration_no: &str,
    ) -> Result<CollaboratorRow> {
        if organization_name.trim().is_empty() {
            return Err(ValidationError::Field {
                field: "organization_name",
                message: "organization name must not be empty".to_string(),
            }
            .into());
        }
        let normalized = normalize_registration(registration_no);
        if normalized.is_empty() {
            return Err(ValidationError::Field {
                field: "registration_no",
                message: "registration number must contain letters or digits".to_string(),
            }
            .into());
        }

        let mut events = PendingEvents::new();
        let row = self.db.with_tx(|tx| {
            let proposal = load_owned(tx, ctx, proposal_id)?;
            ensure_editable(tx, &proposal)?;

            let row = CollaboratorRow {
                id: Uuid::new_v4().to_string(),
                proposal_id: proposal.id.clone(),
                organization_name: organization_name.trim().to_string(),
                registration_no: normalized,
            };
            proposal_repo::insert_collaborator(tx, &row)?;

            events.push_audit(AuditEntry::new(
                ctx,
                AuditAction::Create,
                "collaborator",
                row.id.clone(),
                label_of(&proposal),
                serde_json::json!({
                    "organization_name": row.organization_name,
                    "registration_no": row.registration_no,
                }),
            ));
            Ok::<_, crate::error::GrantflowError>(row)
        })?;
        self.dispatcher.dispatch(events);
        Ok(row)
    }

    /// Deletes a draft. Submitted proposals are never deletable; they carry
    /// an allocated code and an audit trail.
    pub fn delete_draft(&self, ctx: &ActorContext, proposal_id: &str) -> Result<()> {
        let mut events = PendingEvents::new();
        self.db.with_tx(|tx| {
            let proposal = load_owned(tx, ctx, proposal_id)?;
            if proposal.stage != Stage::Draft.as_str() {
                return Err(StateConflictError::SubmittedNotDeletable {
                    proposal: label_of(&proposal),
                }
                .into());
            }

            // Snapshot before the row disappears; the audit entry is the
            // only remaining record of the draft.
            let sections = proposal_repo::list_sections(tx, &proposal.id)?;
            let snapshot = serde_json::json!({
                "template_id": proposal.template_id,
                "cohort": proposal.cohort,
                "stage": proposal.stage,
                "sections": sections.iter().map(|s| s.name.clone()).collect::<Vec<_>>(),
            });

            proposal_repo::delete(tx, &proposal.id)?;

            events.push_audit(AuditEntry::new(
                ctx,
                AuditAction::Delete,
                "proposal",
                proposal.id.clone(),
                label_of(&proposal),
                snapshot,
            ));
            Ok::<_, crate::error::GrantflowError>(())
        })?;
        self.dispatcher.dispatch(events);

        info!(proposal_id, "Draft deleted");
        Ok(())
    }

    // ── Reads ──

    pub fn get(&self, ctx: &ActorContext, proposal_id: &str) -> Result<ProposalRow> {
        self.db.with_tx(|tx| load_owned(tx, ctx, proposal_id))
    }

    pub fn sections(&self, ctx: &ActorContext, proposal_id: &str) -> Result<Vec<SectionRow>> {
        self.db.with_tx(|tx| {
            let proposal = load_owned(tx, ctx, proposal_id)?;
            Ok(proposal_repo::list_sections(tx, &proposal.id)?)
        })
    }

    pub fn collaborators(
        &self,
        ctx: &ActorContext,
        proposal_id: &str,
    ) -> Result<Vec<CollaboratorRow>> {
        self.db.with_tx(|tx| {
            let proposal = load_owned(tx, ctx, proposal_id)?;
            Ok(proposal_repo::list_collaborators(tx, &proposal.id)?)
        })
    }

    /// Full stage trail, oldest first.
    pub fn stage_history(
        &self,
        ctx: &ActorContext,
        proposal_id: &str,
    ) -> Result<Vec<StageHistoryRow>> {
        self.db.with_tx(|tx| {
            let proposal = load_owned(tx, ctx, proposal_id)?;
            Ok(proposal_repo::list_stage_history(tx, &proposal.id)?)
        })
    }
}

/// Human-readable label: the code once assigned, the id before that.
pub(crate) fn label_of(proposal: &ProposalRow) -> String {
    proposal.code.clone().unwrap_or_else(|| proposal.id.clone())
}

/// Loads a proposal, enforcing that applicants only see their own.
pub(crate) fn load_owned(
    conn: &rusqlite::Connection,
    ctx: &ActorContext,
    proposal_id: &str,
) -> Result<ProposalRow> {
    let proposal =
        proposal_repo::find_by_id(conn, proposal_id)?.ok_or(NotFoundError::Entity {
            entity: "proposal",
            id: proposal_id.to_string(),
        })?;
    if ctx.role == ActorRole::Applicant && proposal.applicant_id != ctx.actor_id {
        return Err(NotFoundError::NotOwned {
            entity: "proposal",
            id: proposal_id.to_string(),
            actor: ctx.actor_id.clone(),
        }
        .into());
    }
    Ok(proposal)
}

/// Editability gate. Drafts are always editable by their owner. A submitted
/// proposal stays editable until the template's submission window closes;
/// after that (and at every later stage) it is frozen.
pub(crate) fn ensure_editable(conn: &rusqlite::Connection, proposal: &ProposalRow) -> Result<()> {
    let stage = crate::workflow::engine::stage_of(proposal)?;
    match stage {
        Stage::Draft => Ok(()),
        Stage::Submitted => {
            let template = template_repo::find_by_id(conn, &proposal.template_id)?.ok_or(
                NotFoundError::Entity {
                    entity: "template",
                    id: proposal.template_id.clone(),
                },
            )?;
            let end = crate::workflow::engine::parse_ts(&template.end_date, &template.id)?;
            if Utc::now() < end {
                Ok(())
            } else {
                Err(StateConflictError::FinalizedSubmission {
                    proposal: label_of(proposal),
                }
                .into())
            }
        }
        _ => Err(StateConflictError::FinalizedSubmission {
            proposal: label_of(proposal),
        }
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GrantflowError;
    use crate::testing::TestHarness;

    #[test]
    fn test_create_draft_requires_applicant_role() {
        let h = TestHarness::new();
        let admin = h.admin();
        let err = h
            .proposals
            .create_draft(&admin, "AGRI", "north", "a@example.org")
            .unwrap_err();
        assert!(matches!(
            err,
            GrantflowError::StateConflict(StateConflictError::RoleNotPermitted { .. })
        ));
    }

    #[test]
    fn test_draft_lifecycle() {
        let h = TestHarness::new();
        let alice = h.applicant("u1", "Alice");

        let draft = h
            .proposals
            .create_draft(&alice, "AGRI", "north", "alice@example.org")
            .unwrap();
        assert_eq!(draft.stage, "draft");
        assert!(draft.code.is_none());

        h.proposals
            .update_section(&alice, &draft.id, "abstract", &serde_json::json!({"text": "x"}))
            .unwrap();
        h.proposals
            .mark_section_complete(&alice, &draft.id, "abstract")
            .unwrap();

        let sections = h.proposals.sections(&alice, &draft.id).unwrap();
        assert_eq!(sections.len(), 1);
        assert!(sections[0].completed);

        h.proposals.delete_draft(&alice, &draft.id).unwrap();
        let err = h.proposals.get(&alice, &draft.id).unwrap_err();
        assert!(matches!(err, GrantflowError::NotFound(_)));
    }

    #[test]
    fn test_update_section_resets_completion() {
        let h = TestHarness::new();
        let alice = h.applicant("u1", "Alice");
        let draft = h
            .proposals
            .create_draft(&alice, "AGRI", "north", "alice@example.org")
            .unwrap();

        h.proposals
            .update_section(&alice, &draft.id, "abstract", &serde_json::json!({"v": 1}))
            .unwrap();
        h.proposals
            .mark_section_complete(&alice, &draft.id, "abstract")
            .unwrap();
        h.proposals
            .update_section(&alice, &draft.id, "abstract", &serde_json::json!({"v": 2}))
            .unwrap();

        let sections = h.proposals.sections(&alice, &draft.id).unwrap();
        assert!(!sections[0].completed);
    }

    #[test]
    fn test_foreign_applicant_cannot_read_draft() {
        let h = TestHarness::new();
        let alice = h.applicant("u1", "Alice");
        let bob = h.applicant("u2", "Bob");
        let draft = h
            .proposals
            .create_draft(&alice, "AGRI", "north", "alice@example.org")
            .unwrap();

        let err = h.proposals.get(&bob, &draft.id).unwrap_err();
        assert!(matches!(
            err,
            GrantflowError::NotFound(NotFoundError::NotOwned { .. })
        ));
        // Admins see everything.
        assert!(h.proposals.get(&h.admin(), &draft.id).is_ok());
    }

    #[test]
    fn test_collaborator_registration_is_normalized() {
        let h = TestHarness::new();
        let alice = h.applicant("u1", "Alice");
        let draft = h
            .proposals
            .create_draft(&alice, "AGRI", "north", "alice@example.org")
            .unwrap();

        let row = h
            .proposals
            .add_collaborator(&alice, &draft.id, "Acme Labs", "reg-42/a")
            .unwrap();
        assert_eq!(row.registration_no, "REG42A");
    }

    #[test]
    fn test_mark_missing_section_complete_fails() {
        let h = TestHarness::new();
        let alice = h.applicant("u1", "Alice");
        let draft = h
            .proposals
            .create_draft(&alice, "AGRI", "north", "alice@example.org")
            .unwrap();

        let err = h
            .proposals
            .mark_section_complete(&alice, &draft.id, "missing")
            .unwrap_err();
        assert!(matches!(err, GrantflowError::NotFound(_)));
    }
}
