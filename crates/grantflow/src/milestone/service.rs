//! Milestone management service.
//!
//! Milestones exist only for approved proposals. Every change to a
//! milestone's negotiable fields appends an immutable history snapshot in
//! the same transaction.

use chrono::Utc;
use rusqlite::{Connection, Transaction};
use uuid::Uuid;

use crate::audit::{AuditAction, AuditEntry};
use crate::context::{ActorContext, ActorRole};
use crate::db::{milestone_repo, Database};
use crate::error::{GrantflowError, NotFoundError, Result, StateConflictError, ValidationError};
use crate::events::{EventDispatcher, PendingEvents};
use crate::proposal::service::load_owned;
use crate::workflow::engine::stage_of;
use crate::workflow::Stage;

use milestone_repo::{DocumentRow, HistoryRow, MilestoneRow, SubMilestoneRow};

use super::{derive_status, DocumentCategory, DocumentStatus, MilestoneStatus};

#[derive(Clone)]
pub struct MilestoneService {
    db: Database,
    dispatcher: EventDispatcher,
}

impl MilestoneService {
    pub fn new(db: Database, dispatcher: EventDispatcher) -> Self {
        Self { db, dispatcher }
    }

    /// Creates a milestone under an approved proposal.
    pub fn create(
        &self,
        ctx: &ActorContext,
        proposal_id: &str,
        title: &str,
        requested_amount: f64,
        starts_on: Option<&str>,
        ends_on: Option<&str>,
    ) -> Result<MilestoneRow> {
        ctx.require_role(ActorRole::Applicant, "create_milestone")?;
        validate_amount(requested_amount, "requested_amount")?;

        let mut events = PendingEvents::new();
        let row = self.db.with_tx(|tx| {
            let proposal = load_owned(tx, ctx, proposal_id)?;
            let stage = stage_of(&proposal)?;
            if stage != Stage::Approved {
                return Err(StateConflictError::GuardFailed {
                    from: stage,
                    to: Stage::Approved,
                    reason: "milestones require an approved proposal".to_string(),
                }
                .into());
            }

            let now = Utc::now().to_rfc3339();
            let row = MilestoneRow {
                id: Uuid::new_v4().to_string(),
                proposal_id: proposal.id.clone(),
                title: title.to_string(),
                status: derive_status(&now, starts_on, ends_on, false)
                    .as_str()
                    .to_string(),
                requested_amount,
                revised_amount: None,
                starts_on: starts_on.map(str::to_string),
                ends_on: ends_on.map(str::to_string),
                created_at: now.clone(),
                updated_at: now,
            };
            milestone_repo::insert(tx, &row)?;
            append_snapshot(tx, &row)?;

            events.push_audit(AuditEntry::new(
                ctx,
                AuditAction::Create,
                "milestone",
                row.id.clone(),
                row.title.clone(),
                serde_json::json!({ "requested_amount": requested_amount }),
            ));
            Ok::<_, GrantflowError>(row)
        })?;
        self.dispatcher.dispatch(events);
        Ok(row)
    }

    /// Renegotiates a milestone. The pre-update state is snapshotted first,
    /// so the history always reconstructs every agreed version.
    #[allow(clippy::too_many_arguments)]
    pub fn update(
        &self,
        ctx: &ActorContext,
        milestone_id: &str,
        title: &str,
        requested_amount: f64,
        revised_amount: Option<f64>,
        starts_on: Option<&str>,
        ends_on: Option<&str>,
    ) -> Result<MilestoneRow> {
        validate_amount(requested_amount, "requested_amount")?;
        if let Some(revised) = revised_amount {
            validate_amount(revised, "revised_amount")?;
        }

        let mut events = PendingEvents::new();
        let row = self.db.with_tx(|tx| {
            let mut row = find_owned_milestone(tx, ctx, milestone_id)?;
            append_snapshot(tx, &row)?;

            let now = Utc::now().to_rfc3339();
            let completed = row.status == MilestoneStatus::Completed.as_str();
            row.title = title.to_string();
            row.requested_amount = requested_amount;
            row.revised_amount = revised_amount;
            row.starts_on = starts_on.map(str::to_string);
            row.ends_on = ends_on.map(str::to_string);
            row.status = derive_status(&now, starts_on, ends_on, completed)
                .as_str()
                .to_string();
            row.updated_at = now;
            milestone_repo::update(tx, &row)?;

            events.push_audit(AuditEntry::new(
                ctx,
                AuditAction::Update,
                "milestone",
                row.id.clone(),
                row.title.clone(),
                serde_json::json!({
                    "requested_amount": requested_amount,
                    "revised_amount": revised_amount,
                }),
            ));
            Ok::<_, GrantflowError>(row)
        })?;
        self.dispatcher.dispatch(events);
        Ok(row)
    }

    /// Marks a milestone completed.
    pub fn complete(&self, ctx: &ActorContext, milestone_id: &str) -> Result<MilestoneRow> {
        let mut events = PendingEvents::new();
        let row = self.db.with_tx(|tx| {
            let mut row = find_owned_milestone(tx, ctx, milestone_id)?;
            if row.status == MilestoneStatus::Completed.as_str() {
                return Err(StateConflictError::IllegalStatusChange {
                    entity: "milestone",
                    from: row.status.clone(),
                    to: MilestoneStatus::Completed.as_str().to_string(),
                }
                .into());
            }
            append_snapshot(tx, &row)?;

            row.status = MilestoneStatus::Completed.as_str().to_string();
            row.updated_at = Utc::now().to_rfc3339();
            milestone_repo::update(tx, &row)?;

            events.push_audit(AuditEntry::new(
                ctx,
                AuditAction::Update,
                "milestone",
                row.id.clone(),
                row.title.clone(),
                serde_json::json!({ "status": row.status }),
            ));
            Ok::<_, GrantflowError>(row)
        })?;
        self.dispatcher.dispatch(events);
        Ok(row)
    }

    pub fn create_sub_milestone(
        &self,
        ctx: &ActorContext,
        milestone_id: &str,
        title: &str,
        requested_amount: f64,
    ) -> Result<SubMilestoneRow> {
        validate_amount(requested_amount, "requested_amount")?;

        let mut events = PendingEvents::new();
        let row = self.db.with_tx(|tx| {
            let milestone = find_owned_milestone(tx, ctx, milestone_id)?;

            let row = SubMilestoneRow {
                id: Uuid::new_v4().to_string(),
                milestone_id: milestone.id.clone(),
                title: title.to_string(),
                status: MilestoneStatus::InProgress.as_str().to_string(),
                requested_amount,
                created_at: Utc::now().to_rfc3339(),
            };
            milestone_repo::insert_sub(tx, &row)?;

            events.push_audit(AuditEntry::new(
                ctx,
                AuditAction::Create,
                "sub_milestone",
                row.id.clone(),
                row.title.clone(),
                serde_json::json!({ "milestone_id": milestone.id }),
            ));
            Ok::<_, GrantflowError>(row)
        })?;
        self.dispatcher.dispatch(events);
        Ok(row)
    }

    /// Uploads a document into its category slot. Each category holds
    /// exactly one document per milestone.
    pub fn attach_document(
        &self,
        ctx: &ActorContext,
        milestone_id: &str,
        category: DocumentCategory,
        file_path: &str,
    ) -> Result<DocumentRow> {
        ctx.require_role(ActorRole::Applicant, "attach_document")?;
        if file_path.trim().is_empty() {
            return Err(ValidationError::Field {
                field: "file_path",
                message: "file path must not be empty".to_string(),
            }
            .into());
        }

        let mut events = PendingEvents::new();
        let row = self.db.with_tx(|tx| {
            let milestone = find_owned_milestone(tx, ctx, milestone_id)?;

            let existing = milestone_repo::list_documents(tx, &milestone.id)?;
            if existing.iter().any(|d| d.category == category.as_str()) {
                return Err(ValidationError::Field {
                    field: "category",
                    message: format!("slot '{}' already holds a document", category.as_str()),
                }
                .into());
            }

            let row = DocumentRow {
                id: Uuid::new_v4().to_string(),
                milestone_id: milestone.id.clone(),
                category: category.as_str().to_string(),
                file_path: file_path.to_string(),
                status: DocumentStatus::PendingReview.as_str().to_string(),
                remarks: None,
                reviewed_by: None,
                reviewed_at: None,
                created_at: Utc::now().to_rfc3339(),
            };
            milestone_repo::insert_document(tx, &row)?;

            events.push_audit(AuditEntry::new(
                ctx,
                AuditAction::Create,
                "milestone_document",
                row.id.clone(),
                milestone.title.clone(),
                serde_json::json!({ "category": row.category }),
            ));
            Ok::<_, GrantflowError>(row)
        })?;
        self.dispatcher.dispatch(events);
        Ok(row)
    }

    /// Reviews an uploaded document. Only pending documents can be reviewed;
    /// a rejection must carry remarks explaining what to fix.
    pub fn review_document(
        &self,
        ctx: &ActorContext,
        document_id: &str,
        approve: bool,
        remarks: Option<&str>,
    ) -> Result<DocumentRow> {
        ctx.require_role(ActorRole::ImplementationReviewer, "review_document")?;
        if !approve && remarks.map_or(true, |r| r.trim().is_empty()) {
            return Err(ValidationError::Field {
                field: "remarks",
                message: "a rejection must carry remarks".to_string(),
            }
            .into());
        }

        let mut events = PendingEvents::new();
        let row = self.db.with_tx(|tx| {
            let mut row = milestone_repo::find_document(tx, document_id)?.ok_or(
                NotFoundError::Entity {
                    entity: "milestone_document",
                    id: document_id.to_string(),
                },
            )?;
            if row.status != DocumentStatus::PendingReview.as_str() {
                return Err(StateConflictError::IllegalStatusChange {
                    entity: "milestone_document",
                    from: row.status.clone(),
                    to: if approve { "approved" } else { "rejected" }.to_string(),
                }
                .into());
            }

            let status = if approve {
                DocumentStatus::Approved
            } else {
                DocumentStatus::Rejected
            };
            let now = Utc::now().to_rfc3339();
            milestone_repo::update_document_review(
                tx,
                &row.id,
                status.as_str(),
                remarks,
                &ctx.actor_id,
                &now,
            )?;
            row.status = status.as_str().to_string();
            row.remarks = remarks.map(str::to_string);
            row.reviewed_by = Some(ctx.actor_id.clone());
            row.reviewed_at = Some(now);

            events.push_audit(AuditEntry::new(
                ctx,
                AuditAction::Update,
                "milestone_document",
                row.id.clone(),
                row.category.clone(),
                serde_json::json!({ "status": row.status, "remarks": row.remarks }),
            ));
            Ok::<_, GrantflowError>(row)
        })?;
        self.dispatcher.dispatch(events);
        Ok(row)
    }

    // ── Reads ──

    pub fn list(&self, ctx: &ActorContext, proposal_id: &str) -> Result<Vec<MilestoneRow>> {
        self.db.with_tx(|tx| {
            let proposal = load_owned(tx, ctx, proposal_id)?;
            Ok(milestone_repo::list_by_proposal(tx, &proposal.id)?)
        })
    }

    /// All saved versions of a milestone, oldest first.
    pub fn history(&self, ctx: &ActorContext, milestone_id: &str) -> Result<Vec<HistoryRow>> {
        self.db.with_tx(|tx| {
            let milestone = find_owned_milestone(tx, ctx, milestone_id)?;
            Ok(milestone_repo::list_history(tx, &milestone.id)?)
        })
    }
}

/// 1-based position of a milestone within its proposal (creation order).
/// The finance chain keys its advance/penalty rules off this ordinal.
pub(crate) fn ordinal_of(conn: &Connection, milestone: &MilestoneRow) -> Result<usize> {
    let siblings = milestone_repo::list_by_proposal(conn, &milestone.proposal_id)?;
    siblings
        .iter()
        .position(|m| m.id == milestone.id)
        .map(|i| i + 1)
        .ok_or_else(|| {
            NotFoundError::Entity {
                entity: "milestone",
                id: milestone.id.clone(),
            }
            .into()
        })
}

fn find_owned_milestone(
    tx: &Transaction<'_>,
    ctx: &ActorContext,
    milestone_id: &str,
) -> Result<MilestoneRow> {
    let milestone = milestone_repo::find_by_id(tx, milestone_id)?.ok_or(
        NotFoundError::Entity {
            entity: "milestone",
            id: milestone_id.to_string(),
        },
    )?;
    // Ownership flows through the parent proposal.
    load_owned(tx, ctx, &milestone.proposal_id)?;
    Ok(milestone)
}

fn append_snapshot(tx: &Transaction<'_>, row: &MilestoneRow) -> Result<()> {
    let snapshot = serde_json::json!({
        "title": row.title,
        "status": row.status,
        "requested_amount": row.requested_amount,
        "revised_amount": row.revised_amount,
        "starts_on": row.starts_on,
        "ends_on": row.ends_on,
    });
    milestone_repo::insert_history(
        tx,
        &HistoryRow {
            id: Uuid::new_v4().to_string(),
            milestone_id: row.id.clone(),
            snapshot: snapshot.to_string(),
            created_at: Utc::now().to_rfc3339(),
        },
    )?;
    Ok(())
}

fn validate_amount(amount: f64, field: &'static str) -> Result<()> {
    if amount.is_finite() && amount >= 0.0 {
        Ok(())
    } else {
        Err(ValidationError::Field {
            field,
            message: format!("amount {} must be a non-negative number", amount),
        }
        .into())
    }
}
