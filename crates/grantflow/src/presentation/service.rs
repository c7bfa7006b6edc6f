//! Presentation lifecycle service.
//!
//! Every mutation runs in one transaction that also rebuilds the derived
//! caches, so readers of the projections never observe a stale or partial
//! state.

use chrono::Utc;
use rusqlite::Transaction;
use uuid::Uuid;

use crate::audit::{AuditAction, AuditEntry};
use crate::context::{ActorContext, ActorRole};
use crate::db::{presentation_repo, Database};
use crate::error::{GrantflowError, NotFoundError, Result, StateConflictError, ValidationError};
use crate::events::{EventDispatcher, PendingEvents};
use crate::proposal::service::load_owned;
use crate::workflow::engine::stage_of;
use crate::workflow::Stage;

use presentation_repo::{PresentationCacheRow, PresentationRow, ProposalCacheRow};

use super::{cache, PresentationStatus};

#[derive(Clone)]
pub struct PresentationService {
    db: Database,
    dispatcher: EventDispatcher,
}

impl PresentationService {
    pub fn new(db: Database, dispatcher: EventDispatcher) -> Self {
        Self { db, dispatcher }
    }

    /// Creates a presentation slot for one evaluator. The proposal must have
    /// cleared technical evaluation.
    pub fn create(
        &self,
        ctx: &ActorContext,
        proposal_id: &str,
        evaluator_id: &str,
        evaluator_name: &str,
    ) -> Result<PresentationRow> {
        ctx.require_role(ActorRole::Admin, "create_presentation")?;

        let mut events = PendingEvents::new();
        let row = self.db.with_tx(|tx| {
            let proposal = load_owned(tx, ctx, proposal_id)?;
            let stage = stage_of(&proposal)?;
            if stage != Stage::TechnicallyEvaluated {
                return Err(StateConflictError::GuardFailed {
                    from: stage,
                    to: Stage::Presented,
                    reason: "presentations open at stage technically_evaluated".to_string(),
                }
                .into());
            }

            let now = Utc::now().to_rfc3339();
            let row = PresentationRow {
                id: Uuid::new_v4().to_string(),
                proposal_id: proposal.id.clone(),
                evaluator_id: evaluator_id.to_string(),
                evaluator_name: evaluator_name.to_string(),
                video_link: None,
                document_path: None,
                scheduled_at: None,
                marks: None,
                remarks: None,
                evaluated_at: None,
                status: PresentationStatus::Pending.as_str().to_string(),
                created_at: now.clone(),
                updated_at: now,
            };
            presentation_repo::insert(tx, &row)?;
            cache::rebuild(tx, &proposal.id)?;

            events.push_audit(AuditEntry::new(
                ctx,
                AuditAction::Create,
                "presentation",
                row.id.clone(),
                proposal.code.clone().unwrap_or_else(|| proposal.id.clone()),
                serde_json::json!({ "evaluator_id": evaluator_id }),
            ));
            Ok::<_, GrantflowError>(row)
        })?;
        self.dispatcher.dispatch(events);
        Ok(row)
    }

    /// Attaches all three presentation materials and moves the row to
    /// Assigned. Partial material sets are refused.
    pub fn assign_materials(
        &self,
        ctx: &ActorContext,
        presentation_id: &str,
        video_link: &str,
        document_path: &str,
        scheduled_at: &str,
    ) -> Result<PresentationRow> {
        ctx.require_role(ActorRole::Admin, "assign_materials")?;
        for (field, value) in [
            ("video_link", video_link),
            ("document_path", document_path),
            ("scheduled_at", scheduled_at),
        ] {
            if value.trim().is_empty() {
                return Err(ValidationError::Field {
                    field,
                    message: "all presentation materials are required".to_string(),
                }
                .into());
            }
        }

        let mut events = PendingEvents::new();
        let row = self.db.with_tx(|tx| {
            let mut row = find_presentation(tx, presentation_id)?;
            let status = status_of(&row)?;
            require_advance(status, PresentationStatus::Assigned)?;

            row.video_link = Some(video_link.to_string());
            row.document_path = Some(document_path.to_string());
            row.scheduled_at = Some(scheduled_at.to_string());
            row.status = PresentationStatus::Assigned.as_str().to_string();
            row.updated_at = Utc::now().to_rfc3339();
            presentation_repo::update(tx, &row)?;
            cache::rebuild(tx, &row.proposal_id)?;

            events.push_audit(AuditEntry::new(
                ctx,
                AuditAction::Update,
                "presentation",
                row.id.clone(),
                row.proposal_id.clone(),
                serde_json::json!({ "status": row.status, "scheduled_at": scheduled_at }),
            ));
            Ok::<_, GrantflowError>(row)
        })?;
        self.dispatcher.dispatch(events);
        Ok(row)
    }

    /// Records the assigned evaluator's marks, stamping `evaluated_at`.
    pub fn submit_evaluation(
        &self,
        ctx: &ActorContext,
        presentation_id: &str,
        marks: f64,
        remarks: Option<&str>,
    ) -> Result<PresentationRow> {
        ctx.require_role(ActorRole::Evaluator, "submit_evaluation")?;
        if !(0.0..=100.0).contains(&marks) {
            return Err(ValidationError::Field {
                field: "marks",
                message: format!("marks {} outside 0..=100", marks),
            }
            .into());
        }

        let mut events = PendingEvents::new();
        let row = self.db.with_tx(|tx| {
            let mut row = find_presentation(tx, presentation_id)?;
            if row.evaluator_id != ctx.actor_id {
                return Err(NotFoundError::NotOwned {
                    entity: "presentation",
                    id: row.id.clone(),
                    actor: ctx.actor_id.clone(),
                }
                .into());
            }
            let status = status_of(&row)?;
            require_advance(status, PresentationStatus::Evaluated)?;

            let now = Utc::now().to_rfc3339();
            row.marks = Some(marks);
            row.remarks = remarks.map(str::to_string);
            row.evaluated_at = Some(now.clone());
            row.status = PresentationStatus::Evaluated.as_str().to_string();
            row.updated_at = now;
            presentation_repo::update(tx, &row)?;
            cache::rebuild(tx, &row.proposal_id)?;

            events.push_audit(AuditEntry::new(
                ctx,
                AuditAction::Update,
                "presentation",
                row.id.clone(),
                row.proposal_id.clone(),
                serde_json::json!({ "status": row.status, "marks": marks }),
            ));
            Ok::<_, GrantflowError>(row)
        })?;
        self.dispatcher.dispatch(events);
        Ok(row)
    }

    /// Records the final decision on an evaluated presentation. A rejection
    /// must carry a note.
    pub fn record_final_decision(
        &self,
        ctx: &ActorContext,
        presentation_id: &str,
        decision: PresentationStatus,
        note: Option<&str>,
    ) -> Result<PresentationRow> {
        ctx.require_role(ActorRole::Admin, "record_final_decision")?;
        if !decision.is_final() {
            return Err(ValidationError::Field {
                field: "decision",
                message: format!("'{}' is not a final decision", decision),
            }
            .into());
        }
        if decision == PresentationStatus::Rejected
            && note.map_or(true, |n| n.trim().is_empty())
        {
            return Err(ValidationError::Field {
                field: "note",
                message: "a rejection must carry a note".to_string(),
            }
            .into());
        }

        let mut events = PendingEvents::new();
        let row = self.db.with_tx(|tx| {
            let mut row = find_presentation(tx, presentation_id)?;
            let status = status_of(&row)?;
            require_advance(status, decision)?;

            if let Some(note) = note {
                row.remarks = Some(match row.remarks.take() {
                    Some(existing) => format!("{}\n{}", existing, note),
                    None => note.to_string(),
                });
            }
            row.status = decision.as_str().to_string();
            row.updated_at = Utc::now().to_rfc3339();
            presentation_repo::update(tx, &row)?;
            cache::rebuild(tx, &row.proposal_id)?;

            events.push_audit(AuditEntry::new(
                ctx,
                AuditAction::Update,
                "presentation",
                row.id.clone(),
                row.proposal_id.clone(),
                serde_json::json!({ "status": row.status, "note": note }),
            ));
            Ok::<_, GrantflowError>(row)
        })?;
        self.dispatcher.dispatch(events);
        Ok(row)
    }

    /// Removes a presentation slot and repairs both cache projections.
    pub fn delete(&self, ctx: &ActorContext, presentation_id: &str) -> Result<()> {
        ctx.require_role(ActorRole::Admin, "delete_presentation")?;

        let mut events = PendingEvents::new();
        self.db.with_tx(|tx| {
            let row = find_presentation(tx, presentation_id)?;
            let snapshot = serde_json::json!({
                "evaluator_id": row.evaluator_id,
                "status": row.status,
                "marks": row.marks,
            });
            presentation_repo::delete(tx, &row.id)?;
            cache::rebuild(tx, &row.proposal_id)?;

            events.push_audit(AuditEntry::new(
                ctx,
                AuditAction::Delete,
                "presentation",
                row.id.clone(),
                row.proposal_id.clone(),
                snapshot,
            ));
            Ok::<_, GrantflowError>(())
        })?;
        self.dispatcher.dispatch(events);
        Ok(())
    }

    // ── Cache reads ──

    pub fn presentation_cache(
        &self,
        presentation_id: &str,
    ) -> Result<Option<PresentationCacheRow>> {
        Ok(self.db.with_conn(|conn| {
            presentation_repo::find_presentation_cache(conn, presentation_id)
        })?)
    }

    pub fn proposal_cache(&self, proposal_id: &str) -> Result<Option<ProposalCacheRow>> {
        Ok(self
            .db
            .with_conn(|conn| presentation_repo::find_proposal_cache(conn, proposal_id))?)
    }

    pub fn list_for_proposal(&self, proposal_id: &str) -> Result<Vec<PresentationRow>> {
        Ok(self
            .db
            .with_conn(|conn| presentation_repo::list_by_proposal(conn, proposal_id))?)
    }
}

fn find_presentation(tx: &Transaction<'_>, id: &str) -> Result<PresentationRow> {
    presentation_repo::find_by_id(tx, id)?
        .ok_or(
            NotFoundError::Entity {
                entity: "presentation",
                id: id.to_string(),
            }
            .into(),
        )
}

fn status_of(row: &PresentationRow) -> Result<PresentationStatus> {
    PresentationStatus::parse(&row.status).ok_or_else(|| {
        crate::db::DatabaseError::CorruptEnum {
            what: "presentation status",
            value: row.status.clone(),
            id: row.id.clone(),
        }
        .into()
    })
}

fn require_advance(from: PresentationStatus, to: PresentationStatus) -> Result<()> {
    if from.can_advance(to) {
        Ok(())
    } else {
        Err(StateConflictError::IllegalStatusChange {
            entity: "presentation",
            from: from.as_str().to_string(),
            to: to.as_str().to_string(),
        }
        .into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestHarness;

    #[test]
    fn test_presentation_requires_technically_evaluated_stage() {
        let h = TestHarness::new();
        let alice = h.applicant("u1", "Alice");
        let submitted = h.submitted(&alice);

        let err = h
            .presentations
            .create(&h.admin(), &submitted.id, "e1", "Eve")
            .unwrap_err();
        assert!(matches!(
            err,
            GrantflowError::StateConflict(StateConflictError::GuardFailed { .. })
        ));
    }

    #[test]
    fn test_full_presentation_chain_updates_caches() {
        let h = TestHarness::new();
        let alice = h.applicant("u1", "Alice");
        let p = h.technically_evaluated(&alice);

        let pres = h
            .presentations
            .create(&h.admin(), &p.id, "e1", "Eve")
            .unwrap();
        let cache = h.presentations.presentation_cache(&pres.id).unwrap().unwrap();
        assert!(!cache.is_ready);
        assert_eq!(cache.status_label, "Pending");

        h.presentations
            .assign_materials(
                &h.admin(),
                &pres.id,
                "https://example.org/v",
                "/artifacts/deck.pdf",
                "2025-06-01T10:00:00+00:00",
            )
            .unwrap();
        let cache = h.presentations.presentation_cache(&pres.id).unwrap().unwrap();
        assert!(cache.is_ready);
        assert!(!cache.is_complete);

        let eve = h.evaluator("e1", "Eve");
        h.presentations
            .submit_evaluation(&eve, &pres.id, 72.0, Some("solid"))
            .unwrap();
        let agg = h.presentations.proposal_cache(&p.id).unwrap().unwrap();
        assert_eq!(agg.average_marks, Some(72.0));
        assert_eq!(agg.evaluated_count, 1);

        h.presentations
            .record_final_decision(&h.admin(), &pres.id, PresentationStatus::Shortlisted, None)
            .unwrap();
        let cache = h.presentations.presentation_cache(&pres.id).unwrap().unwrap();
        assert_eq!(cache.status_label, "Shortlisted");
    }

    #[test]
    fn test_partial_materials_rejected() {
        let h = TestHarness::new();
        let alice = h.applicant("u1", "Alice");
        let p = h.technically_evaluated(&alice);
        let pres = h
            .presentations
            .create(&h.admin(), &p.id, "e1", "Eve")
            .unwrap();

        let err = h
            .presentations
            .assign_materials(&h.admin(), &pres.id, "https://example.org/v", "", "2025-06-01")
            .unwrap_err();
        assert!(matches!(err, GrantflowError::Validation(_)));

        // Nothing changed: status is still pending.
        let rows = h.presentations.list_for_proposal(&p.id).unwrap();
        assert_eq!(rows[0].status, "pending");
    }

    #[test]
    fn test_status_chain_cannot_skip() {
        let h = TestHarness::new();
        let alice = h.applicant("u1", "Alice");
        let p = h.technically_evaluated(&alice);
        let pres = h
            .presentations
            .create(&h.admin(), &p.id, "e1", "Eve")
            .unwrap();

        // Evaluating before materials are assigned is refused.
        let err = h
            .presentations
            .submit_evaluation(&h.evaluator("e1", "Eve"), &pres.id, 50.0, None)
            .unwrap_err();
        assert!(matches!(
            err,
            GrantflowError::StateConflict(StateConflictError::IllegalStatusChange { .. })
        ));

        // Final decision before evaluation is refused too.
        let err = h
            .presentations
            .record_final_decision(&h.admin(), &pres.id, PresentationStatus::Shortlisted, None)
            .unwrap_err();
        assert!(matches!(err, GrantflowError::StateConflict(_)));
    }

    #[test]
    fn test_only_assigned_evaluator_may_evaluate() {
        let h = TestHarness::new();
        let alice = h.applicant("u1", "Alice");
        let p = h.technically_evaluated(&alice);
        let pres = h
            .presentations
            .create(&h.admin(), &p.id, "e1", "Eve")
            .unwrap();
        h.presentations
            .assign_materials(
                &h.admin(),
                &pres.id,
                "https://example.org/v",
                "/artifacts/deck.pdf",
                "2025-06-01T10:00:00+00:00",
            )
            .unwrap();

        let err = h
            .presentations
            .submit_evaluation(&h.evaluator("e2", "Evan"), &pres.id, 50.0, None)
            .unwrap_err();
        assert!(matches!(err, GrantflowError::NotFound(_)));
    }

    #[test]
    fn test_delete_repairs_aggregate_cache() {
        let h = TestHarness::new();
        let alice = h.applicant("u1", "Alice");
        let p = h.technically_evaluated(&alice);
        let pres = h
            .presentations
            .create(&h.admin(), &p.id, "e1", "Eve")
            .unwrap();

        h.presentations.delete(&h.admin(), &pres.id).unwrap();

        assert!(h.presentations.presentation_cache(&pres.id).unwrap().is_none());
        let agg = h.presentations.proposal_cache(&p.id).unwrap().unwrap();
        let entries: Vec<serde_json::Value> = serde_json::from_str(&agg.entries).unwrap();
        assert!(entries.is_empty());
    }

    #[test]
    fn test_rejection_without_note_refused() {
        let h = TestHarness::new();
        let alice = h.applicant("u1", "Alice");
        let p = h.technically_evaluated(&alice);
        let pres = h
            .presentations
            .create(&h.admin(), &p.id, "e1", "Eve")
            .unwrap();

        let err = h
            .presentations
            .record_final_decision(&h.admin(), &pres.id, PresentationStatus::Rejected, None)
            .unwrap_err();
        assert!(matches!(err, GrantflowError::Validation(_)));
    }
}
