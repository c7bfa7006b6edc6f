//! Screening records, evaluation rounds, and cutoff management.
//!
//! A round aggregates per-criterion marks from multiple evaluators; closing
//! it records the overall decision the workflow engine acts on.

use chrono::Utc;
use rusqlite::Transaction;
use uuid::Uuid;

use crate::audit::{AuditAction, AuditEntry};
use crate::context::{ActorContext, ActorRole};
use crate::db::{evaluation_repo, Database};
use crate::error::{GrantflowError, NotFoundError, Result, StateConflictError, ValidationError};
use crate::events::{EventDispatcher, PendingEvents};
use crate::proposal::service::load_owned;
use crate::workflow::engine::stage_of;
use crate::workflow::Stage;

use evaluation_repo::{CriteriaRow, RoundRow, ScreeningRow};

use super::{ScreeningDecision, ScreeningKind};

#[derive(Clone)]
pub struct EvaluationService {
    db: Database,
    dispatcher: EventDispatcher,
}

impl EvaluationService {
    pub fn new(db: Database, dispatcher: EventDispatcher) -> Self {
        Self { db, dispatcher }
    }

    /// Records a screening decision. Admin screenings require the Admin role
    /// and a Submitted proposal; technical screenings require the Evaluator
    /// role and an AdminScreened proposal. A rejection must carry remarks.
    pub fn record_screening(
        &self,
        ctx: &ActorContext,
        proposal_id: &str,
        kind: ScreeningKind,
        decision: ScreeningDecision,
        remarks: Option<&str>,
    ) -> Result<ScreeningRow> {
        match kind {
            ScreeningKind::Admin => ctx.require_role(ActorRole::Admin, "record_screening")?,
            ScreeningKind::Technical => {
                ctx.require_role(ActorRole::Evaluator, "record_screening")?
            }
        }
        if decision == ScreeningDecision::Rejected
            && remarks.map_or(true, |r| r.trim().is_empty())
        {
            return Err(ValidationError::Field {
                field: "remarks",
                message: "a rejection must carry remarks".to_string(),
            }
            .into());
        }

        let mut events = PendingEvents::new();
        let row = self.db.with_tx(|tx| {
            let proposal = load_owned(tx, ctx, proposal_id)?;
            let stage = stage_of(&proposal)?;
            let expected = match kind {
                ScreeningKind::Admin => Stage::Submitted,
                ScreeningKind::Technical => Stage::AdminScreened,
            };
            if stage != expected {
                return Err(StateConflictError::GuardFailed {
                    from: stage,
                    to: expected,
                    reason: format!("{} screening requires stage {}", kind.as_str(), expected),
                }
                .into());
            }

            let row = ScreeningRow {
                id: Uuid::new_v4().to_string(),
                proposal_id: proposal.id.clone(),
                kind: kind.as_str().to_string(),
                decision: decision.as_str().to_string(),
                remarks: remarks.map(str::to_string),
                reviewer_id: ctx.actor_id.clone(),
                reviewer_name: ctx.display_name.clone(),
                created_at: Utc::now().to_rfc3339(),
            };
            evaluation_repo::insert_screening(tx, &row)?;

            events.push_audit(AuditEntry::new(
                ctx,
                AuditAction::Create,
                "screening_record",
                row.id.clone(),
                proposal.code.clone().unwrap_or_else(|| proposal.id.clone()),
                serde_json::json!({
                    "kind": row.kind,
                    "decision": row.decision,
                    "remarks": row.remarks,
                }),
            ));
            Ok::<_, GrantflowError>(row)
        })?;
        self.dispatcher.dispatch(events);
        Ok(row)
    }

    /// Opens a new evaluation round for an AdminScreened proposal.
    pub fn open_round(&self, ctx: &ActorContext, proposal_id: &str) -> Result<RoundRow> {
        ctx.require_role(ActorRole::Admin, "open_round")?;

        let mut events = PendingEvents::new();
        let row = self.db.with_tx(|tx| {
            let proposal = load_owned(tx, ctx, proposal_id)?;
            let stage = stage_of(&proposal)?;
            if stage != Stage::AdminScreened {
                return Err(StateConflictError::GuardFailed {
                    from: stage,
                    to: Stage::TechnicallyEvaluated,
                    reason: "evaluation rounds open at stage admin_screened".to_string(),
                }
                .into());
            }

            let row = RoundRow {
                id: Uuid::new_v4().to_string(),
                proposal_id: proposal.id.clone(),
                overall_decision: "pending".to_string(),
                created_at: Utc::now().to_rfc3339(),
                closed_at: None,
            };
            evaluation_repo::insert_round(tx, &row)?;

            events.push_audit(AuditEntry::new(
                ctx,
                AuditAction::Create,
                "evaluation_round",
                row.id.clone(),
                proposal.code.clone().unwrap_or_else(|| proposal.id.clone()),
                serde_json::json!({ "overall_decision": "pending" }),
            ));
            Ok::<_, GrantflowError>(row)
        })?;
        self.dispatcher.dispatch(events);
        Ok(row)
    }

    /// Records (or revises) one evaluator's marks for one criterion. Marks
    /// for a closed round are refused.
    pub fn record_criteria_marks(
        &self,
        ctx: &ActorContext,
        round_id: &str,
        criterion: &str,
        marks: f64,
        remarks: Option<&str>,
    ) -> Result<()> {
        ctx.require_role(ActorRole::Evaluator, "record_criteria_marks")?;
        if !(0.0..=100.0).contains(&marks) {
            return Err(ValidationError::Field {
                field: "marks",
                message: format!("marks {} outside 0..=100", marks),
            }
            .into());
        }

        let mut events = PendingEvents::new();
        self.db.with_tx(|tx| {
            let round = find_open_round(tx, round_id)?;

            evaluation_repo::upsert_criteria(
                tx,
                &CriteriaRow {
                    id: Uuid::new_v4().to_string(),
                    round_id: round.id.clone(),
                    evaluator_id: ctx.actor_id.clone(),
                    criterion: criterion.to_string(),
                    marks,
                    remarks: remarks.map(str::to_string),
                    created_at: Utc::now().to_rfc3339(),
                },
            )?;

            events.push_audit(AuditEntry::new(
                ctx,
                AuditAction::Update,
                "criteria_evaluation",
                format!("{}:{}:{}", round.id, ctx.actor_id, criterion),
                round.proposal_id.clone(),
                serde_json::json!({ "criterion": criterion, "marks": marks }),
            ));
            Ok::<_, GrantflowError>(())
        })?;
        self.dispatcher.dispatch(events);
        Ok(())
    }

    /// Closes a round with its overall decision. A closed round is final.
    pub fn close_round(
        &self,
        ctx: &ActorContext,
        round_id: &str,
        decision: ScreeningDecision,
    ) -> Result<RoundRow> {
        ctx.require_role(ActorRole::Admin, "close_round")?;

        let mut events = PendingEvents::new();
        let row = self.db.with_tx(|tx| {
            let mut round = find_open_round(tx, round_id)?;

            let now = Utc::now().to_rfc3339();
            evaluation_repo::close_round(tx, &round.id, decision.as_str(), &now)?;
            round.overall_decision = decision.as_str().to_string();
            round.closed_at = Some(now);

            events.push_audit(AuditEntry::new(
                ctx,
                AuditAction::Update,
                "evaluation_round",
                round.id.clone(),
                round.proposal_id.clone(),
                serde_json::json!({ "overall_decision": round.overall_decision }),
            ));
            Ok::<_, GrantflowError>(round)
        })?;
        self.dispatcher.dispatch(events);
        Ok(row)
    }

    /// Mean of per-evaluator totals in the latest round, or `None` when no
    /// marks exist yet.
    pub fn aggregate_score(&self, proposal_id: &str) -> Result<Option<f64>> {
        self.db.with_tx(|tx| aggregate_for_proposal(tx, proposal_id))
    }

    pub fn set_cutoff(&self, ctx: &ActorContext, template_id: &str, min_score: f64) -> Result<()> {
        ctx.require_role(ActorRole::Admin, "set_cutoff")?;
        if min_score < 0.0 {
            return Err(ValidationError::Field {
                field: "min_score",
                message: "cutoff must be non-negative".to_string(),
            }
            .into());
        }

        let mut events = PendingEvents::new();
        self.db.with_tx(|tx| {
            evaluation_repo::set_cutoff(tx, template_id, min_score)?;
            events.push_audit(AuditEntry::new(
                ctx,
                AuditAction::Update,
                "evaluation_cutoff",
                template_id,
                template_id,
                serde_json::json!({ "min_score": min_score }),
            ));
            Ok::<_, GrantflowError>(())
        })?;
        self.dispatcher.dispatch(events);
        Ok(())
    }

    pub fn get_cutoff(&self, template_id: &str) -> Result<Option<f64>> {
        Ok(self
            .db
            .with_conn(|conn| evaluation_repo::find_cutoff(conn, template_id))?)
    }
}

/// Mean of per-evaluator criterion totals in the proposal's latest round.
/// Shared with the workflow engine, which compares it against the template
/// cutoff inside the finalization transaction.
pub(crate) fn aggregate_for_proposal(
    conn: &rusqlite::Connection,
    proposal_id: &str,
) -> Result<Option<f64>> {
    let round = match evaluation_repo::latest_round(conn, proposal_id)? {
        Some(r) => r,
        None => return Ok(None),
    };
    let criteria = evaluation_repo::list_criteria_for_round(conn, &round.id)?;
    if criteria.is_empty() {
        return Ok(None);
    }

    let mut totals: std::collections::BTreeMap<String, f64> = std::collections::BTreeMap::new();
    for c in &criteria {
        *totals.entry(c.evaluator_id.clone()).or_insert(0.0) += c.marks;
    }
    let mean = totals.values().sum::<f64>() / totals.len() as f64;
    Ok(Some(mean))
}

fn find_open_round(tx: &Transaction<'_>, round_id: &str) -> Result<RoundRow> {
    let round = evaluation_repo::find_round(tx, round_id)?.ok_or(NotFoundError::Entity {
        entity: "evaluation_round",
        id: round_id.to_string(),
    })?;
    if round.closed_at.is_some() {
        return Err(StateConflictError::IllegalStatusChange {
            entity: "evaluation_round",
            from: round.overall_decision.clone(),
            to: "open".to_string(),
        }
        .into());
    }
    Ok(round)
}
