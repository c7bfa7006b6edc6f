//! Stage transition engine.
//!
//! Every stage change funnels through [`WorkflowEngine::apply_transition`]:
//! legality via [`Stage::can_transition`], the per-transition guard, the
//! stage-history append, and the audit/notification events all happen inside
//! one transaction. Post-commit side effects (PDF render, artifact write)
//! are best-effort and retried by [`WorkflowEngine::retry_pending_renders`].

use std::sync::Arc;

use chrono::{DateTime, Datelike, Utc};
use rusqlite::Transaction;
use tracing::{info, warn};
use uuid::Uuid;

use crate::artifact::ArtifactStore;
use crate::audit::{AuditAction, AuditEntry};
use crate::context::{ActorContext, ActorRole};
use crate::db::{evaluation_repo, presentation_repo, proposal_repo, template_repo, Database, DatabaseError};
use crate::error::{GrantflowError, NotFoundError, Result, StateConflictError, ValidationError};
use crate::evaluation::service::aggregate_for_proposal;
use crate::events::{EventDispatcher, PendingEvents};
use crate::notify::NotificationIntent;
use crate::proposal::format_code;
use crate::proposal::service::{label_of, load_owned};
use crate::render::{RenderBoundary, RenderInput};
use crate::workflow::Stage;

use proposal_repo::{ProposalRow, StageHistoryRow};

use crate::presentation::PresentationStatus;

#[derive(Clone)]
pub struct WorkflowEngine {
    db: Database,
    dispatcher: EventDispatcher,
    render: RenderBoundary,
    artifacts: Arc<ArtifactStore>,
    code_prefix: String,
}

impl WorkflowEngine {
    pub fn new(
        db: Database,
        dispatcher: EventDispatcher,
        render: RenderBoundary,
        artifacts: Arc<ArtifactStore>,
        code_prefix: impl Into<String>,
    ) -> Self {
        Self {
            db,
            dispatcher,
            render,
            artifacts,
            code_prefix: code_prefix.into(),
        }
    }

    /// Submits a draft: window and completeness guards, cohort uniqueness,
    /// code allocation, and the Draft -> Submitted transition, atomically.
    ///
    /// The PDF render runs after the commit; a render failure leaves the
    /// submission intact with `pdf_path` unset.
    pub fn submit(&self, ctx: &ActorContext, proposal_id: &str) -> Result<ProposalRow> {
        ctx.require_role(ActorRole::Applicant, "submit")?;

        let mut events = PendingEvents::new();
        let row = self.db.with_tx(|tx| {
            let proposal = load_owned(tx, ctx, proposal_id)?;
            let from = stage_of(&proposal)?;
            if from != Stage::Draft {
                return Err(StateConflictError::IllegalTransition {
                    from,
                    to: Stage::Submitted,
                }
                .into());
            }

            let template = template_repo::find_by_id(tx, &proposal.template_id)?.ok_or(
                NotFoundError::Entity {
                    entity: "template",
                    id: proposal.template_id.clone(),
                },
            )?;

            let now = Utc::now();
            let start = parse_ts(&template.start_date, &template.id)?;
            let end = parse_ts(&template.end_date, &template.id)?;
            if now < start {
                return Err(ValidationError::WindowNotOpen {
                    template: template.code.clone(),
                }
                .into());
            }
            if now >= end {
                return Err(ValidationError::WindowClosed {
                    template: template.code.clone(),
                }
                .into());
            }

            let sections = proposal_repo::list_sections(tx, &proposal.id)?;
            let missing: Vec<String> = template
                .required_section_names()
                .into_iter()
                .filter(|name| {
                    !sections.iter().any(|s| &s.name == name && s.completed)
                })
                .collect();
            if !missing.is_empty() {
                return Err(ValidationError::SectionsIncomplete { missing }.into());
            }

            check_cohort_uniqueness(tx, &proposal)?;

            let year = now.year();
            let seq = proposal_repo::next_code_seq(tx, &template.code, year)?;
            let code = format_code(&self.code_prefix, &template.code, year, seq);
            if !proposal_repo::assign_code(tx, &proposal.id, &code)? {
                // Unreachable from Draft, but the NULL guard is the backstop.
                return Err(StateConflictError::GuardFailed {
                    from: Stage::Draft,
                    to: Stage::Submitted,
                    reason: "proposal code already assigned".to_string(),
                }
                .into());
            }

            let mut proposal = proposal;
            proposal.code = Some(code.clone());
            let row = self.apply_transition(tx, &mut events, ctx, proposal, Stage::Submitted, None)?;

            info!(proposal_id = %row.id, code = %code, "Proposal submitted");
            Ok::<_, GrantflowError>(row)
        })?;
        self.dispatcher.dispatch(events);

        if let Err(e) = self.render_proposal(&row) {
            warn!(proposal_id = %row.id, "Post-submission render failed: {}", e);
        }

        let refreshed = self
            .db
            .with_conn(|conn| proposal_repo::find_by_id(conn, &row.id))?;
        Ok(refreshed.unwrap_or(row))
    }

    /// Submitted -> AdminScreened (or Rejected), driven by the most recent
    /// admin screening decision.
    pub fn advance_after_screening(
        &self,
        ctx: &ActorContext,
        proposal_id: &str,
    ) -> Result<ProposalRow> {
        ctx.require_role(ActorRole::Admin, "advance_after_screening")?;

        let mut events = PendingEvents::new();
        let row = self.db.with_tx(|tx| {
            let proposal = load_owned(tx, ctx, proposal_id)?;
            let screening = evaluation_repo::latest_screening(tx, &proposal.id, "admin")?;
            let (to, note) = match screening.as_ref().map(|s| s.decision.as_str()) {
                Some("shortlisted") => (Stage::AdminScreened, None),
                Some("rejected") => (
                    Stage::Rejected,
                    screening.as_ref().and_then(|s| s.remarks.clone()),
                ),
                _ => {
                    return Err(StateConflictError::GuardFailed {
                        from: stage_of(&proposal)?,
                        to: Stage::AdminScreened,
                        reason: "no admin screening decision recorded".to_string(),
                    }
                    .into())
                }
            };
            self.apply_transition(tx, &mut events, ctx, proposal, to, note.as_deref())
        })?;
        self.dispatcher.dispatch(events);
        Ok(row)
    }

    /// AdminScreened -> TechnicallyEvaluated (or Rejected), driven by the
    /// closed decision of the latest evaluation round.
    pub fn advance_after_technical(
        &self,
        ctx: &ActorContext,
        proposal_id: &str,
    ) -> Result<ProposalRow> {
        ctx.require_role(ActorRole::Admin, "advance_after_technical")?;

        let mut events = PendingEvents::new();
        let row = self.db.with_tx(|tx| {
            let proposal = load_owned(tx, ctx, proposal_id)?;
            let round = evaluation_repo::latest_round(tx, &proposal.id)?;
            let to = match round.as_ref().map(|r| r.overall_decision.as_str()) {
                Some("shortlisted") => Stage::TechnicallyEvaluated,
                Some("rejected") => Stage::Rejected,
                _ => {
                    return Err(StateConflictError::GuardFailed {
                        from: stage_of(&proposal)?,
                        to: Stage::TechnicallyEvaluated,
                        reason: "latest evaluation round is not closed".to_string(),
                    }
                    .into())
                }
            };
            self.apply_transition(tx, &mut events, ctx, proposal, to, None)
        })?;
        self.dispatcher.dispatch(events);
        Ok(row)
    }

    /// TechnicallyEvaluated -> Presented once at least one presentation has
    /// reached its final decision.
    pub fn advance_after_presentation(
        &self,
        ctx: &ActorContext,
        proposal_id: &str,
    ) -> Result<ProposalRow> {
        ctx.require_role(ActorRole::Admin, "advance_after_presentation")?;

        let mut events = PendingEvents::new();
        let row = self.db.with_tx(|tx| {
            let proposal = load_owned(tx, ctx, proposal_id)?;
            let decided = presentation_repo::list_by_proposal(tx, &proposal.id)?
                .iter()
                .any(|p| {
                    matches!(
                        PresentationStatus::parse(&p.status),
                        Some(PresentationStatus::Shortlisted) | Some(PresentationStatus::Rejected)
                    )
                });
            if !decided {
                return Err(StateConflictError::GuardFailed {
                    from: stage_of(&proposal)?,
                    to: Stage::Presented,
                    reason: "no presentation has a final decision".to_string(),
                }
                .into());
            }
            self.apply_transition(tx, &mut events, ctx, proposal, Stage::Presented, None)
        })?;
        self.dispatcher.dispatch(events);
        Ok(row)
    }

    /// Presented -> Approved when a presentation was shortlisted and the
    /// aggregate evaluation score clears the template cutoff (when one is
    /// configured); Presented -> Rejected otherwise.
    pub fn finalize(&self, ctx: &ActorContext, proposal_id: &str) -> Result<ProposalRow> {
        ctx.require_role(ActorRole::Admin, "finalize")?;

        let mut events = PendingEvents::new();
        let row = self.db.with_tx(|tx| {
            let proposal = load_owned(tx, ctx, proposal_id)?;
            let presentations = presentation_repo::list_by_proposal(tx, &proposal.id)?;

            let shortlisted = presentations
                .iter()
                .any(|p| p.status == PresentationStatus::Shortlisted.as_str());
            let score = aggregate_for_proposal(tx, &proposal.id)?;
            let cutoff = evaluation_repo::find_cutoff(tx, &proposal.template_id)?;

            let clears_cutoff = match cutoff {
                None => true,
                Some(min) => score.map_or(false, |s| s >= min),
            };

            let (to, note) = if shortlisted && clears_cutoff {
                (Stage::Approved, None)
            } else if !shortlisted {
                (Stage::Rejected, Some("no shortlisted presentation".to_string()))
            } else {
                (
                    Stage::Rejected,
                    Some(format!(
                        "aggregate evaluation score {:.2} below cutoff {:.2}",
                        score.unwrap_or(0.0),
                        cutoff.unwrap_or(0.0)
                    )),
                )
            };
            self.apply_transition(tx, &mut events, ctx, proposal, to, note.as_deref())
        })?;
        self.dispatcher.dispatch(events);
        Ok(row)
    }

    /// Admin short-circuit to Rejected from any intermediate stage. The
    /// rejection note is mandatory; it lands in the stage history.
    pub fn reject(&self, ctx: &ActorContext, proposal_id: &str, note: &str) -> Result<ProposalRow> {
        ctx.require_role(ActorRole::Admin, "reject")?;
        if note.trim().is_empty() {
            return Err(ValidationError::Field {
                field: "note",
                message: "a rejection note is required".to_string(),
            }
            .into());
        }

        let mut events = PendingEvents::new();
        let row = self.db.with_tx(|tx| {
            let proposal = load_owned(tx, ctx, proposal_id)?;
            self.apply_transition(tx, &mut events, ctx, proposal, Stage::Rejected, Some(note))
        })?;
        self.dispatcher.dispatch(events);
        Ok(row)
    }

    /// Re-renders every submitted proposal whose PDF never landed. Returns
    /// the number of successful renders.
    pub fn retry_pending_renders(&self) -> Result<usize> {
        let pending = self
            .db
            .with_conn(proposal_repo::list_pending_renders)?;
        let mut rendered = 0;
        for row in pending {
            match self.render_proposal(&row) {
                Ok(()) => rendered += 1,
                Err(e) => warn!(proposal_id = %row.id, "Render retry failed: {}", e),
            }
        }
        Ok(rendered)
    }

    // ── Internals ──

    /// The single funnel for stage changes. Legality check, stage write,
    /// history append, audit entry, and applicant notification, all inside
    /// the caller's transaction.
    fn apply_transition(
        &self,
        tx: &Transaction<'_>,
        events: &mut PendingEvents,
        ctx: &ActorContext,
        mut proposal: ProposalRow,
        to: Stage,
        note: Option<&str>,
    ) -> Result<ProposalRow> {
        let from = stage_of(&proposal)?;
        if !from.can_transition(to) {
            return Err(StateConflictError::IllegalTransition { from, to }.into());
        }

        let now = Utc::now().to_rfc3339();
        proposal_repo::update_stage(tx, &proposal.id, to.as_str(), &now)?;
        proposal_repo::insert_stage_history(
            tx,
            &StageHistoryRow {
                id: Uuid::new_v4().to_string(),
                proposal_id: proposal.id.clone(),
                from_stage: Some(from.as_str().to_string()),
                to_stage: to.as_str().to_string(),
                actor_id: ctx.actor_id.clone(),
                actor_name: ctx.display_name.clone(),
                note: note.map(str::to_string),
                changed_at: now.clone(),
            },
        )?;

        proposal.stage = to.as_str().to_string();
        proposal.updated_at = now;

        events.push_audit(AuditEntry::new(
            ctx,
            AuditAction::Update,
            "proposal",
            proposal.id.clone(),
            label_of(&proposal),
            serde_json::json!({
                "from_stage": from.as_str(),
                "to_stage": to.as_str(),
                "note": note,
            }),
        ));
        events.push_notification(NotificationIntent {
            event_id: format!("proposal:{}:{}", proposal.id, to.as_str()),
            user_id: proposal.applicant_id.clone(),
            email: Some(proposal.applicant_email.clone()),
            subject: format!("Proposal {} update", label_of(&proposal)),
            message: match note {
                Some(note) => format!("Your proposal moved to {}: {}", to, note),
                None => format!("Your proposal moved to {}", to),
            },
            notification_type: "stage_change".to_string(),
        });

        Ok(proposal)
    }

    /// Renders the proposal document and records the artifact path.
    fn render_proposal(&self, proposal: &ProposalRow) -> Result<()> {
        let (template, sections) = self.db.with_conn(|conn| {
            let template = template_repo::find_by_id(conn, &proposal.template_id)?;
            let sections = proposal_repo::list_sections(conn, &proposal.id)?;
            Ok((template, sections))
        })?;
        let template = template.ok_or(NotFoundError::Entity {
            entity: "template",
            id: proposal.template_id.clone(),
        })?;

        let input = RenderInput {
            proposal_code: label_of(proposal),
            applicant_name: proposal.applicant_name.clone(),
            template_title: template.title.clone(),
            sections: sections
                .into_iter()
                .map(|s| {
                    let payload =
                        serde_json::from_str(&s.payload).unwrap_or(serde_json::Value::Null);
                    (s.name, payload)
                })
                .collect(),
        };

        let bytes = self.render.render(input)?;

        let code_or_draft = proposal.code.as_deref().unwrap_or("draft");
        let path = self.artifacts.store(
            "proposals",
            &template.code,
            code_or_draft,
            "proposal.pdf",
            &bytes,
        )?;

        self.db.with_conn(|conn| {
            proposal_repo::set_pdf_path(conn, &proposal.id, &path.to_string_lossy())
        })?;
        Ok(())
    }
}

/// Parses the stage column back into its enum.
pub(crate) fn stage_of(proposal: &ProposalRow) -> Result<Stage> {
    Stage::parse(&proposal.stage).ok_or_else(|| {
        DatabaseError::CorruptEnum {
            what: "stage",
            value: proposal.stage.clone(),
            id: proposal.id.clone(),
        }
        .into()
    })
}

/// Parses a stored RFC3339 timestamp; offsets are normalized to UTC so
/// every caller compares instants, never strings.
pub(crate) fn parse_ts(value: &str, id: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| {
            DatabaseError::CorruptEnum {
                what: "timestamp",
                value: value.to_string(),
                id: id.to_string(),
            }
            .into()
        })
}

/// Cohort uniqueness gate: among *submitted* proposals in the same cohort,
/// no two may declare the same organization (by case-insensitive name or by
/// normalized registration number).
fn check_cohort_uniqueness(tx: &Transaction<'_>, proposal: &ProposalRow) -> Result<()> {
    let mine = proposal_repo::list_collaborators(tx, &proposal.id)?;
    if mine.is_empty() {
        return Ok(());
    }
    let others = proposal_repo::list_cohort_collaborators(tx, &proposal.cohort, &proposal.id)?;

    for c in &mine {
        let name_key = c.organization_name.trim().to_lowercase();
        for other in &others {
            if other.organization_name.trim().to_lowercase() == name_key {
                return Err(ValidationError::CohortDuplicate {
                    field: "organization_name",
                    value: c.organization_name.clone(),
                    cohort: proposal.cohort.clone(),
                }
                .into());
            }
            if other.registration_no == c.registration_no {
                return Err(ValidationError::CohortDuplicate {
                    field: "registration_no",
                    value: c.registration_no.clone(),
                    cohort: proposal.cohort.clone(),
                }
                .into());
            }
        }
    }
    Ok(())
}
