//! Finance chain service.
//!
//! Strict ordering: a claim needs an approved request, a sanction needs an
//! approved claim. Claim shape depends on the milestone's ordinal:
//!   1st milestone  — advance payment, no penalty or adjustment
//!   2nd milestone  — no advance, no adjustment
//!   3rd and later  — all fields free

use chrono::Utc;
use rusqlite::Transaction;
use uuid::Uuid;

use crate::audit::{AuditAction, AuditEntry};
use crate::context::{ActorContext, ActorRole};
use crate::db::{finance_repo, milestone_repo, Database};
use crate::error::{GrantflowError, NotFoundError, Result, StateConflictError, ValidationError};
use crate::events::{EventDispatcher, PendingEvents};
use crate::milestone::service::ordinal_of;

use finance_repo::{ClaimRow, RequestRow, SanctionRow};

use super::ReviewStatus;

/// Fields an applicant supplies when raising a payment claim.
#[derive(Debug, Clone)]
pub struct ClaimInput {
    /// Exactly one of `milestone_id` / `sub_milestone_id` must be set.
    pub milestone_id: Option<String>,
    pub sub_milestone_id: Option<String>,
    pub amount: f64,
    pub advance_payment: bool,
    pub penalty: f64,
    pub adjustment: f64,
}

#[derive(Clone)]
pub struct FinanceService {
    db: Database,
    dispatcher: EventDispatcher,
}

impl FinanceService {
    pub fn new(db: Database, dispatcher: EventDispatcher) -> Self {
        Self { db, dispatcher }
    }

    /// Opens the chain: a funding request against a milestone.
    pub fn create_request(
        &self,
        ctx: &ActorContext,
        milestone_id: &str,
        amount: f64,
    ) -> Result<RequestRow> {
        ctx.require_role(ActorRole::Applicant, "create_finance_request")?;
        validate_amount(amount, "amount")?;

        let mut events = PendingEvents::new();
        let row = self.db.with_tx(|tx| {
            let milestone = milestone_repo::find_by_id(tx, milestone_id)?.ok_or(
                NotFoundError::Entity {
                    entity: "milestone",
                    id: milestone_id.to_string(),
                },
            )?;

            let row = RequestRow {
                id: Uuid::new_v4().to_string(),
                milestone_id: milestone.id.clone(),
                amount,
                status: ReviewStatus::PendingReview.as_str().to_string(),
                remark: None,
                reviewed_by: None,
                reviewed_at: None,
                created_at: Utc::now().to_rfc3339(),
            };
            finance_repo::insert_request(tx, &row)?;

            events.push_audit(AuditEntry::new(
                ctx,
                AuditAction::Create,
                "finance_request",
                row.id.clone(),
                milestone.title.clone(),
                serde_json::json!({ "amount": amount }),
            ));
            Ok::<_, GrantflowError>(row)
        })?;
        self.dispatcher.dispatch(events);
        Ok(row)
    }

    /// First-tier review. Only pending requests can be decided; a rejection
    /// must carry a remark.
    pub fn review_request(
        &self,
        ctx: &ActorContext,
        request_id: &str,
        approve: bool,
        remark: Option<&str>,
    ) -> Result<RequestRow> {
        ctx.require_role(ActorRole::ImplementationReviewer, "review_finance_request")?;
        require_rejection_remark(approve, remark)?;

        let mut events = PendingEvents::new();
        let row = self.db.with_tx(|tx| {
            let mut row = find_request(tx, request_id)?;
            require_pending("finance_request", &row.status, approve)?;

            let status = decided(approve);
            let now = Utc::now().to_rfc3339();
            finance_repo::review_request(tx, &row.id, status.as_str(), remark, &ctx.actor_id, &now)?;
            row.status = status.as_str().to_string();
            row.remark = remark.map(str::to_string);
            row.reviewed_by = Some(ctx.actor_id.clone());
            row.reviewed_at = Some(now);

            events.push_audit(AuditEntry::new(
                ctx,
                AuditAction::Update,
                "finance_request",
                row.id.clone(),
                row.milestone_id.clone(),
                serde_json::json!({ "status": row.status, "remark": row.remark }),
            ));
            Ok::<_, GrantflowError>(row)
        })?;
        self.dispatcher.dispatch(events);
        Ok(row)
    }

    /// Raises a payment claim under an approved request. The claim must
    /// reference exactly one of milestone / sub-milestone, the reference
    /// must belong to the request's milestone, and the claim shape must
    /// satisfy the milestone-ordinal rules.
    pub fn raise_claim(
        &self,
        ctx: &ActorContext,
        request_id: &str,
        input: ClaimInput,
    ) -> Result<ClaimRow> {
        ctx.require_role(ActorRole::Applicant, "raise_claim")?;
        validate_amount(input.amount, "amount")?;
        if input.penalty < 0.0 || input.adjustment < 0.0 {
            return Err(ValidationError::Field {
                field: "penalty",
                message: "penalty and adjustment must be non-negative".to_string(),
            }
            .into());
        }
        if input.milestone_id.is_some() == input.sub_milestone_id.is_some() {
            return Err(ValidationError::ExclusiveReference.into());
        }

        let mut events = PendingEvents::new();
        let row = self.db.with_tx(|tx| {
            let request = find_request(tx, request_id)?;
            if request.status != ReviewStatus::Approved.as_str() {
                return Err(StateConflictError::RequestNotApproved {
                    request: request.id.clone(),
                }
                .into());
            }

            // The claimed reference must sit under the request's milestone.
            if let Some(ref mid) = input.milestone_id {
                if *mid != request.milestone_id {
                    return Err(ValidationError::Field {
                        field: "milestone_id",
                        message: "claim references a different milestone than its request"
                            .to_string(),
                    }
                    .into());
                }
            }
            if let Some(ref sid) = input.sub_milestone_id {
                let sub = milestone_repo::find_sub_by_id(tx, sid)?.ok_or(
                    NotFoundError::Entity {
                        entity: "sub_milestone",
                        id: sid.clone(),
                    },
                )?;
                if sub.milestone_id != request.milestone_id {
                    return Err(ValidationError::Field {
                        field: "sub_milestone_id",
                        message: "claim references a sub-milestone outside its request"
                            .to_string(),
                    }
                    .into());
                }
            }

            let milestone = milestone_repo::find_by_id(tx, &request.milestone_id)?.ok_or(
                NotFoundError::Entity {
                    entity: "milestone",
                    id: request.milestone_id.clone(),
                },
            )?;
            let ordinal = ordinal_of(tx, &milestone)?;
            check_ordinal_rules(ordinal, &input)?;

            let row = ClaimRow {
                id: Uuid::new_v4().to_string(),
                request_id: request.id.clone(),
                milestone_id: input.milestone_id.clone(),
                sub_milestone_id: input.sub_milestone_id.clone(),
                amount: input.amount,
                advance_payment: input.advance_payment,
                penalty: input.penalty,
                adjustment: input.adjustment,
                status: ReviewStatus::PendingReview.as_str().to_string(),
                remark: None,
                reviewed_by: None,
                reviewed_at: None,
                created_at: Utc::now().to_rfc3339(),
            };
            finance_repo::insert_claim(tx, &row)?;

            events.push_audit(AuditEntry::new(
                ctx,
                AuditAction::Create,
                "payment_claim",
                row.id.clone(),
                milestone.title.clone(),
                serde_json::json!({
                    "amount": row.amount,
                    "advance_payment": row.advance_payment,
                    "penalty": row.penalty,
                    "adjustment": row.adjustment,
                }),
            ));
            Ok::<_, GrantflowError>(row)
        })?;
        self.dispatcher.dispatch(events);
        Ok(row)
    }

    /// Second-tier review, by the finance reviewer.
    pub fn review_claim(
        &self,
        ctx: &ActorContext,
        claim_id: &str,
        approve: bool,
        remark: Option<&str>,
    ) -> Result<ClaimRow> {
        ctx.require_role(ActorRole::FinanceReviewer, "review_claim")?;
        require_rejection_remark(approve, remark)?;

        let mut events = PendingEvents::new();
        let row = self.db.with_tx(|tx| {
            let mut row = find_claim(tx, claim_id)?;
            require_pending("payment_claim", &row.status, approve)?;

            let status = decided(approve);
            let now = Utc::now().to_rfc3339();
            finance_repo::review_claim(tx, &row.id, status.as_str(), remark, &ctx.actor_id, &now)?;
            row.status = status.as_str().to_string();
            row.remark = remark.map(str::to_string);
            row.reviewed_by = Some(ctx.actor_id.clone());
            row.reviewed_at = Some(now);

            events.push_audit(AuditEntry::new(
                ctx,
                AuditAction::Update,
                "payment_claim",
                row.id.clone(),
                row.request_id.clone(),
                serde_json::json!({ "status": row.status, "remark": row.remark }),
            ));
            Ok::<_, GrantflowError>(row)
        })?;
        self.dispatcher.dispatch(events);
        Ok(row)
    }

    /// Creates the final tier against an approved claim.
    pub fn create_sanction(
        &self,
        ctx: &ActorContext,
        claim_id: &str,
        amount: f64,
    ) -> Result<SanctionRow> {
        ctx.require_role(ActorRole::SanctioningOfficer, "create_sanction")?;
        validate_amount(amount, "amount")?;

        let mut events = PendingEvents::new();
        let row = self.db.with_tx(|tx| {
            let claim = find_claim(tx, claim_id)?;
            if claim.status != ReviewStatus::Approved.as_str() {
                return Err(StateConflictError::ClaimNotApproved {
                    claim: claim.id.clone(),
                }
                .into());
            }

            let row = SanctionRow {
                id: Uuid::new_v4().to_string(),
                claim_id: claim.id.clone(),
                amount,
                status: ReviewStatus::PendingReview.as_str().to_string(),
                remark: None,
                sanctioned_by: None,
                sanctioned_at: None,
                created_at: Utc::now().to_rfc3339(),
            };
            finance_repo::insert_sanction(tx, &row)?;

            events.push_audit(AuditEntry::new(
                ctx,
                AuditAction::Create,
                "finance_sanction",
                row.id.clone(),
                claim.id.clone(),
                serde_json::json!({ "amount": amount }),
            ));
            Ok::<_, GrantflowError>(row)
        })?;
        self.dispatcher.dispatch(events);
        Ok(row)
    }

    /// Final decision, stamped with the sanctioning officer's identity.
    pub fn review_sanction(
        &self,
        ctx: &ActorContext,
        sanction_id: &str,
        approve: bool,
        remark: Option<&str>,
    ) -> Result<SanctionRow> {
        ctx.require_role(ActorRole::SanctioningOfficer, "review_sanction")?;
        require_rejection_remark(approve, remark)?;

        let mut events = PendingEvents::new();
        let row = self.db.with_tx(|tx| {
            let mut row = finance_repo::find_sanction(tx, sanction_id)?.ok_or(
                NotFoundError::Entity {
                    entity: "finance_sanction",
                    id: sanction_id.to_string(),
                },
            )?;
            require_pending("finance_sanction", &row.status, approve)?;

            let status = decided(approve);
            let now = Utc::now().to_rfc3339();
            finance_repo::review_sanction(tx, &row.id, status.as_str(), remark, &ctx.actor_id, &now)?;
            row.status = status.as_str().to_string();
            row.remark = remark.map(str::to_string);
            row.sanctioned_by = Some(ctx.actor_id.clone());
            row.sanctioned_at = Some(now);

            events.push_audit(AuditEntry::new(
                ctx,
                AuditAction::Update,
                "finance_sanction",
                row.id.clone(),
                row.claim_id.clone(),
                serde_json::json!({ "status": row.status, "remark": row.remark }),
            ));
            Ok::<_, GrantflowError>(row)
        })?;
        self.dispatcher.dispatch(events);
        Ok(row)
    }

    pub fn claims_for_milestone(&self, milestone_id: &str) -> Result<Vec<ClaimRow>> {
        Ok(self
            .db
            .with_conn(|conn| finance_repo::list_claims_for_milestone(conn, milestone_id))?)
    }
}

/// Ordinal rules for claim shape. Violations name the offending field.
fn check_ordinal_rules(ordinal: usize, input: &ClaimInput) -> Result<()> {
    match ordinal {
        1 => {
            if !input.advance_payment {
                return Err(ValidationError::Field {
                    field: "advance_payment",
                    message: "first-milestone claims are advance payments".to_string(),
                }
                .into());
            }
            if input.penalty != 0.0 {
                return Err(ValidationError::Field {
                    field: "penalty",
                    message: "first-milestone claims carry no penalty".to_string(),
                }
                .into());
            }
            if input.adjustment != 0.0 {
                return Err(ValidationError::Field {
                    field: "adjustment",
                    message: "first-milestone claims carry no adjustment".to_string(),
                }
                .into());
            }
        }
        2 => {
            if input.advance_payment {
                return Err(ValidationError::Field {
                    field: "advance_payment",
                    message: "second-milestone claims are not advance payments".to_string(),
                }
                .into());
            }
            if input.adjustment != 0.0 {
                return Err(ValidationError::Field {
                    field: "adjustment",
                    message: "second-milestone claims carry no adjustment".to_string(),
                }
                .into());
            }
        }
        _ => {}
    }
    Ok(())
}

fn decided(approve: bool) -> ReviewStatus {
    if approve {
        ReviewStatus::Approved
    } else {
        ReviewStatus::Rejected
    }
}

fn require_rejection_remark(approve: bool, remark: Option<&str>) -> Result<()> {
    if !approve && remark.map_or(true, |r| r.trim().is_empty()) {
        return Err(ValidationError::Field {
            field: "remark",
            message: "a rejection must carry a remark".to_string(),
        }
        .into());
    }
    Ok(())
}

fn require_pending(entity: &'static str, status: &str, approve: bool) -> Result<()> {
    if status == ReviewStatus::PendingReview.as_str() {
        Ok(())
    } else {
        Err(StateConflictError::IllegalStatusChange {
            entity,
            from: status.to_string(),
            to: decided(approve).as_str().to_string(),
        }
        .into())
    }
}

fn find_request(tx: &Transaction<'_>, id: &str) -> Result<RequestRow> {
    finance_repo::find_request(tx, id)?.ok_or(
        NotFoundError::Entity {
            entity: "finance_request",
            id: id.to_string(),
        }
        .into(),
    )
}

fn find_claim(tx: &Transaction<'_>, id: &str) -> Result<ClaimRow> {
    finance_repo::find_claim(tx, id)?.ok_or(
        NotFoundError::Entity {
            entity: "payment_claim",
            id: id.to_string(),
        }
        .into(),
    )
}

fn validate_amount(amount: f64, field: &'static str) -> Result<()> {
    if amount.is_finite() && amount > 0.0 {
        Ok(())
    } else {
        Err(ValidationError::Field {
            field,
            message: format!("amount {} must be positive", amount),
        }
        .into())
    }
}
