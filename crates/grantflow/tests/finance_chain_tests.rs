//! Integration tests for the post-approval side: milestones, milestone
//! documents, and the request -> claim -> sanction finance chain.

mod common;

use common::TestHarness;
use grantflow::context::ActorContext;
use grantflow::error::{GrantflowError, StateConflictError, ValidationError};
use grantflow::finance::service::ClaimInput;
use grantflow::finance::ReviewStatus;
use grantflow::milestone::DocumentCategory;

/// A well-formed first-milestone claim referencing `milestone_id`.
fn advance_claim(milestone_id: &str, amount: f64) -> ClaimInput {
    ClaimInput {
        milestone_id: Some(milestone_id.to_string()),
        sub_milestone_id: None,
        amount,
        advance_payment: true,
        penalty: 0.0,
        adjustment: 0.0,
    }
}

/// Approved proposal with one milestone, ready for finance activity.
fn setup(h: &TestHarness) -> (ActorContext, String, String) {
    let alice = h.applicant("u1", "Alice");
    let p = h.approved(&alice);
    let m = h
        .milestones
        .create(&alice, &p.id, "Phase one", 50_000.0, None, None)
        .unwrap();
    (alice, p.id, m.id)
}

fn field_of(err: GrantflowError) -> Option<&'static str> {
    match err {
        GrantflowError::Validation(v) => v.field(),
        other => panic!("expected validation error, got {}", other),
    }
}

#[test]
fn full_chain_reaches_an_approved_sanction() {
    let h = TestHarness::new();
    let (alice, _proposal, milestone) = setup(&h);

    let request = h.finance.create_request(&alice, &milestone, 50_000.0).unwrap();
    assert_eq!(request.status, ReviewStatus::PendingReview.as_str());

    let request = h
        .finance
        .review_request(&h.implementation_reviewer(), &request.id, true, None)
        .unwrap();
    assert_eq!(request.status, ReviewStatus::Approved.as_str());

    let claim = h
        .finance
        .raise_claim(&alice, &request.id, advance_claim(&milestone, 25_000.0))
        .unwrap();
    let claim = h
        .finance
        .review_claim(&h.finance_reviewer(), &claim.id, true, None)
        .unwrap();
    assert_eq!(claim.status, ReviewStatus::Approved.as_str());

    let officer = h.sanctioning_officer();
    let sanction = h.finance.create_sanction(&officer, &claim.id, 25_000.0).unwrap();
    let sanction = h
        .finance
        .review_sanction(&officer, &sanction.id, true, None)
        .unwrap();
    assert_eq!(sanction.status, ReviewStatus::Approved.as_str());
    assert_eq!(sanction.sanctioned_by.as_deref(), Some("sanc-1"));
    assert!(sanction.sanctioned_at.is_some());

    let claims = h.finance.claims_for_milestone(&milestone).unwrap();
    assert_eq!(claims.len(), 1);
}

#[test]
fn claim_needs_an_approved_request() {
    let h = TestHarness::new();
    let (alice, _proposal, milestone) = setup(&h);

    let request = h.finance.create_request(&alice, &milestone, 10_000.0).unwrap();
    assert!(matches!(
        h.finance
            .raise_claim(&alice, &request.id, advance_claim(&milestone, 5_000.0))
            .unwrap_err(),
        GrantflowError::StateConflict(StateConflictError::RequestNotApproved { .. })
    ));

    // A rejected request is no better than a pending one.
    let request = h
        .finance
        .review_request(&h.implementation_reviewer(), &request.id, false, Some("over budget"))
        .unwrap();
    assert_eq!(request.status, ReviewStatus::Rejected.as_str());
    assert!(h
        .finance
        .raise_claim(&alice, &request.id, advance_claim(&milestone, 5_000.0))
        .is_err());
}

#[test]
fn sanction_needs_an_approved_claim() {
    let h = TestHarness::new();
    let (alice, _proposal, milestone) = setup(&h);

    let request = h.finance.create_request(&alice, &milestone, 10_000.0).unwrap();
    h.finance
        .review_request(&h.implementation_reviewer(), &request.id, true, None)
        .unwrap();
    let claim = h
        .finance
        .raise_claim(&alice, &request.id, advance_claim(&milestone, 5_000.0))
        .unwrap();

    assert!(matches!(
        h.finance
            .create_sanction(&h.sanctioning_officer(), &claim.id, 5_000.0)
            .unwrap_err(),
        GrantflowError::StateConflict(StateConflictError::ClaimNotApproved { .. })
    ));
}

#[test]
fn first_milestone_claims_must_be_plain_advances() {
    let h = TestHarness::new();
    let (alice, _proposal, milestone) = setup(&h);
    let request = h.finance.create_request(&alice, &milestone, 10_000.0).unwrap();
    h.finance
        .review_request(&h.implementation_reviewer(), &request.id, true, None)
        .unwrap();

    let mut not_advance = advance_claim(&milestone, 5_000.0);
    not_advance.advance_payment = false;
    assert_eq!(
        field_of(h.finance.raise_claim(&alice, &request.id, not_advance).unwrap_err()),
        Some("advance_payment")
    );

    let mut with_penalty = advance_claim(&milestone, 5_000.0);
    with_penalty.penalty = 100.0;
    assert_eq!(
        field_of(h.finance.raise_claim(&alice, &request.id, with_penalty).unwrap_err()),
        Some("penalty")
    );

    let mut with_adjustment = advance_claim(&milestone, 5_000.0);
    with_adjustment.adjustment = 100.0;
    assert_eq!(
        field_of(h.finance.raise_claim(&alice, &request.id, with_adjustment).unwrap_err()),
        Some("adjustment")
    );
}

#[test]
fn second_milestone_claims_cannot_be_advances() {
    let h = TestHarness::new();
    let (alice, proposal, _first) = setup(&h);
    let second = h
        .milestones
        .create(&alice, &proposal, "Phase two", 30_000.0, None, None)
        .unwrap();
    let request = h.finance.create_request(&alice, &second.id, 30_000.0).unwrap();
    h.finance
        .review_request(&h.implementation_reviewer(), &request.id, true, None)
        .unwrap();

    assert_eq!(
        field_of(
            h.finance
                .raise_claim(&alice, &request.id, advance_claim(&second.id, 10_000.0))
                .unwrap_err()
        ),
        Some("advance_payment")
    );

    let mut with_adjustment = advance_claim(&second.id, 10_000.0);
    with_adjustment.advance_payment = false;
    with_adjustment.adjustment = 50.0;
    assert_eq!(
        field_of(h.finance.raise_claim(&alice, &request.id, with_adjustment).unwrap_err()),
        Some("adjustment")
    );

    // Penalty alone is fine from the second milestone on.
    let mut with_penalty = advance_claim(&second.id, 10_000.0);
    with_penalty.advance_payment = false;
    with_penalty.penalty = 50.0;
    h.finance.raise_claim(&alice, &request.id, with_penalty).unwrap();
}

#[test]
fn third_milestone_claims_are_unconstrained() {
    let h = TestHarness::new();
    let (alice, proposal, _first) = setup(&h);
    h.milestones
        .create(&alice, &proposal, "Phase two", 1_000.0, None, None)
        .unwrap();
    let third = h
        .milestones
        .create(&alice, &proposal, "Phase three", 20_000.0, None, None)
        .unwrap();
    let request = h.finance.create_request(&alice, &third.id, 20_000.0).unwrap();
    h.finance
        .review_request(&h.implementation_reviewer(), &request.id, true, None)
        .unwrap();

    let claim = ClaimInput {
        milestone_id: Some(third.id.clone()),
        sub_milestone_id: None,
        amount: 10_000.0,
        advance_payment: false,
        penalty: 250.0,
        adjustment: 500.0,
    };
    h.finance.raise_claim(&alice, &request.id, claim).unwrap();
}

#[test]
fn claim_references_exactly_one_target() {
    let h = TestHarness::new();
    let (alice, _proposal, milestone) = setup(&h);
    let sub = h
        .milestones
        .create_sub_milestone(&alice, &milestone, "Setup", 5_000.0)
        .unwrap();
    let request = h.finance.create_request(&alice, &milestone, 10_000.0).unwrap();
    h.finance
        .review_request(&h.implementation_reviewer(), &request.id, true, None)
        .unwrap();

    let mut both = advance_claim(&milestone, 5_000.0);
    both.sub_milestone_id = Some(sub.id.clone());
    assert!(matches!(
        h.finance.raise_claim(&alice, &request.id, both).unwrap_err(),
        GrantflowError::Validation(ValidationError::ExclusiveReference)
    ));

    let mut neither = advance_claim(&milestone, 5_000.0);
    neither.milestone_id = None;
    assert!(matches!(
        h.finance.raise_claim(&alice, &request.id, neither).unwrap_err(),
        GrantflowError::Validation(ValidationError::ExclusiveReference)
    ));

    // A sub-milestone of the requested milestone is a valid target.
    let mut via_sub = advance_claim(&milestone, 5_000.0);
    via_sub.milestone_id = None;
    via_sub.sub_milestone_id = Some(sub.id);
    h.finance.raise_claim(&alice, &request.id, via_sub).unwrap();
}

#[test]
fn claim_target_must_belong_to_the_requested_milestone() {
    let h = TestHarness::new();
    let (alice, proposal, first) = setup(&h);
    let second = h
        .milestones
        .create(&alice, &proposal, "Phase two", 30_000.0, None, None)
        .unwrap();
    let request = h.finance.create_request(&alice, &first, 10_000.0).unwrap();
    h.finance
        .review_request(&h.implementation_reviewer(), &request.id, true, None)
        .unwrap();

    // Claim raised against the first-milestone request but pointing at the
    // second milestone.
    assert!(h
        .finance
        .raise_claim(&alice, &request.id, advance_claim(&second.id, 5_000.0))
        .is_err());
}

#[test]
fn finance_decisions_are_final() {
    let h = TestHarness::new();
    let (alice, _proposal, milestone) = setup(&h);
    let request = h.finance.create_request(&alice, &milestone, 10_000.0).unwrap();
    h.finance
        .review_request(&h.implementation_reviewer(), &request.id, true, None)
        .unwrap();

    assert!(matches!(
        h.finance
            .review_request(&h.implementation_reviewer(), &request.id, false, Some("again"))
            .unwrap_err(),
        GrantflowError::StateConflict(StateConflictError::IllegalStatusChange { .. })
    ));
}

#[test]
fn rejections_require_a_remark() {
    let h = TestHarness::new();
    let (alice, _proposal, milestone) = setup(&h);
    let request = h.finance.create_request(&alice, &milestone, 10_000.0).unwrap();

    assert_eq!(
        field_of(
            h.finance
                .review_request(&h.implementation_reviewer(), &request.id, false, None)
                .unwrap_err()
        ),
        Some("remark")
    );
}

#[test]
fn milestones_require_an_approved_proposal() {
    let h = TestHarness::new();
    let alice = h.applicant("u1", "Alice");
    let p = h.submitted(&alice);

    assert!(matches!(
        h.milestones
            .create(&alice, &p.id, "Too early", 1_000.0, None, None)
            .unwrap_err(),
        GrantflowError::StateConflict(StateConflictError::GuardFailed { .. })
    ));
}

#[test]
fn each_document_slot_holds_one_file() {
    let h = TestHarness::new();
    let (alice, _proposal, milestone) = setup(&h);

    h.milestones
        .attach_document(&alice, &milestone, DocumentCategory::ProgressReport, "/u/report.pdf")
        .unwrap();

    let err = h
        .milestones
        .attach_document(&alice, &milestone, DocumentCategory::ProgressReport, "/u/other.pdf")
        .unwrap_err();
    assert!(matches!(err, GrantflowError::Validation(_)));

    // A different category is a different slot.
    h.milestones
        .attach_document(&alice, &milestone, DocumentCategory::AssetProof, "/u/asset.pdf")
        .unwrap();
}

#[test]
fn document_review_follows_the_pending_approved_rejected_machine() {
    let h = TestHarness::new();
    let (alice, _proposal, milestone) = setup(&h);
    let reviewer = h.implementation_reviewer();

    let doc = h
        .milestones
        .attach_document(&alice, &milestone, DocumentCategory::ProgressReport, "/u/report.pdf")
        .unwrap();
    assert_eq!(doc.status, "pending_review");

    // Rejection without remarks is refused; the document stays pending.
    assert!(h
        .milestones
        .review_document(&reviewer, &doc.id, false, None)
        .is_err());

    let doc = h
        .milestones
        .review_document(&reviewer, &doc.id, false, Some("wrong period"))
        .unwrap();
    assert_eq!(doc.status, "rejected");
    assert_eq!(doc.reviewed_by.as_deref(), Some("impl-1"));

    // Decided documents cannot be re-reviewed.
    assert!(matches!(
        h.milestones
            .review_document(&reviewer, &doc.id, true, None)
            .unwrap_err(),
        GrantflowError::StateConflict(StateConflictError::IllegalStatusChange { .. })
    ));
}

#[test]
fn milestone_updates_keep_their_history() {
    let h = TestHarness::new();
    let (alice, _proposal, milestone) = setup(&h);

    h.milestones
        .update(&alice, &milestone, "Phase one, revised", 50_000.0, Some(45_000.0), None, None)
        .unwrap();

    let history = h.milestones.history(&alice, &milestone).unwrap();
    assert_eq!(history.len(), 2);
    // The snapshot taken by the update still carries the original title.
    assert!(history[1].snapshot.contains("Phase one"));
    assert!(!history[0].snapshot.contains("revised"));

    let current = h
        .milestones
        .list(&alice, &_proposal)
        .unwrap()
        .into_iter()
        .find(|m| m.id == milestone)
        .unwrap();
    assert_eq!(current.title, "Phase one, revised");
    assert_eq!(current.revised_amount, Some(45_000.0));
}
