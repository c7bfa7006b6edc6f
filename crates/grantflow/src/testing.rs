//! Shared fixture for unit tests: an in-memory database with all services
//! wired, one open template, and helpers that drive a proposal to any stage.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use tempfile::TempDir;

use crate::artifact::ArtifactStore;
use crate::audit::AuditRecorder;
use crate::context::{ActorContext, ActorRole};
use crate::db::proposal_repo::ProposalRow;
use crate::db::{template_repo, Database};
use crate::evaluation::{EvaluationService, ScreeningDecision, ScreeningKind};
use crate::events::EventDispatcher;
use crate::finance::FinanceService;
use crate::milestone::MilestoneService;
use crate::notify::{LogMailer, Notifier};
use crate::presentation::{PresentationService, PresentationStatus};
use crate::proposal::ProposalService;
use crate::render::{PlainTextRenderer, RenderBoundary};
use crate::workflow::WorkflowEngine;

pub(crate) struct TestHarness {
    pub db: Database,
    pub proposals: ProposalService,
    pub workflow: WorkflowEngine,
    pub evaluations: EvaluationService,
    pub presentations: PresentationService,
    pub milestones: MilestoneService,
    pub finance: FinanceService,
    artifacts: TempDir,
}

impl TestHarness {
    pub fn new() -> Self {
        let db = Database::open_in_memory().unwrap();
        let dispatcher = EventDispatcher::new(
            AuditRecorder::new(db.clone()),
            Notifier::new(db.clone(), Arc::new(LogMailer), "noreply@grantflow.local"),
        );
        let artifacts = TempDir::new().unwrap();
        let workflow = WorkflowEngine::new(
            db.clone(),
            dispatcher.clone(),
            RenderBoundary::new(Arc::new(PlainTextRenderer), Duration::from_secs(5)),
            Arc::new(ArtifactStore::new(artifacts.path())),
            "GP",
        );

        let harness = Self {
            proposals: ProposalService::new(db.clone(), dispatcher.clone()),
            evaluations: EvaluationService::new(db.clone(), dispatcher.clone()),
            presentations: PresentationService::new(db.clone(), dispatcher.clone()),
            milestones: MilestoneService::new(db.clone(), dispatcher.clone()),
            finance: FinanceService::new(db.clone(), dispatcher),
            workflow,
            db,
            artifacts,
        };

        // One template with an open window and two required sections.
        let now = Utc::now();
        harness.seed_template(
            "AGRI",
            &(now - ChronoDuration::days(1)).to_rfc3339(),
            &(now + ChronoDuration::days(365)).to_rfc3339(),
            &["abstract", "budget"],
        );
        harness
    }

    pub fn seed_template(&self, code: &str, start: &str, end: &str, sections: &[&str]) {
        self.db
            .with_conn(|conn| {
                template_repo::insert(
                    conn,
                    &template_repo::TemplateRow {
                        id: format!("tpl-{}", code),
                        code: code.to_string(),
                        title: format!("{} grants", code),
                        prefix: "GP".to_string(),
                        start_date: start.to_string(),
                        end_date: end.to_string(),
                        required_sections: serde_json::to_string(sections).unwrap(),
                    },
                )
            })
            .unwrap();
    }

    // ── Actors ──

    pub fn applicant(&self, id: &str, name: &str) -> ActorContext {
        ActorContext::new(id, name, ActorRole::Applicant)
    }

    pub fn admin(&self) -> ActorContext {
        ActorContext::new("admin", "Admin Amy", ActorRole::Admin)
    }

    pub fn evaluator(&self, id: &str, name: &str) -> ActorContext {
        ActorContext::new(id, name, ActorRole::Evaluator)
    }

    pub fn implementation_reviewer(&self) -> ActorContext {
        ActorContext::new("impl-1", "Ivan", ActorRole::ImplementationReviewer)
    }

    pub fn finance_reviewer(&self) -> ActorContext {
        ActorContext::new("fin-1", "Fran", ActorRole::FinanceReviewer)
    }

    pub fn sanctioning_officer(&self) -> ActorContext {
        ActorContext::new("sanc-1", "Sam", ActorRole::SanctioningOfficer)
    }

    // ── Stage drivers ──

    pub fn draft(&self, applicant: &ActorContext) -> ProposalRow {
        self.proposals
            .create_draft(applicant, "AGRI", "north", "applicant@example.org")
            .unwrap()
    }

    /// A draft with every required section completed.
    pub fn submittable(&self, applicant: &ActorContext) -> ProposalRow {
        let draft = self.draft(applicant);
        for section in ["abstract", "budget"] {
            self.proposals
                .update_section(applicant, &draft.id, section, &serde_json::json!({"text": "x"}))
                .unwrap();
            self.proposals
                .mark_section_complete(applicant, &draft.id, section)
                .unwrap();
        }
        draft
    }

    pub fn submitted(&self, applicant: &ActorContext) -> ProposalRow {
        let draft = self.submittable(applicant);
        self.workflow.submit(applicant, &draft.id).unwrap()
    }

    pub fn admin_screened(&self, applicant: &ActorContext) -> ProposalRow {
        let p = self.submitted(applicant);
        self.evaluations
            .record_screening(
                &self.admin(),
                &p.id,
                ScreeningKind::Admin,
                ScreeningDecision::Shortlisted,
                None,
            )
            .unwrap();
        self.workflow
            .advance_after_screening(&self.admin(), &p.id)
            .unwrap()
    }

    pub fn technically_evaluated(&self, applicant: &ActorContext) -> ProposalRow {
        let p = self.admin_screened(applicant);
        let round = self.evaluations.open_round(&self.admin(), &p.id).unwrap();
        self.evaluations
            .record_criteria_marks(&self.evaluator("te-1", "Tess"), &round.id, "novelty", 60.0, None)
            .unwrap();
        self.evaluations
            .close_round(&self.admin(), &round.id, ScreeningDecision::Shortlisted)
            .unwrap();
        self.workflow
            .advance_after_technical(&self.admin(), &p.id)
            .unwrap()
    }

    pub fn presented(&self, applicant: &ActorContext) -> ProposalRow {
        let p = self.technically_evaluated(applicant);
        let pres = self
            .presentations
            .create(&self.admin(), &p.id, "pe-1", "Pia")
            .unwrap();
        self.presentations
            .assign_materials(
                &self.admin(),
                &pres.id,
                "https://example.org/video",
                "/artifacts/deck.pdf",
                "2025-06-01T10:00:00+00:00",
            )
            .unwrap();
        self.presentations
            .submit_evaluation(&self.evaluator("pe-1", "Pia"), &pres.id, 80.0, None)
            .unwrap();
        self.presentations
            .record_final_decision(&self.admin(), &pres.id, PresentationStatus::Shortlisted, None)
            .unwrap();
        self.workflow
            .advance_after_presentation(&self.admin(), &p.id)
            .unwrap()
    }

    pub fn approved(&self, applicant: &ActorContext) -> ProposalRow {
        let p = self.presented(applicant);
        self.workflow.finalize(&self.admin(), &p.id).unwrap()
    }
}
