#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use tempfile::TempDir;

use grantflow::db::proposal_repo::ProposalRow;
use grantflow::db::template_repo;
use grantflow::evaluation::{ScreeningDecision, ScreeningKind};
use grantflow::notify::LogMailer;
use grantflow::presentation::PresentationStatus;
use grantflow::{
    ActorContext, ActorRole, ArtifactStore, AuditRecorder, Database, EvaluationService,
    EventDispatcher, FinanceService, MilestoneService, Notifier, PlainTextRenderer,
    PresentationService, ProposalService, RenderBoundary, WorkflowEngine,
};

pub struct TestHarness {
    pub db: Database,
    pub proposals: ProposalService,
    pub workflow: WorkflowEngine,
    pub evaluations: EvaluationService,
    pub presentations: PresentationService,
    pub milestones: MilestoneService,
    pub finance: FinanceService,
    pub artifacts: TempDir,
}

impl TestHarness {
    pub fn new() -> Self {
        let db = Database::open_in_memory().expect("in-memory db");
        let dispatcher = EventDispatcher::new(
            AuditRecorder::new(db.clone()),
            Notifier::new(db.clone(), Arc::new(LogMailer), "noreply@grantflow.local"),
        );
        let artifacts = TempDir::new().expect("temp artifact dir");
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
            .expect("seed template");
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
        self.draft_in_cohort(applicant, "north")
    }

    pub fn draft_in_cohort(&self, applicant: &ActorContext, cohort: &str) -> ProposalRow {
        self.proposals
            .create_draft(applicant, "AGRI", cohort, "applicant@example.org")
            .expect("create draft")
    }

    /// Fills and completes every required section of a draft.
    pub fn complete_sections(&self, applicant: &ActorContext, proposal_id: &str) {
        for section in ["abstract", "budget"] {
            self.proposals
                .update_section(
                    applicant,
                    proposal_id,
                    section,
                    &serde_json::json!({"text": "content"}),
                )
                .expect("update section");
            self.proposals
                .mark_section_complete(applicant, proposal_id, section)
                .expect("complete section");
        }
    }

    pub fn submitted(&self, applicant: &ActorContext) -> ProposalRow {
        let draft = self.draft(applicant);
        self.complete_sections(applicant, &draft.id);
        self.workflow.submit(applicant, &draft.id).expect("submit")
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
            .expect("admin screening");
        self.workflow
            .advance_after_screening(&self.admin(), &p.id)
            .expect("advance after screening")
    }

    pub fn technically_evaluated(&self, applicant: &ActorContext) -> ProposalRow {
        let p = self.admin_screened(applicant);
        let round = self
            .evaluations
            .open_round(&self.admin(), &p.id)
            .expect("open round");
        self.evaluations
            .record_criteria_marks(&self.evaluator("te-1", "Tess"), &round.id, "novelty", 60.0, None)
            .expect("criteria marks");
        self.evaluations
            .close_round(&self.admin(), &round.id, ScreeningDecision::Shortlisted)
            .expect("close round");
        self.workflow
            .advance_after_technical(&self.admin(), &p.id)
            .expect("advance after technical")
    }

    pub fn presented(&self, applicant: &ActorContext) -> ProposalRow {
        let p = self.technically_evaluated(applicant);
        let pres = self
            .presentations
            .create(&self.admin(), &p.id, "pe-1", "Pia")
            .expect("create presentation");
        self.presentations
            .assign_materials(
                &self.admin(),
                &pres.id,
                "https://example.org/video",
                "/artifacts/deck.pdf",
                "2025-06-01T10:00:00+00:00",
            )
            .expect("assign materials");
        self.presentations
            .submit_evaluation(&self.evaluator("pe-1", "Pia"), &pres.id, 80.0, None)
            .expect("submit evaluation");
        self.presentations
            .record_final_decision(&self.admin(), &pres.id, PresentationStatus::Shortlisted, None)
            .expect("final decision");
        self.workflow
            .advance_after_presentation(&self.admin(), &p.id)
            .expect("advance after presentation")
    }

    pub fn approved(&self, applicant: &ActorContext) -> ProposalRow {
        let p = self.presented(applicant);
        self.workflow.finalize(&self.admin(), &p.id).expect("finalize")
    }
}
