//! Screening and technical evaluation.

pub mod service;

pub use service::EvaluationService;

/// Which review tier produced a screening record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScreeningKind {
    Admin,
    Technical,
}

impl ScreeningKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScreeningKind::Admin => "admin",
            ScreeningKind::Technical => "technical",
        }
    }
}

/// A recorded screening decision. Absence of a record means "pending".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScreeningDecision {
    Shortlisted,
    Rejected,
}

impl ScreeningDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScreeningDecision::Shortlisted => "shortlisted",
            ScreeningDecision::Rejected => "rejected",
        }
    }
}
