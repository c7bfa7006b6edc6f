//! Finance approval chain: request -> claim -> sanction.

pub mod service;

pub use service::FinanceService;

/// Review state shared by all three chain tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewStatus {
    PendingReview,
    Approved,
    Rejected,
}

impl ReviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewStatus::PendingReview => "pending_review",
            ReviewStatus::Approved => "approved",
            ReviewStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending_review" => Some(ReviewStatus::PendingReview),
            "approved" => Some(ReviewStatus::Approved),
            "rejected" => Some(ReviewStatus::Rejected),
            _ => None,
        }
    }

    /// Only pending items can be decided; decisions are final.
    pub fn is_decided(&self) -> bool {
        !matches!(self, ReviewStatus::PendingReview)
    }
}
