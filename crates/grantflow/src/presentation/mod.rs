//! Presentation subsystem — per-evaluator presentation rows plus two derived
//! cache projections that are rebuilt from the authoritative rows on every
//! mutation (read-repair, never incremental patching).

pub mod cache;
pub mod service;

pub use service::PresentationService;

/// Status chain of a presentation row. Strictly forward, no skipping:
/// Pending -> Assigned -> Evaluated -> Shortlisted | Rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentationStatus {
    Pending,
    Assigned,
    Evaluated,
    Shortlisted,
    Rejected,
}

impl PresentationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PresentationStatus::Pending => "pending",
            PresentationStatus::Assigned => "assigned",
            PresentationStatus::Evaluated => "evaluated",
            PresentationStatus::Shortlisted => "shortlisted",
            PresentationStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(PresentationStatus::Pending),
            "assigned" => Some(PresentationStatus::Assigned),
            "evaluated" => Some(PresentationStatus::Evaluated),
            "shortlisted" => Some(PresentationStatus::Shortlisted),
            "rejected" => Some(PresentationStatus::Rejected),
            _ => None,
        }
    }

    /// Display label for cache projections.
    pub fn label(&self) -> &'static str {
        match self {
            PresentationStatus::Pending => "Pending",
            PresentationStatus::Assigned => "Assigned",
            PresentationStatus::Evaluated => "Evaluated",
            PresentationStatus::Shortlisted => "Shortlisted",
            PresentationStatus::Rejected => "Rejected",
        }
    }

    pub fn can_advance(self, to: PresentationStatus) -> bool {
        use PresentationStatus::*;
        matches!(
            (self, to),
            (Pending, Assigned)
                | (Assigned, Evaluated)
                | (Evaluated, Shortlisted)
                | (Evaluated, Rejected)
        )
    }

    /// Final decisions admit no further changes.
    pub fn is_final(&self) -> bool {
        matches!(self, PresentationStatus::Shortlisted | PresentationStatus::Rejected)
    }
}

impl std::fmt::Display for PresentationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for s in [
            PresentationStatus::Pending,
            PresentationStatus::Assigned,
            PresentationStatus::Evaluated,
            PresentationStatus::Shortlisted,
            PresentationStatus::Rejected,
        ] {
            assert_eq!(PresentationStatus::parse(s.as_str()), Some(s));
        }
    }

    #[test]
    fn test_chain_has_no_skips() {
        use PresentationStatus::*;
        assert!(Pending.can_advance(Assigned));
        assert!(Assigned.can_advance(Evaluated));
        assert!(Evaluated.can_advance(Shortlisted));
        assert!(Evaluated.can_advance(Rejected));

        assert!(!Pending.can_advance(Evaluated));
        assert!(!Pending.can_advance(Shortlisted));
        assert!(!Assigned.can_advance(Shortlisted));
        assert!(!Shortlisted.can_advance(Rejected));
        assert!(!Rejected.can_advance(Evaluated));
    }
}
