//! Proposal stage state machine.
//!
//! One explicit `Stage` enum with a central legality check replaces the
//! scattered per-subsystem status booleans: every transition in the system
//! goes through [`Stage::can_transition`], and the [`engine::WorkflowEngine`]
//! enforces the per-transition guards on top of it.

pub mod engine;

use serde::{Deserialize, Serialize};

pub use engine::WorkflowEngine;

/// Coarse lifecycle position of a proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Draft,
    Submitted,
    AdminScreened,
    TechnicallyEvaluated,
    Presented,
    Approved,
    Rejected,
}

impl Stage {
    /// Stable label stored in the `proposals.stage` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Draft => "draft",
            Stage::Submitted => "submitted",
            Stage::AdminScreened => "admin_screened",
            Stage::TechnicallyEvaluated => "technically_evaluated",
            Stage::Presented => "presented",
            Stage::Approved => "approved",
            Stage::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Stage> {
        match s {
            "draft" => Some(Stage::Draft),
            "submitted" => Some(Stage::Submitted),
            "admin_screened" => Some(Stage::AdminScreened),
            "technically_evaluated" => Some(Stage::TechnicallyEvaluated),
            "presented" => Some(Stage::Presented),
            "approved" => Some(Stage::Approved),
            "rejected" => Some(Stage::Rejected),
            _ => None,
        }
    }

    /// Terminal stages admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Approved | Stage::Rejected)
    }

    /// Position along the forward chain; used to assert monotonicity.
    pub fn order(&self) -> u8 {
        match self {
            Stage::Draft => 0,
            Stage::Submitted => 1,
            Stage::AdminScreened => 2,
            Stage::TechnicallyEvaluated => 3,
            Stage::Presented => 4,
            Stage::Approved | Stage::Rejected => 5,
        }
    }

    /// Whether `self -> to` is a legal transition, before guards.
    ///
    /// The forward chain advances one stage at a time; `Rejected` is
    /// additionally reachable from any intermediate stage (explicit admin
    /// short-circuit). No transition ever moves to a strictly earlier stage.
    pub fn can_transition(self, to: Stage) -> bool {
        use Stage::*;
        matches!(
            (self, to),
            (Draft, Submitted)
                | (Submitted, AdminScreened)
                | (AdminScreened, TechnicallyEvaluated)
                | (TechnicallyEvaluated, Presented)
                | (Presented, Approved)
                | (Presented, Rejected)
                | (Submitted, Rejected)
                | (AdminScreened, Rejected)
                | (TechnicallyEvaluated, Rejected)
        )
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Stage::parse(s).ok_or_else(|| format!("unknown stage '{}'", s))
    }
}
