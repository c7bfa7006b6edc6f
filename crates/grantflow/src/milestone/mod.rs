//! Post-approval milestones, sub-milestones, and milestone documents.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};

pub mod service;

pub use service::MilestoneService;

/// Derived schedule status of a milestone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MilestoneStatus {
    /// Scheduled, not started yet.
    OnTime,
    InProgress,
    /// Past its end date without being completed.
    Delayed,
    Completed,
}

impl MilestoneStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MilestoneStatus::OnTime => "on_time",
            MilestoneStatus::InProgress => "in_progress",
            MilestoneStatus::Delayed => "delayed",
            MilestoneStatus::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "on_time" => Some(MilestoneStatus::OnTime),
            "in_progress" => Some(MilestoneStatus::InProgress),
            "delayed" => Some(MilestoneStatus::Delayed),
            "completed" => Some(MilestoneStatus::Completed),
            _ => None,
        }
    }
}

/// Derives the schedule status from the milestone window. `completed` wins
/// unconditionally; otherwise the status follows where `now` falls.
///
/// Window bounds may be full RFC3339 timestamps or bare dates. A date-only
/// end is inclusive through that day; an unparseable bound is ignored.
pub fn derive_status(
    now: &str,
    starts_on: Option<&str>,
    ends_on: Option<&str>,
    completed: bool,
) -> MilestoneStatus {
    if completed {
        return MilestoneStatus::Completed;
    }
    let now = match parse_instant(now, false) {
        Some(t) => t,
        None => return MilestoneStatus::InProgress,
    };
    if let Some(end) = ends_on.and_then(|e| parse_instant(e, true)) {
        if now >= end {
            return MilestoneStatus::Delayed;
        }
    }
    match starts_on.and_then(|s| parse_instant(s, false)) {
        Some(start) if now < start => MilestoneStatus::OnTime,
        _ => MilestoneStatus::InProgress,
    }
}

/// RFC3339 timestamp or bare `YYYY-MM-DD`, as a UTC instant. For a bare
/// date, `end_of_day` shifts the instant to the following midnight so the
/// named day is still inside the window.
fn parse_instant(value: &str, end_of_day: bool) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    let mut date = NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()?;
    if end_of_day {
        date = date.succ_opt()?;
    }
    Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?))
}

/// One document slot per category per milestone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentCategory {
    ProgressReport,
    ComplianceReport,
    UtilizationCertificate,
    AssetProof,
}

impl DocumentCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentCategory::ProgressReport => "progress_report",
            DocumentCategory::ComplianceReport => "compliance_report",
            DocumentCategory::UtilizationCertificate => "utilization_certificate",
            DocumentCategory::AssetProof => "asset_proof",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "progress_report" => Some(DocumentCategory::ProgressReport),
            "compliance_report" => Some(DocumentCategory::ComplianceReport),
            "utilization_certificate" => Some(DocumentCategory::UtilizationCertificate),
            "asset_proof" => Some(DocumentCategory::AssetProof),
            _ => None,
        }
    }
}

/// Review state of an uploaded milestone document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentStatus {
    PendingReview,
    Approved,
    Rejected,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::PendingReview => "pending_review",
            DocumentStatus::Approved => "approved",
            DocumentStatus::Rejected => "rejected",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_status() {
        let now = "2025-06-15T00:00:00+00:00";
        assert_eq!(
            derive_status(now, Some("2025-07-01"), Some("2025-08-01"), false),
            MilestoneStatus::OnTime
        );
        assert_eq!(
            derive_status(now, Some("2025-06-01"), Some("2025-08-01"), false),
            MilestoneStatus::InProgress
        );
        assert_eq!(
            derive_status(now, Some("2025-01-01"), Some("2025-02-01"), false),
            MilestoneStatus::Delayed
        );
        assert_eq!(
            derive_status(now, Some("2025-01-01"), Some("2025-02-01"), true),
            MilestoneStatus::Completed
        );
        // No window at all: in progress until completed.
        assert_eq!(derive_status(now, None, None, false), MilestoneStatus::InProgress);
    }

    #[test]
    fn test_date_only_end_covers_the_whole_day() {
        // Noon on the end date itself is still inside the window.
        assert_eq!(
            derive_status("2025-06-15T12:00:00+00:00", Some("2025-06-01"), Some("2025-06-15"), false),
            MilestoneStatus::InProgress
        );
        assert_eq!(
            derive_status("2025-06-16T00:00:00+00:00", Some("2025-06-01"), Some("2025-06-15"), false),
            MilestoneStatus::Delayed
        );
    }

    #[test]
    fn test_window_bounds_with_offsets() {
        // 01:00+05:00 on the 16th is 20:00Z on the 15th, inside the window.
        assert_eq!(
            derive_status("2025-06-16T01:00:00+05:00", Some("2025-06-01"), Some("2025-06-15"), false),
            MilestoneStatus::InProgress
        );
    }

    #[test]
    fn test_category_round_trip() {
        for c in [
            DocumentCategory::ProgressReport,
            DocumentCategory::ComplianceReport,
            DocumentCategory::UtilizationCertificate,
            DocumentCategory::AssetProof,
        ] {
            assert_eq!(DocumentCategory::parse(c.as_str()), Some(c));
        }
    }
}
