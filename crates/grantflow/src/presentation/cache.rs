//! Derived cache projections for the presentation subsystem.
//!
//! The two compute functions are pure: they read only the authoritative rows
//! handed to them. [`rebuild`] repairs both projections inside the caller's
//! transaction, so a cache row can never commit ahead of (or behind) the row
//! it is derived from.

use chrono::Utc;
use rusqlite::Connection;

use crate::db::{presentation_repo, proposal_repo, DatabaseError};

use presentation_repo::{PresentationCacheRow, PresentationRow, ProposalCacheRow};
use proposal_repo::ProposalRow;

use super::PresentationStatus;

pub fn compute_presentation_cache(
    presentation: &PresentationRow,
    proposal: &ProposalRow,
    rebuilt_at: &str,
) -> PresentationCacheRow {
    let status_label = PresentationStatus::parse(&presentation.status)
        .map(|s| s.label().to_string())
        .unwrap_or_else(|| presentation.status.clone());

    let marks_summary = serde_json::json!({
        "marks": presentation.marks,
        "remarks": presentation.remarks,
        "evaluated_at": presentation.evaluated_at,
    });
    let applicant_summary = serde_json::json!({
        "applicant_name": proposal.applicant_name,
        "code": proposal.code,
    });

    PresentationCacheRow {
        presentation_id: presentation.id.clone(),
        evaluator_name: presentation.evaluator_name.clone(),
        status_label,
        marks_summary: marks_summary.to_string(),
        applicant_summary: applicant_summary.to_string(),
        is_ready: presentation.video_link.is_some()
            && presentation.document_path.is_some()
            && presentation.scheduled_at.is_some(),
        is_complete: presentation.evaluated_at.is_some(),
        rebuilt_at: rebuilt_at.to_string(),
    }
}

pub fn compute_proposal_cache(
    proposal_id: &str,
    presentations: &[PresentationRow],
    rebuilt_at: &str,
) -> ProposalCacheRow {
    let entries: Vec<serde_json::Value> = presentations
        .iter()
        .map(|p| {
            serde_json::json!({
                "presentation_id": p.id,
                "evaluator_name": p.evaluator_name,
                "status": p.status,
                "marks": p.marks,
            })
        })
        .collect();

    let marks: Vec<f64> = presentations.iter().filter_map(|p| p.marks).collect();
    let average_marks = if marks.is_empty() {
        None
    } else {
        Some(marks.iter().sum::<f64>() / marks.len() as f64)
    };
    let evaluated_count = presentations
        .iter()
        .filter(|p| p.evaluated_at.is_some())
        .count() as u32;

    ProposalCacheRow {
        proposal_id: proposal_id.to_string(),
        entries: serde_json::Value::Array(entries).to_string(),
        average_marks,
        evaluated_count,
        rebuilt_at: rebuilt_at.to_string(),
    }
}

/// Rebuilds both cache projections for a proposal from its authoritative
/// presentation rows, and drops cache rows whose presentation is gone.
pub fn rebuild(conn: &Connection, proposal_id: &str) -> Result<(), DatabaseError> {
    let proposal = match proposal_repo::find_by_id(conn, proposal_id)? {
        Some(p) => p,
        // Proposal deleted; cascades removed the presentation rows too.
        None => return prune_orphans(conn),
    };
    let presentations = presentation_repo::list_by_proposal(conn, proposal_id)?;
    let now = Utc::now().to_rfc3339();

    for p in &presentations {
        let cache = compute_presentation_cache(p, &proposal, &now);
        presentation_repo::upsert_presentation_cache(conn, &cache)?;
    }
    let aggregate = compute_proposal_cache(proposal_id, &presentations, &now);
    presentation_repo::upsert_proposal_cache(conn, &aggregate)?;

    prune_orphans(conn)
}

fn prune_orphans(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute(
        "DELETE FROM presentation_cache
         WHERE presentation_id NOT IN (SELECT id FROM presentations)",
        [],
    )?;
    conn.execute(
        "DELETE FROM proposal_presentation_cache
         WHERE proposal_id NOT IN (SELECT id FROM proposals)",
        [],
    )?;
    Ok(())
}
