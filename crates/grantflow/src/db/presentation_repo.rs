//! Presentation repository — evaluator-scoped presentation rows and the two
//! derived cache projections (per-presentation and per-proposal).

use rusqlite::{params, Connection, Row};

use super::DatabaseError;

/// A raw presentation row. One per (proposal, evaluator).
#[derive(Debug, Clone)]
pub struct PresentationRow {
    pub id: String,
    pub proposal_id: String,
    pub evaluator_id: String,
    pub evaluator_name: String,
    pub video_link: Option<String>,
    pub document_path: Option<String>,
    pub scheduled_at: Option<String>,
    pub marks: Option<f64>,
    pub remarks: Option<String>,
    pub evaluated_at: Option<String>,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

impl PresentationRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            proposal_id: row.get("proposal_id")?,
            evaluator_id: row.get("evaluator_id")?,
            evaluator_name: row.get("evaluator_name")?,
            video_link: row.get("video_link")?,
            document_path: row.get("document_path")?,
            scheduled_at: row.get("scheduled_at")?,
            marks: row.get("marks")?,
            remarks: row.get("remarks")?,
            evaluated_at: row.get("evaluated_at")?,
            status: row.get("status")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

/// Derived per-presentation projection. Rebuilt, never patched.
#[derive(Debug, Clone, PartialEq)]
pub struct PresentationCacheRow {
    pub presentation_id: String,
    pub evaluator_name: String,
    pub status_label: String,
    pub marks_summary: String,
    pub applicant_summary: String,
    pub is_ready: bool,
    pub is_complete: bool,
    pub rebuilt_at: String,
}

impl PresentationCacheRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            presentation_id: row.get("presentation_id")?,
            evaluator_name: row.get("evaluator_name")?,
            status_label: row.get("status_label")?,
            marks_summary: row.get("marks_summary")?,
            applicant_summary: row.get("applicant_summary")?,
            is_ready: row.get::<_, i64>("is_ready")? != 0,
            is_complete: row.get::<_, i64>("is_complete")? != 0,
            rebuilt_at: row.get("rebuilt_at")?,
        })
    }
}

/// Derived per-proposal aggregate projection.
#[derive(Debug, Clone, PartialEq)]
pub struct ProposalCacheRow {
    pub proposal_id: String,
    pub entries: String,
    pub average_marks: Option<f64>,
    pub evaluated_count: u32,
    pub rebuilt_at: String,
}

impl ProposalCacheRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            proposal_id: row.get("proposal_id")?,
            entries: row.get("entries")?,
            average_marks: row.get("average_marks")?,
            evaluated_count: row.get("evaluated_count")?,
            rebuilt_at: row.get("rebuilt_at")?,
        })
    }
}

pub fn insert(conn: &Connection, p: &PresentationRow) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO presentations (id, proposal_id, evaluator_id, evaluator_name, video_link,
         document_path, scheduled_at, marks, remarks, evaluated_at, status, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        params![
            p.id,
            p.proposal_id,
            p.evaluator_id,
            p.evaluator_name,
            p.video_link,
            p.document_path,
            p.scheduled_at,
            p.marks,
            p.remarks,
            p.evaluated_at,
            p.status,
            p.created_at,
            p.updated_at,
        ],
    )?;
    Ok(())
}

/// Overwrites all mutable fields of a presentation row.
pub fn update(conn: &Connection, p: &PresentationRow) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE presentations SET video_link = ?2, document_path = ?3, scheduled_at = ?4,
         marks = ?5, remarks = ?6, evaluated_at = ?7, status = ?8, updated_at = ?9
         WHERE id = ?1",
        params![
            p.id,
            p.video_link,
            p.document_path,
            p.scheduled_at,
            p.marks,
            p.remarks,
            p.evaluated_at,
            p.status,
            p.updated_at,
        ],
    )?;
    Ok(())
}

pub fn delete(conn: &Connection, id: &str) -> Result<(), DatabaseError> {
    conn.execute("DELETE FROM presentations WHERE id = ?1", params![id])?;
    Ok(())
}

pub fn find_by_id(conn: &Connection, id: &str) -> Result<Option<PresentationRow>, DatabaseError> {
    let mut stmt = conn.prepare("SELECT * FROM presentations WHERE id = ?1")?;
    let mut rows = stmt.query_map(params![id], PresentationRow::from_row)?;
    match rows.next() {
        Some(Ok(row)) => Ok(Some(row)),
        Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
        None => Ok(None),
    }
}

pub fn list_by_proposal(
    conn: &Connection,
    proposal_id: &str,
) -> Result<Vec<PresentationRow>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT * FROM presentations WHERE proposal_id = ?1 ORDER BY created_at, id",
    )?;
    let rows = stmt
        .query_map(params![proposal_id], PresentationRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ── Cache projections ──

pub fn upsert_presentation_cache(
    conn: &Connection,
    c: &PresentationCacheRow,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO presentation_cache (presentation_id, evaluator_name, status_label,
         marks_summary, applicant_summary, is_ready, is_complete, rebuilt_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(presentation_id) DO UPDATE SET evaluator_name = ?2, status_label = ?3,
         marks_summary = ?4, applicant_summary = ?5, is_ready = ?6, is_complete = ?7,
         rebuilt_at = ?8",
        params![
            c.presentation_id,
            c.evaluator_name,
            c.status_label,
            c.marks_summary,
            c.applicant_summary,
            c.is_ready as i64,
            c.is_complete as i64,
            c.rebuilt_at,
        ],
    )?;
    Ok(())
}

pub fn find_presentation_cache(
    conn: &Connection,
    presentation_id: &str,
) -> Result<Option<PresentationCacheRow>, DatabaseError> {
    let mut stmt = conn.prepare("SELECT * FROM presentation_cache WHERE presentation_id = ?1")?;
    let mut rows = stmt.query_map(params![presentation_id], PresentationCacheRow::from_row)?;
    match rows.next() {
        Some(Ok(row)) => Ok(Some(row)),
        Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
        None => Ok(None),
    }
}

pub fn upsert_proposal_cache(conn: &Connection, c: &ProposalCacheRow) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO proposal_presentation_cache (proposal_id, entries, average_marks,
         evaluated_count, rebuilt_at)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(proposal_id) DO UPDATE SET entries = ?2, average_marks = ?3,
         evaluated_count = ?4, rebuilt_at = ?5",
        params![
            c.proposal_id,
            c.entries,
            c.average_marks,
            c.evaluated_count,
            c.rebuilt_at,
        ],
    )?;
    Ok(())
}

pub fn find_proposal_cache(
    conn: &Connection,
    proposal_id: &str,
) -> Result<Option<ProposalCacheRow>, DatabaseError> {
    let mut stmt =
        conn.prepare("SELECT * FROM proposal_presentation_cache WHERE proposal_id = ?1")?;
    let mut rows = stmt.query_map(params![proposal_id], ProposalCacheRow::from_row)?;
    match rows.next() {
        Some(Ok(row)) => Ok(Some(row)),
        Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
        None => Ok(None),
    }
}
