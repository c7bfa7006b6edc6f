//! Evaluation repository — screening records, evaluation rounds, per-criterion
//! marks, and per-template cutoffs.

use rusqlite::{params, Connection, Row};

use super::DatabaseError;

/// A screening decision row (admin or technical).
#[derive(Debug, Clone)]
pub struct ScreeningRow {
    pub id: String,
    pub proposal_id: String,
    pub kind: String,
    pub decision: String,
    pub remarks: Option<String>,
    pub reviewer_id: String,
    pub reviewer_name: String,
    pub created_at: String,
}

impl ScreeningRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            proposal_id: row.get("proposal_id")?,
            kind: row.get("kind")?,
            decision: row.get("decision")?,
            remarks: row.get("remarks")?,
            reviewer_id: row.get("reviewer_id")?,
            reviewer_name: row.get("reviewer_name")?,
            created_at: row.get("created_at")?,
        })
    }
}

/// An evaluation round aggregating evaluator marks into one decision.
#[derive(Debug, Clone)]
pub struct RoundRow {
    pub id: String,
    pub proposal_id: String,
    pub overall_decision: String,
    pub created_at: String,
    pub closed_at: Option<String>,
}

impl RoundRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            proposal_id: row.get("proposal_id")?,
            overall_decision: row.get("overall_decision")?,
            created_at: row.get("created_at")?,
            closed_at: row.get("closed_at")?,
        })
    }
}

/// One evaluator's marks for one criterion within a round.
#[derive(Debug, Clone)]
pub struct CriteriaRow {
    pub id: String,
    pub round_id: String,
    pub evaluator_id: String,
    pub criterion: String,
    pub marks: f64,
    pub remarks: Option<String>,
    pub created_at: String,
}

impl CriteriaRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            round_id: row.get("round_id")?,
            evaluator_id: row.get("evaluator_id")?,
            criterion: row.get("criterion")?,
            marks: row.get("marks")?,
            remarks: row.get("remarks")?,
            created_at: row.get("created_at")?,
        })
    }
}

pub fn insert_screening(conn: &Connection, s: &ScreeningRow) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO screening_records (id, proposal_id, kind, decision, remarks, reviewer_id,
         reviewer_name, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            s.id,
            s.proposal_id,
            s.kind,
            s.decision,
            s.remarks,
            s.reviewer_id,
            s.reviewer_name,
            s.created_at,
        ],
    )?;
    Ok(())
}

/// Most recent screening record of the given kind for a proposal.
pub fn latest_screening(
    conn: &Connection,
    proposal_id: &str,
    kind: &str,
) -> Result<Option<ScreeningRow>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT * FROM screening_records WHERE proposal_id = ?1 AND kind = ?2
         ORDER BY created_at DESC, id DESC LIMIT 1",
    )?;
    let mut rows = stmt.query_map(params![proposal_id, kind], ScreeningRow::from_row)?;
    match rows.next() {
        Some(Ok(row)) => Ok(Some(row)),
        Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
        None => Ok(None),
    }
}

pub fn insert_round(conn: &Connection, r: &RoundRow) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO evaluation_rounds (id, proposal_id, overall_decision, created_at, closed_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![r.id, r.proposal_id, r.overall_decision, r.created_at, r.closed_at],
    )?;
    Ok(())
}

pub fn find_round(conn: &Connection, id: &str) -> Result<Option<RoundRow>, DatabaseError> {
    let mut stmt = conn.prepare("SELECT * FROM evaluation_rounds WHERE id = ?1")?;
    let mut rows = stmt.query_map(params![id], RoundRow::from_row)?;
    match rows.next() {
        Some(Ok(row)) => Ok(Some(row)),
        Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
        None => Ok(None),
    }
}

/// Most recent round for a proposal.
pub fn latest_round(
    conn: &Connection,
    proposal_id: &str,
) -> Result<Option<RoundRow>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT * FROM evaluation_rounds WHERE proposal_id = ?1
         ORDER BY created_at DESC, id DESC LIMIT 1",
    )?;
    let mut rows = stmt.query_map(params![proposal_id], RoundRow::from_row)?;
    match rows.next() {
        Some(Ok(row)) => Ok(Some(row)),
        Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
        None => Ok(None),
    }
}

pub fn close_round(
    conn: &Connection,
    id: &str,
    overall_decision: &str,
    closed_at: &str,
) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE evaluation_rounds SET overall_decision = ?2, closed_at = ?3 WHERE id = ?1",
        params![id, overall_decision, closed_at],
    )?;
    Ok(())
}

pub fn upsert_criteria(conn: &Connection, c: &CriteriaRow) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO criteria_evaluations (id, round_id, evaluator_id, criterion, marks, remarks,
         created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(round_id, evaluator_id, criterion)
         DO UPDATE SET marks = ?5, remarks = ?6",
        params![
            c.id,
            c.round_id,
            c.evaluator_id,
            c.criterion,
            c.marks,
            c.remarks,
            c.created_at,
        ],
    )?;
    Ok(())
}

pub fn list_criteria_for_round(
    conn: &Connection,
    round_id: &str,
) -> Result<Vec<CriteriaRow>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT * FROM criteria_evaluations WHERE round_id = ?1 ORDER BY evaluator_id, criterion",
    )?;
    let rows = stmt
        .query_map(params![round_id], CriteriaRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ── Cutoffs ──

pub fn set_cutoff(conn: &Connection, template_id: &str, min_score: f64) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO evaluation_cutoffs (template_id, min_score) VALUES (?1, ?2)
         ON CONFLICT(template_id) DO UPDATE SET min_score = ?2",
        params![template_id, min_score],
    )?;
    Ok(())
}

pub fn find_cutoff(conn: &Connection, template_id: &str) -> Result<Option<f64>, DatabaseError> {
    let mut stmt = conn.prepare("SELECT min_score FROM evaluation_cutoffs WHERE template_id = ?1")?;
    let mut rows = stmt.query_map(params![template_id], |r| r.get::<_, f64>(0))?;
    match rows.next() {
        Some(Ok(v)) => Ok(Some(v)),
        Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
        None => Ok(None),
    }
}
