//! Milestone repository — milestones, sub-milestones, document slots, and the
//! append-only history snapshots.

use rusqlite::{params, Connection, Row};

use super::DatabaseError;

/// A raw milestone row.
#[derive(Debug, Clone)]
pub struct MilestoneRow {
    pub id: String,
    pub proposal_id: String,
    pub title: String,
    pub status: String,
    pub requested_amount: f64,
    pub revised_amount: Option<f64>,
    pub starts_on: Option<String>,
    pub ends_on: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl MilestoneRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            proposal_id: row.get("proposal_id")?,
            title: row.get("title")?,
            status: row.get("status")?,
            requested_amount: row.get("requested_amount")?,
            revised_amount: row.get("revised_amount")?,
            starts_on: row.get("starts_on")?,
            ends_on: row.get("ends_on")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct SubMilestoneRow {
    pub id: String,
    pub milestone_id: String,
    pub title: String,
    pub status: String,
    pub requested_amount: f64,
    pub created_at: String,
}

impl SubMilestoneRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            milestone_id: row.get("milestone_id")?,
            title: row.get("title")?,
            status: row.get("status")?,
            requested_amount: row.get("requested_amount")?,
            created_at: row.get("created_at")?,
        })
    }
}

/// One document slot per category per milestone.
#[derive(Debug, Clone)]
pub struct DocumentRow {
    pub id: String,
    pub milestone_id: String,
    pub category: String,
    pub file_path: String,
    pub status: String,
    pub remarks: Option<String>,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<String>,
    pub created_at: String,
}

impl DocumentRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            milestone_id: row.get("milestone_id")?,
            category: row.get("category")?,
            file_path: row.get("file_path")?,
            status: row.get("status")?,
            remarks: row.get("remarks")?,
            reviewed_by: row.get("reviewed_by")?,
            reviewed_at: row.get("reviewed_at")?,
            created_at: row.get("created_at")?,
        })
    }
}

/// Immutable snapshot row; the audit trail for renegotiated milestones.
#[derive(Debug, Clone)]
pub struct HistoryRow {
    pub id: String,
    pub milestone_id: String,
    pub snapshot: String,
    pub created_at: String,
}

impl HistoryRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            milestone_id: row.get("milestone_id")?,
            snapshot: row.get("snapshot")?,
            created_at: row.get("created_at")?,
        })
    }
}

pub fn insert(conn: &Connection, m: &MilestoneRow) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO milestones (id, proposal_id, title, status, requested_amount, revised_amount,
         starts_on, ends_on, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            m.id,
            m.proposal_id,
            m.title,
            m.status,
            m.requested_amount,
            m.revised_amount,
            m.starts_on,
            m.ends_on,
            m.created_at,
            m.updated_at,
        ],
    )?;
    Ok(())
}

/// Overwrites the financial/time fields of a milestone. Callers append a
/// history snapshot in the same transaction.
pub fn update(conn: &Connection, m: &MilestoneRow) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE milestones SET title = ?2, status = ?3, requested_amount = ?4,
         revised_amount = ?5, starts_on = ?6, ends_on = ?7, updated_at = ?8
         WHERE id = ?1",
        params![
            m.id,
            m.title,
            m.status,
            m.requested_amount,
            m.revised_amount,
            m.starts_on,
            m.ends_on,
            m.updated_at,
        ],
    )?;
    Ok(())
}

pub fn find_by_id(conn: &Connection, id: &str) -> Result<Option<MilestoneRow>, DatabaseError> {
    let mut stmt = conn.prepare("SELECT * FROM milestones WHERE id = ?1")?;
    let mut rows = stmt.query_map(params![id], MilestoneRow::from_row)?;
    match rows.next() {
        Some(Ok(row)) => Ok(Some(row)),
        Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
        None => Ok(None),
    }
}

/// Milestones of a proposal in creation order; index + 1 is the ordinal the
/// finance chain validates against.
pub fn list_by_proposal(
    conn: &Connection,
    proposal_id: &str,
) -> Result<Vec<MilestoneRow>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT * FROM milestones WHERE proposal_id = ?1 ORDER BY created_at, id",
    )?;
    let rows = stmt
        .query_map(params![proposal_id], MilestoneRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ── Sub-milestones ──

pub fn insert_sub(conn: &Connection, s: &SubMilestoneRow) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO sub_milestones (id, milestone_id, title, status, requested_amount, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![s.id, s.milestone_id, s.title, s.status, s.requested_amount, s.created_at],
    )?;
    Ok(())
}

pub fn find_sub_by_id(conn: &Connection, id: &str) -> Result<Option<SubMilestoneRow>, DatabaseError> {
    let mut stmt = conn.prepare("SELECT * FROM sub_milestones WHERE id = ?1")?;
    let mut rows = stmt.query_map(params![id], SubMilestoneRow::from_row)?;
    match rows.next() {
        Some(Ok(row)) => Ok(Some(row)),
        Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
        None => Ok(None),
    }
}

// ── Documents ──

pub fn insert_document(conn: &Connection, d: &DocumentRow) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO milestone_documents (id, milestone_id, category, file_path, status, remarks,
         reviewed_by, reviewed_at, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            d.id,
            d.milestone_id,
            d.category,
            d.file_path,
            d.status,
            d.remarks,
            d.reviewed_by,
            d.reviewed_at,
            d.created_at,
        ],
    )?;
    Ok(())
}

pub fn find_document(conn: &Connection, id: &str) -> Result<Option<DocumentRow>, DatabaseError> {
    let mut stmt = conn.prepare("SELECT * FROM milestone_documents WHERE id = ?1")?;
    let mut rows = stmt.query_map(params![id], DocumentRow::from_row)?;
    match rows.next() {
        Some(Ok(row)) => Ok(Some(row)),
        Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
        None => Ok(None),
    }
}

pub fn update_document_review(
    conn: &Connection,
    id: &str,
    status: &str,
    remarks: Option<&str>,
    reviewed_by: &str,
    reviewed_at: &str,
) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE milestone_documents SET status = ?2, remarks = ?3, reviewed_by = ?4,
         reviewed_at = ?5 WHERE id = ?1",
        params![id, status, remarks, reviewed_by, reviewed_at],
    )?;
    Ok(())
}

pub fn list_documents(
    conn: &Connection,
    milestone_id: &str,
) -> Result<Vec<DocumentRow>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT * FROM milestone_documents WHERE milestone_id = ?1 ORDER BY category",
    )?;
    let rows = stmt
        .query_map(params![milestone_id], DocumentRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ── History ──

pub fn insert_history(conn: &Connection, h: &HistoryRow) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO milestone_history (id, milestone_id, snapshot, created_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![h.id, h.milestone_id, h.snapshot, h.created_at],
    )?;
    Ok(())
}

pub fn list_history(
    conn: &Connection,
    milestone_id: &str,
) -> Result<Vec<HistoryRow>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT * FROM milestone_history WHERE milestone_id = ?1 ORDER BY created_at, id",
    )?;
    let rows = stmt
        .query_map(params![milestone_id], HistoryRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
