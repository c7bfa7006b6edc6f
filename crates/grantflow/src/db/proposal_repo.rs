//! Proposal repository — proposals, sections, collaborators, stage history,
//! and the proposal-code sequence counter.

use rusqlite::{params, Connection, Row};

use super::DatabaseError;

/// A raw proposal row from the database.
#[derive(Debug, Clone)]
pub struct ProposalRow {
    pub id: String,
    pub template_id: String,
    pub applicant_id: String,
    pub applicant_name: String,
    pub applicant_email: String,
    pub cohort: String,
    pub stage: String,
    /// Human-readable proposal code; NULL until first successful submission.
    pub code: Option<String>,
    pub pdf_path: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl ProposalRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            template_id: row.get("template_id")?,
            applicant_id: row.get("applicant_id")?,
            applicant_name: row.get("applicant_name")?,
            applicant_email: row.get("applicant_email")?,
            cohort: row.get("cohort")?,
            stage: row.get("stage")?,
            code: row.get("code")?,
            pdf_path: row.get("pdf_path")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

/// A per-section payload row.
#[derive(Debug, Clone)]
pub struct SectionRow {
    pub proposal_id: String,
    pub name: String,
    pub payload: String,
    pub completed: bool,
    pub updated_at: String,
}

impl SectionRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            proposal_id: row.get("proposal_id")?,
            name: row.get("name")?,
            payload: row.get("payload")?,
            completed: row.get::<_, i64>("completed")? != 0,
            updated_at: row.get("updated_at")?,
        })
    }
}

/// A declared collaborator row.
#[derive(Debug, Clone)]
pub struct CollaboratorRow {
    pub id: String,
    pub proposal_id: String,
    pub organization_name: String,
    pub registration_no: String,
}

impl CollaboratorRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            proposal_id: row.get("proposal_id")?,
            organization_name: row.get("organization_name")?,
            registration_no: row.get("registration_no")?,
        })
    }
}

/// An append-only stage history row.
#[derive(Debug, Clone)]
pub struct StageHistoryRow {
    pub id: String,
    pub proposal_id: String,
    pub from_stage: Option<String>,
    pub to_stage: String,
    pub actor_id: String,
    pub actor_name: String,
    pub note: Option<String>,
    pub changed_at: String,
}

impl StageHistoryRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            proposal_id: row.get("proposal_id")?,
            from_stage: row.get("from_stage")?,
            to_stage: row.get("to_stage")?,
            actor_id: row.get("actor_id")?,
            actor_name: row.get("actor_name")?,
            note: row.get("note")?,
            changed_at: row.get("changed_at")?,
        })
    }
}

pub fn insert(conn: &Connection, p: &ProposalRow) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO proposals (id, template_id, applicant_id, applicant_name, applicant_email,
         cohort, stage, code, pdf_path, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            p.id,
            p.template_id,
            p.applicant_id,
            p.applicant_name,
            p.applicant_email,
            p.cohort,
            p.stage,
            p.code,
            p.pdf_path,
            p.created_at,
            p.updated_at,
        ],
    )?;
    Ok(())
}

pub fn find_by_id(conn: &Connection, id: &str) -> Result<Option<ProposalRow>, DatabaseError> {
    let mut stmt = conn.prepare("SELECT * FROM proposals WHERE id = ?1")?;
    let mut rows = stmt.query_map(params![id], ProposalRow::from_row)?;
    match rows.next() {
        Some(Ok(row)) => Ok(Some(row)),
        Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
        None => Ok(None),
    }
}

pub fn update_stage(
    conn: &Connection,
    id: &str,
    stage: &str,
    updated_at: &str,
) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE proposals SET stage = ?2, updated_at = ?3 WHERE id = ?1",
        params![id, stage, updated_at],
    )?;
    Ok(())
}

/// Assigns the proposal code. The `code IS NULL` guard makes the write a
/// no-op when a code already exists; returns whether a row was changed.
pub fn assign_code(conn: &Connection, id: &str, code: &str) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE proposals SET code = ?2 WHERE id = ?1 AND code IS NULL",
        params![id, code],
    )?;
    Ok(changed > 0)
}

pub fn set_pdf_path(conn: &Connection, id: &str, pdf_path: &str) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE proposals SET pdf_path = ?2 WHERE id = ?1",
        params![id, pdf_path],
    )?;
    Ok(())
}

/// Submitted proposals whose one-shot PDF render has not landed yet.
pub fn list_pending_renders(conn: &Connection) -> Result<Vec<ProposalRow>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT * FROM proposals WHERE stage != 'draft' AND pdf_path IS NULL ORDER BY created_at",
    )?;
    let rows = stmt
        .query_map([], ProposalRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Deletes a proposal row. Callers enforce the drafts-only rule.
pub fn delete(conn: &Connection, id: &str) -> Result<(), DatabaseError> {
    conn.execute("DELETE FROM proposals WHERE id = ?1", params![id])?;
    Ok(())
}

// ── Sections ──

pub fn upsert_section(conn: &Connection, s: &SectionRow) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO proposal_sections (proposal_id, name, payload, completed, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(proposal_id, name)
         DO UPDATE SET payload = ?3, completed = ?4, updated_at = ?5",
        params![
            s.proposal_id,
            s.name,
            s.payload,
            s.completed as i64,
            s.updated_at
        ],
    )?;
    Ok(())
}

pub fn find_section(
    conn: &Connection,
    proposal_id: &str,
    name: &str,
) -> Result<Option<SectionRow>, DatabaseError> {
    let mut stmt =
        conn.prepare("SELECT * FROM proposal_sections WHERE proposal_id = ?1 AND name = ?2")?;
    let mut rows = stmt.query_map(params![proposal_id, name], SectionRow::from_row)?;
    match rows.next() {
        Some(Ok(row)) => Ok(Some(row)),
        Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
        None => Ok(None),
    }
}

pub fn list_sections(conn: &Connection, proposal_id: &str) -> Result<Vec<SectionRow>, DatabaseError> {
    let mut stmt =
        conn.prepare("SELECT * FROM proposal_sections WHERE proposal_id = ?1 ORDER BY name")?;
    let rows = stmt
        .query_map(params![proposal_id], SectionRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ── Collaborators ──

pub fn insert_collaborator(conn: &Connection, c: &CollaboratorRow) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO collaborators (id, proposal_id, organization_name, registration_no)
         VALUES (?1, ?2, ?3, ?4)",
        params![c.id, c.proposal_id, c.organization_name, c.registration_no],
    )?;
    Ok(())
}

pub fn list_collaborators(
    conn: &Connection,
    proposal_id: &str,
) -> Result<Vec<CollaboratorRow>, DatabaseError> {
    let mut stmt = conn.prepare("SELECT * FROM collaborators WHERE proposal_id = ?1")?;
    let rows = stmt
        .query_map(params![proposal_id], CollaboratorRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Collaborators declared by *other* submitted proposals in the same cohort.
/// Drafts do not participate in the uniqueness gate.
pub fn list_cohort_collaborators(
    conn: &Connection,
    cohort: &str,
    exclude_proposal: &str,
) -> Result<Vec<CollaboratorRow>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT c.* FROM collaborators c
         JOIN proposals p ON p.id = c.proposal_id
         WHERE p.cohort = ?1 AND p.stage != 'draft' AND p.id != ?2",
    )?;
    let rows = stmt
        .query_map(params![cohort, exclude_proposal], CollaboratorRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ── Stage history ──

pub fn insert_stage_history(conn: &Connection, h: &StageHistoryRow) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO stage_history (id, proposal_id, from_stage, to_stage, actor_id, actor_name,
         note, changed_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            h.id,
            h.proposal_id,
            h.from_stage,
            h.to_stage,
            h.actor_id,
            h.actor_name,
            h.note,
            h.changed_at,
        ],
    )?;
    Ok(())
}

pub fn list_stage_history(
    conn: &Connection,
    proposal_id: &str,
) -> Result<Vec<StageHistoryRow>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT * FROM stage_history WHERE proposal_id = ?1 ORDER BY changed_at, id",
    )?;
    let rows = stmt
        .query_map(params![proposal_id], StageHistoryRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ── Code sequence ──

/// Allocates the next sequence number for (template_code, year).
///
/// Must be called inside the submission transaction: the UPSERT + read pair
/// is the atomic counter that replaces the racy count-then-format pattern.
pub fn next_code_seq(
    conn: &Connection,
    template_code: &str,
    year: i32,
) -> Result<u32, DatabaseError> {
    conn.execute(
        "INSERT INTO code_sequences (template_code, year, next_seq) VALUES (?1, ?2, 1)
         ON CONFLICT(template_code, year) DO NOTHING",
        params![template_code, year],
    )?;
    conn.execute(
        "UPDATE code_sequences SET next_seq = next_seq + 1
         WHERE template_code = ?1 AND year = ?2",
        params![template_code, year],
    )?;
    let allocated: u32 = conn.query_row(
        "SELECT next_seq - 1 FROM code_sequences WHERE template_code = ?1 AND year = ?2",
        params![template_code, year],
        |r| r.get(0),
    )?;
    Ok(allocated)
}
