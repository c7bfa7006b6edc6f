//! Finance repository — the request → claim → sanction chain tables.

use rusqlite::{params, Connection, Row};

use super::DatabaseError;

/// A finance request row, first tier of the chain.
#[derive(Debug, Clone)]
pub struct RequestRow {
    pub id: String,
    pub milestone_id: String,
    pub amount: f64,
    pub status: String,
    pub remark: Option<String>,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<String>,
    pub created_at: String,
}

impl RequestRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            milestone_id: row.get("milestone_id")?,
            amount: row.get("amount")?,
            status: row.get("status")?,
            remark: row.get("remark")?,
            reviewed_by: row.get("reviewed_by")?,
            reviewed_at: row.get("reviewed_at")?,
            created_at: row.get("created_at")?,
        })
    }
}

/// A payment claim row, second tier; references exactly one of
/// milestone / sub-milestone.
#[derive(Debug, Clone)]
pub struct ClaimRow {
    pub id: String,
    pub request_id: String,
    pub milestone_id: Option<String>,
    pub sub_milestone_id: Option<String>,
    pub amount: f64,
    pub advance_payment: bool,
    pub penalty: f64,
    pub adjustment: f64,
    pub status: String,
    pub remark: Option<String>,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<String>,
    pub created_at: String,
}

impl ClaimRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            request_id: row.get("request_id")?,
            milestone_id: row.get("milestone_id")?,
            sub_milestone_id: row.get("sub_milestone_id")?,
            amount: row.get("amount")?,
            advance_payment: row.get::<_, i64>("advance_payment")? != 0,
            penalty: row.get("penalty")?,
            adjustment: row.get("adjustment")?,
            status: row.get("status")?,
            remark: row.get("remark")?,
            reviewed_by: row.get("reviewed_by")?,
            reviewed_at: row.get("reviewed_at")?,
            created_at: row.get("created_at")?,
        })
    }
}

/// A finance sanction row, final tier.
#[derive(Debug, Clone)]
pub struct SanctionRow {
    pub id: String,
    pub claim_id: String,
    pub amount: f64,
    pub status: String,
    pub remark: Option<String>,
    pub sanctioned_by: Option<String>,
    pub sanctioned_at: Option<String>,
    pub created_at: String,
}

impl SanctionRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            claim_id: row.get("claim_id")?,
            amount: row.get("amount")?,
            status: row.get("status")?,
            remark: row.get("remark")?,
            sanctioned_by: row.get("sanctioned_by")?,
            sanctioned_at: row.get("sanctioned_at")?,
            created_at: row.get("created_at")?,
        })
    }
}

pub fn insert_request(conn: &Connection, r: &RequestRow) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO finance_requests (id, milestone_id, amount, status, remark, reviewed_by,
         reviewed_at, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            r.id,
            r.milestone_id,
            r.amount,
            r.status,
            r.remark,
            r.reviewed_by,
            r.reviewed_at,
            r.created_at,
        ],
    )?;
    Ok(())
}

pub fn find_request(conn: &Connection, id: &str) -> Result<Option<RequestRow>, DatabaseError> {
    let mut stmt = conn.prepare("SELECT * FROM finance_requests WHERE id = ?1")?;
    let mut rows = stmt.query_map(params![id], RequestRow::from_row)?;
    match rows.next() {
        Some(Ok(row)) => Ok(Some(row)),
        Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
        None => Ok(None),
    }
}

pub fn review_request(
    conn: &Connection,
    id: &str,
    status: &str,
    remark: Option<&str>,
    reviewed_by: &str,
    reviewed_at: &str,
) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE finance_requests SET status = ?2, remark = ?3, reviewed_by = ?4, reviewed_at = ?5
         WHERE id = ?1",
        params![id, status, remark, reviewed_by, reviewed_at],
    )?;
    Ok(())
}

pub fn insert_claim(conn: &Connection, c: &ClaimRow) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO payment_claims (id, request_id, milestone_id, sub_milestone_id, amount,
         advance_payment, penalty, adjustment, status, remark, reviewed_by, reviewed_at, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        params![
            c.id,
            c.request_id,
            c.milestone_id,
            c.sub_milestone_id,
            c.amount,
            c.advance_payment as i64,
            c.penalty,
            c.adjustment,
            c.status,
            c.remark,
            c.reviewed_by,
            c.reviewed_at,
            c.created_at,
        ],
    )?;
    Ok(())
}

pub fn find_claim(conn: &Connection, id: &str) -> Result<Option<ClaimRow>, DatabaseError> {
    let mut stmt = conn.prepare("SELECT * FROM payment_claims WHERE id = ?1")?;
    let mut rows = stmt.query_map(params![id], ClaimRow::from_row)?;
    match rows.next() {
        Some(Ok(row)) => Ok(Some(row)),
        Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
        None => Ok(None),
    }
}

pub fn review_claim(
    conn: &Connection,
    id: &str,
    status: &str,
    remark: Option<&str>,
    reviewed_by: &str,
    reviewed_at: &str,
) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE payment_claims SET status = ?2, remark = ?3, reviewed_by = ?4, reviewed_at = ?5
         WHERE id = ?1",
        params![id, status, remark, reviewed_by, reviewed_at],
    )?;
    Ok(())
}

pub fn insert_sanction(conn: &Connection, s: &SanctionRow) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO finance_sanctions (id, claim_id, amount, status, remark, sanctioned_by,
         sanctioned_at, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            s.id,
            s.claim_id,
            s.amount,
            s.status,
            s.remark,
            s.sanctioned_by,
            s.sanctioned_at,
            s.created_at,
        ],
    )?;
    Ok(())
}

pub fn find_sanction(conn: &Connection, id: &str) -> Result<Option<SanctionRow>, DatabaseError> {
    let mut stmt = conn.prepare("SELECT * FROM finance_sanctions WHERE id = ?1")?;
    let mut rows = stmt.query_map(params![id], SanctionRow::from_row)?;
    match rows.next() {
        Some(Ok(row)) => Ok(Some(row)),
        Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
        None => Ok(None),
    }
}

pub fn review_sanction(
    conn: &Connection,
    id: &str,
    status: &str,
    remark: Option<&str>,
    sanctioned_by: &str,
    sanctioned_at: &str,
) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE finance_sanctions SET status = ?2, remark = ?3, sanctioned_by = ?4,
         sanctioned_at = ?5 WHERE id = ?1",
        params![id, status, remark, sanctioned_by, sanctioned_at],
    )?;
    Ok(())
}

/// Claims raised against a milestone or any of its sub-milestones.
pub fn list_claims_for_milestone(
    conn: &Connection,
    milestone_id: &str,
) -> Result<Vec<ClaimRow>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT c.* FROM payment_claims c
         LEFT JOIN sub_milestones s ON s.id = c.sub_milestone_id
         WHERE c.milestone_id = ?1 OR s.milestone_id = ?1
         ORDER BY c.created_at, c.id",
    )?;
    let rows = stmt
        .query_map(params![milestone_id], ClaimRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
