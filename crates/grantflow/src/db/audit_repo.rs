//! Audit repository — append-only `audit_log` table.

use rusqlite::{params, Connection, Row};

use super::DatabaseError;

/// An immutable audit record.
#[derive(Debug, Clone)]
pub struct AuditRow {
    pub id: String,
    /// NULL when the owning user has been removed (nulled, not cascaded).
    pub actor_id: Option<String>,
    pub actor_name: String,
    pub action: String,
    pub entity_type: String,
    pub entity_id: String,
    pub label: String,
    pub snapshot: String,
    pub created_at: String,
}

impl AuditRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            actor_id: row.get("actor_id")?,
            actor_name: row.get("actor_name")?,
            action: row.get("action")?,
            entity_type: row.get("entity_type")?,
            entity_id: row.get("entity_id")?,
            label: row.get("label")?,
            snapshot: row.get("snapshot")?,
            created_at: row.get("created_at")?,
        })
    }
}

pub fn insert(conn: &Connection, a: &AuditRow) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO audit_log (id, actor_id, actor_name, action, entity_type, entity_id, label,
         snapshot, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            a.id,
            a.actor_id,
            a.actor_name,
            a.action,
            a.entity_type,
            a.entity_id,
            a.label,
            a.snapshot,
            a.created_at,
        ],
    )?;
    Ok(())
}

pub fn list_for_entity(
    conn: &Connection,
    entity_type: &str,
    entity_id: &str,
) -> Result<Vec<AuditRow>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT * FROM audit_log WHERE entity_type = ?1 AND entity_id = ?2
         ORDER BY created_at, id",
    )?;
    let rows = stmt
        .query_map(params![entity_type, entity_id], AuditRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn count_for_entity(
    conn: &Connection,
    entity_type: &str,
    entity_id: &str,
) -> Result<u64, DatabaseError> {
    let count: u64 = conn.query_row(
        "SELECT COUNT(*) FROM audit_log WHERE entity_type = ?1 AND entity_id = ?2",
        params![entity_type, entity_id],
        |r| r.get(0),
    )?;
    Ok(count)
}

/// Nulls the actor reference on audit rows owned by a removed user.
pub fn null_actor(conn: &Connection, actor_id: &str) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE audit_log SET actor_id = NULL WHERE actor_id = ?1",
        params![actor_id],
    )?;
    Ok(())
}
