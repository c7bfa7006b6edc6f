//! Template repository — CRUD for the `templates` table.
//!
//! Functions take a `&Connection` so they compose inside service
//! transactions (a `Transaction` derefs to `Connection`).

use rusqlite::{params, Connection, Row};

use super::DatabaseError;

/// A raw template row from the database.
#[derive(Debug, Clone)]
pub struct TemplateRow {
    pub id: String,
    pub code: String,
    pub title: String,
    pub prefix: String,
    pub start_date: String,
    pub end_date: String,
    /// JSON array of section names required before submission.
    pub required_sections: String,
}

impl TemplateRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            code: row.get("code")?,
            title: row.get("title")?,
            prefix: row.get("prefix")?,
            start_date: row.get("start_date")?,
            end_date: row.get("end_date")?,
            required_sections: row.get("required_sections")?,
        })
    }

    /// Parses the required-section list out of its JSON column.
    pub fn required_section_names(&self) -> Vec<String> {
        serde_json::from_str(&self.required_sections).unwrap_or_default()
    }
}

pub fn insert(conn: &Connection, t: &TemplateRow) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO templates (id, code, title, prefix, start_date, end_date, required_sections)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            t.id,
            t.code,
            t.title,
            t.prefix,
            t.start_date,
            t.end_date,
            t.required_sections,
        ],
    )?;
    Ok(())
}

pub fn find_by_id(conn: &Connection, id: &str) -> Result<Option<TemplateRow>, DatabaseError> {
    let mut stmt = conn.prepare("SELECT * FROM templates WHERE id = ?1")?;
    let mut rows = stmt.query_map(params![id], TemplateRow::from_row)?;
    match rows.next() {
        Some(Ok(row)) => Ok(Some(row)),
        Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
        None => Ok(None),
    }
}

pub fn find_by_code(conn: &Connection, code: &str) -> Result<Option<TemplateRow>, DatabaseError> {
    let mut stmt = conn.prepare("SELECT * FROM templates WHERE code = ?1")?;
    let mut rows = stmt.query_map(params![code], TemplateRow::from_row)?;
    match rows.next() {
        Some(Ok(row)) => Ok(Some(row)),
        Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
        None => Ok(None),
    }
}
