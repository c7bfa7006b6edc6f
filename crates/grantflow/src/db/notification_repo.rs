//! Notification repository — in-app notification records with an
//! event-id uniqueness guard for at-least-once queue delivery.

use rusqlite::{params, Connection, Row};

use super::DatabaseError;

/// An in-app notification row.
#[derive(Debug, Clone)]
pub struct NotificationRow {
    pub id: String,
    /// Externally supplied idempotency key; UNIQUE in the table.
    pub event_id: String,
    pub user_id: String,
    pub message: String,
    pub notification_type: String,
    pub emailed: bool,
    pub created_at: String,
}

impl NotificationRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            event_id: row.get("event_id")?,
            user_id: row.get("user_id")?,
            message: row.get("message")?,
            notification_type: row.get("notification_type")?,
            emailed: row.get::<_, i64>("emailed")? != 0,
            created_at: row.get("created_at")?,
        })
    }
}

/// Inserts a notification unless one with the same event id already exists.
/// Returns whether a row was actually written.
pub fn insert_unique(conn: &Connection, n: &NotificationRow) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "INSERT OR IGNORE INTO notifications (id, event_id, user_id, message, notification_type,
         emailed, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            n.id,
            n.event_id,
            n.user_id,
            n.message,
            n.notification_type,
            n.emailed as i64,
            n.created_at,
        ],
    )?;
    Ok(changed > 0)
}

pub fn mark_emailed(conn: &Connection, id: &str) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE notifications SET emailed = 1 WHERE id = ?1",
        params![id],
    )?;
    Ok(())
}

pub fn list_for_user(conn: &Connection, user_id: &str) -> Result<Vec<NotificationRow>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT * FROM notifications WHERE user_id = ?1 ORDER BY created_at DESC, id DESC",
    )?;
    let rows = stmt
        .query_map(params![user_id], NotificationRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
