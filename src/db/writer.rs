use anyhow::Result;
use rusqlite::{params, Connection};

/// One activity-log row. `details` is stored as JSON text.
#[derive(Debug, Clone)]
pub struct Activity<'a> {
    pub level: &'a str,
    pub module: &'a str,
    pub action: &'a str,
    pub event_id: Option<i64>,
    pub details: Option<serde_json::Value>,
}

pub fn log_activity(conn: &Connection, activity: &Activity<'_>) -> Result<i64> {
    let details = activity.details.as_ref().map(|d| d.to_string());
    let event_id = activity.event_id.map(|id| id.to_string());
    conn.execute(
        "INSERT INTO system_log (level, module, action, event_id, details) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![activity.level, activity.module, activity.action, event_id, details],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Seeds a registry row. Event management lives outside this service; this is
/// used by tests and local bootstrapping.
pub fn insert_event(conn: &Connection, description: &str, token: &str, event_date: &str, is_open: bool) -> Result<i64> {
    conn.execute(
        "INSERT INTO event (description, token, event_date, is_open) VALUES (?1, ?2, ?3, ?4)",
        params![description, token, event_date, is_open as i64],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn set_event_open(conn: &Connection, event_id: i64, is_open: bool) -> Result<bool> {
    let updated = conn.execute(
        "UPDATE event SET is_open = ?1 WHERE event_id = ?2",
        params![is_open as i64, event_id],
    )?;
    Ok(updated > 0)
}
