use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;

/// The two registry facts the face pipeline consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EventGate {
    pub event_id: i64,
    pub is_open: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub id: i64,
    pub timestamp: String,
    pub level: String,
    pub module: String,
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

#[derive(Debug, Default, Clone)]
pub struct LogFilter {
    pub level: Option<String>,
    pub module: Option<String>,
    /// Inclusive bounds compared against the stored `timestamp` text.
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

pub fn get_event_gate(conn: &Connection, event_id: i64) -> Result<Option<EventGate>> {
    let gate = conn
        .query_row(
            "SELECT event_id, is_open FROM event WHERE event_id = ?1",
            params![event_id],
            |row| {
                Ok(EventGate {
                    event_id: row.get(0)?,
                    is_open: row.get::<_, Option<i64>>(1)?.unwrap_or(0) != 0,
                })
            },
        )
        .optional()?;
    Ok(gate)
}

fn row_to_log(row: &Row<'_>) -> rusqlite::Result<LogEntry> {
    let details: Option<String> = row.get("details")?;
    Ok(LogEntry {
        id: row.get("id")?,
        timestamp: row.get("timestamp")?,
        level: row.get("level")?,
        module: row.get("module")?,
        action: row.get("action")?,
        user_id: row.get("user_id")?,
        event_id: row.get("event_id")?,
        ip_address: row.get("ip_address")?,
        details: details.and_then(|d| serde_json::from_str(&d).ok()),
    })
}

/// Newest first. `page` is 1-based.
pub fn list_logs(conn: &Connection, filter: &LogFilter, page: i64, per_page: i64) -> Result<(Vec<LogEntry>, i64)> {
    let mut where_sql = String::from(" WHERE 1=1");
    let mut args: Vec<String> = Vec::new();
    if let Some(level) = &filter.level {
        where_sql.push_str(" AND level = ?");
        args.push(level.clone());
    }
    if let Some(module) = &filter.module {
        where_sql.push_str(" AND module = ?");
        args.push(module.clone());
    }
    if let Some(start) = &filter.start_date {
        where_sql.push_str(" AND timestamp >= ?");
        args.push(start.clone());
    }
    if let Some(end) = &filter.end_date {
        where_sql.push_str(" AND timestamp <= ?");
        args.push(end.clone());
    }

    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM system_log{}", where_sql),
        rusqlite::params_from_iter(args.iter()),
        |r| r.get(0),
    )?;

    let offset = (page.max(1) - 1) * per_page;
    let sql = format!(
        "SELECT id, timestamp, level, module, action, user_id, event_id, ip_address, details
         FROM system_log{} ORDER BY timestamp DESC, id DESC LIMIT {} OFFSET {}",
        where_sql, per_page, offset
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(rusqlite::params_from_iter(args.iter()), row_to_log)?;
    let mut out = Vec::new();
    for r in rows { out.push(r?); }
    Ok((out, total))
}
