use anyhow::Result;
use rusqlite::Connection;

pub fn apply_pragmas(conn: &Connection) -> Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "temp_store", "MEMORY")?;
    conn.pragma_update(None, "busy_timeout", 5000i64)?;
    Ok(())
}

pub fn apply_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
CREATE TABLE IF NOT EXISTS event (
  event_id INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT,
  description TEXT NOT NULL,
  token TEXT NOT NULL,
  event_date TEXT NOT NULL,
  is_open INTEGER DEFAULT 0,
  creator TEXT
);

CREATE TABLE IF NOT EXISTS system_log (
  id INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT,
  timestamp DATETIME DEFAULT CURRENT_TIMESTAMP,
  level TEXT NOT NULL,
  module TEXT NOT NULL,
  action TEXT NOT NULL,
  user_id TEXT,
  event_id TEXT,
  ip_address TEXT,
  details TEXT
);
CREATE INDEX IF NOT EXISTS idx_system_log_timestamp ON system_log(timestamp);
"#,
    )?;
    Ok(())
}
