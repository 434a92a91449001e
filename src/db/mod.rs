pub mod schema;
pub mod writer;
pub mod query;

use anyhow::Result;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use std::path::Path;
use tracing::warn;

pub use query::EventGate;

pub type DbPool = r2d2::Pool<SqliteConnectionManager>;

pub fn open_or_create<P: AsRef<Path>>(db_path: P) -> Result<Connection> {
    let conn = Connection::open(db_path)?;
    schema::apply_pragmas(&conn)?;
    schema::apply_schema(&conn)?;
    Ok(conn)
}

/// Opens (creating if needed) the database and returns a pool over it.
pub fn create_pool<P: AsRef<Path>>(db_path: P, max_size: u32) -> Result<DbPool> {
    if let Some(parent) = db_path.as_ref().parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    // Schema once up front; pooled connections only need pragmas.
    drop(open_or_create(db_path.as_ref())?);
    let manager = SqliteConnectionManager::file(db_path.as_ref()).with_init(|c| {
        c.execute_batch("PRAGMA synchronous = NORMAL; PRAGMA temp_store = MEMORY; PRAGMA busy_timeout = 5000;")
    });
    let pool = r2d2::Pool::builder().max_size(max_size).build(manager)?;
    Ok(pool)
}

/// Read side of the event registry: existence and open/closed state.
pub trait EventRegistry: Send + Sync {
    fn lookup(&self, event_id: i64) -> Result<Option<EventGate>>;
}

#[derive(Clone)]
pub struct SqliteRegistry {
    pool: DbPool,
}

impl SqliteRegistry {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

impl EventRegistry for SqliteRegistry {
    fn lookup(&self, event_id: i64) -> Result<Option<EventGate>> {
        let conn = self.pool.get()?;
        query::get_event_gate(&conn, event_id)
    }
}

/// Best-effort writer for `system_log` rows. Failures are logged and dropped.
#[derive(Clone)]
pub struct ActivityLog {
    pool: Option<DbPool>,
}

impl ActivityLog {
    pub fn new(pool: DbPool) -> Self {
        Self { pool: Some(pool) }
    }

    /// A log that records nothing; used where no database is attached.
    pub fn disabled() -> Self {
        Self { pool: None }
    }

    pub fn info(&self, module: &str, action: &str, event_id: i64, details: serde_json::Value) {
        self.record("INFO", module, action, event_id, details);
    }

    pub fn error(&self, module: &str, action: &str, event_id: i64, details: serde_json::Value) {
        self.record("ERROR", module, action, event_id, details);
    }

    fn record(&self, level: &str, module: &str, action: &str, event_id: i64, details: serde_json::Value) {
        let Some(pool) = &self.pool else { return };
        let activity = writer::Activity { level, module, action, event_id: Some(event_id), details: Some(details) };
        let result = pool.get().map_err(anyhow::Error::from).and_then(|conn| writer::log_activity(&conn, &activity));
        if let Err(e) = result {
            warn!(event_id, action, "failed to write activity log: {}", e);
        }
    }
}
