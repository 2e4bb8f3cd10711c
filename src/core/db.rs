use crate::core::error;
use crate::core::schemas;
use rusqlite::Connection;
use std::path::{Path, PathBuf};

pub fn db_connect(db_path: &str) -> Result<Connection, error::AutomationError> {
    let conn = Connection::open(db_path)?;
    conn.busy_timeout(std::time::Duration::from_secs(5))
        .map_err(error::AutomationError::RusqliteError)?;
    conn.query_row("PRAGMA journal_mode=WAL;", [], |_| Ok(()))
        .map_err(error::AutomationError::RusqliteError)?;
    Ok(conn)
}

pub fn automation_db_path(data_dir: &Path) -> PathBuf {
    data_dir.join(schemas::AUTOMATION_DB_NAME)
}

/// Create every automation table if missing. Idempotent.
pub fn initialize_automation_db(conn: &Connection) -> Result<(), error::AutomationError> {
    for stmt in schemas::AUTOMATION_DB_SCHEMA_ALL {
        conn.execute(stmt, [])?;
    }
    Ok(())
}
