use crate::core::db;
use crate::core::error;
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// The DB Broker is the thin interface every manager uses to reach the store.
///
/// It owns no connection between calls: each operation opens, runs, and drops
/// its own connection. There is no cross-process lock; rows are only ever
/// upserted or appended.
#[derive(Debug, Clone)]
pub struct DbBroker {
    db_path: PathBuf,
}

impl DbBroker {
    /// Open (and if needed create) the automation database under `data_dir`.
    ///
    /// Any failure comes back as [`error::AutomationError::StoreUnavailable`].
    pub fn open(data_dir: &Path) -> Result<Self, error::AutomationError> {
        Self::create(data_dir).map_err(|e| {
            error::AutomationError::StoreUnavailable(format!("{}: {}", data_dir.display(), e))
        })
    }

    fn create(data_dir: &Path) -> Result<Self, error::AutomationError> {
        std::fs::create_dir_all(data_dir)?;
        let db_path = db::automation_db_path(data_dir);
        let conn = db::db_connect(&db_path.to_string_lossy())?;
        db::initialize_automation_db(&conn)?;
        Ok(Self { db_path })
    }

    /// Like [`DbBroker::open`], but degrade to `None` instead of failing.
    ///
    /// Callers holding `None` run in memory-only mode.
    pub fn open_or_degrade(data_dir: &Path) -> Option<Self> {
        match Self::open(data_dir) {
            Ok(broker) => Some(broker),
            Err(e) => {
                warn!(
                    data_dir = %data_dir.display(),
                    error = %e,
                    "automation store unavailable, running in memory-only mode"
                );
                None
            }
        }
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Execute a closure with a fresh connection to the automation DB.
    pub fn with_conn<F, R>(&self, op_name: &str, f: F) -> Result<R, error::AutomationError>
    where
        F: FnOnce(&Connection) -> Result<R, error::AutomationError>,
    {
        let conn = db::db_connect(&self.db_path.to_string_lossy())?;
        let result = f(&conn);
        let status = if result.is_ok() { "success" } else { "error" };
        debug!(op = op_name, status, "broker op");
        result
    }

    /// Cheap connectivity probe used by health reporting.
    pub fn ping(&self) -> bool {
        self.with_conn("broker.ping", |conn| {
            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
            Ok(())
        })
        .is_ok()
    }
}
