//! Execution lifecycle, key/value state, and rule check history.
//!
//! Every operation degrades instead of failing when the store is unreachable:
//! executions get the sentinel id 0, state lives in memory, and status reports
//! zeroed statistics with the store marked unavailable.

use crate::core::broker::DbBroker;
use crate::core::config::HealthConfig;
use crate::core::error;
use crate::core::store::Store;
use crate::core::time;
use clap::{Parser, Subcommand};
use rusqlite::{OptionalExtension, params};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Execution id handed out when nothing can be persisted.
pub const SENTINEL_EXECUTION_ID: i64 = 0;

const ABANDONED_MESSAGE: &str = "abandoned";

/// Typed key into `automationstate`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StateKey {
    /// Completion time of a task's last successful run.
    TaskLastRun(String),
    /// Per-check verdict map of one analyzer.
    AnalyzerChecks(String),
    /// Files seen deleted, with the time each deletion was first recorded.
    RemovedFiles,
    Custom(String),
}

impl StateKey {
    pub const LAST_RUN_PREFIX: &'static str = "cache.last_run.";
    pub const ANALYZER_PREFIX: &'static str = "analyzer.";
    pub const ANALYZER_SUFFIX: &'static str = ".checks";
    pub const REMOVED_FILES_KEY: &'static str = "cache.removed_files";
    /// Prefixes wiped by a full cache clear.
    pub const CACHE_NAMESPACES: &'static [&'static str] = &["cache.", "analyzer."];

    pub fn parse(raw: &str) -> Self {
        if raw == Self::REMOVED_FILES_KEY {
            return StateKey::RemovedFiles;
        }
        if let Some(task) = raw.strip_prefix(Self::LAST_RUN_PREFIX) {
            if !task.is_empty() {
                return StateKey::TaskLastRun(task.to_string());
            }
        }
        if let Some(name) = raw
            .strip_prefix(Self::ANALYZER_PREFIX)
            .and_then(|rest| rest.strip_suffix(Self::ANALYZER_SUFFIX))
        {
            if !name.is_empty() {
                return StateKey::AnalyzerChecks(name.to_string());
            }
        }
        StateKey::Custom(raw.to_string())
    }
}

impl fmt::Display for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateKey::TaskLastRun(task) => write!(f, "{}{}", Self::LAST_RUN_PREFIX, task),
            StateKey::AnalyzerChecks(name) => write!(
                f,
                "{}{}{}",
                Self::ANALYZER_PREFIX,
                name,
                Self::ANALYZER_SUFFIX
            ),
            StateKey::RemovedFiles => f.write_str(Self::REMOVED_FILES_KEY),
            StateKey::Custom(raw) => f.write_str(raw),
        }
    }
}

impl From<&str> for StateKey {
    fn from(raw: &str) -> Self {
        StateKey::parse(raw)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Running,
    Completed,
    Failed,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Running => "running",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Failed => "failed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "running" => Some(ExecutionStatus::Running),
            "completed" => Some(ExecutionStatus::Completed),
            "failed" => Some(ExecutionStatus::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub id: i64,
    pub task: String,
    pub options: JsonValue,
    pub status: ExecutionStatus,
    pub started_at: i64,
    pub completed_at: Option<i64>,
    pub pid: Option<i64>,
    pub execution_time: Option<f64>,
    pub success: Option<bool>,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExecutionStats {
    pub total: u64,
    /// Percentage of all executions that succeeded.
    pub success_rate: f64,
    /// Mean `execution_time` over executions that recorded one, seconds.
    pub average_time: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreHealth {
    Connected,
    Unavailable,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub store: StoreHealth,
    pub recent_failures: u64,
    pub free_space_bytes: Option<u64>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AutomationStatus {
    pub recent_executions: Vec<ExecutionRecord>,
    pub stats: ExecutionStats,
    pub health: HealthReport,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleCheckRecord {
    pub check_id: String,
    pub name: String,
    pub passed: bool,
    pub details: JsonValue,
    pub executed_at: i64,
}

pub struct StateManager {
    broker: Option<DbBroker>,
    data_dir: PathBuf,
    health: HealthConfig,
    memory: BTreeMap<String, JsonValue>,
}

impl StateManager {
    pub fn open(store: &Store, health: HealthConfig) -> Self {
        let broker = DbBroker::open_or_degrade(&store.data_dir);
        Self::with_broker(broker, &store.data_dir, health)
    }

    pub fn with_broker(broker: Option<DbBroker>, data_dir: &Path, health: HealthConfig) -> Self {
        Self {
            broker,
            data_dir: data_dir.to_path_buf(),
            health,
            memory: BTreeMap::new(),
        }
    }

    pub fn is_available(&self) -> bool {
        self.broker.is_some()
    }

    /// Run `f` against the store, logging and swallowing any failure.
    fn guarded<R>(
        &self,
        op: &str,
        f: impl FnOnce(&rusqlite::Connection) -> Result<R, error::AutomationError>,
    ) -> Option<R> {
        let broker = self.broker.as_ref()?;
        match broker.with_conn(op, f) {
            Ok(r) => Some(r),
            Err(e) => {
                warn!(op, error = %e, "state store operation failed");
                None
            }
        }
    }

    /// Insert a `running` record and return its id, or 0 without a store.
    pub fn start_execution(&self, task: &str, options: &JsonValue) -> i64 {
        let started_at = time::now_epoch_secs();
        let pid = std::process::id() as i64;
        let options = options.to_string();
        let id = self
            .guarded("state.start_execution", |conn| {
                conn.execute(
                    "INSERT INTO automationexecution(task, options, status, started_at, pid) VALUES(?1, ?2, 'running', ?3, ?4)",
                    params![task, options, started_at, pid],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .unwrap_or(SENTINEL_EXECUTION_ID);
        debug!(task, id, "execution started");
        id
    }

    /// Terminal transition to `completed`. No-op for unknown or finished ids.
    pub fn complete_execution(&self, id: i64, success: bool, elapsed_secs: f64) {
        if id == SENTINEL_EXECUTION_ID {
            return;
        }
        let now = time::now_epoch_secs();
        self.guarded("state.complete_execution", |conn| {
            conn.execute(
                "UPDATE automationexecution SET status = 'completed', completed_at = ?1, execution_time = ?2, success = ?3
                 WHERE id = ?4 AND status = 'running'",
                params![now, elapsed_secs, success, id],
            )?;
            Ok(())
        });
        debug!(id, success, elapsed_secs, "execution completed");
    }

    /// Terminal transition to `failed`. No-op for unknown or finished ids.
    pub fn fail_execution(&self, id: i64, error_message: &str) {
        if id == SENTINEL_EXECUTION_ID {
            return;
        }
        let now = time::now_epoch_secs();
        self.guarded("state.fail_execution", |conn| {
            conn.execute(
                "UPDATE automationexecution
                 SET status = 'failed', completed_at = ?1, execution_time = ?1 - started_at, success = 0, error_message = ?2
                 WHERE id = ?3 AND status = 'running'",
                params![now, error_message, id],
            )?;
            Ok(())
        });
        info!(id, error = error_message, "execution failed");
    }

    pub fn execution(&self, id: i64) -> Option<ExecutionRecord> {
        self.guarded("state.execution", |conn| {
            Ok(conn
                .query_row(
                    &format!("{} WHERE id = ?1", EXECUTION_SELECT),
                    params![id],
                    execution_from_row,
                )
                .optional()?)
        })
        .flatten()
    }

    pub fn recent_executions(&self, limit: usize) -> Vec<ExecutionRecord> {
        self.guarded("state.recent_executions", |conn| {
            let mut stmt = conn.prepare(&format!(
                "{} ORDER BY started_at DESC, id DESC LIMIT ?1",
                EXECUTION_SELECT
            ))?;
            let rows = stmt.query_map(params![limit as i64], execution_from_row)?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
        .unwrap_or_default()
    }

    pub fn get_status(&self) -> AutomationStatus {
        let free_space_bytes = available_space(&self.data_dir);
        let mut warnings = Vec::new();

        let (store, stats, recent_failures) = match self.broker.as_ref().filter(|b| b.ping()) {
            None => {
                warnings.push("automation store unavailable".to_string());
                (StoreHealth::Unavailable, ExecutionStats::default(), 0)
            }
            Some(_) => {
                let since = time::now_epoch_secs() - self.health.failure_window_secs;
                let stats = self.guarded("state.stats", read_stats).unwrap_or_default();
                let failures = self
                    .guarded("state.recent_failures", |conn| {
                        Ok(conn.query_row(
                            "SELECT COUNT(*) FROM automationexecution WHERE success = 0 AND started_at >= ?1",
                            params![since],
                            |row| row.get::<_, i64>(0),
                        )?)
                    })
                    .unwrap_or(0) as u64;
                (StoreHealth::Connected, stats, failures)
            }
        };

        if recent_failures >= u64::from(self.health.failure_threshold) {
            warnings.push(format!(
                "{} failed execution(s) in the last {}s",
                recent_failures, self.health.failure_window_secs
            ));
        }
        if let Some(free) = free_space_bytes {
            if free < self.health.low_disk_bytes {
                warnings.push(format!("low disk space: {} bytes free", free));
            }
        }

        AutomationStatus {
            recent_executions: self.recent_executions(self.health.recent_limit),
            stats,
            health: HealthReport {
                store,
                recent_failures,
                free_space_bytes,
                warnings,
            },
        }
    }

    /// Stored value for `key`, decoded from JSON, else the raw string, else `default`.
    ///
    /// Values whose write fell back to memory shadow the store.
    pub fn get_state(&self, key: &StateKey, default: JsonValue) -> JsonValue {
        let raw_key = key.to_string();
        if let Some(value) = self.memory.get(&raw_key) {
            return value.clone();
        }
        if self.broker.is_none() {
            return default;
        }
        let stored = self
            .guarded("state.get", |conn| {
                Ok(conn
                    .query_row(
                        "SELECT state_value FROM automationstate WHERE state_key = ?1",
                        params![raw_key],
                        |row| row.get::<_, String>(0),
                    )
                    .optional()?)
            })
            .flatten();
        match stored {
            Some(raw) => serde_json::from_str(&raw).unwrap_or(JsonValue::String(raw)),
            None => default,
        }
    }

    pub fn set_state(&mut self, key: &StateKey, value: &JsonValue) {
        let raw_key = key.to_string();
        if self.broker.is_none() {
            self.memory.insert(raw_key, value.clone());
            return;
        }
        let encoded = value.to_string();
        let now = time::now_epoch_secs();
        let written = self.guarded("state.set", |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO automationstate(state_key, state_value, updated_at) VALUES(?1, ?2, ?3)",
                params![raw_key, encoded, now],
            )?;
            Ok(())
        });
        match written {
            Some(()) => {
                self.memory.remove(&raw_key);
            }
            None => {
                self.memory.insert(raw_key, value.clone());
            }
        }
    }

    /// Delete executions started more than `days_to_keep` days ago.
    pub fn cleanup(&self, days_to_keep: u32) -> usize {
        let cutoff = time::now_epoch_secs() - i64::from(days_to_keep) * 86_400;
        let removed = self
            .guarded("state.cleanup", |conn| {
                Ok(conn.execute(
                    "DELETE FROM automationexecution WHERE started_at < ?1",
                    params![cutoff],
                )?)
            })
            .unwrap_or(0);
        info!(days_to_keep, removed, "execution history pruned");
        removed
    }

    /// Mark `running` records older than `max_age_secs` as failed.
    ///
    /// Only ever invoked explicitly; a crash otherwise leaves its record running.
    pub fn reap_stale_executions(&self, max_age_secs: i64) -> usize {
        let now = time::now_epoch_secs();
        let cutoff = now - max_age_secs;
        let reaped = self
            .guarded("state.reap", |conn| {
                Ok(conn.execute(
                    "UPDATE automationexecution
                     SET status = 'failed', completed_at = ?1, success = 0, error_message = ?2
                     WHERE status = 'running' AND started_at < ?3",
                    params![now, ABANDONED_MESSAGE, cutoff],
                )?)
            })
            .unwrap_or(0);
        if reaped > 0 {
            warn!(reaped, max_age_secs, "stale running executions marked abandoned");
        }
        reaped
    }

    /// Append one rule outcome to the audit history. Returns the check id.
    pub fn record_rule_check(&self, name: &str, passed: bool, details: &JsonValue) -> Option<String> {
        let check_id = time::new_event_id();
        let now = time::now_epoch_secs();
        let details = details.to_string();
        self.guarded("state.record_rule_check", |conn| {
            conn.execute(
                "INSERT INTO automationrule(check_id, name, passed, details, executed_at) VALUES(?1, ?2, ?3, ?4, ?5)",
                params![check_id, name, passed, details, now],
            )?;
            Ok(())
        })?;
        Some(check_id)
    }

    /// Newest first.
    pub fn rule_history(&self, name: &str, limit: usize) -> Vec<RuleCheckRecord> {
        self.guarded("state.rule_history", |conn| {
            let mut stmt = conn.prepare(
                "SELECT check_id, name, passed, details, executed_at FROM automationrule
                 WHERE name = ?1 ORDER BY executed_at DESC, rowid DESC LIMIT ?2",
            )?;
            let rows = stmt.query_map(params![name, limit as i64], |row| {
                let details: String = row.get(3)?;
                Ok(RuleCheckRecord {
                    check_id: row.get(0)?,
                    name: row.get(1)?,
                    passed: row.get(2)?,
                    details: serde_json::from_str(&details).unwrap_or(JsonValue::String(details)),
                    executed_at: row.get(4)?,
                })
            })?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
        .unwrap_or_default()
    }
}

const EXECUTION_SELECT: &str = "SELECT id, task, options, status, started_at, completed_at, pid, execution_time, success, error_message FROM automationexecution";

fn execution_from_row(row: &rusqlite::Row<'_>) -> Result<ExecutionRecord, rusqlite::Error> {
    let options: String = row.get(2)?;
    let status: String = row.get(3)?;
    Ok(ExecutionRecord {
        id: row.get(0)?,
        task: row.get(1)?,
        options: serde_json::from_str(&options).unwrap_or(JsonValue::String(options)),
        status: ExecutionStatus::parse(&status).unwrap_or(ExecutionStatus::Failed),
        started_at: row.get(4)?,
        completed_at: row.get(5)?,
        pid: row.get(6)?,
        execution_time: row.get(7)?,
        success: row.get(8)?,
        error_message: row.get(9)?,
    })
}

fn read_stats(conn: &rusqlite::Connection) -> Result<ExecutionStats, error::AutomationError> {
    let (total, succeeded, average): (i64, i64, Option<f64>) = conn.query_row(
        "SELECT COUNT(*), COALESCE(SUM(CASE WHEN success = 1 THEN 1 ELSE 0 END), 0), AVG(execution_time)
         FROM automationexecution",
        [],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
    )?;
    let success_rate = if total > 0 {
        succeeded as f64 * 100.0 / total as f64
    } else {
        0.0
    };
    Ok(ExecutionStats {
        total: total as u64,
        success_rate,
        average_time: average.unwrap_or(0.0),
    })
}

/// Free bytes on the volume holding `dir`, probing the nearest existing ancestor.
fn available_space(dir: &Path) -> Option<u64> {
    dir.ancestors()
        .find(|p| p.exists())
        .and_then(|p| fs2::available_space(p).ok())
}

#[derive(Parser, Debug)]
#[clap(name = "state", about = "Read or write persisted automation state")]
pub struct StateCli {
    #[clap(subcommand)]
    pub command: StateCommand,
}

#[derive(Subcommand, Debug)]
pub enum StateCommand {
    /// Print the value stored under a key (JSON).
    Get {
        key: String,
        #[clap(long, default_value = "null")]
        default: String,
    },
    /// Store a value; valid JSON is stored structured, anything else as a string.
    Set { key: String, value: String },
    /// Recent outcomes recorded for one rule.
    History {
        rule: String,
        #[clap(long, default_value = "10")]
        limit: usize,
    },
}

pub fn run_state_cli(
    store: &Store,
    health: HealthConfig,
    cli: StateCli,
) -> Result<(), error::AutomationError> {
    let mut state = StateManager::open(store, health);
    match cli.command {
        StateCommand::Get { key, default } => {
            let default = parse_loose_json(&default);
            let value = state.get_state(&StateKey::parse(&key), default);
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        StateCommand::Set { key, value } => {
            state.set_state(&StateKey::parse(&key), &parse_loose_json(&value));
            println!("state: set {}", key);
        }
        StateCommand::History { rule, limit } => {
            let history = state.rule_history(&rule, limit);
            println!("{}", serde_json::to_string_pretty(&history)?);
        }
    }
    Ok(())
}

pub fn parse_loose_json(raw: &str) -> JsonValue {
    serde_json::from_str(raw).unwrap_or_else(|_| JsonValue::String(raw.to_string()))
}
