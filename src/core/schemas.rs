//! Centralized database schema definitions for the automation store.
//!
//! All automation bookkeeping lives in a single SQLite database:
//! 1. automationexecution: one row per task run (start, terminal status, timing).
//! 2. automationrule: append-only rule check history.
//! 3. automationstate: generic key/value state (analyzer verdicts, task last-run times).
//! 4. automationcache: per-file checksums used for incremental scans.

pub const AUTOMATION_DB_NAME: &str = "automation.db";
pub const CACHE_SNAPSHOT_NAME: &str = "cache.snapshot.json";

pub const AUTOMATION_DB_SCHEMA_EXECUTION: &str = "
    CREATE TABLE IF NOT EXISTS automationexecution (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        task TEXT NOT NULL,
        options TEXT NOT NULL DEFAULT '{}',
        status TEXT NOT NULL DEFAULT 'running', -- running, completed, failed
        started_at INTEGER NOT NULL,
        completed_at INTEGER,
        pid INTEGER,
        execution_time REAL,
        success INTEGER,
        error_message TEXT
    )
";
pub const AUTOMATION_DB_SCHEMA_EXECUTION_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_automationexecution_started ON automationexecution(started_at)";

pub const AUTOMATION_DB_SCHEMA_RULE: &str = "
    CREATE TABLE IF NOT EXISTS automationrule (
        check_id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        passed INTEGER NOT NULL,
        details TEXT NOT NULL DEFAULT '{}', -- JSON blob
        executed_at INTEGER NOT NULL
    )
";
pub const AUTOMATION_DB_SCHEMA_RULE_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_automationrule_name ON automationrule(name, executed_at)";

pub const AUTOMATION_DB_SCHEMA_STATE: &str = "
    CREATE TABLE IF NOT EXISTS automationstate (
        state_key TEXT PRIMARY KEY,
        state_value TEXT NOT NULL,
        updated_at INTEGER NOT NULL
    )
";

pub const AUTOMATION_DB_SCHEMA_CACHE: &str = "
    CREATE TABLE IF NOT EXISTS automationcache (
        file_path TEXT PRIMARY KEY,
        checksum TEXT NOT NULL,
        updated_at INTEGER NOT NULL
    )
";

/// Every statement needed to bring a fresh database up to date, in order.
pub const AUTOMATION_DB_SCHEMA_ALL: &[&str] = &[
    AUTOMATION_DB_SCHEMA_EXECUTION,
    AUTOMATION_DB_SCHEMA_EXECUTION_INDEX,
    AUTOMATION_DB_SCHEMA_RULE,
    AUTOMATION_DB_SCHEMA_RULE_INDEX,
    AUTOMATION_DB_SCHEMA_STATE,
    AUTOMATION_DB_SCHEMA_CACHE,
];
