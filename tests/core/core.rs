use isotone_automation::core::broker::DbBroker;
use isotone_automation::core::config::{AutomationConfig, CONFIG_FILE_NAME};
use isotone_automation::core::db;
use isotone_automation::core::error::AutomationError;
use isotone_automation::core::schemas;
use isotone_automation::core::store::Store;
use rusqlite::params;
use std::fs;
use std::path::PathBuf;
use tempfile::tempdir;

#[test]
fn broker_creates_schema_and_is_idempotent() {
    let tmp = tempdir().expect("tempdir");
    let data_dir = tmp.path().join("data");

    let broker = DbBroker::open(&data_dir).expect("open");
    assert_eq!(broker.db_path(), db::automation_db_path(&data_dir));
    assert!(broker.db_path().ends_with(schemas::AUTOMATION_DB_NAME));

    broker
        .with_conn("test.insert", |conn| {
            conn.execute(
                "INSERT INTO automationstate(state_key, state_value, updated_at) VALUES(?1, ?2, ?3)",
                params!["k", "\"v\"", 1],
            )?;
            Ok(())
        })
        .expect("insert");

    // Re-opening must not drop existing rows.
    let again = DbBroker::open(&data_dir).expect("reopen");
    let count: i64 = again
        .with_conn("test.count", |conn| {
            Ok(conn.query_row("SELECT COUNT(*) FROM automationstate", [], |row| row.get(0))?)
        })
        .expect("count");
    assert_eq!(count, 1);

    let journal: String = again
        .with_conn("test.journal", |conn| {
            Ok(conn.query_row("PRAGMA journal_mode;", [], |row| row.get(0))?)
        })
        .expect("journal");
    assert_eq!(journal.to_lowercase(), "wal");
}

#[test]
fn broker_errors_surface_as_sqlite_errors() {
    let tmp = tempdir().expect("tempdir");
    let broker = DbBroker::open(tmp.path()).expect("open");
    let err = broker
        .with_conn("test.bad_sql", |conn| {
            conn.execute("INSERT INTO nope VALUES(1)", [])?;
            Ok(())
        })
        .unwrap_err();
    assert!(matches!(err, AutomationError::RusqliteError(_)));
}

#[test]
fn config_file_overrides_defaults_and_resolves_store() {
    let tmp = tempdir().expect("tempdir");
    fs::write(
        tmp.path().join(CONFIG_FILE_NAME),
        r#"
[store]
data_dir = "var/automation"

[validation]
strict_commands = true

[tasks]
docs = ["handbook"]

[hooks]
min_coverage = 75.5
"#,
    )
    .expect("write config");

    let config = AutomationConfig::load(tmp.path()).expect("load");
    assert!(config.validation.strict_commands);
    assert!(!config.validation.strict_paths);
    assert_eq!(config.tasks.directories("docs"), &[PathBuf::from("handbook")]);
    assert!(config.tasks.directories("hooks").is_empty());
    assert_eq!(config.hooks.min_coverage, 75.5);
    assert_eq!(config.health.failure_threshold, 5);

    let store = Store::from_config(tmp.path(), &config);
    assert_eq!(store.data_dir, tmp.path().join("var/automation"));
}

#[test]
fn missing_config_uses_defaults_and_malformed_config_fails() {
    let tmp = tempdir().expect("tempdir");
    let config = AutomationConfig::load(tmp.path()).expect("defaults");
    assert_eq!(config.tasks.names().collect::<Vec<_>>(), vec!["docs", "hooks", "rules"]);

    fs::write(tmp.path().join(CONFIG_FILE_NAME), "[store\nbroken").expect("write");
    let err = AutomationConfig::load(tmp.path()).unwrap_err();
    assert!(matches!(err, AutomationError::ConfigError(_)));
}
