use isotone_automation::core::config::HealthConfig;
use isotone_automation::core::store::Store;
use isotone_automation::plugins::state::{
    ExecutionStatus, SENTINEL_EXECUTION_ID, StateKey, StateManager, StoreHealth,
};
use serde_json::json;
use std::fs;
use tempfile::tempdir;

fn open(root: &std::path::Path) -> StateManager {
    StateManager::open(
        &Store::new(root, root.join(".isotone/automation")),
        HealthConfig::default(),
    )
}

#[test]
fn degraded_store_returns_sentinel_and_zeroed_status() {
    let tmp = tempdir().unwrap();
    let blocker = tmp.path().join("blocked");
    fs::write(&blocker, "plain file").unwrap();
    let mut state = StateManager::open(
        &Store::new(tmp.path(), blocker.join("automation")),
        HealthConfig::default(),
    );
    assert!(!state.is_available());

    let id = state.start_execution("x", &json!({}));
    assert_eq!(id, SENTINEL_EXECUTION_ID);
    state.complete_execution(id, true, 0.1);
    state.fail_execution(id, "boom");

    let status = state.get_status();
    assert_eq!(status.stats.total, 0);
    assert_eq!(status.stats.success_rate, 0.0);
    assert_eq!(status.stats.average_time, 0.0);
    assert_eq!(status.health.store, StoreHealth::Unavailable);
    assert!(status.recent_executions.is_empty());

    let key = StateKey::Custom("k".to_string());
    state.set_state(&key, &json!([1, 2, 3]));
    assert_eq!(state.get_state(&key, json!(null)), json!([1, 2, 3]));
    assert_eq!(state.cleanup(1), 0);
}

#[test]
fn execution_lifecycle_is_recorded() {
    let tmp = tempdir().unwrap();
    let state = open(tmp.path());
    let ok = state.start_execution("docs", &json!({"force": false}));
    let bad = state.start_execution("hooks", &json!({}));
    assert!(ok > 0 && bad > ok);

    state.complete_execution(ok, true, 0.25);
    state.fail_execution(bad, "scanner crashed");
    // Terminal states are final.
    state.complete_execution(bad, true, 9.0);

    let record = state.execution(bad).unwrap();
    assert_eq!(record.status, ExecutionStatus::Failed);
    assert_eq!(record.error_message.as_deref(), Some("scanner crashed"));
    assert_eq!(record.pid, Some(std::process::id() as i64));

    let status = state.get_status();
    assert_eq!(status.stats.total, 2);
    assert!((status.stats.success_rate - 50.0).abs() < 1e-9);
    assert_eq!(status.health.store, StoreHealth::Connected);
    assert_eq!(status.recent_executions[0].id, bad);
}

#[test]
fn repeated_failures_raise_a_health_warning() {
    let tmp = tempdir().unwrap();
    let state = StateManager::open(
        &Store::new(tmp.path(), tmp.path().join(".data")),
        HealthConfig {
            failure_threshold: 3,
            low_disk_bytes: 0,
            ..HealthConfig::default()
        },
    );
    for _ in 0..2 {
        let id = state.start_execution("hooks", &json!({}));
        state.fail_execution(id, "boom");
    }
    assert!(state.get_status().health.warnings.is_empty());

    let id = state.start_execution("hooks", &json!({}));
    state.fail_execution(id, "boom");
    let health = state.get_status().health;
    assert_eq!(health.recent_failures, 3);
    assert_eq!(health.warnings.len(), 1);
    assert!(health.warnings[0].contains("3 failed execution(s)"));
}

#[test]
fn state_round_trips_structured_values() {
    let tmp = tempdir().unwrap();
    let mut state = open(tmp.path());
    let key = StateKey::parse("dashboard.layout");
    state.set_state(&key, &json!({"columns": 3, "widgets": ["runs", "health"]}));
    assert_eq!(state.get_state(&key, json!(null))["widgets"][1], "health");

    state.set_state(&key, &json!("plain"));
    assert_eq!(state.get_state(&key, json!(null)), json!("plain"));

    let reopened = open(tmp.path());
    assert_eq!(reopened.get_state(&key, json!(null)), json!("plain"));
    assert_eq!(
        reopened.get_state(&StateKey::parse("missing"), json!(7)),
        json!(7)
    );
}

#[test]
fn cleanup_keeps_recent_records() {
    let tmp = tempdir().unwrap();
    let state = open(tmp.path());
    let id = state.start_execution("docs", &json!({}));
    state.complete_execution(id, true, 0.0);
    assert_eq!(state.cleanup(30), 0);
    assert!(state.execution(id).is_some());
}

#[test]
fn crashed_runs_stay_running_until_reaped() {
    let tmp = tempdir().unwrap();
    let id = open(tmp.path()).start_execution("docs", &json!({}));

    let state = open(tmp.path());
    assert_eq!(state.execution(id).unwrap().status, ExecutionStatus::Running);
    assert_eq!(state.reap_stale_executions(-60), 1);
    let record = state.execution(id).unwrap();
    assert_eq!(record.status, ExecutionStatus::Failed);
    assert_eq!(record.success, Some(false));
}
