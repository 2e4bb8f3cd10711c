use isotone_automation::core::config::TaskTable;
use isotone_automation::core::store::Store;
use isotone_automation::plugins::cache::CacheManager;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

fn tasks() -> TaskTable {
    let mut map = BTreeMap::new();
    map.insert(
        "docs".to_string(),
        vec![PathBuf::from("README.md"), PathBuf::from("docs")],
    );
    map.insert("hooks".to_string(), vec![PathBuf::from("app")]);
    TaskTable(map)
}

fn project(root: &Path) -> Store {
    fs::create_dir_all(root.join("docs/guide")).unwrap();
    fs::create_dir_all(root.join("app")).unwrap();
    fs::write(root.join("README.md"), "# Site\n").unwrap();
    fs::write(root.join("docs/index.md"), "index").unwrap();
    fs::write(root.join("docs/guide/setup.md"), "setup").unwrap();
    fs::write(root.join("app/boot.php"), "<?php").unwrap();
    Store::new(root, root.join(".isotone/automation"))
}

#[test]
fn unchanged_tree_reports_nothing_after_update() {
    let tmp = tempdir().unwrap();
    let store = project(tmp.path());
    let mut cache = CacheManager::open(&store, tasks());

    assert_eq!(cache.get_modified_files("docs").len(), 3);
    cache.update_cache("docs").unwrap();
    assert!(cache.get_modified_files("docs").is_empty());
    assert!(cache.get_modified_files("docs").is_empty());

    // Other tasks keep their own baseline.
    assert_eq!(cache.get_modified_files("hooks").len(), 1);
}

#[test]
fn baseline_survives_reopening_the_store() {
    let tmp = tempdir().unwrap();
    let store = project(tmp.path());
    {
        let mut cache = CacheManager::open(&store, tasks());
        cache.update_cache("docs").unwrap();
    }
    let cache = CacheManager::open(&store, tasks());
    assert!(!cache.is_degraded());
    assert!(cache.last_run_time("docs") > 0);
    assert!(cache.get_modified_files("docs").is_empty());
}

#[test]
fn new_and_changed_files_are_reported() {
    let tmp = tempdir().unwrap();
    let store = project(tmp.path());
    let mut cache = CacheManager::open(&store, tasks());
    cache.update_cache("docs").unwrap();

    fs::write(tmp.path().join("docs/guide/setup.md"), "setup, expanded").unwrap();
    fs::write(tmp.path().join("docs/new.md"), "fresh").unwrap();

    let mut modified: Vec<String> = cache
        .get_modified_files("docs")
        .iter()
        .map(|p| store.relative_key(p))
        .collect();
    modified.sort();
    assert_eq!(modified, vec!["docs/guide/setup.md", "docs/new.md"]);
}

#[test]
fn partial_clear_only_forgets_named_files() {
    let tmp = tempdir().unwrap();
    let store = project(tmp.path());
    let mut cache = CacheManager::open(&store, tasks());
    cache.update_cache("docs").unwrap();

    let removed = cache.clear_cache(&[PathBuf::from("docs/index.md")]).unwrap();
    assert_eq!(removed, 1);
    assert!(cache.is_file_modified(Path::new("docs/index.md")));
    assert!(!cache.is_file_modified(Path::new("README.md")));
    assert_eq!(
        cache.get_modified_files("docs"),
        vec![tmp.path().join("docs/index.md")]
    );
}

#[test]
fn full_clear_forces_a_complete_rescan() {
    let tmp = tempdir().unwrap();
    let store = project(tmp.path());
    let mut cache = CacheManager::open(&store, tasks());
    cache.update_cache("docs").unwrap();
    cache.update_cache("hooks").unwrap();

    cache.clear_cache(&[]).unwrap();
    assert_eq!(cache.last_run_time("docs"), 0);
    assert_eq!(cache.get_modified_files("docs").len(), 3);

    let reopened = CacheManager::open(&store, tasks());
    assert_eq!(reopened.status().tracked_files, 0);
    assert_eq!(reopened.last_run_time("hooks"), 0);
}

#[test]
fn missing_directories_are_not_errors() {
    let tmp = tempdir().unwrap();
    let store = Store::new(tmp.path(), tmp.path().join(".data"));
    let mut cache = CacheManager::open(&store, tasks());
    assert!(cache.get_modified_files("docs").is_empty());
    cache.update_cache("docs").unwrap();
    assert!(cache.last_run_time("docs") > 0);
}

#[test]
fn unreachable_store_falls_back_to_memory() {
    let tmp = tempdir().unwrap();
    let blocker = tmp.path().join("blocked");
    fs::write(&blocker, "plain file").unwrap();
    project(tmp.path());
    let store = Store::new(tmp.path(), blocker.join("automation"));

    let mut cache = CacheManager::open(&store, tasks());
    assert!(cache.is_degraded());
    assert_eq!(cache.get_modified_files("docs").len(), 3);
    cache.update_cache("docs").unwrap();
    assert!(cache.get_modified_files("docs").is_empty());
    assert!(cache.status().degraded);
}

#[test]
fn deleted_files_are_reported_until_the_next_update() {
    let tmp = tempdir().unwrap();
    let store = project(tmp.path());
    let mut cache = CacheManager::open(&store, tasks());
    cache.update_cache("docs").unwrap();

    fs::remove_file(tmp.path().join("docs/guide/setup.md")).unwrap();
    assert_eq!(
        cache.get_modified_files("docs"),
        vec![tmp.path().join("docs/guide/setup.md")]
    );
    assert!(cache.is_file_modified(Path::new("docs/guide/setup.md")));

    cache.update_cache("docs").unwrap();
    assert!(cache.get_modified_files("docs").is_empty());
    assert_eq!(cache.status().tracked_files, 2);
    assert!(CacheManager::open(&store, tasks()).get_modified_files("docs").is_empty());
}

#[test]
fn deletion_seen_by_one_task_still_reaches_an_overlapping_task() {
    let tmp = tempdir().unwrap();
    let store = project(tmp.path());
    let mut map = BTreeMap::new();
    map.insert("docs".to_string(), vec![PathBuf::from("docs")]);
    map.insert("guide".to_string(), vec![PathBuf::from("docs/guide")]);
    let table = TaskTable(map);

    let mut cache = CacheManager::open(&store, table.clone());
    cache.update_cache("guide").unwrap();
    cache.update_cache("docs").unwrap();
    // The guide task must see a deletion that happens after its own run.
    std::thread::sleep(std::time::Duration::from_millis(1100));

    fs::remove_file(tmp.path().join("docs/guide/setup.md")).unwrap();
    cache.update_cache("docs").unwrap();

    let reopened = CacheManager::open(&store, table);
    assert_eq!(
        reopened.get_modified_files("guide"),
        vec![tmp.path().join("docs/guide/setup.md")]
    );
    assert!(reopened.get_modified_files("docs").is_empty());
}
