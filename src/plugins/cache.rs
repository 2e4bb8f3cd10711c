//! Task-scoped incremental change detection.
//!
//! Each task watches a fixed set of project-relative directories. The manager
//! answers "what changed since this task last completed" and records a fresh
//! baseline once the task's results are durable. Without a reachable store it
//! keeps everything in memory and falls back to a JSON snapshot on disk.

use crate::core::broker::DbBroker;
use crate::core::config::TaskTable;
use crate::core::error;
use crate::core::schemas;
use crate::core::store::Store;
use crate::core::time;
use crate::plugins::checksum::{Checksum, ChecksumStore, collect_files, entry_covers};
use crate::plugins::state::StateKey;
use clap::{Parser, Subcommand};
use rusqlite::{OptionalExtension, params};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheSnapshot {
    #[serde(default)]
    last_run: BTreeMap<String, i64>,
    #[serde(default)]
    checksums: ChecksumStore,
    #[serde(default)]
    removed: BTreeMap<String, i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskCacheStatus {
    pub task: String,
    /// Epoch seconds of the last recorded completion, 0 if never run.
    pub last_run: i64,
    pub directories: Vec<PathBuf>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheStatus {
    pub degraded: bool,
    pub tracked_files: usize,
    pub tasks: Vec<TaskCacheStatus>,
}

pub struct CacheManager {
    store: Store,
    tasks: TaskTable,
    broker: Option<DbBroker>,
    checksums: ChecksumStore,
    last_run: BTreeMap<String, i64>,
    /// Deleted files and when a run first saw them gone. Kept until every
    /// task covering the path has completed a run since.
    removed: BTreeMap<String, i64>,
}

impl CacheManager {
    /// Open against the store's database, degrading to memory-only mode.
    pub fn open(store: &Store, tasks: TaskTable) -> Self {
        let broker = DbBroker::open_or_degrade(&store.data_dir);
        Self::with_broker(store, tasks, broker)
    }

    pub fn with_broker(store: &Store, tasks: TaskTable, broker: Option<DbBroker>) -> Self {
        let mut manager = Self {
            store: store.clone(),
            tasks,
            broker,
            checksums: ChecksumStore::default(),
            last_run: BTreeMap::new(),
            removed: BTreeMap::new(),
        };
        manager.reload();
        manager
    }

    fn snapshot_path(&self) -> PathBuf {
        self.store.data_dir.join(schemas::CACHE_SNAPSHOT_NAME)
    }

    fn reload(&mut self) {
        if let Some(broker) = &self.broker {
            match load_from_store(broker) {
                Ok(snapshot) => {
                    self.apply_snapshot(snapshot);
                    return;
                }
                Err(e) => warn!(error = %e, "cache load failed, trying snapshot"),
            }
        }
        let path = self.snapshot_path();
        let Ok(raw) = std::fs::read_to_string(&path) else {
            return;
        };
        match serde_json::from_str::<CacheSnapshot>(&raw) {
            Ok(snapshot) => self.apply_snapshot(snapshot),
            Err(e) => warn!(path = %path.display(), error = %e, "ignoring unreadable cache snapshot"),
        }
    }

    fn apply_snapshot(&mut self, snapshot: CacheSnapshot) {
        self.checksums = snapshot.checksums;
        self.last_run = snapshot.last_run;
        self.removed = snapshot.removed;
    }

    pub fn is_degraded(&self) -> bool {
        self.broker.is_none()
    }

    pub fn tasks(&self) -> Vec<&str> {
        self.tasks.names().collect()
    }

    pub fn last_run_time(&self, task: &str) -> i64 {
        self.last_run.get(task).copied().unwrap_or(0)
    }

    fn absolute(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.store.project_root.join(path)
        }
    }

    /// Files under `task`'s directories changed since its last completed run.
    ///
    /// A task that never ran reports every file. Unknown tasks and missing
    /// directories report nothing. Deleted files are reported by their former
    /// path until the task completes a run after the deletion.
    pub fn get_modified_files(&self, task: &str) -> Vec<PathBuf> {
        let last_run = self.last_run_time(task);
        let dirs = self.tasks.directories(task);
        let files = collect_files(&self.store.project_root, dirs);
        if last_run == 0 {
            return files;
        }
        let mut modified: Vec<PathBuf> = files
            .into_iter()
            .filter(|file| {
                let Some(current) = Checksum::of(file) else {
                    return false;
                };
                let key = self.store.relative_key(file);
                current.mtime > last_run || self.checksums.get(&key) != Some(current)
            })
            .collect();
        modified.extend(
            self.removed_since(dirs, last_run)
                .into_iter()
                .map(|key| self.store.project_root.join(key)),
        );
        modified.sort();
        modified.dedup();
        modified
    }

    /// Keys under `dirs` deleted after `since`: still stored but gone from
    /// disk, or already recorded as removed by another task's run.
    fn removed_since(&self, dirs: &[PathBuf], since: i64) -> Vec<String> {
        let mut gone = self.vanished(dirs);
        gone.extend(
            self.removed
                .iter()
                .filter(|(key, at)| **at > since && dirs.iter().any(|d| entry_covers(d, key)))
                .map(|(key, _)| key.clone()),
        );
        gone
    }

    fn vanished(&self, dirs: &[PathBuf]) -> Vec<String> {
        self.checksums
            .keys_under(dirs)
            .into_iter()
            .filter(|key| !self.store.project_root.join(key).exists())
            .collect()
    }

    /// Drop removal records every covering task has already run past.
    fn prune_removed(&mut self) {
        let tasks = &self.tasks;
        let last_run = &self.last_run;
        self.removed.retain(|key, at| {
            tasks.names().any(|task| {
                let ran = last_run.get(task).copied().unwrap_or(0);
                ran > 0 && ran < *at && tasks.directories(task).iter().any(|d| entry_covers(d, key))
            })
        });
    }

    /// Record a fresh baseline for `task` and flush it.
    ///
    /// Call once per successful execution, after its results are recorded.
    pub fn update_cache(&mut self, task: &str) -> Result<(), error::AutomationError> {
        let now = time::now_epoch_secs();
        let dirs = self.tasks.directories(task).to_vec();
        let files = collect_files(&self.store.project_root, &dirs);
        let mut keys = Vec::with_capacity(files.len());
        for file in &files {
            if let Some(checksum) = Checksum::of(file) {
                let key = self.store.relative_key(file);
                self.checksums.insert(key.clone(), checksum);
                keys.push(key);
            }
        }
        let gone = self.vanished(&dirs);
        for key in &gone {
            self.checksums.remove(key);
            self.removed.insert(key.clone(), now);
        }
        self.last_run.insert(task.to_string(), now);
        self.prune_removed();
        debug!(task, files = keys.len(), removed = gone.len(), "cache baseline updated");

        if let Some(broker) = &self.broker {
            self.checksums.persist(broker, Some(&keys))?;
            if !gone.is_empty() {
                ChecksumStore::delete(broker, Some(&gone))?;
            }
            let last_run_key = StateKey::TaskLastRun(task.to_string()).to_string();
            let removed_key = StateKey::RemovedFiles.to_string();
            let removed = serde_json::to_string(&self.removed)?;
            broker.with_conn("cache.last_run", |conn| {
                let upsert = "INSERT OR REPLACE INTO automationstate(state_key, state_value, updated_at) VALUES(?1, ?2, ?3)";
                conn.execute(upsert, params![last_run_key, now.to_string(), now])?;
                conn.execute(upsert, params![removed_key, removed, now])?;
                Ok(())
            })?;
        }
        self.write_snapshot();
        Ok(())
    }

    /// Compare one file's current checksum to the stored one.
    pub fn is_file_modified(&self, path: &Path) -> bool {
        let abs = self.absolute(path);
        let key = self.store.relative_key(&abs);
        self.checksums.is_modified(&key, &abs)
    }

    /// Drop cached entries for `files`, or everything when `files` is empty.
    ///
    /// A full clear also forgets task run times and analyzer verdicts, forcing
    /// the next run of every task to re-scan from scratch.
    pub fn clear_cache(&mut self, files: &[PathBuf]) -> Result<usize, error::AutomationError> {
        if files.is_empty() {
            let removed = self.checksums.len();
            self.checksums.clear();
            self.last_run.clear();
            self.removed.clear();
            if let Some(broker) = &self.broker {
                ChecksumStore::delete(broker, None)?;
                broker.with_conn("cache.clear_state", |conn| {
                    for namespace in StateKey::CACHE_NAMESPACES {
                        conn.execute(
                            "DELETE FROM automationstate WHERE state_key LIKE ?1",
                            params![format!("{}%", namespace)],
                        )?;
                    }
                    Ok(())
                })?;
            }
            let snapshot = self.snapshot_path();
            if snapshot.exists() {
                std::fs::remove_file(&snapshot)?;
            }
            debug!(removed, "cache cleared");
            return Ok(removed);
        }

        let keys: Vec<String> = files
            .iter()
            .map(|f| self.store.relative_key(&self.absolute(f)))
            .collect();
        let removed = keys.iter().filter(|k| self.checksums.remove(k)).count();
        if let Some(broker) = &self.broker {
            ChecksumStore::delete(broker, Some(&keys))?;
        }
        self.write_snapshot();
        Ok(removed)
    }

    pub fn status(&self) -> CacheStatus {
        CacheStatus {
            degraded: self.is_degraded(),
            tracked_files: self.checksums.len(),
            tasks: self
                .tasks
                .names()
                .map(|task| TaskCacheStatus {
                    task: task.to_string(),
                    last_run: self.last_run_time(task),
                    directories: self.tasks.directories(task).to_vec(),
                })
                .collect(),
        }
    }

    /// Best effort: a snapshot that cannot be written only costs a re-scan.
    fn write_snapshot(&self) {
        let snapshot = CacheSnapshot {
            last_run: self.last_run.clone(),
            checksums: self.checksums.clone(),
            removed: self.removed.clone(),
        };
        let path = self.snapshot_path();
        let result = std::fs::create_dir_all(&self.store.data_dir)
            .map_err(error::AutomationError::from)
            .and_then(|_| Ok(serde_json::to_vec_pretty(&snapshot)?))
            .and_then(|bytes| Ok(std::fs::write(&path, bytes)?));
        if let Err(e) = result {
            warn!(path = %path.display(), error = %e, "cache snapshot not written");
        }
    }
}

fn load_from_store(broker: &DbBroker) -> Result<CacheSnapshot, error::AutomationError> {
    let checksums = ChecksumStore::load(broker)?;
    let last_run = broker.with_conn("cache.load_last_run", |conn| {
        let mut stmt = conn.prepare(
            "SELECT state_key, state_value FROM automationstate WHERE state_key LIKE ?1",
        )?;
        let rows = stmt.query_map(params![format!("{}%", StateKey::LAST_RUN_PREFIX)], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        let mut out = BTreeMap::new();
        for row in rows {
            let (key, value) = row?;
            if let (StateKey::TaskLastRun(task), Ok(ts)) = (StateKey::parse(&key), value.parse::<i64>()) {
                out.insert(task, ts);
            }
        }
        Ok(out)
    })?;
    let removed: BTreeMap<String, i64> = broker.with_conn("cache.load_removed", |conn| {
        let raw: Option<String> = conn
            .query_row(
                "SELECT state_value FROM automationstate WHERE state_key = ?1",
                params![StateKey::RemovedFiles.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(raw
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default())
    })?;
    Ok(CacheSnapshot {
        last_run,
        checksums,
        removed,
    })
}

#[derive(Parser, Debug)]
#[clap(name = "cache", about = "Inspect or reset the incremental scan cache")]
pub struct CacheCli {
    #[clap(subcommand)]
    pub command: CacheCommand,
}

#[derive(Subcommand, Debug)]
pub enum CacheCommand {
    /// Show tracked file count and per-task last run times.
    Status {
        #[clap(long, default_value = "text")]
        format: String,
    },
    /// Forget cached checksums (all of them when no files are given).
    Clear {
        files: Vec<PathBuf>,
    },
    /// List files a task would re-check right now.
    Modified {
        task: String,
    },
}

pub fn run_cache_cli(
    store: &Store,
    tasks: TaskTable,
    cli: CacheCli,
) -> Result<(), error::AutomationError> {
    let mut cache = CacheManager::open(store, tasks);
    match cli.command {
        CacheCommand::Status { format } => {
            let status = cache.status();
            if format == "json" {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                println!(
                    "cache: {} tracked file(s){}",
                    status.tracked_files,
                    if status.degraded { " (memory-only)" } else { "" }
                );
                for task in &status.tasks {
                    let last = if task.last_run == 0 {
                        "never".to_string()
                    } else {
                        format!("{}Z", task.last_run)
                    };
                    println!("  {:<12} last run {}", task.task, last);
                }
            }
        }
        CacheCommand::Clear { files } => {
            let removed = cache.clear_cache(&files)?;
            println!("cache: cleared {} entr{}", removed, if removed == 1 { "y" } else { "ies" });
        }
        CacheCommand::Modified { task } => {
            for file in cache.get_modified_files(&task) {
                println!("{}", store.relative_key(&file));
            }
        }
    }
    Ok(())
}
