//! Cheap per-file fingerprints for incremental scans.
//!
//! A checksum is `(size, mtime)`, not a content hash. Collisions only cause
//! an extra re-check, never a missed change across a size/mtime boundary.

use crate::core::broker::DbBroker;
use crate::core::error;
use crate::core::time;
use rusqlite::params;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Directory names never descended into when collecting task files.
const SKIPPED_DIRS: &[&str] = &[".git", "target", "vendor", "node_modules"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checksum {
    pub size: u64,
    /// Modification time, epoch seconds.
    pub mtime: i64,
}

impl Checksum {
    /// Fingerprint of `path`, or `None` if it is missing or unreadable.
    pub fn of(path: &Path) -> Option<Self> {
        let meta = std::fs::metadata(path).ok()?;
        let mtime = meta.modified().map(time::system_time_secs).unwrap_or(0);
        Some(Self {
            size: meta.len(),
            mtime,
        })
    }

    pub fn encode(&self) -> String {
        format!("{}:{}", self.size, self.mtime)
    }

    pub fn decode(raw: &str) -> Option<Self> {
        let (size, mtime) = raw.split_once(':')?;
        Some(Self {
            size: size.parse().ok()?,
            mtime: mtime.parse().ok()?,
        })
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.encode())
    }
}

/// Stored checksums keyed by project-relative path.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChecksumStore {
    entries: BTreeMap<String, Checksum>,
}

impl ChecksumStore {
    pub fn get(&self, key: &str) -> Option<Checksum> {
        self.entries.get(key).copied()
    }

    pub fn insert(&mut self, key: impl Into<String>, checksum: Checksum) {
        self.entries.insert(key.into(), checksum);
    }

    pub fn remove(&mut self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether the file at `path` differs from what is stored under `key`.
    ///
    /// A file with no stored checksum counts as modified; a file that is gone
    /// counts as modified only if something was stored for it.
    pub fn is_modified(&self, key: &str, path: &Path) -> bool {
        match (self.get(key), Checksum::of(path)) {
            (Some(stored), Some(current)) => stored != current,
            (None, None) => false,
            _ => true,
        }
    }

    /// Stored keys at or under any of the project-relative `entries`.
    pub fn keys_under(&self, entries: &[PathBuf]) -> Vec<String> {
        self.entries
            .keys()
            .filter(|key| entries.iter().any(|entry| entry_covers(entry, key)))
            .cloned()
            .collect()
    }

    /// The subset of `(key, path)` candidates whose checksum changed.
    pub fn changed<'a>(&self, candidates: &'a [(String, PathBuf)]) -> Vec<&'a Path> {
        candidates
            .iter()
            .filter(|(key, path)| self.is_modified(key, path))
            .map(|(_, path)| path.as_path())
            .collect()
    }

    /// Read every row of `automationcache`. Undecodable rows are skipped.
    pub fn load(broker: &DbBroker) -> Result<Self, error::AutomationError> {
        broker.with_conn("cache.load", |conn| {
            let mut stmt = conn.prepare("SELECT file_path, checksum FROM automationcache")?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;
            let mut store = ChecksumStore::default();
            for row in rows {
                let (path, raw) = row?;
                if let Some(checksum) = Checksum::decode(&raw) {
                    store.insert(path, checksum);
                }
            }
            Ok(store)
        })
    }

    /// Upsert the stored checksums for `keys` (all entries when `None`).
    pub fn persist(
        &self,
        broker: &DbBroker,
        keys: Option<&[String]>,
    ) -> Result<(), error::AutomationError> {
        let now = time::now_epoch_secs();
        broker.with_conn("cache.persist", |conn| {
            let tx = conn.unchecked_transaction()?;
            {
                let mut stmt = tx.prepare(
                    "INSERT OR REPLACE INTO automationcache(file_path, checksum, updated_at) VALUES(?1, ?2, ?3)",
                )?;
                let mut write = |key: &str, checksum: &Checksum| -> Result<(), rusqlite::Error> {
                    stmt.execute(params![key, checksum.encode(), now])?;
                    Ok(())
                };
                match keys {
                    Some(keys) => {
                        for key in keys {
                            if let Some(checksum) = self.entries.get(key) {
                                write(key, checksum)?;
                            }
                        }
                    }
                    None => {
                        for (key, checksum) in &self.entries {
                            write(key, checksum)?;
                        }
                    }
                }
            }
            tx.commit()?;
            Ok(())
        })
    }

    /// Delete persisted rows for `keys` (every row when `None`).
    pub fn delete(broker: &DbBroker, keys: Option<&[String]>) -> Result<usize, error::AutomationError> {
        broker.with_conn("cache.delete", |conn| match keys {
            None => Ok(conn.execute("DELETE FROM automationcache", [])?),
            Some(keys) => {
                let mut removed = 0;
                for key in keys {
                    removed += conn.execute(
                        "DELETE FROM automationcache WHERE file_path = ?1",
                        params![key],
                    )?;
                }
                Ok(removed)
            }
        })
    }
}

/// Every regular file under the project-relative `entries` (files or dirs).
///
/// Missing entries contribute nothing. Output is sorted and deduplicated.
pub fn collect_files(project_root: &Path, entries: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for entry in entries {
        let base = project_root.join(entry);
        if !base.exists() {
            continue;
        }
        let walker = WalkDir::new(&base).follow_links(false).into_iter();
        for item in walker.filter_entry(|e| {
            e.depth() == 0
                || !(e.file_type().is_dir() && is_skipped_dir(e.file_name().to_string_lossy().as_ref()))
        }) {
            let Ok(item) = item else { continue };
            if item.file_type().is_file() {
                files.push(item.into_path());
            }
        }
    }
    files.sort();
    files.dedup();
    files
}

/// Whether the project-relative `entry` (file or directory) contains `key`.
pub fn entry_covers(entry: &Path, key: &str) -> bool {
    let raw = entry.to_string_lossy().replace('\\', "/");
    let entry = raw.trim_start_matches("./").trim_end_matches('/');
    key == entry || (key.starts_with(entry) && key[entry.len()..].starts_with('/'))
}

fn is_skipped_dir(name: &str) -> bool {
    SKIPPED_DIRS.contains(&name) || name.starts_with('.')
}
