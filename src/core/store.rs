//! Store abstraction for the automation workspace.
//!
//! A store pairs the project tree being scanned with the data directory that
//! holds the automation database and cache snapshot.

use crate::core::config::AutomationConfig;
use std::path::{Path, PathBuf};

/// Store handle representing one project's automation workspace.
#[derive(Debug, Clone)]
pub struct Store {
    /// Root of the project tree the engine scans (read-only for checks).
    pub project_root: PathBuf,
    /// Directory holding `automation.db` and the cache snapshot.
    pub data_dir: PathBuf,
}

impl Store {
    pub fn new(project_root: impl Into<PathBuf>, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            data_dir: data_dir.into(),
        }
    }

    /// Resolve the store for `project_root` using the configured data dir.
    ///
    /// Relative data dirs are resolved against the project root.
    pub fn from_config(project_root: &Path, config: &AutomationConfig) -> Self {
        let data_dir = if config.store.data_dir.is_absolute() {
            config.store.data_dir.clone()
        } else {
            project_root.join(&config.store.data_dir)
        };
        Self::new(project_root, data_dir)
    }

    /// Project-relative, forward-slash form of `path` used as a stable cache key.
    pub fn relative_key(&self, path: &Path) -> String {
        let rel = path.strip_prefix(&self.project_root).unwrap_or(path);
        rel.to_string_lossy().replace('\\', "/")
    }
}
