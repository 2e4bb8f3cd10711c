//! `automation.toml` loading.
//!
//! Every section is optional; a missing file yields [`AutomationConfig::default`].

use crate::core::error;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const CONFIG_FILE_NAME: &str = "automation.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AutomationConfig {
    pub store: StoreConfig,
    pub rules: RulesConfig,
    pub validation: ValidationSettings,
    /// Task name -> project-relative directories (or single files) it watches.
    pub tasks: TaskTable,
    pub health: HealthConfig,
    pub hooks: HooksConfig,
    pub docs: DocsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub data_dir: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".isotone/automation"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    pub rules_file: PathBuf,
    pub workflows_file: PathBuf,
    /// Markdown documents scraped by the path and command heuristics.
    pub scan_docs: Vec<PathBuf>,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            rules_file: PathBuf::from("iso-automation/config/rules.yaml"),
            workflows_file: PathBuf::from("iso-automation/config/workflows.yaml"),
            scan_docs: vec![PathBuf::from("iso-automation/README.md")],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationSettings {
    /// Path prefixes whose absence is reported. Anything else is advisory and skipped.
    pub critical_paths: Vec<String>,
    /// Command prefixes recognized by the command heuristic.
    pub allowed_commands: Vec<String>,
    /// Interpreter name used in `"<runtime> isotone ..."` commands.
    pub runtime: String,
    /// Escalate missing critical paths from warnings to errors.
    pub strict_paths: bool,
    /// Escalate unrecognized commands from warnings to errors.
    pub strict_commands: bool,
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self {
            critical_paths: vec![
                "/app/".to_string(),
                "/iso-core/".to_string(),
                "/iso-automation/".to_string(),
                "/config/".to_string(),
            ],
            allowed_commands: vec![
                "composer install".to_string(),
                "composer update".to_string(),
                "composer dump-autoload".to_string(),
                "composer test".to_string(),
                "composer docs:check".to_string(),
                "composer hooks:docs".to_string(),
                "php isotone".to_string(),
            ],
            runtime: "php".to_string(),
            strict_paths: false,
            strict_commands: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskTable(pub BTreeMap<String, Vec<PathBuf>>);

impl Default for TaskTable {
    fn default() -> Self {
        let mut tasks = BTreeMap::new();
        tasks.insert(
            "docs".to_string(),
            vec![
                PathBuf::from("README.md"),
                PathBuf::from("docs"),
                PathBuf::from("user-docs"),
                PathBuf::from("iso-automation/config"),
            ],
        );
        tasks.insert(
            "hooks".to_string(),
            vec![
                PathBuf::from("app"),
                PathBuf::from("iso-core"),
                PathBuf::from("iso-admin"),
                PathBuf::from("iso-includes"),
                PathBuf::from("docs/hooks.md"),
            ],
        );
        tasks.insert(
            "rules".to_string(),
            vec![PathBuf::from("iso-automation/config")],
        );
        Self(tasks)
    }
}

impl TaskTable {
    pub fn directories(&self, task: &str) -> &[PathBuf] {
        self.0.get(task).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Failures inside the window at or above this count raise a warning.
    pub failure_threshold: u32,
    pub failure_window_secs: i64,
    /// Free space below this raises a warning.
    pub low_disk_bytes: u64,
    /// Number of executions listed in `recent_executions`.
    pub recent_limit: usize,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            failure_window_secs: 3600,
            low_disk_bytes: 100 * 1024 * 1024,
            recent_limit: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HooksConfig {
    /// Markdown catalog listing the hooks the project promises.
    pub catalog: PathBuf,
    pub source_dirs: Vec<PathBuf>,
    pub extensions: Vec<String>,
    /// Coverage percentage below which the analyzer reports an error.
    pub min_coverage: f64,
    pub statistics_output: PathBuf,
    pub implementation_map_output: PathBuf,
}

impl Default for HooksConfig {
    fn default() -> Self {
        Self {
            catalog: PathBuf::from("docs/hooks.md"),
            source_dirs: vec![
                PathBuf::from("app"),
                PathBuf::from("iso-core"),
                PathBuf::from("iso-admin"),
                PathBuf::from("iso-includes"),
            ],
            extensions: vec!["php".to_string()],
            min_coverage: 0.0,
            statistics_output: PathBuf::from(".isotone/automation/hook-statistics.json"),
            implementation_map_output: PathBuf::from(
                ".isotone/automation/hook-implementation-map.json",
            ),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DocsConfig {
    pub readme: PathBuf,
    pub docs_dir: PathBuf,
    /// Index file inside `docs_dir` that should link every other page.
    pub index: String,
}

impl Default for DocsConfig {
    fn default() -> Self {
        Self {
            readme: PathBuf::from("README.md"),
            docs_dir: PathBuf::from("docs"),
            index: "README.md".to_string(),
        }
    }
}

impl AutomationConfig {
    /// Load `automation.toml` from `project_root`, or defaults if absent.
    pub fn load(project_root: &Path) -> Result<Self, error::AutomationError> {
        let path = project_root.join(CONFIG_FILE_NAME);
        if !path.exists() {
            debug!(path = %path.display(), "no automation config, using defaults");
            return Ok(Self::default());
        }
        let content = fs::read_to_string(&path).map_err(error::AutomationError::IoError)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, error::AutomationError> {
        Ok(toml::from_str(content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = AutomationConfig::from_toml_str("").unwrap();
        assert_eq!(config.health.failure_threshold, 5);
        assert!(config.tasks.directories("hooks").contains(&PathBuf::from("app")));
        assert!(config.tasks.directories("unknown").is_empty());
    }

    #[test]
    fn partial_sections_override_only_named_keys() {
        let config = AutomationConfig::from_toml_str(
            r#"
            [validation]
            strict_paths = true

            [tasks]
            docs = ["handbook"]
            "#,
        )
        .unwrap();
        assert!(config.validation.strict_paths);
        assert_eq!(config.validation.runtime, "php");
        assert_eq!(config.tasks.directories("docs"), &[PathBuf::from("handbook")]);
        assert!(config.tasks.directories("hooks").is_empty());
    }

    #[test]
    fn malformed_document_is_a_config_error() {
        let err = AutomationConfig::from_toml_str("[validation\nstrict = ").unwrap_err();
        assert!(matches!(err, error::AutomationError::ConfigError(_)));
    }
}
