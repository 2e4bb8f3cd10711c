//! Hook coverage scanner.
//!
//! Source files fire hooks (`do_action`, `apply_filters`) and listen to them
//! (`add_action`, `add_filter`). The catalog document lists the hooks the
//! project promises, one backticked name per list item or heading. Coverage
//! is the share of catalogued hooks that some source file actually fires.
//!
//! Each source directory is its own check, so only directories with modified
//! files are re-scanned; the rest replay their cached hook sites.

use crate::core::config::HooksConfig;
use crate::core::error;
use crate::core::time;
use crate::plugins::analyzer::{Analyzer, CheckSpec, CheckVerdict};
use crate::plugins::checksum::collect_files;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::info;

pub const ANALYZER_NAME: &str = "hooks";

const CHECK_CATALOG: &str = "catalog";
const SCAN_PREFIX: &str = "scan:";

fn site_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"\b(do_action|apply_filters|add_action|add_filter)\s*\(\s*['"]([A-Za-z0-9_.:/\-]+)['"]"#)
            .expect("hook site regex is valid")
    })
}

fn catalog_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^\s*(?:[-*+]|\d+\.|#{2,6})\s+`([A-Za-z0-9_.:/\-]+)`")
            .expect("catalog regex is valid")
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SiteKind {
    Fire,
    Listen,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookSite {
    pub hook: String,
    pub kind: SiteKind,
    pub file: String,
    pub line: usize,
}

impl HookSite {
    fn location(&self) -> String {
        format!("{}:{}", self.file, self.line)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ScanData {
    files: usize,
    sites: Vec<HookSite>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct CatalogData {
    hooks: Vec<String>,
}

/// Hook sites found in `text`, with 1-based line numbers.
pub fn scan_source(file: &str, text: &str) -> Vec<HookSite> {
    let mut sites = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        for caps in site_regex().captures_iter(line) {
            let kind = match &caps[1] {
                "do_action" | "apply_filters" => SiteKind::Fire,
                _ => SiteKind::Listen,
            };
            sites.push(HookSite {
                hook: caps[2].to_string(),
                kind,
                file: file.to_string(),
                line: idx + 1,
            });
        }
    }
    sites
}

/// Backticked hook names listed in the catalog, deduplicated in order.
pub fn parse_catalog(text: &str) -> Vec<String> {
    let mut seen = BTreeSet::new();
    catalog_regex()
        .captures_iter(text)
        .map(|c| c[1].to_string())
        .filter(|h| seen.insert(h.clone()))
        .collect()
}

#[derive(Debug, Clone, Default)]
pub struct HookInventory {
    pub files_scanned: usize,
    pub files_with_hooks: usize,
    pub fired: BTreeMap<String, Vec<String>>,
    pub listeners: BTreeMap<String, Vec<String>>,
    pub documented: BTreeSet<String>,
}

impl HookInventory {
    pub fn implemented(&self) -> usize {
        self.documented.iter().filter(|h| self.fired.contains_key(*h)).count()
    }

    /// Percentage of documented hooks that are fired; 100 with an empty catalog.
    pub fn coverage_percent(&self) -> f64 {
        if self.documented.is_empty() {
            return 100.0;
        }
        self.implemented() as f64 * 100.0 / self.documented.len() as f64
    }

    pub fn undocumented(&self) -> impl Iterator<Item = &String> {
        self.fired.keys().filter(|h| !self.documented.contains(*h))
    }

    pub fn missing(&self) -> impl Iterator<Item = &String> {
        self.documented.iter().filter(|h| !self.fired.contains_key(*h))
    }

    pub fn statistics(&self) -> JsonValue {
        let all: BTreeSet<&String> = self.fired.keys().chain(self.documented.iter()).collect();
        json!({
            "generated_at": time::now_epoch_z(),
            "total_files": self.files_scanned,
            "files_with_hooks": self.files_with_hooks,
            "total_hooks": all.len(),
            "fired_hooks": self.fired.len(),
            "documented_hooks": self.documented.len(),
            "implemented_hooks": self.implemented(),
            "undocumented_hooks": self.undocumented().count(),
            "missing_hooks": self.missing().count(),
            "listener_count": self.listeners.values().map(Vec::len).sum::<usize>(),
            "coverage_percent": (self.coverage_percent() * 10.0).round() / 10.0,
        })
    }

    pub fn implementation_map(&self) -> JsonValue {
        let all: BTreeSet<&String> = self.fired.keys().chain(self.documented.iter()).collect();
        let hooks: serde_json::Map<String, JsonValue> = all
            .into_iter()
            .map(|hook| {
                let documented = self.documented.contains(hook);
                let fired_at = self.fired.get(hook).cloned().unwrap_or_default();
                let status = match (documented, fired_at.is_empty()) {
                    (true, false) => "implemented",
                    (true, true) => "missing",
                    (false, _) => "undocumented",
                };
                (
                    hook.clone(),
                    json!({
                        "status": status,
                        "documented": documented,
                        "fired_at": fired_at,
                        "listeners": self.listeners.get(hook).cloned().unwrap_or_default(),
                    }),
                )
            })
            .collect();
        json!({
            "generated_at": time::now_epoch_z(),
            "hooks": hooks,
        })
    }
}

pub struct HookCoverageAnalyzer {
    project_root: PathBuf,
    config: HooksConfig,
    inventory: HookInventory,
}

impl HookCoverageAnalyzer {
    pub fn new(project_root: impl Into<PathBuf>, config: HooksConfig) -> Self {
        Self {
            project_root: project_root.into(),
            config,
            inventory: HookInventory::default(),
        }
    }

    /// Inventory assembled by the last analysis.
    pub fn inventory(&self) -> &HookInventory {
        &self.inventory
    }

    fn rel(&self, path: &Path) -> String {
        path.strip_prefix(&self.project_root)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/")
    }

    fn scan_dir(&self, dir: &Path) -> CheckVerdict {
        let files: Vec<PathBuf> = collect_files(&self.project_root, &[dir.to_path_buf()])
            .into_iter()
            .filter(|f| {
                f.extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| self.config.extensions.iter().any(|x| x == e))
            })
            .collect();
        let mut verdict = CheckVerdict::default();
        let mut data = ScanData {
            files: files.len(),
            sites: Vec::new(),
        };
        for file in &files {
            match fs::read_to_string(file) {
                Ok(text) => data.sites.extend(scan_source(&self.rel(file), &text)),
                Err(e) => verdict.warn(format!("{}: unreadable ({})", self.rel(file), e)),
            }
        }
        verdict.data = serde_json::to_value(&data).unwrap_or(JsonValue::Null);
        verdict
    }

    fn read_catalog(&self) -> CheckVerdict {
        let mut verdict = CheckVerdict::default();
        let path = self.project_root.join(&self.config.catalog);
        let hooks = match fs::read_to_string(&path) {
            Ok(text) => parse_catalog(&text),
            Err(_) => {
                verdict.warn(format!("hook catalog {} not found", self.rel(&path)));
                Vec::new()
            }
        };
        verdict.data = serde_json::to_value(CatalogData { hooks }).unwrap_or(JsonValue::Null);
        verdict
    }

    /// Write the statistics and implementation map documents.
    pub fn write_artifacts(&self) -> Result<(), error::AutomationError> {
        for (path, doc) in [
            (&self.config.statistics_output, self.inventory.statistics()),
            (&self.config.implementation_map_output, self.inventory.implementation_map()),
        ] {
            let path = self.project_root.join(path);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&path, serde_json::to_string_pretty(&doc)?)?;
        }
        info!(
            hooks = self.inventory.fired.len(),
            coverage = self.inventory.coverage_percent(),
            "hook artifacts written"
        );
        Ok(())
    }
}

impl Analyzer for HookCoverageAnalyzer {
    fn name(&self) -> &str {
        ANALYZER_NAME
    }

    fn checks(&self) -> Vec<CheckSpec> {
        let mut checks = vec![CheckSpec::new(CHECK_CATALOG, &self.config.catalog)];
        for dir in &self.config.source_dirs {
            checks.push(CheckSpec::new(
                format!("{}{}", SCAN_PREFIX, dir.to_string_lossy().replace('\\', "/")),
                dir,
            ));
        }
        checks
    }

    fn run_check(&mut self, check: &CheckSpec) -> CheckVerdict {
        if check.name == CHECK_CATALOG {
            self.read_catalog()
        } else {
            self.scan_dir(&check.input)
        }
    }

    fn finish(&mut self, verdicts: &BTreeMap<String, CheckVerdict>) -> CheckVerdict {
        let mut inventory = HookInventory::default();
        for (name, verdict) in verdicts {
            if name == CHECK_CATALOG {
                let catalog: CatalogData =
                    serde_json::from_value(verdict.data.clone()).unwrap_or_default();
                inventory.documented.extend(catalog.hooks);
                continue;
            }
            let scan: ScanData = serde_json::from_value(verdict.data.clone()).unwrap_or_default();
            inventory.files_scanned += scan.files;
            inventory.files_with_hooks += scan
                .sites
                .iter()
                .map(|s| s.file.as_str())
                .collect::<BTreeSet<_>>()
                .len();
            for site in scan.sites {
                let target = match site.kind {
                    SiteKind::Fire => &mut inventory.fired,
                    SiteKind::Listen => &mut inventory.listeners,
                };
                target.entry(site.hook.clone()).or_default().push(site.location());
            }
        }

        let mut verdict = CheckVerdict::default();
        for hook in inventory.undocumented() {
            let first = inventory.fired[hook].first().cloned().unwrap_or_default();
            verdict.warn(format!("hook '{}' is fired at {} but not documented", hook, first));
        }
        for hook in inventory.missing() {
            verdict.warn(format!("documented hook '{}' is never fired", hook));
        }
        for (hook, locations) in &inventory.listeners {
            if !inventory.fired.contains_key(hook) && !inventory.documented.contains(hook) {
                verdict.warn(format!(
                    "listener for unknown hook '{}' at {}",
                    hook,
                    locations.first().cloned().unwrap_or_default()
                ));
            }
        }
        let coverage = inventory.coverage_percent();
        if coverage < self.config.min_coverage {
            verdict.error(format!(
                "hook coverage {:.1}% is below the required {:.1}%",
                coverage, self.config.min_coverage
            ));
        }
        self.inventory = inventory;
        verdict
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_scan_classifies_sites() {
        let sites = scan_source(
            "app/boot.php",
            "<?php\ndo_action('init');\n$x = apply_filters( \"title\", $x );\nadd_action('init', 'f');\n",
        );
        assert_eq!(sites.len(), 3);
        assert_eq!(sites[0].hook, "init");
        assert_eq!(sites[0].kind, SiteKind::Fire);
        assert_eq!(sites[1].line, 3);
        assert_eq!(sites[2].kind, SiteKind::Listen);
    }

    #[test]
    fn catalog_reads_list_items_and_headings() {
        let hooks = parse_catalog("# Hooks\n\n- `init` fires early\n### `title`\n* `init`\nprose `ignored`\n");
        assert_eq!(hooks, vec!["init", "title"]);
    }

    #[test]
    fn coverage_counts_documented_hooks_that_fire() {
        let mut inv = HookInventory::default();
        inv.documented.extend(["a".to_string(), "b".to_string()]);
        inv.fired.insert("a".to_string(), vec!["x.php:1".to_string()]);
        inv.fired.insert("c".to_string(), vec!["x.php:2".to_string()]);
        assert!((inv.coverage_percent() - 50.0).abs() < 1e-9);
        assert_eq!(inv.undocumented().collect::<Vec<_>>(), vec!["c"]);
        assert_eq!(inv.missing().collect::<Vec<_>>(), vec!["b"]);
        let map = inv.implementation_map();
        assert_eq!(map["hooks"]["a"]["status"], "implemented");
        assert_eq!(map["hooks"]["b"]["status"], "missing");
        assert_eq!(map["hooks"]["c"]["status"], "undocumented");
        assert_eq!(inv.statistics()["total_hooks"], 3);
    }

    #[test]
    fn empty_catalog_is_fully_covered() {
        assert_eq!(HookInventory::default().coverage_percent(), 100.0);
    }
}
