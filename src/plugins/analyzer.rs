//! Incremental analyzers: ordered named checks with cached verdicts.
//!
//! Every check declares the project-relative file or directory it depends on.
//! When that input is outside the modified-file set, the check's previous
//! verdict is replayed verbatim instead of re-running it. The per-check map is
//! persisted through [`StateManager`] under the analyzer's state key.

use crate::core::output::{self, StepStatus};
use crate::plugins::state::{StateKey, StateManager};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Findings of one check, plus optional structured data later stages use.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckVerdict {
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "JsonValue::is_null")]
    pub data: JsonValue,
}

impl CheckVerdict {
    pub fn error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }
}

/// Identity of one cached verdict.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CheckKey {
    analyzer: String,
    check: String,
}

impl CheckKey {
    pub fn new(analyzer: impl Into<String>, check: impl Into<String>) -> Self {
        Self {
            analyzer: analyzer.into(),
            check: check.into(),
        }
    }

    pub fn analyzer(&self) -> &str {
        &self.analyzer
    }

    pub fn check(&self) -> &str {
        &self.check
    }

    /// State entry holding every verdict of this key's analyzer.
    pub fn state_key(&self) -> StateKey {
        StateKey::AnalyzerChecks(self.analyzer.clone())
    }
}

impl fmt::Display for CheckKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.analyzer, self.check)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckSpec {
    pub name: String,
    /// Project-relative file or directory governing this check.
    pub input: PathBuf,
    /// Further inputs the check reads; a change to any of them re-runs it.
    pub extra_inputs: Vec<PathBuf>,
}

impl CheckSpec {
    pub fn new(name: impl Into<String>, input: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            input: input.into(),
            extra_inputs: Vec::new(),
        }
    }

    pub fn with_input(mut self, input: impl Into<PathBuf>) -> Self {
        self.extra_inputs.push(input.into());
        self
    }

    pub fn inputs(&self) -> impl Iterator<Item = &Path> {
        std::iter::once(self.input.as_path()).chain(self.extra_inputs.iter().map(PathBuf::as_path))
    }
}

pub trait Analyzer {
    fn name(&self) -> &str;

    /// Checks in execution order. Names must be unique.
    fn checks(&self) -> Vec<CheckSpec>;

    fn run_check(&mut self, check: &CheckSpec) -> CheckVerdict;

    /// Cross-check findings derived from every verdict, fresh or replayed.
    fn finish(&mut self, _verdicts: &BTreeMap<String, CheckVerdict>) -> CheckVerdict {
        CheckVerdict::default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AnalysisReport {
    pub analyzer: String,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub checks_run: Vec<String>,
    pub checks_replayed: Vec<String>,
}

impl AnalysisReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

pub struct AnalyzerRunner<A: Analyzer> {
    analyzer: A,
    project_root: PathBuf,
    /// Project-relative keys; `None` means every input counts as modified.
    modified: Option<Vec<String>>,
    last: Option<AnalysisReport>,
}

impl<A: Analyzer> AnalyzerRunner<A> {
    pub fn new(analyzer: A, project_root: impl Into<PathBuf>) -> Self {
        Self {
            analyzer,
            project_root: project_root.into(),
            modified: None,
            last: None,
        }
    }

    pub fn analyzer(&self) -> &A {
        &self.analyzer
    }

    fn relative(&self, path: &Path) -> String {
        let rel = path.strip_prefix(&self.project_root).unwrap_or(path);
        let key = rel.to_string_lossy().replace('\\', "/");
        key.trim_start_matches("./").trim_end_matches('/').to_string()
    }

    pub fn set_modified_files(&mut self, files: impl IntoIterator<Item = PathBuf>) {
        let keys = files.into_iter().map(|f| self.relative(&f)).collect();
        self.modified = Some(keys);
    }

    /// Forget the modified set so the next run re-evaluates every check.
    pub fn clear_modified_files(&mut self) {
        self.modified = None;
    }

    fn is_affected(&self, input: &Path) -> bool {
        let Some(modified) = &self.modified else {
            return true;
        };
        let input = self.relative(input);
        let dir_prefix = format!("{}/", input);
        modified
            .iter()
            .any(|f| *f == input || f.starts_with(&dir_prefix))
    }

    pub fn analyze(&mut self, state: &mut StateManager) -> AnalysisReport {
        let name = self.analyzer.name().to_string();
        let state_key = StateKey::AnalyzerChecks(name.clone());
        let mut cached: BTreeMap<String, CheckVerdict> =
            serde_json::from_value(state.get_state(&state_key, JsonValue::Null)).unwrap_or_default();

        let mut report = AnalysisReport {
            analyzer: name.clone(),
            ..AnalysisReport::default()
        };
        let mut verdicts = BTreeMap::new();
        for check in self.analyzer.checks() {
            let key = CheckKey::new(&name, &check.name);
            output::trace(&name, key.check());
            let verdict = match cached.remove(&check.name) {
                Some(previous) if !check.inputs().any(|i| self.is_affected(i)) => {
                    report.checks_replayed.push(check.name.clone());
                    previous
                }
                _ => {
                    report.checks_run.push(check.name.clone());
                    self.analyzer.run_check(&check)
                }
            };
            report.errors.extend(verdict.errors.iter().cloned());
            report.warnings.extend(verdict.warnings.iter().cloned());
            verdicts.insert(check.name, verdict);
        }

        let summary = self.analyzer.finish(&verdicts);
        report.errors.extend(summary.errors);
        report.warnings.extend(summary.warnings);

        match serde_json::to_value(&verdicts) {
            Ok(value) => state.set_state(&state_key, &value),
            Err(e) => warn!(analyzer = %name, error = %e, "verdict cache not persisted"),
        }
        debug!(
            analyzer = %name,
            run = report.checks_run.len(),
            replayed = report.checks_replayed.len(),
            errors = report.errors.len(),
            warnings = report.warnings.len(),
            "analysis finished"
        );
        self.last = Some(report.clone());
        report
    }

    /// Human-readable rendering of the last analysis.
    pub fn report(&self) -> String {
        let name = self.analyzer.name();
        let Some(report) = &self.last else {
            return format!("{}: not analyzed", name);
        };
        let mut lines = vec![format!(
            "{}: {} check(s), {} replayed from cache",
            name,
            report.checks_run.len() + report.checks_replayed.len(),
            report.checks_replayed.len()
        )];
        for e in &report.errors {
            lines.push(output::step_line(StepStatus::Fail, "error", e));
        }
        for w in &report.warnings {
            lines.push(output::step_line(StepStatus::Warn, "warning", w));
        }
        if report.errors.is_empty() && report.warnings.is_empty() {
            lines.push(output::step_line(StepStatus::Pass, "clean", ""));
        }
        lines.push(format!(
            "{}: summary errors={} warnings={}",
            name,
            report.errors.len(),
            report.warnings.len()
        ));
        lines.join("\n")
    }
}
