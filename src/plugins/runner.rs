//! Task orchestration: cache → analyzer → state.
//!
//! One run computes the task's modified files, opens an execution record,
//! runs the task's analyzer, closes the record, and only then advances the
//! cache baseline. A fault closes the record as failed and leaves the
//! baseline untouched, so the next run re-checks the same files.

use crate::core::config::AutomationConfig;
use crate::core::error;
use crate::core::store::Store;
use crate::plugins::analyzer::{AnalysisReport, AnalyzerRunner};
use crate::plugins::cache::CacheManager;
use crate::plugins::docs_check::{self, DocumentationChecker};
use crate::plugins::hook_coverage::{self, HookCoverageAnalyzer};
use crate::plugins::rules::{ApplyOutcome, RuleEngine};
use crate::plugins::state::StateManager;
use serde::Serialize;
use serde_json::{Value as JsonValue, json};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, info};

pub const RULES_TASK: &str = "rules";

#[derive(Debug, Clone, Serialize)]
pub struct TaskOutcome {
    pub task: String,
    pub execution_id: i64,
    /// `None` when the run was forced and every input was re-checked.
    pub modified_files: Option<usize>,
    pub report: AnalysisReport,
    pub elapsed_secs: f64,
    #[serde(skip)]
    pub rendered: String,
}

impl TaskOutcome {
    pub fn success(&self) -> bool {
        self.report.is_clean()
    }
}

pub struct TaskRunner<'a> {
    store: &'a Store,
    config: &'a AutomationConfig,
    cache: &'a mut CacheManager,
    state: &'a mut StateManager,
}

impl<'a> TaskRunner<'a> {
    pub fn new(
        store: &'a Store,
        config: &'a AutomationConfig,
        cache: &'a mut CacheManager,
        state: &'a mut StateManager,
    ) -> Self {
        Self {
            store,
            config,
            cache,
            state,
        }
    }

    pub fn run(&mut self, task: &str, force: bool) -> Result<TaskOutcome, error::AutomationError> {
        if !self.cache.tasks().contains(&task) {
            return Err(error::AutomationError::NotFound(format!(
                "unknown task '{}' (configured: {})",
                task,
                self.cache.tasks().join(", ")
            )));
        }
        let modified = if force {
            None
        } else {
            Some(self.cache.get_modified_files(task))
        };
        let modified_count = modified.as_ref().map(Vec::len);
        debug!(task, force, modified = ?modified_count, "task starting");

        let id = self.state.start_execution(
            task,
            &json!({ "force": force, "modified_files": modified_count }),
        );
        let started = Instant::now();
        let (report, rendered) = match self.execute(task, modified) {
            Ok(done) => done,
            Err(e) => {
                self.state.fail_execution(id, &e.to_string());
                return Err(e);
            }
        };
        let elapsed_secs = started.elapsed().as_secs_f64();
        self.state
            .complete_execution(id, report.is_clean(), elapsed_secs);
        self.cache.update_cache(task)?;
        info!(
            task,
            errors = report.errors.len(),
            warnings = report.warnings.len(),
            elapsed_secs,
            "task finished"
        );

        Ok(TaskOutcome {
            task: task.to_string(),
            execution_id: id,
            modified_files: modified_count,
            report,
            elapsed_secs,
            rendered,
        })
    }

    fn execute(
        &mut self,
        task: &str,
        modified: Option<Vec<PathBuf>>,
    ) -> Result<(AnalysisReport, String), error::AutomationError> {
        let root = &self.store.project_root;
        match task {
            docs_check::ANALYZER_NAME => {
                let checker = DocumentationChecker::new(
                    root,
                    self.config.docs.clone(),
                    self.config.rules.clone(),
                );
                let mut runner = AnalyzerRunner::new(checker, root);
                if let Some(files) = modified {
                    runner.set_modified_files(files);
                }
                let report = runner.analyze(self.state);
                Ok((report, runner.report()))
            }
            hook_coverage::ANALYZER_NAME => {
                let analyzer = HookCoverageAnalyzer::new(root, self.config.hooks.clone());
                let mut runner = AnalyzerRunner::new(analyzer, root);
                if let Some(files) = modified {
                    runner.set_modified_files(files);
                }
                let report = runner.analyze(self.state);
                runner.analyzer().write_artifacts()?;
                Ok((report, runner.report()))
            }
            RULES_TASK => {
                let engine = RuleEngine::load(self.store, self.config);
                let validation = engine.run_validation();
                for rule in engine.rule_set().rules() {
                    let findings: Vec<String> = validation
                        .violations
                        .iter()
                        .filter(|v| v.rules.iter().any(|r| *r == rule.name))
                        .map(ToString::to_string)
                        .collect();
                    let passed = !validation
                        .errors()
                        .any(|v| v.rules.iter().any(|r| *r == rule.name));
                    self.state.record_rule_check(
                        &rule.name,
                        passed,
                        &json!({ "source": "validate", "violations": findings }),
                    );
                }
                let report = AnalysisReport {
                    analyzer: RULES_TASK.to_string(),
                    errors: validation.errors().map(ToString::to_string).collect(),
                    warnings: validation.warnings().map(ToString::to_string).collect(),
                    checks_run: validation.steps.iter().map(|s| s.label.to_string()).collect(),
                    checks_replayed: Vec::new(),
                };
                Ok((report, validation.render()))
            }
            other => Err(error::AutomationError::NotFound(format!(
                "no analyzer handles task '{}'",
                other
            ))),
        }
    }
}

/// Apply rules for `context` and append every result to the rule history.
pub fn apply_rules_recorded(
    engine: &RuleEngine,
    state: &StateManager,
    context: &str,
    data: &JsonValue,
) -> ApplyOutcome {
    let outcome = engine.apply_rules(context, data);
    for name in &outcome.applied {
        if let Some(result) = outcome.results.get(name) {
            let details = serde_json::to_value(result).unwrap_or(JsonValue::Null);
            state.record_rule_check(name, result.passed(), &details);
        }
    }
    outcome
}
