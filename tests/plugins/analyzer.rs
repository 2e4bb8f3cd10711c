use isotone_automation::core::config::{AutomationConfig, HealthConfig, HooksConfig};
use isotone_automation::core::store::Store;
use isotone_automation::plugins::analyzer::{Analyzer, AnalyzerRunner, CheckSpec, CheckVerdict};
use isotone_automation::plugins::cache::CacheManager;
use isotone_automation::plugins::hook_coverage::HookCoverageAnalyzer;
use isotone_automation::plugins::runner::TaskRunner;
use isotone_automation::plugins::state::{ExecutionStatus, StateManager};
use std::fs;
use std::path::Path;
use tempfile::tempdir;

/// Produces a different verdict every time a check actually runs.
struct Volatile {
    calls: u32,
}

impl Analyzer for Volatile {
    fn name(&self) -> &str {
        "volatile"
    }

    fn checks(&self) -> Vec<CheckSpec> {
        vec![
            CheckSpec::new("first", "src/a.php"),
            CheckSpec::new("second", "docs"),
        ]
    }

    fn run_check(&mut self, check: &CheckSpec) -> CheckVerdict {
        self.calls += 1;
        let mut verdict = CheckVerdict::default();
        if self.calls % 2 == 0 {
            verdict.error(format!("{} failed on call {}", check.name, self.calls));
        } else {
            verdict.warn(format!("{} flaky on call {}", check.name, self.calls));
        }
        verdict
    }
}

fn state_for(root: &Path) -> StateManager {
    StateManager::open(
        &Store::new(root, root.join(".isotone/automation")),
        HealthConfig::default(),
    )
}

#[test]
fn unmodified_inputs_replay_byte_identical_findings() {
    let tmp = tempdir().unwrap();
    let mut state = state_for(tmp.path());

    let mut runner = AnalyzerRunner::new(Volatile { calls: 0 }, tmp.path());
    let first = runner.analyze(&mut state);

    // A fresh analyzer instance only sees the persisted cache.
    let mut runner = AnalyzerRunner::new(Volatile { calls: 100 }, tmp.path());
    runner.set_modified_files(Vec::new());
    let second = runner.analyze(&mut state);

    assert_eq!(second.checks_replayed, vec!["first", "second"]);
    assert_eq!(
        serde_json::to_string(&(&first.errors, &first.warnings)).unwrap(),
        serde_json::to_string(&(&second.errors, &second.warnings)).unwrap()
    );
}

#[test]
fn modified_directory_reruns_only_its_check() {
    let tmp = tempdir().unwrap();
    let mut state = state_for(tmp.path());
    let mut runner = AnalyzerRunner::new(Volatile { calls: 0 }, tmp.path());
    runner.analyze(&mut state);

    runner.set_modified_files(vec![tmp.path().join("docs/guide/intro.md")]);
    let report = runner.analyze(&mut state);
    assert_eq!(report.checks_run, vec!["second"]);
    assert_eq!(report.checks_replayed, vec!["first"]);
}

fn hook_project(root: &Path) {
    fs::create_dir_all(root.join("app")).unwrap();
    fs::create_dir_all(root.join("iso-core")).unwrap();
    fs::create_dir_all(root.join("docs")).unwrap();
    fs::write(
        root.join("app/boot.php"),
        "<?php\ndo_action('init');\nadd_action('init', 'boot');\nadd_filter('ghost', 'x');\n",
    )
    .unwrap();
    fs::write(
        root.join("iso-core/render.php"),
        "<?php\n$t = apply_filters('title', $t);\ndo_action('secret');\n",
    )
    .unwrap();
    fs::write(
        root.join("docs/hooks.md"),
        "# Hooks\n\n- `init` runs first\n- `title` filters titles\n- `shutdown` runs last\n",
    )
    .unwrap();
}

#[test]
fn hook_coverage_reports_gaps_and_writes_artifacts() {
    let tmp = tempdir().unwrap();
    hook_project(tmp.path());
    let mut state = state_for(tmp.path());
    let config = HooksConfig {
        min_coverage: 80.0,
        ..HooksConfig::default()
    };
    let mut runner = AnalyzerRunner::new(HookCoverageAnalyzer::new(tmp.path(), config.clone()), tmp.path());
    let report = runner.analyze(&mut state);

    assert_eq!(
        report.errors,
        vec!["hook coverage 66.7% is below the required 80.0%"]
    );
    assert!(report.warnings.iter().any(|w| w.starts_with("hook 'secret' is fired at iso-core/render.php:3")));
    assert!(report.warnings.iter().any(|w| w == "documented hook 'shutdown' is never fired"));
    assert!(report.warnings.iter().any(|w| w.starts_with("listener for unknown hook 'ghost'")));

    runner.analyzer().write_artifacts().unwrap();
    let stats: serde_json::Value = serde_json::from_str(
        &fs::read_to_string(tmp.path().join(&config.statistics_output)).unwrap(),
    )
    .unwrap();
    assert_eq!(stats["documented_hooks"], 3);
    assert_eq!(stats["implemented_hooks"], 2);
    assert_eq!(stats["files_with_hooks"], 2);
    let map: serde_json::Value = serde_json::from_str(
        &fs::read_to_string(tmp.path().join(&config.implementation_map_output)).unwrap(),
    )
    .unwrap();
    assert_eq!(map["hooks"]["init"]["fired_at"][0], "app/boot.php:2");
    assert_eq!(map["hooks"]["secret"]["status"], "undocumented");
}

#[test]
fn replayed_hook_scans_still_feed_coverage() {
    let tmp = tempdir().unwrap();
    hook_project(tmp.path());
    let mut state = state_for(tmp.path());
    let config = HooksConfig::default();

    let mut runner = AnalyzerRunner::new(HookCoverageAnalyzer::new(tmp.path(), config.clone()), tmp.path());
    let first = runner.analyze(&mut state);

    let mut runner = AnalyzerRunner::new(HookCoverageAnalyzer::new(tmp.path(), config), tmp.path());
    runner.set_modified_files(Vec::new());
    let second = runner.analyze(&mut state);
    assert!(second.checks_run.is_empty());
    assert_eq!(second.warnings, first.warnings);
    assert_eq!(runner.analyzer().inventory().fired.len(), 3);
}

#[test]
fn task_runner_records_execution_then_advances_the_cache() {
    let tmp = tempdir().unwrap();
    hook_project(tmp.path());
    let config = AutomationConfig::default();
    let store = Store::from_config(tmp.path(), &config);
    let mut cache = CacheManager::open(&store, config.tasks.clone());
    let mut state = StateManager::open(&store, config.health.clone());

    let outcome = TaskRunner::new(&store, &config, &mut cache, &mut state)
        .run("hooks", false)
        .unwrap();
    assert!(outcome.success());
    assert_eq!(outcome.modified_files, Some(3));
    let record = state.execution(outcome.execution_id).unwrap();
    assert_eq!(record.status, ExecutionStatus::Completed);
    assert!(cache.get_modified_files("hooks").is_empty());

    let again = TaskRunner::new(&store, &config, &mut cache, &mut state)
        .run("hooks", false)
        .unwrap();
    assert_eq!(again.modified_files, Some(0));
    assert!(again.report.checks_run.is_empty());
    assert_eq!(again.report.warnings, outcome.report.warnings);
}

#[test]
fn unknown_task_is_rejected_before_any_record() {
    let tmp = tempdir().unwrap();
    let config = AutomationConfig::default();
    let store = Store::from_config(tmp.path(), &config);
    let mut cache = CacheManager::open(&store, config.tasks.clone());
    let mut state = StateManager::open(&store, config.health.clone());
    let result = TaskRunner::new(&store, &config, &mut cache, &mut state).run("nope", false);
    assert!(result.is_err());
    assert_eq!(state.get_status().stats.total, 0);
}

fn docs_project(root: &Path) {
    fs::create_dir_all(root.join("docs")).unwrap();
    fs::create_dir_all(root.join("iso-automation/config")).unwrap();
    fs::write(root.join("README.md"), "# Site\n").unwrap();
    fs::write(root.join("docs/README.md"), "# Docs\n").unwrap();
    fs::write(
        root.join("iso-automation/config/rules.yaml"),
        "release:\n  a:\n    priority: 10\n    workflow: ship\n",
    )
    .unwrap();
    fs::write(
        root.join("iso-automation/config/workflows.yaml"),
        "workflows:\n  ship:\n    steps: [a]\n",
    )
    .unwrap();
}

fn run_docs(root: &Path, force: bool) -> isotone_automation::plugins::runner::TaskOutcome {
    let config = AutomationConfig::default();
    let store = Store::from_config(root, &config);
    let mut cache = CacheManager::open(&store, config.tasks.clone());
    let mut state = StateManager::open(&store, config.health.clone());
    TaskRunner::new(&store, &config, &mut cache, &mut state)
        .run("docs", force)
        .unwrap()
}

#[test]
fn editing_only_the_workflows_document_rechecks_rule_references() {
    let tmp = tempdir().unwrap();
    docs_project(tmp.path());
    let first = run_docs(tmp.path(), false);
    assert!(first.success());

    fs::write(
        tmp.path().join("iso-automation/config/workflows.yaml"),
        "workflows:\n  deploy:\n    steps: [a, b]\n",
    )
    .unwrap();
    let second = run_docs(tmp.path(), false);
    assert!(second.report.checks_run.contains(&"rules_reference".to_string()));
    assert_eq!(
        second.report.errors,
        vec!["rule 'a' references unknown workflow 'ship'"]
    );
}

#[test]
fn deleted_page_drops_its_stale_finding() {
    let tmp = tempdir().unwrap();
    docs_project(tmp.path());
    fs::write(tmp.path().join("docs/orphan.md"), "# Orphan\n").unwrap();
    let first = run_docs(tmp.path(), false);
    assert!(first
        .report
        .warnings
        .contains(&"docs/orphan.md is not linked from docs/README.md".to_string()));

    fs::remove_file(tmp.path().join("docs/orphan.md")).unwrap();
    let second = run_docs(tmp.path(), false);
    assert_eq!(second.modified_files, Some(1));
    assert!(second.report.checks_run.contains(&"docs_index".to_string()));
    assert!(second.report.warnings.is_empty());

    let third = run_docs(tmp.path(), false);
    assert_eq!(third.modified_files, Some(0));
    assert!(third.report.checks_run.is_empty());
}
