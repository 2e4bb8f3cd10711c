use isotone_automation::core::config::ValidationSettings;
use isotone_automation::plugins::rule_export::ExportFormat;
use isotone_automation::plugins::rule_validate::{Severity, ViolationKind};
use isotone_automation::plugins::rules::{ActionKind, ActionOutcome, ActionRegistry, ActionStatus, RuleEngine, RuleSet};
use serde_json::json;
use std::fs;
use tempfile::tempdir;

fn engine(doc: &str) -> RuleEngine {
    RuleEngine::new(
        RuleSet::from_yaml_str(doc),
        "/nonexistent-project",
        ValidationSettings::default(),
    )
}

#[test]
fn rules_for_context_orders_by_descending_priority() {
    let engine = engine(
        "quality:\n  low:\n    priority: 10\n  high:\n    priority: 90\n  mid:\n    priority: 50\n",
    );
    let names: Vec<&str> = engine
        .rules_for_context("anything")
        .iter()
        .map(|r| r.name.as_str())
        .collect();
    assert_eq!(names, vec!["high", "mid", "low"]);
}

#[test]
fn context_filter_honours_wildcard_and_lists() {
    let engine = engine(
        "a:\n  priority: 1\n  context: [commit]\nb:\n  priority: 2\n  context: ['*']\nc:\n  priority: 3\n  context: [deploy]\n",
    );
    let names: Vec<&str> = engine
        .rules_for_context("commit")
        .iter()
        .map(|r| r.name.as_str())
        .collect();
    assert_eq!(names, vec!["b", "a"]);
}

#[test]
fn conflicts_are_reported_regardless_of_declaration_order() {
    let forward = "a:\n  priority: 50\n  applies_to: [/x]\n  action: fmt\nb:\n  priority: 50\n  applies_to: [/x]\n  action: lint\n";
    let reverse = "b:\n  priority: 50\n  applies_to: [/x]\n  action: lint\na:\n  priority: 50\n  applies_to: [/x]\n  action: fmt\n";

    let one = engine(forward).run_validation();
    let two = engine(reverse).run_validation();

    let conflicts = |report: &isotone_automation::plugins::rule_validate::ValidationReport| {
        report
            .violations
            .iter()
            .filter(|v| v.kind == ViolationKind::Conflict)
            .cloned()
            .collect::<Vec<_>>()
    };
    let c1 = conflicts(&one);
    assert_eq!(c1.len(), 1);
    assert_eq!(c1[0].rules, vec!["a", "b"]);
    assert_eq!(c1, conflicts(&two));
    assert!(!one.is_valid());
}

#[test]
fn same_action_or_different_priority_is_not_a_conflict() {
    let report = engine(
        "a:\n  priority: 50\n  applies_to: [/x]\n  action: fmt\nb:\n  priority: 50\n  applies_to: [/x]\n  action: fmt\nc:\n  priority: 40\n  applies_to: [/x]\n  action: lint\n",
    )
    .run_validation();
    assert!(report.violations.iter().all(|v| v.kind != ViolationKind::Conflict));
}

#[test]
fn missing_dependency_is_exactly_one_violation() {
    let engine = engine("A:\n  priority: 10\n  depends_on: [B]\n");
    assert!(!engine.validate());
    let report = engine.run_validation();
    assert_eq!(report.violations.len(), 1);
    let v = &report.violations[0];
    assert_eq!(v.kind, ViolationKind::Reference);
    assert_eq!(v.rules, vec!["A"]);
    assert!(v.message.contains('A') && v.message.contains('B'));
}

#[test]
fn unknown_workflow_reference_fails() {
    let set = RuleSet::from_yaml_str("a:\n  priority: 1\n  workflow: ship\n");
    let report = RuleEngine::new(set, "/nonexistent-project", ValidationSettings::default())
        .run_validation();
    assert!(!report.is_valid());

    let set = RuleSet::from_yaml_str("a:\n  priority: 1\n  workflow: ship\n")
        .with_workflows_yaml("ship:\n  steps: [a]\n");
    let report = RuleEngine::new(set, "/nonexistent-project", ValidationSettings::default())
        .run_validation();
    assert!(report.is_valid(), "{:?}", report.violations);
}

#[test]
fn priority_range_is_inclusive_of_100() {
    let report = engine("over:\n  priority: 150\nedge:\n  priority: 100\n").run_validation();
    let structure: Vec<_> = report
        .violations
        .iter()
        .filter(|v| v.kind == ViolationKind::Structure)
        .collect();
    assert_eq!(structure.len(), 1);
    assert_eq!(structure[0].rules, vec!["over"]);
}

#[test]
fn validation_is_deterministic() {
    let doc = "a:\n  priority: 50\n  applies_to: [/x]\n  action: fmt\n  depends_on: [zz]\nb:\n  priority: 50\n  applies_to: [/x]\n  action: lint\nc:\n  priority: 500\n";
    let engine = engine(doc);
    let first = engine.run_validation();
    for _ in 0..5 {
        assert_eq!(engine.run_validation(), first);
    }
}

#[test]
fn yaml_export_reloads_to_an_equal_table() {
    let doc = r#"
quality:
  format:
    description: Format sources
    priority: 80
    context: [commit]
    conditions:
      - field: files
        operator: contains
        value: app/x.php
    applies_to: ["/app/**"]
    action: "run:composer test"
  docs:
    priority: 20
    enabled: false
    depends_on: [format]
    workflow: ship
standalone:
  priority: 5
  action: warn
workflows:
  ship:
    description: Release flow
    steps: [format, docs]
"#;
    let original = RuleSet::from_yaml_str(doc);
    let engine = RuleEngine::new(original.clone(), "/nonexistent-project", ValidationSettings::default());
    let exported = engine.export_rules(ExportFormat::Yaml).unwrap();
    let reloaded = RuleSet::from_yaml_str(&exported);

    assert!(reloaded.load_issues().is_empty());
    assert_eq!(reloaded.by_name(), original.by_name());
    assert_eq!(reloaded.workflows(), original.workflows());
}

#[test]
fn apply_rules_dispatches_through_the_registry() {
    let mut registry = ActionRegistry::new();
    registry.register(ActionKind::Run, |rule: &isotone_automation::plugins::rules::Rule,
                                         action: &isotone_automation::plugins::rules::RuleAction,
                                         _data: &serde_json::Value| ActionOutcome {
        action: action.to_string(),
        status: ActionStatus::Skipped,
        message: format!("dry run for {}", rule.name),
    });
    let engine = engine(
        "lint:\n  priority: 60\n  action: 'run:composer test'\n  conditions:\n    - {field: branch, operator: '==', value: main}\n  validation:\n    - {field: tests, operator: '>', value: 0}\nnotify:\n  priority: 10\n  action: 'notify:ops'\n",
    )
    .with_actions(registry);

    let outcome = engine.apply_rules("ci", &json!({"branch": "main", "tests": 0}));
    assert_eq!(outcome.applied, vec!["lint", "notify"]);
    let lint = &outcome.results["lint"];
    assert_eq!(lint.action.as_ref().unwrap().status, ActionStatus::Skipped);
    assert!(!lint.passed());
    assert_eq!(
        outcome.results["notify"].action.as_ref().unwrap().status,
        ActionStatus::Dispatched
    );

    let outcome = engine.apply_rules("ci", &json!({"branch": "dev"}));
    assert_eq!(outcome.applied, vec!["notify"]);
}

#[test]
fn critical_paths_are_warnings_unless_strict() {
    let tmp = tempdir().unwrap();
    fs::create_dir_all(tmp.path().join("app")).unwrap();
    fs::write(
        tmp.path().join("GUIDE.md"),
        "Hooks live in /app/ and /iso-core/boot.php; see https://example.com/config/x.\n",
    )
    .unwrap();
    let set = RuleSet::from_yaml_str("a:\n  priority: 1\n");

    let lenient = RuleEngine::new(set.clone(), tmp.path(), ValidationSettings::default())
        .with_scan_docs(vec!["GUIDE.md".into()])
        .run_validation();
    let paths: Vec<_> = lenient
        .violations
        .iter()
        .filter(|v| v.kind == ViolationKind::Path)
        .collect();
    assert_eq!(paths.len(), 1);
    assert_eq!(paths[0].severity, Severity::Warning);
    assert!(paths[0].message.contains("/iso-core/boot.php"));
    assert!(lenient.is_valid());

    let strict = RuleEngine::new(
        set,
        tmp.path(),
        ValidationSettings {
            strict_paths: true,
            ..ValidationSettings::default()
        },
    )
    .with_scan_docs(vec!["GUIDE.md".into()])
    .run_validation();
    assert!(!strict.is_valid());
}
