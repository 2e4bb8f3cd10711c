//! Rule table validation.
//!
//! Five independent gates run in a fixed order and every violation is
//! collected; no gate short-circuits another:
//!
//! 1. Structure: priority present, integral and within 0-100; `context` is a
//!    list; `enabled` is a boolean; conditions are well formed.
//! 2. References: `depends_on` targets and `workflow` names resolve.
//! 3. Conflicts: same `applies_to` pattern, same priority, different action.
//! 4. Paths: critical project paths mentioned in rule text or prose exist.
//! 5. Commands: quoted commands are on the allow-list (advisory).
//!
//! Validation is a pure function of the rule table and the filesystem, so the
//! same inputs always produce the same violation list.

use crate::core::output::{self, StepStatus};
use crate::plugins::rule_scrape;
use crate::plugins::rules::{ConditionOperator, Rule, RuleEngine, yaml_integer};
use serde::Serialize;
use serde_yaml::Value as YamlValue;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::path::PathBuf;
use tracing::debug;

pub const PRIORITY_MIN: i64 = 0;
pub const PRIORITY_MAX: i64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    Structure,
    Reference,
    Conflict,
    Path,
    Command,
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ViolationKind::Structure => "structure",
            ViolationKind::Reference => "reference",
            ViolationKind::Conflict => "conflict",
            ViolationKind::Path => "path",
            ViolationKind::Command => "command",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Violation {
    pub kind: ViolationKind,
    pub severity: Severity,
    /// Rules involved, sorted by name.
    pub rules: Vec<String>,
    pub message: String,
}

impl Violation {
    pub fn new(
        kind: ViolationKind,
        severity: Severity,
        mut rules: Vec<String>,
        message: impl Into<String>,
    ) -> Self {
        rules.sort();
        Self {
            kind,
            severity,
            rules,
            message: message.into(),
        }
    }

    fn error(kind: ViolationKind, rule: &str, message: impl Into<String>) -> Self {
        Self::new(kind, Severity::Error, vec![rule.to_string()], message)
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationStep {
    pub label: &'static str,
    pub errors: usize,
    pub warnings: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationReport {
    pub steps: Vec<ValidationStep>,
    pub violations: Vec<Violation>,
}

impl ValidationReport {
    fn record(&mut self, label: &'static str, found: Vec<Violation>) {
        let errors = found.iter().filter(|v| v.is_error()).count();
        self.steps.push(ValidationStep {
            label,
            errors,
            warnings: found.len() - errors,
        });
        self.violations.extend(found);
    }

    /// True iff no error-severity violation was found.
    pub fn is_valid(&self) -> bool {
        self.errors().next().is_none()
    }

    pub fn errors(&self) -> impl Iterator<Item = &Violation> {
        self.violations.iter().filter(|v| v.is_error())
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Violation> {
        self.violations.iter().filter(|v| !v.is_error())
    }

    /// Step-by-step trace plus the final count, one line per entry.
    pub fn render(&self) -> String {
        let total = self.steps.len();
        let mut lines = vec!["rules: validating".to_string()];
        for (i, step) in self.steps.iter().enumerate() {
            let label = format!("[{}/{}] {}", i + 1, total, step.label);
            let (status, detail) = match (step.errors, step.warnings) {
                (0, 0) => (StepStatus::Pass, "ok".to_string()),
                (0, w) => (StepStatus::Warn, format!("{} warning(s)", w)),
                (e, 0) => (StepStatus::Fail, format!("{} violation(s)", e)),
                (e, w) => (
                    StepStatus::Fail,
                    format!("{} violation(s), {} warning(s)", e, w),
                ),
            };
            lines.push(output::step_line(status, &label, &detail));
        }
        let errors: Vec<String> = self.errors().map(ToString::to_string).collect();
        let warnings: Vec<String> = self.warnings().map(ToString::to_string).collect();
        lines.push(format!(
            "rules: summary violations={} warnings={}",
            errors.len(),
            warnings.len()
        ));
        if !errors.is_empty() {
            lines.push(format!(
                "rules: violations: {}",
                output::preview_messages(&errors, 3, 110)
            ));
        }
        if !warnings.is_empty() {
            lines.push(format!(
                "rules: warnings: {}",
                output::preview_messages(&warnings, 3, 110)
            ));
        }
        lines.join("\n")
    }
}

impl RuleEngine {
    /// Run every gate, print the trace, and report whether the table is valid.
    pub fn validate(&self) -> bool {
        let report = self.run_validation();
        println!("{}", report.render());
        report.is_valid()
    }

    /// Run every gate and return the full report without printing.
    pub fn run_validation(&self) -> ValidationReport {
        let mut report = ValidationReport::default();
        output::trace("rules", "validate_structure");
        report.record("Structure", self.validate_structure());
        output::trace("rules", "validate_references");
        report.record("References", self.validate_references());
        output::trace("rules", "validate_conflicts");
        report.record("Conflicts", self.validate_conflicts());
        output::trace("rules", "validate_paths");
        report.record("Paths", self.validate_paths());
        output::trace("rules", "validate_commands");
        report.record("Commands", self.validate_commands());
        debug!(
            violations = report.violations.len(),
            valid = report.is_valid(),
            "rule validation finished"
        );
        report
    }

    fn validate_structure(&self) -> Vec<Violation> {
        let mut found: Vec<Violation> = self.rule_set().load_issues().to_vec();
        for entry in self.rule_set().entries() {
            let name = entry.name.as_str();
            let fields = &entry.fields;

            match fields.get("priority") {
                None => found.push(Violation::error(
                    ViolationKind::Structure,
                    name,
                    format!("rule '{}' is missing a priority", name),
                )),
                Some(raw) => match yaml_integer(raw) {
                    None => found.push(Violation::error(
                        ViolationKind::Structure,
                        name,
                        format!("rule '{}' priority must be an integer", name),
                    )),
                    Some(p) if !(PRIORITY_MIN..=PRIORITY_MAX).contains(&p) => {
                        found.push(Violation::error(
                            ViolationKind::Structure,
                            name,
                            format!(
                                "rule '{}' priority {} is outside {}-{}",
                                name, p, PRIORITY_MIN, PRIORITY_MAX
                            ),
                        ))
                    }
                    Some(_) => {}
                },
            }

            if let Some(context) = fields.get("context") {
                let is_string_list = matches!(context, YamlValue::Sequence(items)
                    if items.iter().all(|i| matches!(i, YamlValue::String(_))));
                if !is_string_list {
                    found.push(Violation::error(
                        ViolationKind::Structure,
                        name,
                        format!("rule '{}' context must be a list of strings", name),
                    ));
                }
            }

            if let Some(enabled) = fields.get("enabled") {
                if !enabled.is_bool() {
                    found.push(Violation::error(
                        ViolationKind::Structure,
                        name,
                        format!("rule '{}' enabled must be a boolean", name),
                    ));
                }
            }

            for key in ["conditions", "validation"] {
                found.extend(condition_shape_violations(name, key, fields.get(key)));
            }
        }
        found
    }

    fn validate_references(&self) -> Vec<Violation> {
        let set = self.rule_set();
        let mut found = Vec::new();
        for rule in set.rules() {
            for target in &rule.depends_on {
                if set.get(target).is_none() {
                    found.push(Violation::error(
                        ViolationKind::Reference,
                        &rule.name,
                        format!(
                            "rule '{}' depends on unknown rule '{}'",
                            rule.name, target
                        ),
                    ));
                }
            }
            if let Some(workflow) = &rule.workflow {
                if set.workflow(workflow).is_none() {
                    found.push(Violation::error(
                        ViolationKind::Reference,
                        &rule.name,
                        format!(
                            "rule '{}' references unknown workflow '{}'",
                            rule.name, workflow
                        ),
                    ));
                }
            }
        }
        found
    }

    fn validate_conflicts(&self) -> Vec<Violation> {
        let mut by_pattern: BTreeMap<&str, Vec<&Rule>> = BTreeMap::new();
        for rule in self.rule_set().rules() {
            let patterns: BTreeSet<&str> = rule.applies_to.iter().map(String::as_str).collect();
            for pattern in patterns {
                by_pattern.entry(pattern).or_default().push(rule);
            }
        }

        let mut found = Vec::new();
        for (pattern, rules) in by_pattern {
            for (i, a) in rules.iter().enumerate() {
                for b in &rules[i + 1..] {
                    if a.name == b.name || a.effective_priority() != b.effective_priority() {
                        continue;
                    }
                    let (Some(action_a), Some(action_b)) = (&a.action, &b.action) else {
                        continue;
                    };
                    if action_a == action_b {
                        continue;
                    }
                    // Name order, so the message is the same whichever rule came first.
                    let ((first, first_action), (second, second_action)) = if a.name <= b.name {
                        ((a, action_a), (b, action_b))
                    } else {
                        ((b, action_b), (a, action_a))
                    };
                    found.push(Violation::new(
                        ViolationKind::Conflict,
                        Severity::Error,
                        vec![first.name.clone(), second.name.clone()],
                        format!(
                            "rules '{}' and '{}' both target '{}' at priority {} with different actions ({} vs {})",
                            first.name,
                            second.name,
                            pattern,
                            first.effective_priority(),
                            first_action,
                            second_action
                        ),
                    ));
                }
            }
        }
        found
    }

    /// Texts scraped by the heuristics: rule documents, then existing scan docs.
    fn scraped_texts(&self) -> Vec<(PathBuf, String)> {
        let mut texts: Vec<(PathBuf, String)> = self
            .rule_set()
            .documents()
            .iter()
            .map(|d| (d.source.clone(), d.text.clone()))
            .collect();
        for doc in self.scan_docs() {
            let path = self.project_root().join(doc);
            if let Ok(text) = fs::read_to_string(&path) {
                texts.push((doc.clone(), text));
            }
        }
        texts
    }

    fn validate_paths(&self) -> Vec<Violation> {
        let settings = self.settings();
        let severity = if settings.strict_paths {
            Severity::Error
        } else {
            Severity::Warning
        };
        let mut seen = BTreeSet::new();
        let mut found = Vec::new();
        for (source, text) in self.scraped_texts() {
            for path in rule_scrape::extract_paths(&text) {
                if rule_scrape::is_pattern(&path) || !seen.insert(path.clone()) {
                    continue;
                }
                let critical = settings.critical_paths.iter().any(|prefix| {
                    path.starts_with(prefix.as_str()) || path == prefix.trim_end_matches('/')
                });
                if !critical {
                    continue;
                }
                let on_disk = self.project_root().join(path.trim_start_matches('/'));
                if !on_disk.exists() {
                    found.push(Violation::new(
                        ViolationKind::Path,
                        severity,
                        Vec::new(),
                        format!(
                            "critical path '{}' referenced in {} does not exist",
                            path,
                            source.display()
                        ),
                    ));
                }
            }
        }
        found
    }

    fn validate_commands(&self) -> Vec<Violation> {
        let settings = self.settings();
        let severity = if settings.strict_commands {
            Severity::Error
        } else {
            Severity::Warning
        };
        let mut seen = BTreeSet::new();
        let mut found = Vec::new();
        for (source, text) in self.scraped_texts() {
            for command in rule_scrape::extract_commands(&text, &settings.runtime) {
                if !seen.insert(command.clone()) {
                    continue;
                }
                if !rule_scrape::is_allowed_command(&command, &settings.allowed_commands) {
                    found.push(Violation::new(
                        ViolationKind::Command,
                        severity,
                        Vec::new(),
                        format!(
                            "unrecognized command '{}' in {}",
                            command,
                            source.display()
                        ),
                    ));
                }
            }
        }
        found
    }
}

fn condition_shape_violations(rule: &str, key: &str, raw: Option<&YamlValue>) -> Vec<Violation> {
    let Some(raw) = raw else {
        return Vec::new();
    };
    let YamlValue::Sequence(items) = raw else {
        return vec![Violation::error(
            ViolationKind::Structure,
            rule,
            format!("rule '{}' {} must be a list", rule, key),
        )];
    };
    let mut found = Vec::new();
    for (i, item) in items.iter().enumerate() {
        let Some(m) = item.as_mapping() else {
            found.push(Violation::error(
                ViolationKind::Structure,
                rule,
                format!("rule '{}' {}[{}] must be a mapping", rule, key, i),
            ));
            continue;
        };
        if !m.get("field").is_some_and(YamlValue::is_string) {
            found.push(Violation::error(
                ViolationKind::Structure,
                rule,
                format!("rule '{}' {}[{}] is missing a field name", rule, key, i),
            ));
        }
        if let Some(op) = m.get("operator").and_then(YamlValue::as_str) {
            if let ConditionOperator::Unknown(raw) = ConditionOperator::parse(op) {
                found.push(Violation::error(
                    ViolationKind::Structure,
                    rule,
                    format!("rule '{}' {}[{}] uses unknown operator '{}'", rule, key, i, raw),
                ));
            }
        }
    }
    found
}
