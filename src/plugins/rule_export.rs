//! Rule table export for tooling and audits.
//!
//! The YAML export uses the same document shape the loader reads, so
//! exporting and re-loading yields an equal rule table.

use crate::core::error;
use crate::plugins::rules::{Condition, ROOT_CATEGORY, Rule, RuleEngine, RuleSet, WORKFLOWS_KEY, Workflow};
use serde::Serialize;
use serde_json::Value as JsonValue;
use serde_yaml::{Mapping, Value as YamlValue};
use std::fmt::Write as _;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// Native rule document (YAML).
    Yaml,
    Json,
    /// Rust source literal.
    Rust,
    Markdown,
}

impl FromStr for ExportFormat {
    type Err = error::AutomationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "yaml" | "yml" => Ok(ExportFormat::Yaml),
            "json" => Ok(ExportFormat::Json),
            "rust" | "rs" => Ok(ExportFormat::Rust),
            "markdown" | "md" => Ok(ExportFormat::Markdown),
            other => Err(error::AutomationError::ValidationError(format!(
                "unknown export format '{}' (expected yaml, json, rust or markdown)",
                other
            ))),
        }
    }
}

#[derive(Debug, Serialize)]
struct ConditionRecord<'a> {
    field: &'a str,
    operator: &'a str,
    value: &'a JsonValue,
}

#[derive(Debug, Serialize)]
struct RuleRecord<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    priority: Option<i64>,
    enabled: bool,
    #[serde(skip_serializing_if = "is_empty_list")]
    context: &'a [String],
    #[serde(skip_serializing_if = "Vec::is_empty")]
    conditions: Vec<ConditionRecord<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    validation: Vec<ConditionRecord<'a>>,
    #[serde(skip_serializing_if = "is_empty_list")]
    depends_on: &'a [String],
    #[serde(skip_serializing_if = "is_empty_list")]
    applies_to: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    action: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    workflow: Option<&'a str>,
}

fn is_empty_list(list: &&[String]) -> bool {
    list.is_empty()
}

fn conditions(list: &[Condition]) -> Vec<ConditionRecord<'_>> {
    list.iter()
        .map(|c| ConditionRecord {
            field: &c.field,
            operator: c.operator.as_str(),
            value: &c.value,
        })
        .collect()
}

impl<'a> From<&'a Rule> for RuleRecord<'a> {
    fn from(rule: &'a Rule) -> Self {
        RuleRecord {
            description: rule.description.as_deref(),
            priority: rule.priority,
            enabled: rule.enabled,
            context: &rule.context,
            conditions: conditions(&rule.conditions),
            validation: conditions(&rule.validation),
            depends_on: &rule.depends_on,
            applies_to: &rule.applies_to,
            action: rule.action.as_ref().map(ToString::to_string),
            workflow: rule.workflow.as_deref(),
        }
    }
}

#[derive(Debug, Serialize)]
struct WorkflowRecord<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    steps: &'a [String],
}

impl<'a> From<&'a Workflow> for WorkflowRecord<'a> {
    fn from(w: &'a Workflow) -> Self {
        WorkflowRecord {
            description: w.description.as_deref(),
            steps: &w.steps,
        }
    }
}

impl RuleSet {
    /// The table as a loader-compatible YAML document.
    pub fn to_document(&self) -> Result<YamlValue, error::AutomationError> {
        let mut root = Mapping::new();
        for category in self.categories() {
            let mut body = Mapping::new();
            for rule in &category.rules {
                body.insert(
                    YamlValue::String(rule.name.clone()),
                    serde_yaml::to_value(RuleRecord::from(rule))?,
                );
            }
            if category.name == ROOT_CATEGORY {
                root.extend(body);
            } else {
                root.insert(
                    YamlValue::String(category.name.clone()),
                    YamlValue::Mapping(body),
                );
            }
        }
        if !self.workflows().is_empty() {
            let mut workflows = Mapping::new();
            for w in self.workflows() {
                workflows.insert(
                    YamlValue::String(w.name.clone()),
                    serde_yaml::to_value(WorkflowRecord::from(w))?,
                );
            }
            root.insert(
                YamlValue::String(WORKFLOWS_KEY.to_string()),
                YamlValue::Mapping(workflows),
            );
        }
        Ok(YamlValue::Mapping(root))
    }
}

impl RuleEngine {
    pub fn export_rules(&self, format: ExportFormat) -> Result<String, error::AutomationError> {
        let set = self.rule_set();
        match format {
            ExportFormat::Yaml => Ok(serde_yaml::to_string(&set.to_document()?)?),
            ExportFormat::Json => {
                let doc: JsonValue = serde_yaml::from_value(set.to_document()?)?;
                Ok(serde_json::to_string_pretty(&doc)?)
            }
            ExportFormat::Rust => Ok(render_rust(set)),
            ExportFormat::Markdown => Ok(render_markdown(set)),
        }
    }
}

fn render_rust(set: &RuleSet) -> String {
    let mut out = String::new();
    out.push_str("// Generated by `isotone-automation rules export --format rust`.\n");
    out.push_str("// (name, category, priority, enabled, action, context, applies_to)\n");
    out.push_str(
        "pub const RULES: &[(&str, &str, i64, bool, &str, &[&str], &[&str])] = &[\n",
    );
    for rule in set.rules() {
        let action = rule.action.as_ref().map(ToString::to_string).unwrap_or_default();
        let _ = writeln!(
            out,
            "    ({:?}, {:?}, {}, {}, {:?}, &{:?}, &{:?}),",
            rule.name,
            rule.category,
            rule.effective_priority(),
            rule.enabled,
            action,
            rule.context,
            rule.applies_to
        );
    }
    out.push_str("];\n");
    out
}

fn render_markdown(set: &RuleSet) -> String {
    let mut out = String::new();
    out.push_str("# Automation Rules\n\n");
    let _ = writeln!(
        out,
        "{} rule(s) in {} categor{}, {} workflow(s).\n",
        set.len(),
        set.categories().len(),
        if set.categories().len() == 1 { "y" } else { "ies" },
        set.workflows().len()
    );
    for category in set.categories() {
        let _ = writeln!(out, "## {}\n", category.name);
        if category.rules.is_empty() {
            out.push_str("_No rules._\n\n");
            continue;
        }
        out.push_str("| Rule | Priority | Enabled | Context | Action | Depends on |\n");
        out.push_str("|------|----------|---------|---------|--------|------------|\n");
        for rule in &category.rules {
            let context = if rule.context.is_empty() {
                "*".to_string()
            } else {
                rule.context.join(", ")
            };
            let _ = writeln!(
                out,
                "| `{}` | {} | {} | {} | {} | {} |",
                rule.name,
                rule.priority.map(|p| p.to_string()).unwrap_or_else(|| "-".to_string()),
                if rule.enabled { "yes" } else { "no" },
                context,
                rule.action.as_ref().map(ToString::to_string).unwrap_or_else(|| "-".to_string()),
                if rule.depends_on.is_empty() {
                    "-".to_string()
                } else {
                    rule.depends_on.join(", ")
                }
            );
        }
        out.push('\n');
    }
    if !set.workflows().is_empty() {
        out.push_str("## Workflows\n\n");
        for w in set.workflows() {
            let _ = writeln!(
                out,
                "- **{}**{}: {}",
                w.name,
                w.description
                    .as_deref()
                    .map(|d| format!(" ({})", d))
                    .unwrap_or_default(),
                w.steps.join(" → ")
            );
        }
    }
    out
}
