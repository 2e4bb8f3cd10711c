//! Declarative automation rules: loading, context selection, and evaluation.
//!
//! Rule documents are YAML. A mapping entry is a rule when it carries a
//! `priority` or `enabled` field; any other mapping is a category (container)
//! whose nested rules are flattened into it. A top-level `workflows` key, or
//! a separate workflows document, declares the workflows rules may reference.
//!
//! Rules are loaded once and never mutated afterwards. Within each category
//! they are stably sorted by descending priority.

use crate::core::config::{AutomationConfig, ValidationSettings};
use crate::core::store::Store;
use crate::plugins::rule_validate::{Severity, Violation, ViolationKind};
use serde::Serialize;
use serde_json::Value as JsonValue;
use serde_yaml::{Mapping, Value as YamlValue};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const WORKFLOWS_KEY: &str = "workflows";
pub const ROOT_CATEGORY: &str = "root";
pub const WILDCARD_CONTEXT: &str = "*";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ConditionOperator {
    Eq,
    Ne,
    Gt,
    Lt,
    Contains,
    Unknown(String),
}

impl ConditionOperator {
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "=" | "==" => ConditionOperator::Eq,
            "!=" => ConditionOperator::Ne,
            ">" => ConditionOperator::Gt,
            "<" => ConditionOperator::Lt,
            "contains" => ConditionOperator::Contains,
            other => ConditionOperator::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ConditionOperator::Eq => "=",
            ConditionOperator::Ne => "!=",
            ConditionOperator::Gt => ">",
            ConditionOperator::Lt => "<",
            ConditionOperator::Contains => "contains",
            ConditionOperator::Unknown(raw) => raw,
        }
    }
}

/// `field operator value`, evaluated against run-time data.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Condition {
    pub field: String,
    pub operator: ConditionOperator,
    pub value: JsonValue,
}

impl Condition {
    pub fn evaluate(&self, data: &JsonValue) -> bool {
        let actual = data.get(&self.field).unwrap_or(&JsonValue::Null);
        match &self.operator {
            ConditionOperator::Eq => loosely_equal(actual, &self.value),
            ConditionOperator::Ne => !loosely_equal(actual, &self.value),
            ConditionOperator::Gt => compare(actual, &self.value) == Some(Ordering::Greater),
            ConditionOperator::Lt => compare(actual, &self.value) == Some(Ordering::Less),
            ConditionOperator::Contains => contains(actual, &self.value),
            ConditionOperator::Unknown(_) => false,
        }
    }

    pub fn describe(&self) -> String {
        format!("{} {} {}", self.field, self.operator.as_str(), self.value)
    }
}

fn as_number(v: &JsonValue) -> Option<f64> {
    match v {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn scalar_string(v: &JsonValue) -> Option<String> {
    match v {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        JsonValue::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn loosely_equal(a: &JsonValue, b: &JsonValue) -> bool {
    if a == b {
        return true;
    }
    if let (Some(x), Some(y)) = (as_number(a), as_number(b)) {
        return x == y;
    }
    match (scalar_string(a), scalar_string(b)) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

fn compare(a: &JsonValue, b: &JsonValue) -> Option<Ordering> {
    if let (Some(x), Some(y)) = (as_number(a), as_number(b)) {
        return x.partial_cmp(&y);
    }
    match (scalar_string(a), scalar_string(b)) {
        (Some(x), Some(y)) => Some(x.cmp(&y)),
        _ => None,
    }
}

fn contains(haystack: &JsonValue, needle: &JsonValue) -> bool {
    match haystack {
        JsonValue::Array(items) => items.iter().any(|item| loosely_equal(item, needle)),
        JsonValue::String(s) => scalar_string(needle).is_some_and(|n| s.contains(&n)),
        JsonValue::Object(map) => scalar_string(needle).is_some_and(|n| map.contains_key(&n)),
        _ => false,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum ActionKind {
    Enforce,
    Warn,
    Generate,
    Run,
    Notify,
    Custom,
}

/// What a rule does when it applies. Parsed once from the `action` string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum RuleAction {
    Enforce,
    Warn,
    Generate(String),
    Run(String),
    Notify(String),
    Custom(String),
}

impl RuleAction {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        match raw {
            "enforce" => return RuleAction::Enforce,
            "warn" => return RuleAction::Warn,
            _ => {}
        }
        match raw.split_once(':') {
            Some(("generate", target)) => RuleAction::Generate(target.trim().to_string()),
            Some(("run", command)) => RuleAction::Run(command.trim().to_string()),
            Some(("notify", channel)) => RuleAction::Notify(channel.trim().to_string()),
            _ => RuleAction::Custom(raw.to_string()),
        }
    }

    pub fn kind(&self) -> ActionKind {
        match self {
            RuleAction::Enforce => ActionKind::Enforce,
            RuleAction::Warn => ActionKind::Warn,
            RuleAction::Generate(_) => ActionKind::Generate,
            RuleAction::Run(_) => ActionKind::Run,
            RuleAction::Notify(_) => ActionKind::Notify,
            RuleAction::Custom(_) => ActionKind::Custom,
        }
    }
}

impl fmt::Display for RuleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleAction::Enforce => write!(f, "enforce"),
            RuleAction::Warn => write!(f, "warn"),
            RuleAction::Generate(target) => write!(f, "generate:{}", target),
            RuleAction::Run(command) => write!(f, "run:{}", command),
            RuleAction::Notify(channel) => write!(f, "notify:{}", channel),
            RuleAction::Custom(raw) => write!(f, "{}", raw),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rule {
    pub name: String,
    pub category: String,
    pub description: Option<String>,
    pub priority: Option<i64>,
    pub enabled: bool,
    /// Empty means "any context", same as `*`.
    pub context: Vec<String>,
    pub conditions: Vec<Condition>,
    pub validation: Vec<Condition>,
    pub depends_on: Vec<String>,
    pub applies_to: Vec<String>,
    pub action: Option<RuleAction>,
    pub workflow: Option<String>,
}

impl Rule {
    /// Sort key; a missing priority sorts as 0.
    pub fn effective_priority(&self) -> i64 {
        self.priority.unwrap_or(0)
    }

    pub fn matches_context(&self, context: &str) -> bool {
        self.context.is_empty()
            || self
                .context
                .iter()
                .any(|c| c == WILDCARD_CONTEXT || c == context)
    }

    /// Lenient conversion; shape problems are reported by structure validation.
    pub fn from_entry(entry: &RuleEntry) -> Self {
        let fields = &entry.fields;
        Rule {
            name: entry.name.clone(),
            category: entry.category.clone(),
            description: fields.get("description").and_then(yaml_string),
            priority: fields.get("priority").and_then(yaml_integer),
            enabled: fields
                .get("enabled")
                .and_then(YamlValue::as_bool)
                .unwrap_or(true),
            context: fields.get("context").map(yaml_string_list).unwrap_or_default(),
            conditions: fields.get("conditions").map(yaml_conditions).unwrap_or_default(),
            validation: fields.get("validation").map(yaml_conditions).unwrap_or_default(),
            depends_on: fields.get("depends_on").map(yaml_string_list).unwrap_or_default(),
            applies_to: fields.get("applies_to").map(yaml_string_list).unwrap_or_default(),
            action: fields
                .get("action")
                .and_then(yaml_string)
                .map(|a| RuleAction::parse(&a)),
            workflow: fields.get("workflow").and_then(yaml_string),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Workflow {
    pub name: String,
    pub description: Option<String>,
    pub steps: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleCategory {
    pub name: String,
    pub rules: Vec<Rule>,
}

/// A rule exactly as parsed, kept for structure validation.
#[derive(Debug, Clone)]
pub struct RuleEntry {
    pub name: String,
    pub category: String,
    pub source: PathBuf,
    pub fields: Mapping,
}

/// Raw text of a loaded document, kept for the path and command heuristics.
#[derive(Debug, Clone)]
pub struct LoadedDocument {
    pub source: PathBuf,
    pub text: String,
}

/// The merged, priority-sorted rule table.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    categories: Vec<RuleCategory>,
    workflows: Vec<Workflow>,
    entries: Vec<RuleEntry>,
    documents: Vec<LoadedDocument>,
    load_issues: Vec<Violation>,
}

impl RuleSet {
    /// Load the primary rules document and the workflows document.
    ///
    /// A missing document contributes nothing; it is not an error.
    pub fn load(rules_path: &Path, workflows_path: &Path) -> Self {
        let mut set = RuleSet::default();
        match read_document(rules_path) {
            Some(text) => set.ingest_document(rules_path, &text),
            None => warn!(path = %rules_path.display(), "rules document missing, no rules apply"),
        }
        if let Some(text) = read_document(workflows_path) {
            set.ingest_workflows_document(workflows_path, &text);
        }
        set.finish();
        info!(
            rules = set.len(),
            workflows = set.workflows.len(),
            "rule table loaded"
        );
        set
    }

    /// Build a table from a single in-memory rules document.
    pub fn from_yaml_str(text: &str) -> Self {
        let mut set = RuleSet::default();
        set.ingest_document(Path::new("<inline>"), text);
        set.finish();
        set
    }

    /// Add a workflows document to a table built from strings.
    pub fn with_workflows_yaml(mut self, text: &str) -> Self {
        self.ingest_workflows_document(Path::new("<inline-workflows>"), text);
        self
    }

    fn ingest_document(&mut self, source: &Path, text: &str) {
        self.documents.push(LoadedDocument {
            source: source.to_path_buf(),
            text: text.to_string(),
        });
        let Some(root) = self.parse_mapping(source, text) else {
            return;
        };
        for (key, value) in &root {
            let Some(key) = yaml_key(key) else { continue };
            let YamlValue::Mapping(body) = value else {
                // Scalars at the top level are document metadata.
                continue;
            };
            if key == WORKFLOWS_KEY {
                self.ingest_workflows(body);
            } else if is_rule_mapping(body) {
                self.push_entry(source, ROOT_CATEGORY, &key, body);
            } else {
                self.ensure_category(&key);
                self.ingest_category(source, &key, body);
            }
        }
    }

    fn ingest_category(&mut self, source: &Path, category: &str, body: &Mapping) {
        for (key, value) in body {
            let Some(key) = yaml_key(key) else { continue };
            let YamlValue::Mapping(child) = value else {
                continue;
            };
            if is_rule_mapping(child) {
                self.push_entry(source, category, &key, child);
            } else {
                // Nested containers flatten into their top-level category.
                self.ingest_category(source, category, child);
            }
        }
    }

    fn ingest_workflows_document(&mut self, source: &Path, text: &str) {
        self.documents.push(LoadedDocument {
            source: source.to_path_buf(),
            text: text.to_string(),
        });
        let Some(root) = self.parse_mapping(source, text) else {
            return;
        };
        match root.get(WORKFLOWS_KEY) {
            Some(YamlValue::Mapping(body)) => self.ingest_workflows(body),
            _ => self.ingest_workflows(&root),
        }
    }

    fn ingest_workflows(&mut self, body: &Mapping) {
        for (key, value) in body {
            let Some(name) = yaml_key(key) else { continue };
            let (description, steps) = match value {
                YamlValue::Mapping(m) => (
                    m.get("description").and_then(yaml_string),
                    m.get("steps").map(yaml_step_list).unwrap_or_default(),
                ),
                _ => (None, Vec::new()),
            };
            let workflow = Workflow {
                name: name.clone(),
                description,
                steps,
            };
            match self.workflows.iter_mut().find(|w| w.name == name) {
                Some(existing) => *existing = workflow,
                None => self.workflows.push(workflow),
            }
        }
    }

    fn parse_mapping(&mut self, source: &Path, text: &str) -> Option<Mapping> {
        match serde_yaml::from_str::<YamlValue>(text) {
            Ok(YamlValue::Mapping(m)) => Some(m),
            Ok(YamlValue::Null) => None,
            Ok(_) => {
                self.load_issues.push(Violation::new(
                    ViolationKind::Structure,
                    Severity::Error,
                    Vec::new(),
                    format!("{} is not a mapping of rules", source.display()),
                ));
                None
            }
            Err(e) => {
                warn!(source = %source.display(), error = %e, "rules document failed to parse");
                self.load_issues.push(Violation::new(
                    ViolationKind::Structure,
                    Severity::Error,
                    Vec::new(),
                    format!("{} failed to parse: {}", source.display(), e),
                ));
                None
            }
        }
    }

    fn ensure_category(&mut self, name: &str) {
        if !self.categories.iter().any(|c| c.name == name) {
            self.categories.push(RuleCategory {
                name: name.to_string(),
                rules: Vec::new(),
            });
        }
    }

    fn push_entry(&mut self, source: &Path, category: &str, name: &str, fields: &Mapping) {
        if let Some(previous) = self.entries.iter().position(|e| e.name == name) {
            let prior_category = self.entries[previous].category.clone();
            self.load_issues.push(Violation::new(
                ViolationKind::Structure,
                Severity::Error,
                vec![name.to_string()],
                format!(
                    "duplicate rule '{}' (categories '{}' and '{}'); the later definition wins",
                    name, prior_category, category
                ),
            ));
            self.entries.remove(previous);
            for cat in &mut self.categories {
                cat.rules.retain(|r| r.name != name);
            }
        }
        let entry = RuleEntry {
            name: name.to_string(),
            category: category.to_string(),
            source: source.to_path_buf(),
            fields: fields.clone(),
        };
        let rule = Rule::from_entry(&entry);
        self.entries.push(entry);
        self.ensure_category(category);
        if let Some(cat) = self.categories.iter_mut().find(|c| c.name == category) {
            cat.rules.push(rule);
        }
    }

    fn finish(&mut self) {
        for category in &mut self.categories {
            // `sort_by` is stable: equal priorities keep document order.
            category
                .rules
                .sort_by(|a, b| b.effective_priority().cmp(&a.effective_priority()));
        }
        debug!(categories = self.categories.len(), "rule categories sorted");
    }

    pub fn categories(&self) -> &[RuleCategory] {
        &self.categories
    }

    pub fn workflows(&self) -> &[Workflow] {
        &self.workflows
    }

    pub fn entries(&self) -> &[RuleEntry] {
        &self.entries
    }

    pub fn documents(&self) -> &[LoadedDocument] {
        &self.documents
    }

    pub fn load_issues(&self) -> &[Violation] {
        &self.load_issues
    }

    /// Every rule, category by category, each category in priority order.
    pub fn rules(&self) -> impl Iterator<Item = &Rule> {
        self.categories.iter().flat_map(|c| c.rules.iter())
    }

    pub fn get(&self, name: &str) -> Option<&Rule> {
        self.rules().find(|r| r.name == name)
    }

    pub fn workflow(&self, name: &str) -> Option<&Workflow> {
        self.workflows.iter().find(|w| w.name == name)
    }

    pub fn len(&self) -> usize {
        self.categories.iter().map(|c| c.rules.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rule name -> rule, for whole-table comparisons.
    pub fn by_name(&self) -> BTreeMap<&str, &Rule> {
        self.rules().map(|r| (r.name.as_str(), r)).collect()
    }
}

fn read_document(path: &Path) -> Option<String> {
    if !path.is_file() {
        return None;
    }
    match fs::read_to_string(path) {
        Ok(text) => Some(text),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "rules document unreadable");
            None
        }
    }
}

pub(crate) fn is_rule_mapping(m: &Mapping) -> bool {
    m.contains_key("priority") || m.contains_key("enabled")
}

fn yaml_key(key: &YamlValue) -> Option<String> {
    match key {
        YamlValue::String(s) => Some(s.clone()),
        YamlValue::Number(n) => Some(n.to_string()),
        YamlValue::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn yaml_string(v: &YamlValue) -> Option<String> {
    match v {
        YamlValue::String(s) => Some(s.clone()),
        YamlValue::Number(n) => Some(n.to_string()),
        YamlValue::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

pub(crate) fn yaml_integer(v: &YamlValue) -> Option<i64> {
    match v {
        YamlValue::Number(n) => n.as_i64(),
        YamlValue::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn yaml_string_list(v: &YamlValue) -> Vec<String> {
    match v {
        YamlValue::Sequence(items) => items.iter().filter_map(yaml_string).collect(),
        other => yaml_string(other).into_iter().collect(),
    }
}

fn yaml_step_list(v: &YamlValue) -> Vec<String> {
    let YamlValue::Sequence(items) = v else {
        return Vec::new();
    };
    items
        .iter()
        .map(|step| match yaml_string(step) {
            Some(s) => s,
            None => serde_yaml::to_string(step)
                .map(|s| s.trim().to_string())
                .unwrap_or_default(),
        })
        .collect()
}

pub(crate) fn yaml_to_json(v: &YamlValue) -> JsonValue {
    serde_yaml::from_value(v.clone()).unwrap_or(JsonValue::Null)
}

fn yaml_conditions(v: &YamlValue) -> Vec<Condition> {
    let YamlValue::Sequence(items) = v else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| {
            let m = item.as_mapping()?;
            Some(Condition {
                field: m.get("field").and_then(yaml_string).unwrap_or_default(),
                operator: ConditionOperator::parse(
                    &m.get("operator")
                        .and_then(yaml_string)
                        .unwrap_or_else(|| "=".to_string()),
                ),
                value: m.get("value").map(yaml_to_json).unwrap_or(JsonValue::Null),
            })
        })
        .collect()
}

// ===== Action dispatch =====

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Dispatched,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionOutcome {
    pub action: String,
    pub status: ActionStatus,
    pub message: String,
}

/// Handles one kind of rule action.
pub trait ActionHandler {
    fn handle(&self, rule: &Rule, action: &RuleAction, data: &JsonValue) -> ActionOutcome;
}

impl<F> ActionHandler for F
where
    F: Fn(&Rule, &RuleAction, &JsonValue) -> ActionOutcome,
{
    fn handle(&self, rule: &Rule, action: &RuleAction, data: &JsonValue) -> ActionOutcome {
        self(rule, action, data)
    }
}

/// Explicit action-kind -> handler table owned by one engine instance.
#[derive(Default)]
pub struct ActionRegistry {
    handlers: BTreeMap<ActionKind, Box<dyn ActionHandler>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, kind: ActionKind, handler: impl ActionHandler + 'static) {
        self.handlers.insert(kind, Box::new(handler));
    }

    pub fn has_handler(&self, kind: ActionKind) -> bool {
        self.handlers.contains_key(&kind)
    }

    /// Without a registered handler the dispatch is only recorded.
    pub fn dispatch(&self, rule: &Rule, action: &RuleAction, data: &JsonValue) -> ActionOutcome {
        match self.handlers.get(&action.kind()) {
            Some(handler) => handler.handle(rule, action, data),
            None => ActionOutcome {
                action: action.to_string(),
                status: ActionStatus::Dispatched,
                message: format!("{} recorded for rule '{}'", action, rule.name),
            },
        }
    }
}

impl fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionRegistry")
            .field("handlers", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationOutcome {
    pub passed: bool,
    pub failed_conditions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleResult {
    pub rule: String,
    pub priority: i64,
    pub action: Option<ActionOutcome>,
    pub validation: Option<ValidationOutcome>,
    pub workflow: Option<String>,
}

impl RuleResult {
    pub fn passed(&self) -> bool {
        self.validation.as_ref().is_none_or(|v| v.passed)
            && self
                .action
                .as_ref()
                .is_none_or(|a| a.status != ActionStatus::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApplyOutcome {
    pub context: String,
    /// Applied rule names in application (priority) order.
    pub applied: Vec<String>,
    pub results: BTreeMap<String, RuleResult>,
}

// ===== Engine =====

/// In-memory rule engine over one immutable [`RuleSet`].
#[derive(Debug)]
pub struct RuleEngine {
    rules: RuleSet,
    project_root: PathBuf,
    settings: ValidationSettings,
    scan_docs: Vec<PathBuf>,
    actions: ActionRegistry,
}

impl RuleEngine {
    pub fn new(rules: RuleSet, project_root: impl Into<PathBuf>, settings: ValidationSettings) -> Self {
        Self {
            rules,
            project_root: project_root.into(),
            settings,
            scan_docs: Vec::new(),
            actions: ActionRegistry::new(),
        }
    }

    /// Load the configured rule documents for `store`.
    pub fn load(store: &Store, config: &AutomationConfig) -> Self {
        let rules = RuleSet::load(
            &store.project_root.join(&config.rules.rules_file),
            &store.project_root.join(&config.rules.workflows_file),
        );
        Self::new(rules, &store.project_root, config.validation.clone())
            .with_scan_docs(config.rules.scan_docs.clone())
    }

    /// Project-relative markdown documents scraped by the path/command checks.
    pub fn with_scan_docs(mut self, docs: Vec<PathBuf>) -> Self {
        self.scan_docs = docs;
        self
    }

    pub fn with_actions(mut self, actions: ActionRegistry) -> Self {
        self.actions = actions;
        self
    }

    pub fn rule_set(&self) -> &RuleSet {
        &self.rules
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn settings(&self) -> &ValidationSettings {
        &self.settings
    }

    pub fn scan_docs(&self) -> &[PathBuf] {
        &self.scan_docs
    }

    /// Rules whose context includes `context` or the wildcard, highest priority first.
    pub fn rules_for_context(&self, context: &str) -> Vec<&Rule> {
        let mut selected: Vec<&Rule> = self
            .rules
            .rules()
            .filter(|r| r.matches_context(context))
            .collect();
        selected.sort_by(|a, b| b.effective_priority().cmp(&a.effective_priority()));
        selected
    }

    pub fn should_apply_rule(&self, rule: &Rule, data: &JsonValue) -> bool {
        rule.enabled && rule.conditions.iter().all(|c| c.evaluate(data))
    }

    pub fn apply_rules(&self, context: &str, data: &JsonValue) -> ApplyOutcome {
        let mut outcome = ApplyOutcome {
            context: context.to_string(),
            applied: Vec::new(),
            results: BTreeMap::new(),
        };
        for rule in self.rules_for_context(context) {
            if !self.should_apply_rule(rule, data) {
                continue;
            }
            let action = rule
                .action
                .as_ref()
                .map(|a| self.actions.dispatch(rule, a, data));
            let validation = if rule.validation.is_empty() {
                None
            } else {
                let failed_conditions: Vec<String> = rule
                    .validation
                    .iter()
                    .filter(|c| !c.evaluate(data))
                    .map(Condition::describe)
                    .collect();
                Some(ValidationOutcome {
                    passed: failed_conditions.is_empty(),
                    failed_conditions,
                })
            };
            debug!(rule = %rule.name, context, "rule applied");
            outcome.applied.push(rule.name.clone());
            outcome.results.insert(
                rule.name.clone(),
                RuleResult {
                    rule: rule.name.clone(),
                    priority: rule.effective_priority(),
                    action,
                    validation,
                    workflow: rule.workflow.clone(),
                },
            );
        }
        outcome
    }
}
