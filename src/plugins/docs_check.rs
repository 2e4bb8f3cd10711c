//! Documentation checker.

use crate::core::config::{DocsConfig, RulesConfig};
use crate::plugins::analyzer::{Analyzer, CheckSpec, CheckVerdict};
use crate::plugins::rules::RuleSet;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use walkdir::WalkDir;

pub const ANALYZER_NAME: &str = "docs";

const CHECK_README: &str = "readme";
const CHECK_INDEX: &str = "docs_index";
const CHECK_LINKS: &str = "internal_links";
const CHECK_RULES: &str = "rules_reference";

fn link_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[[^\]]*\]\(([^)\s]+)\)").expect("link regex is valid"))
}

pub struct DocumentationChecker {
    project_root: PathBuf,
    docs: DocsConfig,
    rules: RulesConfig,
}

impl DocumentationChecker {
    pub fn new(project_root: impl Into<PathBuf>, docs: DocsConfig, rules: RulesConfig) -> Self {
        Self {
            project_root: project_root.into(),
            docs,
            rules,
        }
    }

    fn display(&self, path: &Path) -> String {
        path.strip_prefix(&self.project_root)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/")
    }

    fn markdown_pages(&self) -> Vec<PathBuf> {
        let dir = self.project_root.join(&self.docs.docs_dir);
        let mut pages: Vec<PathBuf> = WalkDir::new(dir)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "md"))
            .collect();
        pages.sort();
        pages
    }

    fn check_readme(&self) -> CheckVerdict {
        let mut v = CheckVerdict::default();
        let path = self.project_root.join(&self.docs.readme);
        let Ok(text) = fs::read_to_string(&path) else {
            v.error(format!("{} is missing", self.display(&path)));
            return v;
        };
        if text.trim().is_empty() {
            v.error(format!("{} is empty", self.display(&path)));
            return v;
        }
        if !text.lines().any(|l| l.starts_with("# ")) {
            v.warn(format!("{} has no top-level heading", self.display(&path)));
        }
        for broken in broken_links(&path, &text) {
            v.error(format!("{}: broken link '{}'", self.display(&path), broken));
        }
        v
    }

    fn check_index(&self) -> CheckVerdict {
        let mut v = CheckVerdict::default();
        let dir = self.project_root.join(&self.docs.docs_dir);
        if !dir.is_dir() {
            v.warn(format!("documentation directory {} not found", self.display(&dir)));
            return v;
        }
        let index = dir.join(&self.docs.index);
        let Ok(index_text) = fs::read_to_string(&index) else {
            v.error(format!("{} index is missing", self.display(&index)));
            return v;
        };
        for page in self.markdown_pages() {
            if page == index {
                continue;
            }
            let rel = page
                .strip_prefix(&dir)
                .unwrap_or(&page)
                .to_string_lossy()
                .replace('\\', "/");
            if !index_text.contains(&rel) {
                v.warn(format!(
                    "{} is not linked from {}",
                    self.display(&page),
                    self.display(&index)
                ));
            }
        }
        v
    }

    fn check_links(&self) -> CheckVerdict {
        let mut v = CheckVerdict::default();
        for page in self.markdown_pages() {
            let Ok(text) = fs::read_to_string(&page) else {
                v.warn(format!("{} is unreadable", self.display(&page)));
                continue;
            };
            for broken in broken_links(&page, &text) {
                v.error(format!("{}: broken link '{}'", self.display(&page), broken));
            }
        }
        v
    }

    fn check_rules(&self) -> CheckVerdict {
        let mut v = CheckVerdict::default();
        let path = self.project_root.join(&self.rules.rules_file);
        if !path.exists() {
            v.warn(format!("rule document {} not found", self.display(&path)));
            return v;
        }
        let rules = RuleSet::load(&path, &self.project_root.join(&self.rules.workflows_file));
        for issue in rules.load_issues() {
            v.error(issue.message.clone());
        }
        for rule in rules.rules() {
            for dep in rule.depends_on.iter().filter(|d| rules.get(d).is_none()) {
                v.error(format!("rule '{}' references unknown rule '{}'", rule.name, dep));
            }
            if let Some(w) = rule.workflow.as_deref().filter(|w| rules.workflow(w).is_none()) {
                v.error(format!("rule '{}' references unknown workflow '{}'", rule.name, w));
            }
        }
        if rules.is_empty() {
            v.warn(format!("{} defines no rules", self.display(&path)));
        }
        v
    }
}

/// Relative link targets in `text` that do not exist next to `page`.
fn broken_links(page: &Path, text: &str) -> Vec<String> {
    let base = page.parent().unwrap_or(Path::new("."));
    let mut broken = Vec::new();
    for caps in link_regex().captures_iter(text) {
        let target = &caps[1];
        if target.contains("://") || target.starts_with("mailto:") || target.starts_with('/') {
            continue;
        }
        let local = target.split(['#', '?']).next().unwrap_or("");
        if local.is_empty() {
            continue;
        }
        if !base.join(local).exists() && !broken.iter().any(|b| b == target) {
            broken.push(target.to_string());
        }
    }
    broken
}

impl Analyzer for DocumentationChecker {
    fn name(&self) -> &str {
        ANALYZER_NAME
    }

    fn checks(&self) -> Vec<CheckSpec> {
        vec![
            CheckSpec::new(CHECK_README, &self.docs.readme),
            CheckSpec::new(CHECK_INDEX, &self.docs.docs_dir),
            CheckSpec::new(CHECK_LINKS, &self.docs.docs_dir),
            CheckSpec::new(CHECK_RULES, &self.rules.rules_file)
                .with_input(&self.rules.workflows_file),
        ]
    }

    fn run_check(&mut self, check: &CheckSpec) -> CheckVerdict {
        match check.name.as_str() {
            CHECK_README => self.check_readme(),
            CHECK_INDEX => self.check_index(),
            CHECK_LINKS => self.check_links(),
            CHECK_RULES => self.check_rules(),
            _ => CheckVerdict::default(),
        }
    }
}
