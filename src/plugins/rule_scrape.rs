//! Heuristic scraping of paths and commands out of rule documents and prose.
//!
//! Best-effort regex matching over free text. Findings from this module only
//! ever surface as warnings unless a strict setting escalates them.

use regex::Regex;
use std::collections::BTreeSet;
use std::sync::OnceLock;

fn path_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?:^|[\s"'`(\[<,=])(/[A-Za-z0-9_.\-]+(?:/[A-Za-z0-9_.\-*{}]*)*)"#)
            .expect("path regex is valid")
    })
}

fn quoted_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#""([^"\n]+)"|`([^`\n]+)`"#).expect("quoted regex is valid")
    })
}

fn version_segment_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^v?\d+(\.\d+)*$").expect("version regex is valid"))
}

/// Project-looking absolute paths, deduplicated in first-seen order.
///
/// URLs are never matched (the `/` after `:` or `/` is not a path start) and
/// paths whose first segment is a version string (`/v2`, `/1.4.0`) are dropped.
pub fn extract_paths(text: &str) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut out = Vec::new();
    for caps in path_regex().captures_iter(text) {
        let Some(m) = caps.get(1) else { continue };
        let path = m.as_str().trim_end_matches(['.', ',', ':', ';']);
        if path.len() < 2 {
            continue;
        }
        let first = path[1..].split('/').next().unwrap_or("");
        if version_segment_regex().is_match(first) {
            continue;
        }
        if seen.insert(path.to_string()) {
            out.push(path.to_string());
        }
    }
    out
}

/// True when a scraped path is a glob rather than a concrete location.
pub fn is_pattern(path: &str) -> bool {
    path.contains(['*', '{', '}', '?'])
}

/// Quoted `composer ...` and `<runtime> isotone ...` command strings.
pub fn extract_commands(text: &str, runtime: &str) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut out = Vec::new();
    for caps in quoted_regex().captures_iter(text) {
        let Some(m) = caps.get(1).or_else(|| caps.get(2)) else {
            continue;
        };
        let command = m.as_str().split_whitespace().collect::<Vec<_>>().join(" ");
        let mut words = command.split(' ');
        let first = words.next().unwrap_or("");
        let second = words.next().unwrap_or("");
        let is_command = (first == "composer" && !second.is_empty())
            || (first == runtime && second == "isotone");
        if is_command && seen.insert(command.clone()) {
            out.push(command);
        }
    }
    out
}

/// `command` equals an allowed entry or extends it with more arguments.
pub fn is_allowed_command(command: &str, allowed: &[String]) -> bool {
    allowed.iter().any(|a| {
        command == a
            || command
                .strip_prefix(a.as_str())
                .is_some_and(|rest| rest.starts_with(' '))
    })
}
