//! Compact output rendering helpers for CLI surfaces.
//!
//! Keeps validation traces and analyzer reports bounded and readable.

use colored::Colorize;

/// Collapse newlines/extra whitespace and bound length for terminal display.
pub fn compact_line(input: &str, max_chars: usize) -> String {
    let collapsed = input.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut chars = collapsed.chars();
    let preview: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{}...", preview)
    } else {
        preview
    }
}

/// Render up to `max_items` messages with compact formatting.
pub fn preview_messages(messages: &[String], max_items: usize, max_chars: usize) -> String {
    if messages.is_empty() {
        return String::new();
    }
    let shown = messages
        .iter()
        .take(max_items)
        .map(|m| compact_line(m, max_chars))
        .collect::<Vec<_>>()
        .join(" | ");
    if messages.len() > max_items {
        format!("{} (+{} more)", shown, messages.len() - max_items)
    } else {
        shown
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepStatus {
    Pass,
    Warn,
    Fail,
    Info,
}

impl StepStatus {
    pub fn icon(&self) -> &'static str {
        match self {
            StepStatus::Pass => "✅",
            StepStatus::Warn => "⚠️",
            StepStatus::Fail => "❌",
            StepStatus::Info => "💡",
        }
    }
}

/// One colored progress line, e.g. `  ✅ [2/5] References: all resolved`.
pub fn step_line(status: StepStatus, label: &str, detail: &str) -> String {
    let label = match status {
        StepStatus::Pass => label.bright_green().bold(),
        StepStatus::Warn => label.bright_yellow().bold(),
        StepStatus::Fail => label.bright_red().bold(),
        StepStatus::Info => label.bright_cyan().bold(),
    };
    if detail.is_empty() {
        format!("  {} {}", status.icon(), label)
    } else {
        format!("  {} {}: {}", status.icon(), label, detail)
    }
}

/// Per-check trace when `ISOTONE_AUTOMATION_TRACE=1`.
pub fn trace(scope: &str, name: &str) {
    if std::env::var("ISOTONE_AUTOMATION_TRACE").ok().as_deref() == Some("1") {
        println!("{}: trace {}", scope, name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compact_line_truncates_and_collapses() {
        assert_eq!(compact_line("a\n  b   c", 10), "a b c");
        assert_eq!(compact_line("abcdefghij", 4), "abcd...");
    }

    #[test]
    fn preview_messages_counts_hidden_items() {
        let msgs = vec!["one".to_string(), "two".to_string(), "three".to_string()];
        assert_eq!(preview_messages(&msgs, 2, 20), "one | two (+1 more)");
        assert_eq!(preview_messages(&[], 2, 20), "");
    }

    #[test]
    fn step_line_includes_detail() {
        colored::control::set_override(false);
        let line = step_line(StepStatus::Fail, "Structure", "2 violation(s)");
        assert!(line.contains("Structure: 2 violation(s)"));
        assert!(line.contains("❌"));
    }
}
