//! Per-file analysis layers.
//!
//! Three layers run over every text file:
//!
//! - [`pattern`]: rule-driven regex matching, the first and cheapest layer.
//! - [`ast`]: evasion heuristics that catch behavior obfuscated from plain
//!   pattern matching.
//! - [`prompt`]: prompt-injection detection in natural-language content.
//!
//! All layers are pure functions over `(text, path)`; they never touch the
//! filesystem. The orchestrator in [`crate::scanner`] feeds them file
//! contents and merges their findings.

pub mod ast;
pub mod pattern;
pub mod prompt;

use crate::finding::Severity;

/// Maximum rendered snippet length in characters.
const SNIPPET_MAX: usize = 120;

/// Truncates a matched line for report readability.
///
/// Cuts at a char boundary; a raw byte index can fall mid-codepoint and
/// panic on multi-byte UTF-8.
pub(crate) fn truncate_snippet(line: &str) -> String {
    if line.chars().count() > SNIPPET_MAX {
        let cut = line
            .char_indices()
            .nth(SNIPPET_MAX - 3)
            .map(|(i, _)| i)
            .unwrap_or(line.len());
        format!("{}...", line[..cut].trim())
    } else {
        line.trim().to_string()
    }
}

/// 1-based line number of a byte offset, counted by newline occurrences
/// before the offset.
pub(crate) fn line_of_offset(text: &str, offset: usize) -> usize {
    text.as_bytes()[..offset.min(text.len())]
        .iter()
        .filter(|&&b| b == b'\n')
        .count()
        + 1
}

/// Bounded context window: the matched line plus one line either side,
/// each truncated independently.
pub(crate) fn context_window(text: &str, line_num: usize) -> String {
    let start = line_num.saturating_sub(2); // 0-based index of the line above
    text.lines()
        .skip(start)
        .take(if line_num == 1 { 2 } else { 3 })
        .map(truncate_snippet)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Metadata for one built-in analyzer rule.
///
/// The pattern layer's rules live in the loaded [`crate::rules::RuleSet`];
/// the AST and prompt layers define theirs in code. `built_in_rules` exposes
/// the latter for the `list-rules` and `explain` CLI commands.
pub struct RuleInfo {
    pub id: &'static str,
    pub severity: Severity,
    /// Analysis layer that owns the rule (`"ast"` or `"prompt"`).
    pub layer: &'static str,
    pub title: &'static str,
}

/// Aggregates [`RuleInfo`] from the built-in analyzer layers.
pub fn built_in_rules() -> Vec<RuleInfo> {
    let mut rules = Vec::new();
    rules.extend(ast::rules());
    rules.extend(prompt::rules());
    rules
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_of_offset_is_one_based() {
        let text = "first\nsecond\nthird";
        assert_eq!(line_of_offset(text, 0), 1);
        assert_eq!(line_of_offset(text, 6), 2);
        assert_eq!(line_of_offset(text, text.len()), 3);
    }

    #[test]
    fn snippet_truncation_is_char_boundary_safe() {
        let line = "é".repeat(200);
        let snippet = truncate_snippet(&line);
        assert!(snippet.ends_with("..."));
        assert!(snippet.chars().count() <= SNIPPET_MAX);
    }

    #[test]
    fn context_window_spans_one_line_each_side() {
        let text = "one\ntwo\nthree\nfour";
        assert_eq!(context_window(text, 3), "two\nthree\nfour");
        assert_eq!(context_window(text, 1), "one\ntwo");
    }
}
