//! Rule-driven pattern matching: the first and cheapest detection layer.
//!
//! Applies every applicable rule's regex to the raw file text and emits one
//! finding per `(rule, line)`. Pure function over its inputs: no filesystem
//! access, no shared state.

use crate::analyzers::{context_window, line_of_offset, truncate_snippet};
use crate::finding::{Finding, FindingSource};
use crate::rules::RuleSet;
use std::collections::HashSet;
use std::path::Path;

/// Applies the loaded [`RuleSet`] to file text.
pub struct PatternMatcher<'a> {
    rules: &'a RuleSet,
}

impl<'a> PatternMatcher<'a> {
    pub fn new(rules: &'a RuleSet) -> Self {
        PatternMatcher { rules }
    }

    /// Scans `text` with every rule whose file-type filter matches `path`.
    ///
    /// Line numbers are 1-based, counted by newline occurrences before the
    /// match start. Overlapping matches for the same rule on the same line
    /// collapse to one finding.
    pub fn scan(&self, text: &str, path: &Path) -> Vec<Finding> {
        let ext = path.extension().and_then(|e| e.to_str());
        let mut findings = Vec::new();
        let mut seen: HashSet<(&str, usize)> = HashSet::new();

        for rule in self.rules.rules() {
            if !rule.applies_to(ext) {
                continue;
            }
            for m in rule.regex.find_iter(text) {
                let line = line_of_offset(text, m.start());
                if !seen.insert((rule.id.as_str(), line)) {
                    continue;
                }
                findings.push(Finding {
                    rule_id: rule.id.clone(),
                    severity: rule.severity,
                    category: rule.category.clone(),
                    title: rule.title.clone(),
                    file: Some(path.to_path_buf()),
                    line: Some(line),
                    snippet: Some(truncate_snippet(m.as_str())),
                    context: Some(context_window(text, line)),
                    weight: rule.weight,
                    source: FindingSource::Pattern,
                    note: None,
                });
            }
        }

        findings
    }
}
