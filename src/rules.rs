//! Rule set loading and validation.
//!
//! Rules are data, not code: a TOML file containing an array of rule objects
//! with a fixed, explicitly validated schema. The rule set is loaded once at
//! scanner construction and never mutated during a scan. A missing or
//! malformed rule file is a fatal [`ConfigError`]; the scanner fails fast
//! rather than running with a silently empty rule set.
//!
//! # Rule file format
//!
//! ```toml
//! [[rules]]
//! id = "exec/eval-call"
//! pattern = '\beval\s*\('
//! severity = "critical"
//! category = "code-execution"
//! title = "Direct eval of dynamic content"
//! file_types = ["js", "ts", "py"]
//! weight = 50
//! ```
//!
//! A default rule set is embedded in the binary so the tool works with zero
//! configuration; see [`RuleSet::builtin`].

use crate::config::ConfigError;
use crate::finding::Severity;
use regex::{Regex, RegexBuilder};
use std::collections::HashSet;
use std::path::Path;

/// Default rule set bundled with the binary.
const DEFAULT_RULES: &str = include_str!("../rules/default.toml");

#[derive(serde::Deserialize)]
struct RuleFile {
    #[serde(default)]
    rules: Vec<RuleSpec>,
}

/// Raw rule entry as it appears in the TOML file, before validation.
#[derive(serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct RuleSpec {
    id: String,
    pattern: String,
    severity: Severity,
    category: String,
    title: String,
    #[serde(default)]
    file_types: Vec<String>,
    weight: u32,
    #[serde(default)]
    case_insensitive: bool,
}

/// One validated detection rule with its compiled pattern.
///
/// Immutable for the duration of a scan; safely shared across concurrent
/// readers.
#[derive(Debug, Clone)]
pub struct Rule {
    /// Unique rule identifier (e.g., `"exec/eval-call"`).
    pub id: String,
    pub severity: Severity,
    /// Category used for signature correlation and contextual downweighting
    /// (e.g., `"code-execution"`, `"credential-access"`, `"network"`).
    pub category: String,
    /// Human-readable title carried into findings.
    pub title: String,
    /// Applicable file extensions, lowercase. Empty means all file types.
    pub file_types: Vec<String>,
    /// Penalty subtracted from the trust score per surviving finding.
    pub weight: u32,
    /// Compiled detection pattern. Case-sensitive unless the rule declared
    /// `case_insensitive = true`.
    pub regex: Regex,
}

impl Rule {
    /// Returns `true` when this rule's file-type filter matches `ext`.
    ///
    /// An unfiltered rule (empty `file_types`) matches everything, including
    /// extensionless files.
    pub fn applies_to(&self, ext: Option<&str>) -> bool {
        if self.file_types.is_empty() {
            return true;
        }
        match ext {
            Some(e) => {
                let e = e.to_lowercase();
                self.file_types.iter().any(|t| *t == e)
            }
            None => false,
        }
    }
}

/// The validated, immutable rule collection consumed by the pattern matcher.
#[derive(Debug, Clone)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    /// Loads and validates a rule file.
    ///
    /// # Errors
    ///
    /// Fails fast on unreadable files, TOML parse errors, duplicate or empty
    /// rule ids, uncompilable patterns, out-of-range weights, or an empty
    /// rule array.
    pub fn load(path: &Path) -> Result<RuleSet, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml(&content, path)
    }

    /// Returns the embedded default rule set.
    ///
    /// # Panics
    ///
    /// Panics if the bundled `rules/default.toml` fails validation; this is a
    /// build defect, not a runtime condition, and is covered by a unit test.
    pub fn builtin() -> RuleSet {
        Self::from_toml(DEFAULT_RULES, Path::new("<builtin>"))
            .expect("embedded default rule set failed validation")
    }

    /// Parses and validates rule TOML. `origin` is used in error messages.
    pub fn from_toml(content: &str, origin: &Path) -> Result<RuleSet, ConfigError> {
        let file: RuleFile = toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: origin.to_path_buf(),
            message: e.to_string(),
        })?;

        if file.rules.is_empty() {
            return Err(ConfigError::EmptyRuleSet {
                path: origin.to_path_buf(),
            });
        }

        let mut seen: HashSet<String> = HashSet::new();
        let mut rules = Vec::with_capacity(file.rules.len());

        for spec in file.rules {
            if spec.id.trim().is_empty() {
                return Err(ConfigError::InvalidRule {
                    id: "<empty>".to_string(),
                    message: "rule id must be non-empty".to_string(),
                });
            }
            if !seen.insert(spec.id.clone()) {
                return Err(ConfigError::InvalidRule {
                    id: spec.id,
                    message: "duplicate rule id".to_string(),
                });
            }
            if spec.weight > 100 {
                return Err(ConfigError::InvalidRule {
                    id: spec.id,
                    message: format!("weight {} exceeds maximum of 100", spec.weight),
                });
            }
            let regex = RegexBuilder::new(&spec.pattern)
                .case_insensitive(spec.case_insensitive)
                .build()
                .map_err(|e| ConfigError::InvalidRule {
                    id: spec.id.clone(),
                    message: format!("pattern does not compile: {e}"),
                })?;

            rules.push(Rule {
                id: spec.id,
                severity: spec.severity,
                category: spec.category,
                title: spec.title,
                file_types: spec.file_types.iter().map(|t| t.to_lowercase()).collect(),
                weight: spec.weight,
                regex,
            });
        }

        Ok(RuleSet { rules })
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn get(&self, id: &str) -> Option<&Rule> {
        self.rules.iter().find(|r| r.id == id)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_rule_set_is_valid() {
        let rules = RuleSet::builtin();
        assert!(!rules.is_empty());
        assert!(rules.get("exec/eval-call").is_some());
    }

    #[test]
    fn duplicate_rule_ids_are_rejected() {
        let toml = r#"
[[rules]]
id = "a"
pattern = "x"
severity = "low"
category = "test"
title = "t"
weight = 1

[[rules]]
id = "a"
pattern = "y"
severity = "low"
category = "test"
title = "t"
weight = 1
"#;
        let err = RuleSet::from_toml(toml, Path::new("test.toml"));
        assert!(matches!(err, Err(ConfigError::InvalidRule { .. })));
    }

    #[test]
    fn uncompilable_pattern_is_rejected() {
        let toml = r#"
[[rules]]
id = "bad"
pattern = "(unclosed"
severity = "low"
category = "test"
title = "t"
weight = 1
"#;
        let err = RuleSet::from_toml(toml, Path::new("test.toml"));
        assert!(matches!(err, Err(ConfigError::InvalidRule { .. })));
    }

    #[test]
    fn empty_rule_file_is_rejected() {
        let err = RuleSet::from_toml("", Path::new("empty.toml"));
        assert!(matches!(err, Err(ConfigError::EmptyRuleSet { .. })));
    }

    #[test]
    fn file_type_filter_matches_case_insensitively() {
        let toml = r#"
[[rules]]
id = "a"
pattern = "x"
severity = "low"
category = "test"
title = "t"
file_types = ["SH"]
weight = 1
"#;
        let rules = RuleSet::from_toml(toml, Path::new("test.toml")).unwrap();
        let rule = rules.get("a").unwrap();
        assert!(rule.applies_to(Some("sh")));
        assert!(rule.applies_to(Some("SH")));
        assert!(!rule.applies_to(Some("py")));
        assert!(!rule.applies_to(None));
    }
}
