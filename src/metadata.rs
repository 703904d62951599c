//! Skill manifest parsing.
//!
//! A skill's manifest (`SKILL.md`) starts with a frontmatter block of
//! `key: value` pairs followed by free-form documentation:
//!
//! ```text
//! ---
//! name: github-release-notes
//! description: Drafts release notes from merged pull requests.
//! requires:
//!   env:
//!     - GITHUB_TOKEN
//!   bins:
//!     - git
//! ---
//! ```
//!
//! We intentionally avoid a full YAML crate dependency. The frontmatter uses
//! a tiny subset of YAML: scalar pairs, one nesting level under `requires:`,
//! and simple sequences (block style `- item` or flow style `[item, item]`).
//!
//! A malformed manifest yields `None`, never an error; contextual
//! downweighting is simply disabled for that scan.

/// Declared skill metadata extracted from the manifest frontmatter.
///
/// The declared requirements contextualize findings: a credential-access
/// pattern referencing a declared environment variable is materially less
/// risky than one referencing an undeclared secret.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillMetadata {
    pub name: String,
    pub description: String,
    /// Environment variables the skill declares it needs.
    pub required_env: Vec<String>,
    /// Binaries the skill declares it needs on PATH.
    pub required_bins: Vec<String>,
}

impl SkillMetadata {
    /// Returns `true` when `var` is declared in the manifest's required
    /// environment list (exact, case-sensitive match; env var names are
    /// case-sensitive on every platform the scanner targets).
    pub fn declares_env(&self, var: &str) -> bool {
        self.required_env.iter().any(|v| v == var)
    }
}

/// Parses the frontmatter block at the start of `content`.
///
/// Returns `None` when the file does not begin with `---`, the block never
/// closes in a recognizable way, or no `name` field is present.
pub fn parse_manifest(content: &str) -> Option<SkillMetadata> {
    let mut lines = content.lines();
    if lines.next()?.trim() != "---" {
        return None;
    }

    let mut name: Option<String> = None;
    let mut description = String::new();
    let mut required_env: Vec<String> = Vec::new();
    let mut required_bins: Vec<String> = Vec::new();

    // (top-level key, nested key under it) currently collecting list items.
    let mut current_top: Option<String> = None;
    let mut current_sub: Option<String> = None;
    let mut closed = false;

    for line in lines {
        if line.trim() == "---" {
            closed = true;
            break;
        }

        if !line.starts_with(|c: char| c.is_whitespace()) {
            // Top-level `key: value` line.
            let Some((key, value)) = parse_kv(line) else {
                continue;
            };
            current_sub = None;
            match key.as_str() {
                "name" if !value.is_empty() => name = Some(value),
                "description" if !value.is_empty() => description = value,
                _ => {}
            }
            current_top = Some(key);
            continue;
        }

        let trimmed = line.trim_start();

        if let Some(item) = trimmed.strip_prefix("- ") {
            let item = item.trim();
            if item.is_empty() {
                continue;
            }
            if current_top.as_deref() == Some("requires") {
                match current_sub.as_deref() {
                    Some("env") => required_env.push(item.to_string()),
                    Some("bins") => required_bins.push(item.to_string()),
                    _ => {}
                }
            }
            continue;
        }

        // Nested `sub: value` line under the current top-level key.
        if let Some((key, value)) = parse_kv(trimmed) {
            current_sub = Some(key.clone());
            if current_top.as_deref() == Some("requires") && !value.is_empty() {
                // Flow sequence: `env: [GITHUB_TOKEN, NPM_TOKEN]`
                let items = parse_flow_sequence(&value);
                match key.as_str() {
                    "env" => required_env.extend(items),
                    "bins" => required_bins.extend(items),
                    _ => {}
                }
            }
        }
    }

    if !closed {
        return None;
    }

    Some(SkillMetadata {
        name: name?,
        description,
        required_env,
        required_bins,
    })
}

/// Splits a `key: value` line into `(key, value)`.
fn parse_kv(line: &str) -> Option<(String, String)> {
    let colon_pos = line.find(':')?;
    let key = line[..colon_pos].trim();
    if key.is_empty() || !key.chars().all(|c| c.is_alphanumeric() || c == '-' || c == '_') {
        return None;
    }
    let value = line[colon_pos + 1..].trim();
    Some((key.to_string(), value.to_string()))
}

/// Parses `[a, b, c]` into its items; a bare scalar becomes a single item.
fn parse_flow_sequence(value: &str) -> Vec<String> {
    let inner = value
        .strip_prefix('[')
        .and_then(|v| v.strip_suffix(']'))
        .unwrap_or(value);
    inner
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
