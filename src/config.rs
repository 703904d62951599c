//! Scanner configuration.
//!
//! Two configuration surfaces exist:
//!
//! - the **rule set** (see [`crate::rules`]), which is a fatal error when
//!   missing or malformed, and
//! - the **scan config** in this module, which carries tuning values (score
//!   thresholds, skipped directories, LLM provider selection) and falls back
//!   to built-in defaults when no file is present.
//!
//! ```rust,no_run
//! use skillscan::config::ScanConfig;
//!
//! let config = ScanConfig::load(None).expect("failed to load config");
//! assert_eq!(config.thresholds.low, 80);
//! ```

use crate::llm::LlmProvider;
use std::path::{Path, PathBuf};

/// Fatal configuration errors.
///
/// Per the error taxonomy, these are the only errors that prevent a scanner
/// from being constructed at all. Everything that happens after construction
/// (unreadable files, malformed manifests, unavailable LLM) is recovered
/// locally and never surfaces as a `ConfigError`.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },
    #[error("invalid rule `{id}`: {message}")]
    InvalidRule { id: String, message: String },
    #[error("rule file defines no rules: {path}")]
    EmptyRuleSet { path: PathBuf },
}

/// Tuning configuration for a scan.
///
/// Loaded from a TOML file (typically `skillscan.toml`). All fields carry
/// defaults so the file can be omitted entirely.
#[derive(Debug, Clone, Default, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Score→risk-tier boundaries. See [`Thresholds`].
    pub thresholds: Thresholds,
    /// Directory names skipped during the walk (VCS metadata, dependency
    /// caches, build output).
    pub skip: SkipConfig,
    /// LLM adjudication settings.
    pub llm: LlmSettings,
}

/// Score boundaries for the four risk tiers.
///
/// The mapping is a monotonic, non-overlapping partition of 0–100:
/// `score >= low` is LOW, `score >= medium` is MEDIUM, `score >= high` is
/// HIGH, everything below is CRITICAL. The same `low` boundary defines the
/// safe/unsafe split used by the evaluation harness, so the two cannot drift.
///
/// These are empirical tuning constants validated against the bundled
/// fixture corpus; treat them as configuration, not architecture.
#[derive(Debug, Clone, Copy, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct Thresholds {
    /// Minimum score for the LOW tier (default 80).
    pub low: u32,
    /// Minimum score for the MEDIUM tier (default 50).
    pub medium: u32,
    /// Minimum score for the HIGH tier (default 20).
    pub high: u32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Thresholds {
            low: 80,
            medium: 50,
            high: 20,
        }
    }
}

/// Directories excluded from the file walk.
#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct SkipConfig {
    pub dirs: Vec<String>,
}

impl Default for SkipConfig {
    fn default() -> Self {
        SkipConfig {
            dirs: vec![
                ".git".to_string(),
                "node_modules".to_string(),
                "__pycache__".to_string(),
                ".venv".to_string(),
                "venv".to_string(),
                "target".to_string(),
                "dist".to_string(),
                ".cache".to_string(),
            ],
        }
    }
}

impl SkipConfig {
    /// Returns `true` when `name` is one of the configured noise directories.
    pub fn is_skipped(&self, name: &str) -> bool {
        self.dirs.iter().any(|d| d == name)
    }
}

/// LLM adjudication settings.
///
/// The provider is an explicit configuration value resolved once at startup
/// (`main.rs` may populate it via [`LlmProvider::from_env`]); the scanner
/// itself never inspects the process environment, which keeps scans
/// reproducible under test by construction.
#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct LlmSettings {
    /// Selected provider, or `None` to run static-only.
    pub provider: Option<LlmProvider>,
    /// Argv of the adjudication command the provider is reached through
    /// (e.g., a local model runner or an API wrapper script). Empty means no
    /// adjudication even when a provider is named.
    pub command: Vec<String>,
    /// Upper bound on the external call, in seconds.
    pub timeout_secs: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        LlmSettings {
            provider: None,
            command: Vec::new(),
            timeout_secs: 30,
        }
    }
}

impl ScanConfig {
    /// Loads configuration from a TOML file.
    ///
    /// Resolution order:
    /// 1. If `path` is `Some`, load from that file (error if missing).
    /// 2. If `path` is `None`, try `skillscan.toml` in the current directory.
    /// 3. If that file does not exist either, return [`ScanConfig::default()`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when an explicit path does not exist, the file
    /// cannot be read, or the TOML fails to parse.
    pub fn load(path: Option<&Path>) -> Result<ScanConfig, ConfigError> {
        let config_path = match path {
            Some(p) => {
                if !p.exists() {
                    return Err(ConfigError::Io {
                        path: p.to_path_buf(),
                        source: std::io::Error::new(
                            std::io::ErrorKind::NotFound,
                            "config file not found",
                        ),
                    });
                }
                Some(p.to_path_buf())
            }
            None => {
                let default_path = Path::new("skillscan.toml");
                default_path.exists().then(|| default_path.to_path_buf())
            }
        };

        match config_path {
            Some(path) => {
                let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::Io {
                    path: path.clone(),
                    source: e,
                })?;
                toml::from_str(&content).map_err(|e| ConfigError::Parse {
                    path,
                    message: e.to_string(),
                })
            }
            None => Ok(ScanConfig::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_thresholds_match_documented_boundaries() {
        let t = Thresholds::default();
        assert_eq!((t.low, t.medium, t.high), (80, 50, 20));
    }

    #[test]
    fn explicit_missing_config_path_is_an_error() {
        let err = ScanConfig::load(Some(Path::new("/nonexistent/skillscan.toml")));
        assert!(err.is_err());
    }

    #[test]
    fn default_skip_list_contains_vcs_and_dependency_dirs() {
        let skip = SkipConfig::default();
        assert!(skip.is_skipped(".git"));
        assert!(skip.is_skipped("node_modules"));
        assert!(!skip.is_skipped("scripts"));
    }
}
