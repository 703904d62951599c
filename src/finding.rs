//! Core data types: findings, file records, signatures, and the scan report.
//!
//! Every analysis layer (pattern, AST, prompt, LLM) produces [`Finding`]
//! values with one consistent shape; the originating layer is carried in
//! [`Finding::source`] rather than in divergent field names. The final
//! [`Report`] is fully serializable; every field is a primitive, string,
//! number, or nested serializable structure.

use crate::config::Thresholds;
use std::fmt;
use std::path::PathBuf;

/// Severity assigned to a rule or finding.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Critical => write!(f, "critical"),
            Severity::High => write!(f, "high"),
            Severity::Medium => write!(f, "medium"),
            Severity::Low => write!(f, "low"),
            Severity::Info => write!(f, "info"),
        }
    }
}

/// Analysis layer that produced a finding.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum FindingSource {
    Pattern,
    Ast,
    Prompt,
    Llm,
}

impl fmt::Display for FindingSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FindingSource::Pattern => write!(f, "pattern"),
            FindingSource::Ast => write!(f, "ast"),
            FindingSource::Prompt => write!(f, "prompt"),
            FindingSource::Llm => write!(f, "llm"),
        }
    }
}

/// One concrete detection instance tied to a rule, file, and location.
///
/// Immutable once created; a scan produces an ordered collection, later
/// deduplicated by `(rule_id, file, line)`.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    /// Owning rule identifier (e.g., `"exec/eval-call"`, `"ast/bracket-access"`).
    pub rule_id: String,
    pub severity: Severity,
    /// Rule category (e.g., `"code-execution"`, `"credential-access"`).
    pub category: String,
    /// Human-readable title.
    pub title: String,
    /// Source file path, relative to the skill root. `None` for findings that
    /// are not tied to a file (e.g., an LLM verdict over the whole skill).
    pub file: Option<PathBuf>,
    /// 1-based line number of the match.
    pub line: Option<usize>,
    /// Matched text, truncated for readability.
    pub snippet: Option<String>,
    /// Bounded context window around the match.
    pub context: Option<String>,
    /// Penalty subtracted from the trust score when this finding survives
    /// deduplication and contextual downweighting.
    pub weight: u32,
    /// Analysis layer that produced this finding.
    pub source: FindingSource,
    /// Contextual note, e.g. `"downweighted: GITHUB_TOKEN declared in manifest"`.
    pub note: Option<String>,
}

/// Coarse content classification of a walked file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Text,
    Binary,
    /// The file could not be read or classified; it was skipped, not fatal.
    Unknown,
}

/// One file discovered during the directory walk. Read-only after creation.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileInfo {
    /// Path relative to the skill root.
    pub path: PathBuf,
    pub absolute_path: PathBuf,
    pub size: u64,
    pub kind: FileKind,
}

/// Confidence level attached to a [`BehavioralSignature`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

/// A higher-level risk pattern inferred by correlating multiple findings.
///
/// A suppressed signature carries no score penalty but remains visible in
/// the report for audit.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BehavioralSignature {
    pub name: String,
    pub description: String,
    pub severity: Severity,
    pub confidence: Confidence,
    pub suppressed: bool,
    /// Explanation when suppressed (e.g., capability declared in manifest).
    pub note: Option<String>,
}

/// Qualitative risk tier derived from the numeric trust score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// Maps a trust score to its risk tier.
    ///
    /// The partition is monotonic and non-overlapping: exactly one tier is
    /// active for any score. With the default thresholds, 80 maps to LOW and
    /// 79 to MEDIUM, 50 to MEDIUM and 49 to HIGH, 20 to HIGH and 19 to
    /// CRITICAL.
    pub fn from_score(score: u32, thresholds: &Thresholds) -> RiskLevel {
        if score >= thresholds.low {
            RiskLevel::Low
        } else if score >= thresholds.medium {
            RiskLevel::Medium
        } else if score >= thresholds.high {
            RiskLevel::High
        } else {
            RiskLevel::Critical
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "LOW"),
            RiskLevel::Medium => write!(f, "MEDIUM"),
            RiskLevel::High => write!(f, "HIGH"),
            RiskLevel::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Finding counts broken down by severity.
#[derive(Debug, Clone, Copy, Default, serde::Serialize, serde::Deserialize)]
pub struct Summary {
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub info: usize,
}

impl Summary {
    /// Counts all five severities in a single pass over `findings`.
    pub fn from_findings(findings: &[Finding]) -> Summary {
        findings.iter().fold(Summary::default(), |mut s, f| {
            match f.severity {
                Severity::Critical => s.critical += 1,
                Severity::High => s.high += 1,
                Severity::Medium => s.medium += 1,
                Severity::Low => s.low += 1,
                Severity::Info => s.info += 1,
            }
            s
        })
    }

    pub fn total(&self) -> usize {
        self.critical + self.high + self.medium + self.low + self.info
    }
}

/// Final scan report. Created once per scan invocation; never mutated after
/// construction.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    /// Scan root path.
    pub path: PathBuf,
    /// RFC 3339 scan timestamp. The only field that differs between two
    /// scans of byte-identical input.
    pub scanned_at: String,
    pub files: Vec<FileInfo>,
    /// Deduplicated findings, ordered by (file, line, rule id).
    pub findings: Vec<Finding>,
    /// Trust score in 0–100; 100 means no surviving findings.
    pub score: u32,
    pub risk: RiskLevel,
    pub summary: Summary,
    pub behavioral_signatures: Vec<BehavioralSignature>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Thresholds;

    fn tiers(score: u32) -> RiskLevel {
        RiskLevel::from_score(score, &Thresholds::default())
    }

    #[test]
    fn tier_boundaries_are_exact() {
        assert_eq!(tiers(100), RiskLevel::Low);
        assert_eq!(tiers(80), RiskLevel::Low);
        assert_eq!(tiers(79), RiskLevel::Medium);
        assert_eq!(tiers(50), RiskLevel::Medium);
        assert_eq!(tiers(49), RiskLevel::High);
        assert_eq!(tiers(20), RiskLevel::High);
        assert_eq!(tiers(19), RiskLevel::Critical);
        assert_eq!(tiers(0), RiskLevel::Critical);
    }

    #[test]
    fn summary_counts_each_severity_once() {
        let mk = |sev: Severity| Finding {
            rule_id: "t".to_string(),
            severity: sev,
            category: "test".to_string(),
            title: "t".to_string(),
            file: None,
            line: None,
            snippet: None,
            context: None,
            weight: 0,
            source: FindingSource::Pattern,
            note: None,
        };
        let findings = vec![
            mk(Severity::Critical),
            mk(Severity::High),
            mk(Severity::High),
            mk(Severity::Info),
        ];
        let s = Summary::from_findings(&findings);
        assert_eq!(s.critical, 1);
        assert_eq!(s.high, 2);
        assert_eq!(s.medium, 0);
        assert_eq!(s.info, 1);
        assert_eq!(s.total(), 4);
    }

    #[test]
    fn report_serializes_with_camel_case_contract_fields() {
        let report = Report {
            path: PathBuf::from("/tmp/skill"),
            scanned_at: "2026-01-01T00:00:00Z".to_string(),
            files: vec![],
            findings: vec![],
            score: 100,
            risk: RiskLevel::Low,
            summary: Summary::default(),
            behavioral_signatures: vec![],
        };
        let json = serde_json::to_value(&report).unwrap();
        assert!(json.get("scannedAt").is_some());
        assert!(json.get("behavioralSignatures").is_some());
        assert_eq!(json["risk"], "LOW");
    }
}
