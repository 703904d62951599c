//! Scan orchestration: walk, analyze, correlate, score.
//!
//! The pipeline is a fixed sequence:
//!
//! 1. Walk the skill directory, classifying files and skipping noise dirs.
//! 2. Parse the `SKILL.md` manifest for declared capabilities.
//! 3. Run the pattern, AST, and prompt layers over every text file, in
//!    parallel across files.
//! 4. Deduplicate findings and downweight those the manifest contextually
//!    justifies.
//! 5. Evaluate behavioral signatures over the combined finding set.
//! 6. Optionally merge an LLM verdict (advisory; failure degrades to
//!    static-only).
//! 7. Score, tier, and assemble the [`Report`].
//!
//! Scanning the same input twice yields byte-identical reports apart from
//! the timestamp: findings are sorted by `(file, line, rule id)` after the
//! parallel phase, and deduplication is idempotent.

use crate::analyzers::{ast, pattern::PatternMatcher, prompt};
use crate::config::{ConfigError, ScanConfig};
use crate::finding::{
    BehavioralSignature, FileInfo, FileKind, Finding, Report, RiskLevel, Severity, Summary,
};
use crate::llm::{FileExcerpt, LlmAnalyzer, LlmRequest};
use crate::metadata::{self, SkillMetadata};
use crate::rules::RuleSet;
use crate::signatures::SignatureEngine;
use rayon::prelude::*;
use regex::Regex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Penalty per active high-confidence behavioral signature.
const SIGNATURE_PENALTY: u32 = 15;

/// Bytes sniffed for the text/binary classification.
const SNIFF_LEN: usize = 8192;

/// Per-file excerpt cap for LLM adjudication requests.
const EXCERPT_MAX_CHARS: usize = 4000;
const EXCERPT_MAX_FILES: usize = 12;

static RE_ENV_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Z][A-Z0-9_]{2,}").unwrap());

/// Fatal scan errors. Everything else is recovered per-file.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("scan root is not a directory: {0}")]
    InvalidRoot(PathBuf),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// The scan orchestrator. Construct once, scan many.
pub struct Scanner {
    rules: RuleSet,
    config: ScanConfig,
    llm: Option<Box<dyn LlmAnalyzer>>,
}

impl Scanner {
    pub fn new(rules: RuleSet, config: ScanConfig) -> Scanner {
        Scanner {
            rules,
            config,
            llm: None,
        }
    }

    /// Attaches an LLM analyzer for advisory adjudication.
    pub fn with_llm(mut self, analyzer: Box<dyn LlmAnalyzer>) -> Scanner {
        self.llm = Some(analyzer);
        self
    }

    /// Scans a skill directory and produces the full report.
    ///
    /// # Errors
    ///
    /// Only [`ScanError::InvalidRoot`]; unreadable files inside the tree are
    /// recorded as [`FileKind::Unknown`] and skipped, not fatal.
    pub fn scan_directory(&self, root: &Path) -> Result<Report, ScanError> {
        if !root.is_dir() {
            return Err(ScanError::InvalidRoot(root.to_path_buf()));
        }

        let files = self.walk_files(root);
        info!(files = files.len(), path = %root.display(), "walk complete");

        let manifest_text = std::fs::read_to_string(root.join("SKILL.md")).ok();
        let skill_meta = manifest_text.as_deref().and_then(metadata::parse_manifest);
        if let Some(meta) = &skill_meta {
            debug!(skill = %meta.name, env = ?meta.required_env, "manifest parsed");
        }

        let matcher = PatternMatcher::new(&self.rules);
        let mut findings: Vec<Finding> = files
            .par_iter()
            .filter(|f| f.kind == FileKind::Text)
            .flat_map(|file| self.analyze_file(&matcher, file))
            .collect();

        if let Some(analyzer) = &self.llm {
            match analyzer.analyze(&build_request(&skill_meta, manifest_text.as_deref(), &files)) {
                Ok(verdict) => {
                    info!(provider = analyzer.name(), classification = %verdict.classification, "llm verdict merged");
                    findings.extend(verdict.to_findings());
                }
                Err(e) => {
                    warn!(provider = analyzer.name(), error = %e, "llm unavailable, continuing static-only");
                }
            }
        }

        Ok(self.assemble(root.to_path_buf(), files, findings, skill_meta.as_ref()))
    }

    /// Runs the analysis layers over an in-memory string without touching
    /// the filesystem. Returns the deduplicated, sorted findings.
    pub fn scan_content(&self, text: &str, label: &Path) -> Vec<Finding> {
        let matcher = PatternMatcher::new(&self.rules);
        let mut findings = matcher.scan(text, label);
        findings.extend(ast::analyze(text, label));
        findings.extend(prompt::analyze(text, label));
        let mut findings = dedup_findings(findings);
        findings.sort_by(|a, b| {
            (&a.file, a.line, &a.rule_id).cmp(&(&b.file, b.line, &b.rule_id))
        });
        findings
    }

    /// Like [`Scanner::scan_content`] but carries the findings through
    /// signature correlation and scoring into a full [`Report`]. Used by the
    /// `check` command.
    pub fn check_content(&self, text: &str, label: &Path) -> Report {
        let matcher = PatternMatcher::new(&self.rules);
        let file = FileInfo {
            path: label.to_path_buf(),
            absolute_path: label.to_path_buf(),
            size: text.len() as u64,
            kind: FileKind::Text,
        };
        let mut findings = matcher.scan(text, label);
        findings.extend(ast::analyze(text, label));
        findings.extend(prompt::analyze(text, label));
        self.assemble(label.to_path_buf(), vec![file], findings, None)
    }

    fn analyze_file(&self, matcher: &PatternMatcher<'_>, file: &FileInfo) -> Vec<Finding> {
        let Ok(text) = std::fs::read_to_string(&file.absolute_path) else {
            return Vec::new();
        };
        let mut findings = matcher.scan(&text, &file.path);
        findings.extend(ast::analyze(&text, &file.path));
        findings.extend(prompt::analyze(&text, &file.path));
        debug!(file = %file.path.display(), findings = findings.len(), "file analyzed");
        findings
    }

    /// Dedup, downweight, correlate, score, sort.
    fn assemble(
        &self,
        path: PathBuf,
        files: Vec<FileInfo>,
        findings: Vec<Finding>,
        meta: Option<&SkillMetadata>,
    ) -> Report {
        let mut findings = dedup_findings(findings);
        if let Some(meta) = meta {
            downweight_declared(&mut findings, meta);
        }

        let signatures = SignatureEngine::evaluate(&findings);
        let score = compute_score(&findings, &signatures);
        let risk = RiskLevel::from_score(score, &self.config.thresholds);

        findings.sort_by(|a, b| {
            (&a.file, a.line, &a.rule_id).cmp(&(&b.file, b.line, &b.rule_id))
        });
        let summary = Summary::from_findings(&findings);

        info!(score, risk = %risk, findings = findings.len(), "scan assembled");

        Report {
            path,
            scanned_at: chrono::Utc::now().to_rfc3339(),
            files,
            findings,
            score,
            risk,
            summary,
            behavioral_signatures: signatures,
        }
    }

    /// Walks the skill tree, classifying every regular file and skipping the
    /// configured noise directories. Returns records sorted by relative path.
    pub fn walk_files(&self, root: &Path) -> Vec<FileInfo> {
        let mut files = Vec::new();
        let walker = WalkDir::new(root).follow_links(false).into_iter();
        for entry in walker.filter_entry(|e| {
            !(e.file_type().is_dir()
                && e.file_name()
                    .to_str()
                    .is_some_and(|name| self.config.skip.is_skipped(name)))
        }) {
            let Ok(entry) = entry else { continue };
            if !entry.file_type().is_file() {
                continue;
            }
            let absolute_path = entry.path().to_path_buf();
            let path = absolute_path
                .strip_prefix(root)
                .unwrap_or(&absolute_path)
                .to_path_buf();
            let (size, kind) = classify(&absolute_path);
            files.push(FileInfo {
                path,
                absolute_path,
                size,
                kind,
            });
        }
        files.sort_by(|a, b| a.path.cmp(&b.path));
        files
    }
}

/// Classifies a file as text or binary by sniffing for NUL bytes. Unreadable
/// files are recorded as [`FileKind::Unknown`] and excluded from analysis.
fn classify(path: &Path) -> (u64, FileKind) {
    let size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
    match std::fs::read(path) {
        Ok(bytes) => {
            let kind = if bytes[..bytes.len().min(SNIFF_LEN)].contains(&0) {
                FileKind::Binary
            } else {
                FileKind::Text
            };
            (size, kind)
        }
        Err(e) => {
            warn!(file = %path.display(), error = %e, "unreadable file skipped");
            (size, FileKind::Unknown)
        }
    }
}

/// Removes duplicate findings keyed by `(rule id, file, line)`. First
/// occurrence wins; applying this twice is a no-op.
pub fn dedup_findings(findings: Vec<Finding>) -> Vec<Finding> {
    let mut seen: HashSet<(String, Option<PathBuf>, Option<usize>)> = HashSet::new();
    findings
        .into_iter()
        .filter(|f| seen.insert((f.rule_id.clone(), f.file.clone(), f.line)))
        .collect()
}

/// Contextual downweighting: a credential-access finding that references an
/// environment variable the manifest declares is informational, not
/// suspicious. The finding stays in the report with a note; its severity
/// drops to info and its weight to zero.
fn downweight_declared(findings: &mut [Finding], meta: &SkillMetadata) {
    for finding in findings.iter_mut() {
        if finding.category != "credential-access" {
            continue;
        }
        let Some(snippet) = finding.snippet.as_deref() else {
            continue;
        };
        let declared = RE_ENV_TOKEN
            .find_iter(snippet)
            .map(|m| m.as_str())
            .find(|token| meta.declares_env(token));
        if let Some(var) = declared {
            finding.note = Some(format!("downweighted: {var} declared in manifest"));
            finding.severity = Severity::Info;
            finding.weight = 0;
        }
    }
}

/// Trust score: start at 100, subtract finding weights and the penalty for
/// each active high-confidence signature, floor at 0.
fn compute_score(findings: &[Finding], signatures: &[BehavioralSignature]) -> u32 {
    let finding_penalty: u32 = findings.iter().map(|f| f.weight).sum();
    let signature_penalty =
        SIGNATURE_PENALTY * SignatureEngine::active_count(signatures) as u32;
    100u32
        .saturating_sub(finding_penalty)
        .saturating_sub(signature_penalty)
}

fn build_request(
    meta: &Option<SkillMetadata>,
    manifest_text: Option<&str>,
    files: &[FileInfo],
) -> LlmRequest {
    let excerpts = files
        .iter()
        .filter(|f| f.kind == FileKind::Text)
        .take(EXCERPT_MAX_FILES)
        .filter_map(|f| {
            let content = std::fs::read_to_string(&f.absolute_path).ok()?;
            let content: String = content.chars().take(EXCERPT_MAX_CHARS).collect();
            Some(FileExcerpt {
                path: f.path.display().to_string(),
                content,
            })
        })
        .collect();
    LlmRequest {
        skill_name: meta.as_ref().map(|m| m.name.clone()),
        manifest: manifest_text.map(|s| s.to_string()),
        excerpts,
    }
}
