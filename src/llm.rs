//! LLM adjudication boundary.
//!
//! Static analysis is the source of truth; an LLM verdict is advisory
//! evidence layered on top. The contract here keeps that relationship
//! enforceable:
//!
//! - [`LlmAnalyzer`] is the only seam the scanner knows. Providers are
//!   injected; the scanner never constructs one.
//! - An unavailable or failing analyzer degrades the scan to static-only.
//!   It never fails the scan.
//! - A verdict can only lower the trust score. A `SAFE` verdict adds
//!   nothing and removes nothing.
//! - Malformed model output normalizes to a fixed low-confidence
//!   `SUSPICIOUS` verdict rather than being trusted or discarded.

use crate::finding::{Finding, FindingSource, Severity};
use std::fmt;

/// External model providers the scanner can adjudicate with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    Anthropic,
    OpenAi,
    Ollama,
}

impl LlmProvider {
    /// Resolves a provider from `SKILLSCAN_LLM_PROVIDER`.
    ///
    /// Called once at startup in `main`; the scanner itself never reads the
    /// environment. Unset or unrecognized values mean static-only.
    pub fn from_env() -> Option<LlmProvider> {
        match std::env::var("SKILLSCAN_LLM_PROVIDER").ok()?.as_str() {
            "anthropic" => Some(LlmProvider::Anthropic),
            "openai" => Some(LlmProvider::OpenAi),
            "ollama" => Some(LlmProvider::Ollama),
            _ => None,
        }
    }
}

impl fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LlmProvider::Anthropic => write!(f, "anthropic"),
            LlmProvider::OpenAi => write!(f, "openai"),
            LlmProvider::Ollama => write!(f, "ollama"),
        }
    }
}

/// Analyzer failures. All of them are recoverable: the scanner logs and
/// continues static-only.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("provider unavailable: {0}")]
    Unavailable(String),
    #[error("provider timed out after {0}s")]
    Timeout(u64),
    #[error("unusable provider response: {0}")]
    InvalidResponse(String),
}

/// Material handed to the analyzer: the manifest plus bounded file excerpts.
#[derive(Debug, Clone, serde::Serialize)]
pub struct LlmRequest {
    pub skill_name: Option<String>,
    pub manifest: Option<String>,
    pub excerpts: Vec<FileExcerpt>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct FileExcerpt {
    pub path: String,
    pub content: String,
}

/// Verdict classification, ordered from benign to hostile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Classification {
    Safe,
    Suspicious,
    Malicious,
    /// The provider answered but could not complete its analysis. Treated
    /// like an unavailable analyzer: no score contribution either way.
    Error,
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Classification::Safe => write!(f, "SAFE"),
            Classification::Suspicious => write!(f, "SUSPICIOUS"),
            Classification::Malicious => write!(f, "MALICIOUS"),
            Classification::Error => write!(f, "ERROR"),
        }
    }
}

/// Normalized analyzer output.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct LlmVerdict {
    pub classification: Classification,
    /// Model confidence, clamped to `[0.0, 1.0]` at construction.
    pub confidence: f32,
    /// Free-form observations the model reported.
    pub observations: Vec<String>,
}

impl LlmVerdict {
    pub fn new(
        classification: Classification,
        confidence: f32,
        observations: Vec<String>,
    ) -> LlmVerdict {
        LlmVerdict {
            classification,
            confidence: confidence.clamp(0.0, 1.0),
            observations,
        }
    }

    /// The fixed verdict used when model output cannot be parsed. Malformed
    /// output is itself a weak signal, so it maps to low-confidence
    /// SUSPICIOUS rather than SAFE.
    pub fn malformed() -> LlmVerdict {
        LlmVerdict::new(
            Classification::Suspicious,
            0.2,
            vec!["provider returned unparseable output".to_string()],
        )
    }

    /// Converts the verdict into findings the scoring pass can subtract.
    ///
    /// SAFE contributes nothing, preserving the invariant that adjudication
    /// can only lower a score. Weights scale with confidence so a hesitant
    /// model moves the score less than a certain one.
    pub fn to_findings(&self) -> Vec<Finding> {
        let (severity, base_weight) = match self.classification {
            Classification::Safe | Classification::Error => return Vec::new(),
            Classification::Suspicious => (Severity::Medium, 20u32),
            Classification::Malicious => (Severity::Critical, 50u32),
        };
        let weight = ((base_weight as f32) * self.confidence).round() as u32;
        let note = (!self.observations.is_empty()).then(|| self.observations.join("; "));
        vec![Finding {
            rule_id: "llm/verdict".to_string(),
            severity,
            category: "llm-adjudication".to_string(),
            title: format!(
                "Model adjudication: {} (confidence {:.2})",
                self.classification, self.confidence
            ),
            file: None,
            line: None,
            snippet: None,
            context: None,
            weight,
            source: FindingSource::Llm,
            note,
        }]
    }
}

/// The seam between the scanner and any external model.
pub trait LlmAnalyzer: Send + Sync {
    /// Provider name for logging.
    fn name(&self) -> &str;

    /// Adjudicates the skill. Implementations own their transport, prompt
    /// construction, and timeout handling; they report failures as
    /// [`LlmError`] and return raw model text for [`parse_verdict`].
    fn analyze(&self, request: &LlmRequest) -> Result<LlmVerdict, LlmError>;
}

/// Adapter that delegates adjudication to an external command.
///
/// The request is written to the child's stdin as JSON; the child prints a
/// verdict in the documented JSON shape on stdout. The call is time-bounded:
/// on timeout the child is killed and the scan continues static-only. This
/// keeps the provider transport (local model runner, API wrapper script)
/// outside the scanner entirely.
pub struct CommandAnalyzer {
    name: String,
    command: Vec<String>,
    timeout: std::time::Duration,
}

impl CommandAnalyzer {
    /// `command` is the argv to spawn; it must be non-empty.
    pub fn new(name: impl Into<String>, command: Vec<String>, timeout_secs: u64) -> CommandAnalyzer {
        CommandAnalyzer {
            name: name.into(),
            command,
            timeout: std::time::Duration::from_secs(timeout_secs),
        }
    }
}

impl LlmAnalyzer for CommandAnalyzer {
    fn name(&self) -> &str {
        &self.name
    }

    fn analyze(&self, request: &LlmRequest) -> Result<LlmVerdict, LlmError> {
        use std::io::{Read, Write};
        use std::process::{Command, Stdio};

        let Some((program, args)) = self.command.split_first() else {
            return Err(LlmError::Unavailable("empty adjudication command".to_string()));
        };
        let payload = serde_json::to_string(request)
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| LlmError::Unavailable(e.to_string()))?;

        if let Some(mut stdin) = child.stdin.take() {
            // A child that exits without reading is handled below; a broken
            // pipe here is not fatal on its own.
            let _ = stdin.write_all(payload.as_bytes());
        }

        let (tx, rx) = std::sync::mpsc::channel();
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| LlmError::Unavailable("child stdout not captured".to_string()))?;
        std::thread::spawn(move || {
            let mut out = String::new();
            let _ = stdout.read_to_string(&mut out);
            let _ = tx.send(out);
        });

        match rx.recv_timeout(self.timeout) {
            Ok(output) => {
                let status = child
                    .wait()
                    .map_err(|e| LlmError::Unavailable(e.to_string()))?;
                if !status.success() {
                    return Err(LlmError::Unavailable(format!(
                        "adjudication command exited with {status}"
                    )));
                }
                Ok(parse_verdict(&output))
            }
            Err(_) => {
                let _ = child.kill();
                let _ = child.wait();
                Err(LlmError::Timeout(self.timeout.as_secs()))
            }
        }
    }
}

/// Raw model-output shape. Tolerant: every field is optional and unknown
/// fields are ignored.
#[derive(Debug, serde::Deserialize)]
struct RawVerdict {
    classification: Option<String>,
    confidence: Option<f32>,
    #[serde(default)]
    observations: Vec<String>,
}

/// Normalizes raw model text into an [`LlmVerdict`].
///
/// Accepts the documented JSON shape; anything else (non-JSON, missing or
/// unknown classification, NaN confidence) becomes [`LlmVerdict::malformed`].
pub fn parse_verdict(raw: &str) -> LlmVerdict {
    let Ok(parsed) = serde_json::from_str::<RawVerdict>(raw.trim()) else {
        return LlmVerdict::malformed();
    };

    let classification = match parsed.classification.as_deref() {
        Some(c) if c.eq_ignore_ascii_case("safe") => Classification::Safe,
        Some(c) if c.eq_ignore_ascii_case("suspicious") => Classification::Suspicious,
        Some(c) if c.eq_ignore_ascii_case("malicious") => Classification::Malicious,
        Some(c) if c.eq_ignore_ascii_case("error") => Classification::Error,
        _ => return LlmVerdict::malformed(),
    };

    let confidence = match parsed.confidence {
        Some(c) if c.is_finite() => c,
        _ => return LlmVerdict::malformed(),
    };

    LlmVerdict::new(classification, confidence, parsed.observations)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_formed_verdict_parses() {
        let v = parse_verdict(
            r#"{"classification": "MALICIOUS", "confidence": 0.9, "observations": ["hidden exfil"]}"#,
        );
        assert_eq!(v.classification, Classification::Malicious);
        assert!((v.confidence - 0.9).abs() < f32::EPSILON);
        assert_eq!(v.observations, vec!["hidden exfil"]);
    }

    #[test]
    fn classification_is_case_insensitive() {
        let v = parse_verdict(r#"{"classification": "safe", "confidence": 1.0}"#);
        assert_eq!(v.classification, Classification::Safe);
    }

    #[test]
    fn non_json_output_normalizes_to_low_confidence_suspicious() {
        let v = parse_verdict("I think this skill is probably fine.");
        assert_eq!(v.classification, Classification::Suspicious);
        assert!((v.confidence - 0.2).abs() < f32::EPSILON);
    }

    #[test]
    fn unknown_classification_normalizes_to_malformed() {
        let v = parse_verdict(r#"{"classification": "BENIGN", "confidence": 0.8}"#);
        assert_eq!(v.classification, Classification::Suspicious);
        assert!((v.confidence - 0.2).abs() < f32::EPSILON);
    }

    #[test]
    fn out_of_range_confidence_is_clamped() {
        let v = parse_verdict(r#"{"classification": "MALICIOUS", "confidence": 7.5}"#);
        assert!((v.confidence - 1.0).abs() < f32::EPSILON);
        let v = parse_verdict(r#"{"classification": "MALICIOUS", "confidence": -3.0}"#);
        assert!(v.confidence.abs() < f32::EPSILON);
    }

    #[test]
    fn safe_verdict_yields_no_findings() {
        let v = LlmVerdict::new(Classification::Safe, 1.0, vec![]);
        assert!(v.to_findings().is_empty());
    }

    #[test]
    fn error_verdict_yields_no_findings() {
        let v = parse_verdict(r#"{"classification": "ERROR", "confidence": 0.0}"#);
        assert_eq!(v.classification, Classification::Error);
        assert!(v.to_findings().is_empty());
    }

    #[test]
    fn malicious_verdict_weight_scales_with_confidence() {
        let certain = LlmVerdict::new(Classification::Malicious, 1.0, vec![]);
        let hesitant = LlmVerdict::new(Classification::Malicious, 0.5, vec![]);
        assert_eq!(certain.to_findings()[0].weight, 50);
        assert_eq!(hesitant.to_findings()[0].weight, 25);
    }

    fn request() -> LlmRequest {
        LlmRequest {
            skill_name: Some("x".to_string()),
            manifest: None,
            excerpts: vec![],
        }
    }

    #[test]
    fn command_analyzer_parses_child_output() {
        let analyzer = CommandAnalyzer::new(
            "test",
            vec![
                "sh".to_string(),
                "-c".to_string(),
                r#"cat >/dev/null; echo '{"classification":"SAFE","confidence":1.0}'"#.to_string(),
            ],
            10,
        );
        let verdict = analyzer.analyze(&request()).unwrap();
        assert_eq!(verdict.classification, Classification::Safe);
    }

    #[test]
    fn missing_command_is_unavailable_not_fatal() {
        let analyzer = CommandAnalyzer::new(
            "test",
            vec!["/nonexistent/adjudicator".to_string()],
            10,
        );
        assert!(matches!(
            analyzer.analyze(&request()),
            Err(LlmError::Unavailable(_))
        ));
    }

    #[test]
    fn hung_command_times_out() {
        let analyzer = CommandAnalyzer::new(
            "test",
            vec!["sleep".to_string(), "30".to_string()],
            1,
        );
        assert!(matches!(
            analyzer.analyze(&request()),
            Err(LlmError::Timeout(1))
        ));
    }

    #[test]
    fn failing_command_is_unavailable() {
        let analyzer = CommandAnalyzer::new(
            "test",
            vec!["sh".to_string(), "-c".to_string(), "cat >/dev/null; exit 3".to_string()],
            10,
        );
        assert!(matches!(
            analyzer.analyze(&request()),
            Err(LlmError::Unavailable(_))
        ));
    }

    #[test]
    fn verdict_findings_carry_the_llm_source() {
        let v = LlmVerdict::new(Classification::Suspicious, 0.8, vec!["odd".to_string()]);
        let f = &v.to_findings()[0];
        assert_eq!(f.source, FindingSource::Llm);
        assert_eq!(f.rule_id, "llm/verdict");
        assert!(f.note.as_deref().unwrap().contains("odd"));
    }
}
