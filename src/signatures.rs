//! Behavioral signatures: cross-finding correlation.
//!
//! Individual findings are local facts about one line of one file. A
//! signature correlates findings across the whole skill to recognize a
//! higher-level behavior, e.g. reading a credential in one file and sending
//! encoded data from another. Signatures carry a confidence level; only
//! high-confidence signatures affect the trust score, and a suppressed
//! signature (capability declared in the manifest) never does.

use crate::finding::{
    BehavioralSignature, Confidence, Finding, FindingSource, Severity,
};
use std::collections::HashSet;

/// Evaluates the built-in signatures against a deduplicated finding set.
pub struct SignatureEngine;

impl SignatureEngine {
    /// Runs every signature over `findings` and returns those that matched.
    ///
    /// The input must already be deduplicated and downweighted; signature
    /// suppression keys off finding severities the downweighting pass
    /// assigned.
    pub fn evaluate(findings: &[Finding]) -> Vec<BehavioralSignature> {
        let mut signatures = Vec::new();
        signatures.extend(exfiltration_chain(findings));
        signatures.extend(layered_obfuscation(findings));
        signatures.extend(injection_driven_execution(findings));
        signatures
    }

    /// Number of signatures that carry a score penalty: active (not
    /// suppressed) and high-confidence.
    pub fn active_count(signatures: &[BehavioralSignature]) -> usize {
        signatures
            .iter()
            .filter(|s| !s.suppressed && s.confidence == Confidence::High)
            .count()
    }
}

fn has_category(findings: &[Finding], category: &str) -> bool {
    findings.iter().any(|f| f.category == category)
}

/// Credential material flowing toward the network.
///
/// High confidence when the in-file taint pass already proved the chain
/// (`ast/exfil-chain`). Medium confidence when the three ingredient
/// categories merely co-occur across the skill, since the data flow between
/// them is then inferred, not observed.
fn exfiltration_chain(findings: &[Finding]) -> Option<BehavioralSignature> {
    let proven = findings.iter().any(|f| f.rule_id == "ast/exfil-chain");

    let credential = findings.iter().filter(|f| f.category == "credential-access");
    let mut cred_any = false;
    let mut cred_all_declared = true;
    for f in credential {
        cred_any = true;
        if f.severity != Severity::Info {
            cred_all_declared = false;
        }
    }

    let ingredients = cred_any
        && has_category(findings, "obfuscation")
        && has_category(findings, "network");

    if !proven && !ingredients {
        return None;
    }

    let confidence = if proven {
        Confidence::High
    } else {
        Confidence::Medium
    };

    // A co-occurrence built entirely on manifest-declared credential access
    // is recorded but carries no penalty. A proven taint chain is never
    // excused by a declaration.
    let suppressed = !proven && cred_all_declared;
    let note = suppressed
        .then(|| "credential access is declared in the skill manifest".to_string());

    Some(BehavioralSignature {
        name: "exfiltration-chain".to_string(),
        description: "Credential access, data encoding, and network egress combine into a \
                      plausible exfiltration path"
            .to_string(),
        severity: Severity::Critical,
        confidence,
        suppressed,
        note,
    })
}

/// Several distinct evasion techniques stacked in one skill.
///
/// One obfuscation trick can be sloppy code; three or more distinct tricks
/// is deliberate concealment.
fn layered_obfuscation(findings: &[Finding]) -> Option<BehavioralSignature> {
    let distinct: HashSet<&str> = findings
        .iter()
        .filter(|f| f.source == FindingSource::Ast)
        .map(|f| f.rule_id.as_str())
        .collect();

    if distinct.len() < 3 {
        return None;
    }

    let confidence = if distinct.len() >= 4 {
        Confidence::High
    } else {
        Confidence::Medium
    };

    Some(BehavioralSignature {
        name: "layered-obfuscation".to_string(),
        description: format!(
            "{} distinct evasion techniques detected in one skill",
            distinct.len()
        ),
        severity: Severity::High,
        confidence,
        suppressed: false,
        note: None,
    })
}

/// Prompt injection paired with code execution: the skill both manipulates
/// the agent and has the machinery to act on hijacked instructions.
fn injection_driven_execution(findings: &[Finding]) -> Option<BehavioralSignature> {
    let injection = findings.iter().any(|f| {
        f.source == FindingSource::Prompt
            && matches!(f.severity, Severity::Critical | Severity::High)
    });
    let execution = has_category(findings, "code-execution");

    if !injection || !execution {
        return None;
    }

    Some(BehavioralSignature {
        name: "injection-driven-execution".to_string(),
        description: "Prompt-injection content coexists with code-execution capability"
            .to_string(),
        severity: Severity::Critical,
        confidence: Confidence::High,
        suppressed: false,
        note: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn finding(rule_id: &str, category: &str, source: FindingSource, severity: Severity) -> Finding {
        Finding {
            rule_id: rule_id.to_string(),
            severity,
            category: category.to_string(),
            title: rule_id.to_string(),
            file: Some(PathBuf::from("a.js")),
            line: Some(1),
            snippet: None,
            context: None,
            weight: 10,
            source,
            note: None,
        }
    }

    #[test]
    fn proven_taint_chain_is_high_confidence() {
        let findings = vec![finding(
            "ast/exfil-chain",
            "exfiltration",
            FindingSource::Ast,
            Severity::Critical,
        )];
        let sigs = SignatureEngine::evaluate(&findings);
        let sig = sigs.iter().find(|s| s.name == "exfiltration-chain").unwrap();
        assert_eq!(sig.confidence, Confidence::High);
        assert!(!sig.suppressed);
        assert_eq!(SignatureEngine::active_count(&sigs), 1);
    }

    #[test]
    fn category_co_occurrence_is_medium_confidence() {
        let findings = vec![
            finding("cred/env-secret", "credential-access", FindingSource::Pattern, Severity::High),
            finding("obfuscation/base64-decode", "obfuscation", FindingSource::Pattern, Severity::Low),
            finding("net/outbound-call", "network", FindingSource::Pattern, Severity::Low),
        ];
        let sigs = SignatureEngine::evaluate(&findings);
        let sig = sigs.iter().find(|s| s.name == "exfiltration-chain").unwrap();
        assert_eq!(sig.confidence, Confidence::Medium);
        assert!(!sig.suppressed);
        // Medium confidence carries no penalty.
        assert_eq!(SignatureEngine::active_count(&sigs), 0);
    }

    #[test]
    fn declared_credential_access_suppresses_the_co_occurrence() {
        let findings = vec![
            finding("cred/env-secret", "credential-access", FindingSource::Pattern, Severity::Info),
            finding("obfuscation/base64-decode", "obfuscation", FindingSource::Pattern, Severity::Low),
            finding("net/outbound-call", "network", FindingSource::Pattern, Severity::Low),
        ];
        let sigs = SignatureEngine::evaluate(&findings);
        let sig = sigs.iter().find(|s| s.name == "exfiltration-chain").unwrap();
        assert!(sig.suppressed);
        assert!(sig.note.as_deref().unwrap().contains("manifest"));
        assert_eq!(SignatureEngine::active_count(&sigs), 0);
    }

    #[test]
    fn two_evasion_rules_do_not_trigger_layered_obfuscation() {
        let findings = vec![
            finding("ast/string-construction", "evasion", FindingSource::Ast, Severity::High),
            finding("ast/bracket-access", "evasion", FindingSource::Ast, Severity::High),
        ];
        let sigs = SignatureEngine::evaluate(&findings);
        assert!(sigs.iter().all(|s| s.name != "layered-obfuscation"));
    }

    #[test]
    fn four_evasion_rules_are_high_confidence_obfuscation() {
        let findings = vec![
            finding("ast/string-construction", "evasion", FindingSource::Ast, Severity::High),
            finding("ast/bracket-access", "evasion", FindingSource::Ast, Severity::High),
            finding("ast/alias-invoke", "evasion", FindingSource::Ast, Severity::High),
            finding("ast/eval-decode", "evasion", FindingSource::Ast, Severity::Critical),
        ];
        let sigs = SignatureEngine::evaluate(&findings);
        let sig = sigs.iter().find(|s| s.name == "layered-obfuscation").unwrap();
        assert_eq!(sig.confidence, Confidence::High);
    }

    #[test]
    fn injection_plus_execution_triggers_the_combined_signature() {
        let findings = vec![
            finding("prompt/override-instructions", "prompt-injection", FindingSource::Prompt, Severity::Critical),
            finding("exec/eval-call", "code-execution", FindingSource::Pattern, Severity::Critical),
        ];
        let sigs = SignatureEngine::evaluate(&findings);
        let sig = sigs
            .iter()
            .find(|s| s.name == "injection-driven-execution")
            .unwrap();
        assert_eq!(sig.confidence, Confidence::High);
    }

    #[test]
    fn low_severity_prompt_findings_do_not_pair_with_execution() {
        let findings = vec![
            finding("prompt/urgency", "prompt-injection", FindingSource::Prompt, Severity::Low),
            finding("exec/eval-call", "code-execution", FindingSource::Pattern, Severity::Critical),
        ];
        let sigs = SignatureEngine::evaluate(&findings);
        assert!(sigs.iter().all(|s| s.name != "injection-driven-execution"));
    }

    #[test]
    fn clean_findings_produce_no_signatures() {
        let findings = vec![finding(
            "net/outbound-call",
            "network",
            FindingSource::Pattern,
            Severity::Low,
        )];
        assert!(SignatureEngine::evaluate(&findings).is_empty());
    }
}
