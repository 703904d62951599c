//! Human-readable terminal output.

use crate::finding::{BehavioralSignature, Finding, Report, RiskLevel, Severity};
use colored::{ColoredString, Colorize};
use std::fmt::Write;

pub fn render(report: &Report) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "{}", "─".repeat(64).dimmed());
    let _ = writeln!(out, "{} {}", "Skill scan:".bold(), report.path.display());
    let _ = writeln!(
        out,
        "{} {} files ({} analyzed as text)",
        "Walked:".bold(),
        report.files.len(),
        report
            .files
            .iter()
            .filter(|f| f.kind == crate::finding::FileKind::Text)
            .count()
    );
    let _ = writeln!(out, "{}", "─".repeat(64).dimmed());

    if report.findings.is_empty() {
        let _ = writeln!(out, "\n{}", "No findings.".green());
    } else {
        let _ = writeln!(out, "\n{}", "Findings".bold().underline());
        for finding in &report.findings {
            render_finding(&mut out, finding);
        }
    }

    if !report.behavioral_signatures.is_empty() {
        let _ = writeln!(out, "\n{}", "Behavioral signatures".bold().underline());
        for sig in &report.behavioral_signatures {
            render_signature(&mut out, sig);
        }
    }

    let s = &report.summary;
    let _ = writeln!(
        out,
        "\n{} {} critical, {} high, {} medium, {} low, {} info",
        "Summary:".bold(),
        s.critical,
        s.high,
        s.medium,
        s.low,
        s.info
    );
    let _ = writeln!(
        out,
        "{} {}/100 ({})",
        "Trust score:".bold(),
        report.score,
        risk_label(report.risk)
    );

    out
}

fn render_finding(out: &mut String, finding: &Finding) {
    let location = match (&finding.file, finding.line) {
        (Some(file), Some(line)) => format!("{}:{}", file.display(), line),
        (Some(file), None) => file.display().to_string(),
        _ => "(skill-wide)".to_string(),
    };
    let _ = writeln!(
        out,
        "\n  {} {} {}",
        severity_label(finding.severity),
        finding.rule_id.bold(),
        location.dimmed()
    );
    let _ = writeln!(out, "    {}", finding.title);
    if let Some(snippet) = &finding.snippet {
        let _ = writeln!(out, "    {} {}", "│".dimmed(), snippet.dimmed());
    }
    if let Some(note) = &finding.note {
        let _ = writeln!(out, "    {} {}", "note:".italic(), note.italic());
    }
}

fn render_signature(out: &mut String, sig: &BehavioralSignature) {
    let status = if sig.suppressed {
        "suppressed".dimmed()
    } else {
        "active".yellow()
    };
    let _ = writeln!(
        out,
        "\n  {} {} ({} confidence, {})",
        severity_label(sig.severity),
        sig.name.bold(),
        format!("{:?}", sig.confidence).to_lowercase(),
        status
    );
    let _ = writeln!(out, "    {}", sig.description);
    if let Some(note) = &sig.note {
        let _ = writeln!(out, "    {} {}", "note:".italic(), note.italic());
    }
}

fn severity_label(severity: Severity) -> ColoredString {
    match severity {
        Severity::Critical => "[CRITICAL]".red().bold(),
        Severity::High => "[HIGH]    ".red(),
        Severity::Medium => "[MEDIUM]  ".yellow(),
        Severity::Low => "[LOW]     ".cyan(),
        Severity::Info => "[INFO]    ".dimmed(),
    }
}

fn risk_label(risk: RiskLevel) -> ColoredString {
    match risk {
        RiskLevel::Low => "LOW".green().bold(),
        RiskLevel::Medium => "MEDIUM".yellow().bold(),
        RiskLevel::High => "HIGH".red().bold(),
        RiskLevel::Critical => "CRITICAL".red().bold().underline(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::finding::{FindingSource, Summary};
    use std::path::PathBuf;

    #[test]
    fn render_includes_score_and_findings() {
        colored::control::set_override(false);
        let finding = Finding {
            rule_id: "exec/eval-call".to_string(),
            severity: Severity::Critical,
            category: "code-execution".to_string(),
            title: "Dynamic code evaluation".to_string(),
            file: Some(PathBuf::from("run.js")),
            line: Some(3),
            snippet: Some("eval(code)".to_string()),
            context: None,
            weight: 50,
            source: FindingSource::Pattern,
            note: None,
        };
        let report = Report {
            path: PathBuf::from("skill"),
            scanned_at: "2026-01-01T00:00:00Z".to_string(),
            files: vec![],
            findings: vec![finding.clone()],
            score: 50,
            risk: RiskLevel::Medium,
            summary: Summary::from_findings(&[finding]),
            behavioral_signatures: vec![],
        };
        let text = render(&report);
        assert!(text.contains("exec/eval-call"));
        assert!(text.contains("run.js:3"));
        assert!(text.contains("50/100"));
        assert!(text.contains("MEDIUM"));
    }

    #[test]
    fn clean_report_says_no_findings() {
        colored::control::set_override(false);
        let report = Report {
            path: PathBuf::from("skill"),
            scanned_at: "2026-01-01T00:00:00Z".to_string(),
            files: vec![],
            findings: vec![],
            score: 100,
            risk: RiskLevel::Low,
            summary: Summary::default(),
            behavioral_signatures: vec![],
        };
        assert!(render(&report).contains("No findings."));
    }
}
