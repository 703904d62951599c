//! JSON report output: the serialized [`Report`], nothing more.

use crate::finding::Report;

pub fn render(report: &Report) -> serde_json::Result<String> {
    serde_json::to_string_pretty(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::finding::{RiskLevel, Summary};
    use std::path::PathBuf;

    #[test]
    fn output_is_valid_json_with_contract_fields() {
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
        let rendered = render(&report).unwrap();
        let value: serde_json::Value = serde_json::from_str(&rendered).unwrap();
        assert_eq!(value["score"], 100);
        assert_eq!(value["risk"], "LOW");
        assert!(value["scannedAt"].is_string());
    }
}
