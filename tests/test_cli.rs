//! CLI behavior: output, exit codes, rule introspection.

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::PathBuf;

fn skillscan() -> Command {
    Command::cargo_bin("skillscan").unwrap()
}

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

#[test]
fn scanning_a_clean_skill_exits_zero() {
    skillscan()
        .arg("scan")
        .arg(fixture("clean-skill"))
        .assert()
        .success()
        .stdout(predicate::str::contains("100/100"))
        .stdout(predicate::str::contains("LOW"));
}

#[test]
fn scanning_a_malicious_skill_exits_one_with_critical_risk() {
    let assert = skillscan()
        .arg("scan")
        .arg(fixture("malicious-exec"))
        .arg("--format")
        .arg("json")
        .assert()
        .code(1);

    let output = assert.get_output();
    let report: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("valid JSON report");
    assert_eq!(report["risk"], "CRITICAL");
    assert!(report["score"].as_u64().unwrap() < 20);
    assert!(report["findings"]
        .as_array()
        .unwrap()
        .iter()
        .any(|f| f["ruleId"] == "exec/eval-call"));
}

#[test]
fn scan_report_can_be_written_to_a_file() {
    let tmp = tempfile::tempdir().unwrap();
    let out = tmp.path().join("report.json");
    skillscan()
        .arg("scan")
        .arg(fixture("clean-skill"))
        .arg("--format")
        .arg("json")
        .arg("--output")
        .arg(&out)
        .assert()
        .success();
    let report: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(out).unwrap()).unwrap();
    assert_eq!(report["score"], 100);
}

#[test]
fn scanning_a_missing_directory_is_a_usage_error() {
    skillscan()
        .arg("scan")
        .arg("/nonexistent/skill")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("error:"));
}

#[test]
fn check_flags_a_single_malicious_file() {
    let tmp = tempfile::tempdir().unwrap();
    let file = tmp.path().join("payload.js");
    std::fs::write(&file, "eval(code);\n").unwrap();
    skillscan()
        .arg("check")
        .arg(&file)
        .assert()
        .code(1)
        .stdout(predicate::str::contains("exec/eval-call"));
}

#[test]
fn eval_passes_on_the_bundled_corpus() {
    skillscan()
        .arg("eval")
        .arg(fixture(""))
        .assert()
        .success()
        .stdout(predicate::str::contains("Evaluation passed."))
        .stdout(predicate::str::contains("precision=1.000"))
        .stdout(predicate::str::contains("recall=1.000"));
}

#[test]
fn eval_fails_on_a_mislabeled_fixture() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().join("mislabeled");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(
        dir.join("SKILL.md"),
        "---\nname: x\ndescription: d\n---\n\n# X\n",
    )
    .unwrap();
    std::fs::write(dir.join("go.js"), "eval(input);\n").unwrap();
    std::fs::write(dir.join("expected.toml"), "safe = true\n").unwrap();

    skillscan()
        .arg("eval")
        .arg(tmp.path())
        .assert()
        .code(1)
        .stdout(predicate::str::contains("FAIL"))
        .stdout(predicate::str::contains("Evaluation failed."));
}

#[test]
fn list_rules_covers_all_layers() {
    skillscan()
        .arg("list-rules")
        .assert()
        .success()
        .stdout(predicate::str::contains("exec/eval-call"))
        .stdout(predicate::str::contains("ast/bracket-access"))
        .stdout(predicate::str::contains("prompt/override-instructions"));
}

#[test]
fn explain_shows_a_pattern_rule() {
    skillscan()
        .arg("explain")
        .arg("exec/eval-call")
        .assert()
        .success()
        .stdout(predicate::str::contains("code-execution"))
        .stdout(predicate::str::contains("eval"));
}

#[test]
fn explain_shows_a_built_in_analyzer_rule() {
    skillscan()
        .arg("explain")
        .arg("ast/exfil-chain")
        .assert()
        .success()
        .stdout(predicate::str::contains("ast"));
}

#[test]
fn explain_rejects_unknown_rules() {
    skillscan()
        .arg("explain")
        .arg("no/such-rule")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("unknown rule"));
}

#[test]
fn custom_rule_file_overrides_the_builtin_set() {
    let tmp = tempfile::tempdir().unwrap();
    let rules = tmp.path().join("rules.toml");
    std::fs::write(
        &rules,
        r#"
[[rules]]
id = "custom/todo"
pattern = 'TODO'
severity = "low"
category = "hygiene"
title = "Leftover TODO"
file_types = ["js"]
weight = 1
"#,
    )
    .unwrap();
    let file = tmp.path().join("a.js");
    std::fs::write(&file, "// TODO clean up\neval(code);\n").unwrap();

    skillscan()
        .arg("check")
        .arg(&file)
        .arg("--rules")
        .arg(&rules)
        .assert()
        .stdout(predicate::str::contains("custom/todo"))
        .stdout(predicate::str::contains("exec/eval-call").not());
}

#[test]
fn malformed_rule_file_is_fatal() {
    let tmp = tempfile::tempdir().unwrap();
    let rules = tmp.path().join("rules.toml");
    std::fs::write(&rules, "[[rules]]\nid = \"broken\"\n").unwrap();
    skillscan()
        .arg("list-rules")
        .arg("--rules")
        .arg(&rules)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("error:"));
}
