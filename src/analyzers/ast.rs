//! Evasion analysis: detects behavior obfuscated from plain pattern matching.
//!
//! Each detection is a bounded, single-pass heuristic over lightly-tokenized
//! source, not an interpreter. False negatives on sufficiently obfuscated
//! code are accepted; false positives on common idioms are not (the clean
//! fixture corpus must yield zero findings from this module).
//!
//! The exfiltration-chain detection follows a minimal def-use design: a
//! per-file symbol table mapping variable name to taint state, updated in a
//! single forward pass. It is deliberately not a data-flow graph.

use crate::analyzers::{context_window, truncate_snippet, RuleInfo};
use crate::finding::{Finding, FindingSource, Severity};
use regex::Regex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::LazyLock;

/// Script extensions this analyzer understands.
const SCRIPT_EXTENSIONS: &[&str] = &["js", "mjs", "cjs", "ts", "py"];

/// Capability names attackers reassemble from fragments.
const SENSITIVE_TOKENS: &[&str] = &[
    "eval",
    "exec",
    "execsync",
    "spawn",
    "spawnsync",
    "require",
    "child_process",
    "system",
    "os.system",
    "popen",
];

/// Substrings that make a decoded payload suspicious rather than merely odd.
const SUSPICIOUS_DECODED: &[&str] = &[
    "eval",
    "exec",
    "http://",
    "https://",
    "require",
    "socket",
    "/bin/sh",
    "/bin/bash",
    "child_process",
    "base64",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lang {
    Js,
    Py,
}

// String construction: two or more short quoted fragments joined with `+`.
static RE_CONCAT_CHAIN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?:["'][A-Za-z_$.]{1,12}["']\s*\+\s*)+["'][A-Za-z_$.]{1,12}["']"#).unwrap()
});

static RE_STRING_FRAGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"["']([A-Za-z_$.]{1,12})["']"#).unwrap());

// Array-join assembly: ['e','v','a','l'].join('')
static RE_ARRAY_JOIN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\[\s*(?:["'][A-Za-z_$]["']\s*,\s*)+["'][A-Za-z_$]["']\s*\]\s*\.\s*join\s*\(\s*["']["']\s*\)"#)
        .unwrap()
});

// Character-code assembly.
static RE_FROM_CHAR_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"String\.fromCharCode\s*\(\s*([0-9,\s]+)\)").unwrap());

// Literal reversal: 'lave'.split('').reverse().join('') or 'lave'[::-1]
static RE_JS_REVERSE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"["']([A-Za-z_$.]{3,20})["']\s*\.split\(\s*["']["']\s*\)\s*\.reverse\(\)\s*\.join\(\s*["']["']\s*\)"#)
        .unwrap()
});

static RE_PY_REVERSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"["']([A-Za-z_.]{3,20})["']\s*\[\s*::\s*-1\s*\]"#).unwrap());

// Bracket access with a literal key.
static RE_BRACKET_LITERAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"[A-Za-z_$][\w$]*\s*\[\s*["']([A-Za-z_$][\w$]*)["']\s*\]"#).unwrap()
});

/// Keys that reach a sensitive capability through bracket notation.
const SENSITIVE_KEYS: &[&str] = &[
    "eval",
    "exec",
    "execSync",
    "spawn",
    "spawnSync",
    "system",
    "popen",
    "require",
    "constructor",
];

// Variable-key indexing of a global object, immediately invoked.
static RE_BRACKET_DYNAMIC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:globalThis|global|window|self)\s*\[\s*[A-Za-z_$][\w$]*\s*\]\s*\(").unwrap()
});

// Aliasing: binding a capability without invoking it.
static RE_JS_ALIAS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(?:const|let|var)\s+([A-Za-z_$][\w$]*)\s*=\s*(eval|Function|require|child_process\.exec(?:Sync)?)\s*;?\s*$",
    )
    .unwrap()
});

static RE_PY_ALIAS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([A-Za-z_]\w*)\s*=\s*(eval|exec|getattr|os\.system|subprocess\.run)\s*(?:#.*)?$")
        .unwrap()
});

// Environment harvesting: enumerate, then filter by name.
static RE_ENV_ENUM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"Object\.(?:keys|entries|values)\s*\(\s*process\.env\s*\)|for\s+[\w,\s]+\s+in\s+(?:os\.environ|process\.env)|os\.environ\.items\s*\(\s*\)",
    )
    .unwrap()
});

static RE_SECRET_NAME_FILTER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(secret|token|passw|credential|api[_-]?key|private[_-]?key|auth)").unwrap()
});

// Encoded payloads: a run of hex or unicode escapes inside one literal.
static RE_ESCAPE_RUN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:\\x[0-9a-fA-F]{2}|\\u[0-9a-fA-F]{4}){8,}").unwrap()
});

// Time bombs: deferred execution with an unusually long delay.
static RE_JS_TIMER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"set(?:Timeout|Interval)\s*\([^)]*,\s*(\d[\d_]*)\s*\)").unwrap()
});

static RE_PY_SLEEP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"time\.sleep\s*\(\s*(\d[\d_]*)\s*\)").unwrap());

/// One hour in milliseconds; longer timer delays look like scheduling, not UI.
const JS_DELAY_THRESHOLD_MS: u64 = 3_600_000;
const PY_DELAY_THRESHOLD_S: u64 = 3_600;

// Taint sources: secret-bearing environment reads, whole-environment grabs,
// credential files.
static RE_TAINT_SOURCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"process\.env(?:\.|\[["']?)[A-Z0-9_]*(?:SECRET|TOKEN|KEY|PASSWORD|PASSWD|CREDENTIAL)|os\.environ(?:\.get)?\s*[\(\[]\s*["'][A-Z0-9_]*(?:SECRET|TOKEN|KEY|PASSWORD|PASSWD|CREDENTIAL)|process\.env\s*(?:[,)\];}]|$)|dict\(\s*os\.environ\s*\)|os\.environ\.copy\(\)|~/\.ssh|\.aws/credentials|credentials\.json"#,
    )
    .unwrap()
});

static RE_ENCODE_STEP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"\bbtoa\s*\(|Buffer\.from\s*\(|toString\s*\(\s*["']base64|b64encode|base64\.|encodeURIComponent\s*\(|JSON\.stringify\s*\(|hexlify"#,
    )
    .unwrap()
});

static RE_NETWORK_SINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\bfetch\s*\(|axios\.\w+\s*\(|https?\.request\s*\(|XMLHttpRequest|requests\.(?:post|get|put)\s*\(|urllib\.request|net\.connect\s*\(|socket\.(?:socket|create_connection)\s*\(",
    )
    .unwrap()
});

// Assignment line: `const x = rhs` / `let x = rhs` / `x = rhs`.
// The `[^=]` after `=` excludes `==`/`===` comparisons.
static RE_ASSIGNMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:const\s+|let\s+|var\s+)?([A-Za-z_$][\w$]*)\s*=\s*([^=].*)$").unwrap()
});

static RE_IDENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z_$][\w$]*").unwrap());

// Prototype and global namespace pollution.
static RE_PROTO_POLLUTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"__proto__|Object\.prototype\.[\w$]+\s*=|Object\.assign\s*\(\s*Object\.prototype|\.constructor\.prototype|\b(?:globalThis|global)\.[\w$]+\s*=[^=]"#,
    )
    .unwrap()
});

// Evaluation primitive fed directly by a decoding primitive.
static RE_EVAL_DECODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(?:eval|Function|exec)\s*\(\s*(?:atob|Buffer\.from|base64\.b64decode|b64decode|decodeURIComponent|unescape)\s*\(",
    )
    .unwrap()
});

// `with` blocks allow implicit capability lookup through dynamic scoping.
static RE_WITH_SCOPE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bwith\s*\(").unwrap());

/// Taint state for one variable in the per-file symbol table.
struct Taint {
    encoded: bool,
    source_line: usize,
}

/// Returns `true` when this analyzer understands the file's language.
pub fn applies_to(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| SCRIPT_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

fn lang_of(path: &Path) -> Lang {
    match path.extension().and_then(|e| e.to_str()) {
        Some("py") => Lang::Py,
        _ => Lang::Js,
    }
}

/// Runs every evasion detection over `text`.
pub fn analyze(text: &str, path: &Path) -> Vec<Finding> {
    if !applies_to(path) {
        return Vec::new();
    }
    let lang = lang_of(path);
    let lines: Vec<&str> = text.lines().collect();

    let mut findings = Vec::new();
    // Declaration order, so the reported alias is stable across runs.
    let mut aliases: Vec<String> = Vec::new();
    let mut alias_capability: HashMap<String, String> = HashMap::new();
    let mut taint: HashMap<String, Taint> = HashMap::new();

    for (idx, raw_line) in lines.iter().enumerate() {
        let line_num = idx + 1;
        let line = *raw_line;
        let trimmed = line.trim();

        // Skip comment lines so documentation inside scripts cannot trip the
        // heuristics. Shebangs carry no code either.
        let is_comment = match lang {
            Lang::Js => trimmed.starts_with("//") || trimmed.starts_with('*'),
            Lang::Py => trimmed.starts_with('#'),
        };
        if is_comment || trimmed.is_empty() {
            continue;
        }

        check_string_construction(&mut findings, text, line, line_num, path, lang);
        check_bracket_access(&mut findings, text, line, line_num, path);
        check_encoded_payload(&mut findings, text, line, line_num, path);
        check_time_bomb(&mut findings, text, line, line_num, path, lang);

        if RE_PROTO_POLLUTION.is_match(line) {
            emit(
                &mut findings,
                "ast/proto-pollution",
                Severity::High,
                30,
                "Prototype or global namespace pollution",
                "obfuscation",
                text,
                line,
                line_num,
                path,
                None,
            );
        }

        if RE_EVAL_DECODE.is_match(line) {
            emit(
                &mut findings,
                "ast/eval-decode",
                Severity::Critical,
                45,
                "Evaluation primitive fed by a decoding primitive",
                "code-execution",
                text,
                line,
                line_num,
                path,
                None,
            );
        }

        if lang == Lang::Js && RE_WITH_SCOPE.is_match(line) {
            emit(
                &mut findings,
                "ast/dynamic-scope",
                Severity::Medium,
                15,
                "Dynamic scoping via `with` gives implicit capability lookup",
                "obfuscation",
                text,
                line,
                line_num,
                path,
                None,
            );
        }

        // Environment harvesting: enumeration on this line plus a
        // secret-name filter on the same or next few lines.
        if RE_ENV_ENUM.is_match(line) {
            let window_end = (idx + 4).min(lines.len());
            if lines[idx..window_end]
                .iter()
                .any(|l| RE_SECRET_NAME_FILTER.is_match(l))
            {
                emit(
                    &mut findings,
                    "ast/env-harvest",
                    Severity::Critical,
                    40,
                    "Environment variable harvesting filtered by secret-like names",
                    "credential-access",
                    text,
                    line,
                    line_num,
                    path,
                    None,
                );
            }
        }

        // Aliasing: record the binding, flag the later invocation.
        let alias_re = match lang {
            Lang::Js => &RE_JS_ALIAS,
            Lang::Py => &RE_PY_ALIAS,
        };
        if let Some(cap) = alias_re.captures(line) {
            let name = cap[1].to_string();
            let capability = cap[2].to_string();
            if alias_capability.insert(name.clone(), capability).is_none() {
                aliases.push(name);
            }
        } else {
            for alias in &aliases {
                let invoked = line
                    .find(alias.as_str())
                    .map(|pos| {
                        let before_ok = pos == 0
                            || !line[..pos]
                                .chars()
                                .next_back()
                                .is_some_and(|c| c.is_alphanumeric() || c == '_' || c == '$' || c == '.');
                        let rest = &line[pos + alias.len()..];
                        before_ok && rest.trim_start().starts_with('(')
                    })
                    .unwrap_or(false);
                if invoked {
                    let capability = alias_capability
                        .get(alias)
                        .cloned()
                        .unwrap_or_default();
                    emit(
                        &mut findings,
                        "ast/alias-invoke",
                        Severity::High,
                        30,
                        "Sensitive capability invoked through an alias",
                        "code-execution",
                        text,
                        line,
                        line_num,
                        path,
                        Some(format!("`{alias}` aliases `{capability}`")),
                    );
                    break;
                }
            }
        }

        // Minimal def-use taint pass for the exfiltration chain.
        if let Some(cap) = RE_ASSIGNMENT.captures(line) {
            let name = cap[1].to_string();
            let rhs = &cap[2];
            let rhs_tainted_var = RE_IDENT
                .find_iter(rhs)
                .find(|m| taint.contains_key(m.as_str()));
            let from_source = RE_TAINT_SOURCE.is_match(rhs);
            if from_source || rhs_tainted_var.is_some() {
                let inherited_encoded = rhs_tainted_var
                    .and_then(|m| taint.get(m.as_str()))
                    .map(|t| t.encoded)
                    .unwrap_or(false);
                let encoded = inherited_encoded || RE_ENCODE_STEP.is_match(rhs);
                let source_line = rhs_tainted_var
                    .and_then(|m| taint.get(m.as_str()))
                    .map(|t| t.source_line)
                    .unwrap_or(line_num);
                taint.insert(
                    name,
                    Taint {
                        encoded,
                        source_line,
                    },
                );
            } else {
                // Reassignment from a clean expression clears the taint.
                taint.remove(&name);
            }
        }

        if RE_NETWORK_SINK.is_match(line) {
            let hit = RE_IDENT
                .find_iter(line)
                .filter_map(|m| taint.get_key_value(m.as_str()))
                .find(|(_, t)| t.encoded);
            if let Some((name, t)) = hit {
                emit(
                    &mut findings,
                    "ast/exfil-chain",
                    Severity::Critical,
                    45,
                    "Sensitive value encoded and passed to a network call",
                    "exfiltration",
                    text,
                    line,
                    line_num,
                    path,
                    Some(format!(
                        "`{name}` sourced from a sensitive read on line {}",
                        t.source_line
                    )),
                );
            }
        }
    }

    findings
}

fn check_string_construction(
    findings: &mut Vec<Finding>,
    text: &str,
    line: &str,
    line_num: usize,
    path: &Path,
    lang: Lang,
) {
    let mut reconstructed: Option<String> = None;

    if let Some(m) = RE_CONCAT_CHAIN.find(line) {
        let joined: String = RE_STRING_FRAGMENT
            .captures_iter(m.as_str())
            .map(|c| c[1].to_string())
            .collect();
        if is_sensitive_token(&joined) {
            reconstructed = Some(joined);
        }
    }

    if reconstructed.is_none() {
        if let Some(m) = RE_ARRAY_JOIN.find(line) {
            let joined: String = RE_STRING_FRAGMENT
                .captures_iter(m.as_str())
                .map(|c| c[1].to_string())
                .collect();
            if is_sensitive_token(&joined) {
                reconstructed = Some(joined);
            }
        }
    }

    if reconstructed.is_none() {
        if let Some(cap) = RE_FROM_CHAR_CODE.captures(line) {
            if let Some(decoded) = decode_char_codes(&cap[1]) {
                if is_sensitive_token(&decoded) || contains_suspicious(&decoded) {
                    reconstructed = Some(decoded);
                }
            }
        }
    }

    if reconstructed.is_none() {
        let reverse_re = match lang {
            Lang::Js => &RE_JS_REVERSE,
            Lang::Py => &RE_PY_REVERSE,
        };
        if let Some(cap) = reverse_re.captures(line) {
            let reversed: String = cap[1].chars().rev().collect();
            if is_sensitive_token(&reversed) {
                reconstructed = Some(reversed);
            }
        }
    }

    if let Some(token) = reconstructed {
        emit(
            findings,
            "ast/string-construction",
            Severity::High,
            30,
            "Sensitive token assembled from string fragments",
            "code-execution",
            text,
            line,
            line_num,
            path,
            Some(format!("reconstructs `{token}`")),
        );
    }
}

fn check_bracket_access(
    findings: &mut Vec<Finding>,
    text: &str,
    line: &str,
    line_num: usize,
    path: &Path,
) {
    let literal_hit = RE_BRACKET_LITERAL
        .captures_iter(line)
        .any(|c| SENSITIVE_KEYS.contains(&&c[1]));
    if literal_hit || RE_BRACKET_DYNAMIC.is_match(line) {
        emit(
            findings,
            "ast/bracket-access",
            Severity::High,
            35,
            "Sensitive capability reached through bracket notation",
            "code-execution",
            text,
            line,
            line_num,
            path,
            None,
        );
    }
}

fn check_encoded_payload(
    findings: &mut Vec<Finding>,
    text: &str,
    line: &str,
    line_num: usize,
    path: &Path,
) {
    let Some(m) = RE_ESCAPE_RUN.find(line) else {
        return;
    };
    let decoded = decode_escapes(m.as_str());
    // Unicode-escape runs that decode to ordinary text are a common i18n
    // idiom; only hex runs or suspicious decodes are worth a finding.
    let (severity, weight, note) = if contains_suspicious(&decoded) {
        (
            Severity::High,
            35,
            Some(format!("decodes to `{}`", truncate_snippet(&decoded))),
        )
    } else if m.as_str().contains("\\x") {
        (Severity::Medium, 20, None)
    } else {
        return;
    };
    emit(
        findings,
        "ast/encoded-payload",
        severity,
        weight,
        "Escape-encoded string literal",
        "obfuscation",
        text,
        line,
        line_num,
        path,
        note,
    );
}

fn check_time_bomb(
    findings: &mut Vec<Finding>,
    text: &str,
    line: &str,
    line_num: usize,
    path: &Path,
    lang: Lang,
) {
    let delayed = match lang {
        Lang::Js => RE_JS_TIMER
            .captures(line)
            .and_then(|c| parse_delay(&c[1]))
            .is_some_and(|ms| ms >= JS_DELAY_THRESHOLD_MS),
        Lang::Py => RE_PY_SLEEP
            .captures(line)
            .and_then(|c| parse_delay(&c[1]))
            .is_some_and(|s| s >= PY_DELAY_THRESHOLD_S),
    };
    if delayed {
        emit(
            findings,
            "ast/time-bomb",
            Severity::Medium,
            20,
            "Execution deferred by an unusually long delay",
            "evasion",
            text,
            line,
            line_num,
            path,
            None,
        );
    }
}

fn parse_delay(digits: &str) -> Option<u64> {
    digits.replace('_', "").parse().ok()
}

fn is_sensitive_token(s: &str) -> bool {
    let lower = s.to_lowercase();
    SENSITIVE_TOKENS.contains(&lower.as_str())
}

fn contains_suspicious(decoded: &str) -> bool {
    let lower = decoded.to_lowercase();
    SUSPICIOUS_DECODED.iter().any(|s| lower.contains(s))
}

/// Decodes `\xHH` and `\uHHHH` escapes; anything else passes through.
fn decode_escapes(s: &str) -> String {
    let mut out = String::with_capacity(s.len() / 4);
    let chars: Vec<char> = s.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '\\' && i + 1 < chars.len() {
            let width = match chars[i + 1] {
                'x' => 2,
                'u' => 4,
                _ => {
                    out.push(chars[i]);
                    i += 1;
                    continue;
                }
            };
            if i + 2 + width <= chars.len() {
                let hex: String = chars[i + 2..i + 2 + width].iter().collect();
                if let Ok(code) = u32::from_str_radix(&hex, 16) {
                    if let Some(c) = char::from_u32(code) {
                        out.push(c);
                        i += 2 + width;
                        continue;
                    }
                }
            }
            out.push(chars[i]);
            i += 1;
        } else {
            out.push(chars[i]);
            i += 1;
        }
    }
    out
}

fn decode_char_codes(list: &str) -> Option<String> {
    let mut out = String::new();
    for part in list.split(',') {
        let code: u32 = part.trim().parse().ok()?;
        out.push(char::from_u32(code)?);
    }
    Some(out)
}

#[allow(clippy::too_many_arguments)]
fn emit(
    findings: &mut Vec<Finding>,
    id: &str,
    severity: Severity,
    weight: u32,
    title: &str,
    category: &str,
    text: &str,
    line: &str,
    line_num: usize,
    path: &Path,
    note: Option<String>,
) {
    findings.push(Finding {
        rule_id: id.to_string(),
        severity,
        category: category.to_string(),
        title: title.to_string(),
        file: Some(path.to_path_buf()),
        line: Some(line_num),
        snippet: Some(truncate_snippet(line)),
        context: Some(context_window(text, line_num)),
        weight,
        source: FindingSource::Ast,
        note,
    });
}

/// Built-in rule inventory for `list-rules` / `explain`.
pub fn rules() -> Vec<RuleInfo> {
    vec![
        RuleInfo {
            id: "ast/string-construction",
            severity: Severity::High,
            layer: "ast",
            title: "Sensitive token assembled from string fragments",
        },
        RuleInfo {
            id: "ast/bracket-access",
            severity: Severity::High,
            layer: "ast",
            title: "Sensitive capability reached through bracket notation",
        },
        RuleInfo {
            id: "ast/alias-invoke",
            severity: Severity::High,
            layer: "ast",
            title: "Sensitive capability invoked through an alias",
        },
        RuleInfo {
            id: "ast/env-harvest",
            severity: Severity::Critical,
            layer: "ast",
            title: "Environment variable harvesting filtered by secret-like names",
        },
        RuleInfo {
            id: "ast/encoded-payload",
            severity: Severity::Medium,
            layer: "ast",
            title: "Escape-encoded string literal",
        },
        RuleInfo {
            id: "ast/time-bomb",
            severity: Severity::Medium,
            layer: "ast",
            title: "Execution deferred by an unusually long delay",
        },
        RuleInfo {
            id: "ast/exfil-chain",
            severity: Severity::Critical,
            layer: "ast",
            title: "Sensitive value encoded and passed to a network call",
        },
        RuleInfo {
            id: "ast/proto-pollution",
            severity: Severity::High,
            layer: "ast",
            title: "Prototype or global namespace pollution",
        },
        RuleInfo {
            id: "ast/eval-decode",
            severity: Severity::Critical,
            layer: "ast",
            title: "Evaluation primitive fed by a decoding primitive",
        },
        RuleInfo {
            id: "ast/dynamic-scope",
            severity: Severity::Medium,
            layer: "ast",
            title: "Dynamic scoping via `with` gives implicit capability lookup",
        },
    ]
}
