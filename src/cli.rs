//! Command-line interface.
//!
//! Exit codes: `0` when the scanned skill is LOW risk (or the evaluation run
//! passed), `1` when risk is elevated or the evaluation failed, `2` for
//! usage and configuration errors.

use crate::config::ScanConfig;
use crate::eval;
use crate::finding::RiskLevel;
use crate::llm::{CommandAnalyzer, LlmProvider};
use crate::output::{self, OutputFormat};
use crate::rules::RuleSet;
use crate::scanner::Scanner;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(Parser)]
#[command(
    name = "skillscan",
    version,
    about = "Static security scanner for automation skill bundles",
    propagate_version = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Scan a skill directory and report findings, score, and risk tier
    Scan {
        /// Skill directory to scan
        path: PathBuf,
        /// Output format
        #[arg(long, value_enum, default_value_t)]
        format: OutputFormat,
        /// Write the report to a file instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
        /// Rule file (defaults to the embedded rule set)
        #[arg(long)]
        rules: Option<PathBuf>,
        /// Config file (defaults to ./skillscan.toml when present)
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Scan a single file's content
    Check {
        /// File to check
        file: PathBuf,
        /// Output format
        #[arg(long, value_enum, default_value_t)]
        format: OutputFormat,
        /// Rule file (defaults to the embedded rule set)
        #[arg(long)]
        rules: Option<PathBuf>,
    },
    /// Run the scanner against a labeled fixture corpus
    Eval {
        /// Directory of fixture skills, each with an expected.toml
        fixtures: PathBuf,
        /// Rule file (defaults to the embedded rule set)
        #[arg(long)]
        rules: Option<PathBuf>,
        /// Config file (defaults to ./skillscan.toml when present)
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// List every rule across all detection layers
    ListRules {
        /// Rule file (defaults to the embedded rule set)
        #[arg(long)]
        rules: Option<PathBuf>,
    },
    /// Show the details of one rule
    Explain {
        /// Rule identifier, e.g. exec/eval-call
        rule_id: String,
        /// Rule file (defaults to the embedded rule set)
        #[arg(long)]
        rules: Option<PathBuf>,
    },
}

pub fn run(cli: Cli) -> i32 {
    match cli.command {
        Command::Scan {
            path,
            format,
            output,
            rules,
            config,
        } => cmd_scan(&path, format, output.as_deref(), rules.as_deref(), config.as_deref()),
        Command::Check {
            file,
            format,
            rules,
        } => cmd_check(&file, format, rules.as_deref()),
        Command::Eval {
            fixtures,
            rules,
            config,
        } => cmd_eval(&fixtures, rules.as_deref(), config.as_deref()),
        Command::ListRules { rules } => cmd_list_rules(rules.as_deref()),
        Command::Explain { rule_id, rules } => cmd_explain(&rule_id, rules.as_deref()),
    }
}

fn fail(message: impl std::fmt::Display) -> i32 {
    eprintln!("{} {message}", "error:".red().bold());
    2
}

fn load_rules(path: Option<&Path>) -> Result<RuleSet, i32> {
    match path {
        Some(p) => RuleSet::load(p).map_err(|e| fail(e)),
        None => Ok(RuleSet::builtin()),
    }
}

/// Builds the scanner, attaching an LLM adapter when one is configured.
fn build_scanner(rules: RuleSet, config: ScanConfig) -> Scanner {
    let provider = config.llm.provider.or_else(LlmProvider::from_env);
    let llm = match provider {
        Some(provider) if !config.llm.command.is_empty() => Some(CommandAnalyzer::new(
            provider.to_string(),
            config.llm.command.clone(),
            config.llm.timeout_secs,
        )),
        Some(provider) => {
            warn!(%provider, "llm provider named but no adjudication command configured, running static-only");
            None
        }
        None => None,
    };
    let scanner = Scanner::new(rules, config);
    match llm {
        Some(analyzer) => scanner.with_llm(Box::new(analyzer)),
        None => scanner,
    }
}

fn risk_exit(risk: RiskLevel) -> i32 {
    if risk == RiskLevel::Low {
        0
    } else {
        1
    }
}

fn cmd_scan(
    path: &Path,
    format: OutputFormat,
    output: Option<&Path>,
    rules: Option<&Path>,
    config: Option<&Path>,
) -> i32 {
    let rules = match load_rules(rules) {
        Ok(r) => r,
        Err(code) => return code,
    };
    let config = match ScanConfig::load(config) {
        Ok(c) => c,
        Err(e) => return fail(e),
    };
    let scanner = build_scanner(rules, config);
    let report = match scanner.scan_directory(path) {
        Ok(r) => r,
        Err(e) => return fail(e),
    };
    let rendered = match output::render(&report, format) {
        Ok(r) => r,
        Err(e) => return fail(e),
    };
    if let Some(out_path) = output {
        if let Err(e) = std::fs::write(out_path, rendered) {
            return fail(format!("failed to write {}: {e}", out_path.display()));
        }
        println!(
            "Report written to {} (score {}/100, {})",
            out_path.display(),
            report.score,
            report.risk
        );
    } else {
        println!("{rendered}");
    }
    risk_exit(report.risk)
}

fn cmd_check(file: &Path, format: OutputFormat, rules: Option<&Path>) -> i32 {
    let rules = match load_rules(rules) {
        Ok(r) => r,
        Err(code) => return code,
    };
    let content = match std::fs::read_to_string(file) {
        Ok(c) => c,
        Err(e) => return fail(format!("failed to read {}: {e}", file.display())),
    };
    let scanner = Scanner::new(rules, ScanConfig::default());
    let report = scanner.check_content(&content, file);
    match output::render(&report, format) {
        Ok(rendered) => println!("{rendered}"),
        Err(e) => return fail(e),
    }
    risk_exit(report.risk)
}

fn cmd_eval(fixtures: &Path, rules: Option<&Path>, config: Option<&Path>) -> i32 {
    let rules = match load_rules(rules) {
        Ok(r) => r,
        Err(code) => return code,
    };
    let config = match ScanConfig::load(config) {
        Ok(c) => c,
        Err(e) => return fail(e),
    };
    let scanner = Scanner::new(rules, config);
    let report = match eval::run(&scanner, fixtures) {
        Ok(r) => r,
        Err(e) => return fail(e),
    };

    for result in &report.results {
        let status = if result.passed() {
            "PASS".green().bold()
        } else {
            "FAIL".red().bold()
        };
        println!(
            "{status} {} (score {}/100, {})",
            result.name, result.score, result.risk
        );
        for reason in &result.failures {
            println!("     {} {reason}", "↳".dimmed());
        }
    }

    println!(
        "\n{} tp={} fp={} tn={} fn={}",
        "Confusion:".bold(),
        report.true_positives,
        report.false_positives,
        report.true_negatives,
        report.false_negatives
    );
    println!(
        "{} precision={:.3} recall={:.3} f1={:.3}",
        "Metrics:  ".bold(),
        report.precision(),
        report.recall(),
        report.f1()
    );

    if report.passed() {
        println!("\n{}", "Evaluation passed.".green().bold());
        0
    } else {
        println!("\n{}", "Evaluation failed.".red().bold());
        1
    }
}

fn cmd_list_rules(rules: Option<&Path>) -> i32 {
    let rules = match load_rules(rules) {
        Ok(r) => r,
        Err(code) => return code,
    };
    println!("{}", "Pattern rules".bold().underline());
    for rule in rules.rules() {
        println!(
            "  {:<28} {:<8} {:<18} {}",
            rule.id.bold(),
            rule.severity.to_string(),
            rule.category,
            rule.title
        );
    }
    println!("\n{}", "Built-in analyzer rules".bold().underline());
    for rule in crate::analyzers::built_in_rules() {
        println!(
            "  {:<28} {:<8} {:<18} {}",
            rule.id.bold(),
            rule.severity.to_string(),
            rule.layer,
            rule.title
        );
    }
    0
}

fn cmd_explain(rule_id: &str, rules: Option<&Path>) -> i32 {
    let rules = match load_rules(rules) {
        Ok(r) => r,
        Err(code) => return code,
    };
    if let Some(rule) = rules.get(rule_id) {
        println!("{} {}", "Rule:".bold(), rule.id);
        println!("{} {}", "Layer:".bold(), "pattern");
        println!("{} {}", "Severity:".bold(), rule.severity);
        println!("{} {}", "Category:".bold(), rule.category);
        println!("{} {}", "Weight:".bold(), rule.weight);
        println!("{} {}", "Pattern:".bold(), rule.regex.as_str());
        if rule.file_types.is_empty() {
            println!("{} all", "File types:".bold());
        } else {
            println!("{} {}", "File types:".bold(), rule.file_types.join(", "));
        }
        println!("\n{}", rule.title);
        return 0;
    }
    if let Some(rule) = crate::analyzers::built_in_rules()
        .into_iter()
        .find(|r| r.id == rule_id)
    {
        println!("{} {}", "Rule:".bold(), rule.id);
        println!("{} {}", "Layer:".bold(), rule.layer);
        println!("{} {}", "Severity:".bold(), rule.severity);
        println!("\n{}", rule.title);
        return 0;
    }
    fail(format!("unknown rule `{rule_id}`"))
}
