//! # skillscan
//!
//! Static security scanner for automation skill bundles: directories of
//! manifest, scripts, and documentation intended to be loaded and executed
//! by an autonomous agent runtime.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use skillscan::config::ScanConfig;
//! use skillscan::rules::RuleSet;
//! use skillscan::scanner::Scanner;
//! use std::path::Path;
//!
//! let scanner = Scanner::new(RuleSet::builtin(), ScanConfig::default());
//! let report = scanner.scan_directory(Path::new("./my-skill")).unwrap();
//! println!("score {}/100 ({})", report.score, report.risk);
//! ```
//!
//! ## Architecture
//!
//! A scan is a fixed pipeline over the skill directory:
//!
//! ```text
//! walk → {pattern, ast, prompt} per file → dedup → downweight
//!      → signatures → optional LLM verdict → score/tier → report
//! ```
//!
//! - [`rules`]: TOML rule loading and validation; an embedded default set.
//! - [`analyzers`]: the three per-file detection layers.
//! - [`signatures`]: cross-finding behavioral correlation.
//! - [`llm`]: the advisory adjudication boundary.
//! - [`scanner`]: orchestration, deduplication, scoring.
//! - [`eval`]: the labeled-fixture evaluation harness.
//! - [`output`]: pretty and JSON report rendering.

pub mod analyzers;
pub mod cli;
pub mod config;
pub mod eval;
pub mod finding;
pub mod llm;
pub mod metadata;
pub mod output;
pub mod rules;
pub mod scanner;
pub mod signatures;
