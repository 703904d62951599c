//! Report rendering.

pub mod json;
pub mod pretty;

use crate::finding::Report;

/// Output format selected on the command line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable colored terminal output.
    #[default]
    Pretty,
    /// Machine-readable JSON.
    Json,
}

/// Renders a report in the selected format.
pub fn render(report: &Report, format: OutputFormat) -> serde_json::Result<String> {
    match format {
        OutputFormat::Pretty => Ok(pretty::render(report)),
        OutputFormat::Json => json::render(report),
    }
}
