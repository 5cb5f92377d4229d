//! Output formatters for analysis reports.

pub mod diff;
pub mod github;
pub mod json;
pub mod plain;

use crate::analyzer::kubecuro::aggregate::Report;

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Plain text output.
    #[default]
    Plain,
    /// JSON output.
    Json,
    /// GitHub Actions annotations.
    GitHub,
}

impl OutputFormat {
    /// Parse from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "plain" | "text" => Some(Self::Plain),
            "json" => Some(Self::Json),
            "github" | "github-actions" => Some(Self::GitHub),
            _ => None,
        }
    }
}

/// Format a report to a string.
pub fn format_report_to_string(report: &Report, format: OutputFormat) -> String {
    match format {
        OutputFormat::Plain => plain::format(report),
        OutputFormat::Json => json::format(report),
        OutputFormat::GitHub => github::format(report),
    }
}

/// Format and print a report.
pub fn format_report(report: &Report, format: OutputFormat) {
    print!("{}", format_report_to_string(report, format));
}
