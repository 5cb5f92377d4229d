//! GitHub Actions workflow-command annotations.

use crate::analyzer::kubecuro::aggregate::Report;
use crate::analyzer::kubecuro::types::Severity;

/// Format a report as `::error`/`::warning`/`::notice` lines.
pub fn format(report: &Report) -> String {
    let mut output = String::new();

    for finding in &report.findings {
        let level = match finding.severity {
            Severity::Fatal | Severity::High => "error",
            Severity::Medium => "warning",
            Severity::Low => "notice",
        };
        let file = finding.subject.file.display();
        let line = finding.line().unwrap_or(1);

        output.push_str(&format!(
            "::{} file={},line={},title={}::{}\n",
            level,
            file,
            line,
            finding.code,
            escape(&finding.message),
        ));
    }

    output
}

/// Workflow commands end at a newline; `%`, CR and LF must be encoded.
fn escape(message: &str) -> String {
    message
        .replace('%', "%25")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}
