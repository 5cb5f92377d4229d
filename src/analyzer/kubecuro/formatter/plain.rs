//! Plain text formatter.

use colored::Colorize;

use crate::analyzer::kubecuro::aggregate::Report;
use crate::analyzer::kubecuro::types::{Finding, Severity};

/// Format a report as plain text.
pub fn format(report: &Report) -> String {
    let mut output = String::new();

    for finding in &report.findings {
        output.push_str(&format_finding(finding));
    }

    if report.findings.is_empty() {
        output.push_str(&format!(
            "No issues found in {} file(s).\n",
            report.summary.files_analyzed
        ));
    } else {
        let counts: Vec<String> = report
            .counts()
            .iter()
            .rev()
            .map(|(severity, count)| format!("{} {}", count, severity))
            .collect();
        output.push_str(&format!(
            "\nFound {} issue(s) ({}) in {} file(s).\n",
            report.findings.len(),
            counts.join(", "),
            report.summary.files_analyzed
        ));
    }

    output
}

fn format_finding(finding: &Finding) -> String {
    let location = match finding.line() {
        Some(line) => format!("{}:{}", finding.subject.file.display(), line),
        None => finding.subject.file.display().to_string(),
    };
    let object = match (&finding.subject.kind, &finding.subject.name) {
        (Some(kind), Some(name)) => format!(" ({}/{})", kind, name),
        _ => String::new(),
    };

    let mut out = format!(
        "{}: [{}] {}{} - {}\n",
        location,
        colorize(finding.severity),
        finding.code.as_str().bold(),
        object,
        finding.message,
    );
    for related in &finding.related {
        out.push_str(&format!("  Related: {}\n", related.identifier()));
    }
    match &finding.suggestion {
        Some(suggestion) => out.push_str(&format!("  Suggestion: {}\n", suggestion)),
        None => out.push_str(&format!("  Remediation: {}\n", finding.code.remediation())),
    }
    out
}

fn colorize(severity: Severity) -> colored::ColoredString {
    match severity {
        Severity::Fatal => severity.as_str().red().bold(),
        Severity::High => severity.as_str().red(),
        Severity::Medium => severity.as_str().yellow(),
        Severity::Low => severity.as_str().cyan(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::kubecuro::aggregate::ReportSummary;
    use crate::analyzer::kubecuro::types::{FindingCode, SubjectRef};

    #[test]
    fn test_plain_output() {
        colored::control::set_override(false);
        let finding = Finding::new(
            FindingCode::GhostService,
            "Service 'web' selector {app=web} matches no workload in namespace 'default'",
            SubjectRef::document("svc.yaml", 0)
                .with_line(1)
                .with_object("Service", "web", "default"),
        );
        let report = Report::new(
            vec![finding],
            ReportSummary {
                files_analyzed: 1,
                ..Default::default()
            },
        );
        let output = format(&report);
        assert!(output.starts_with("svc.yaml:1: [high] GHOST_SERVICE (Service/web) - Service 'web'"));
        assert!(output.contains("  Remediation: Align the Service selector"));
        assert!(output.contains("Found 1 issue(s) (1 high) in 1 file(s)."));
    }

    #[test]
    fn test_empty_report() {
        let report = Report::new(Vec::new(), ReportSummary::default());
        assert_eq!(format(&report), "No issues found in 0 file(s).\n");
    }
}
