//! JSON formatter.

use serde::Serialize;

use crate::analyzer::kubecuro::aggregate::{Report, ReportSummary};
use crate::analyzer::kubecuro::types::Finding;

/// Format a report as JSON.
pub fn format(report: &Report) -> String {
    let output = JsonOutput::from(report);
    let mut text = serde_json::to_string_pretty(&output).unwrap_or_else(|_| "{}".to_string());
    text.push('\n');
    text
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JsonOutput<'r> {
    findings: Vec<JsonFinding<'r>>,
    summary: JsonSummary<'r>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JsonFinding<'r> {
    code: &'r str,
    severity: &'r str,
    message: &'r str,
    file: String,
    line: Option<u32>,
    document: Option<usize>,
    kind: Option<&'r str>,
    name: Option<&'r str>,
    namespace: Option<&'r str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    related: Vec<String>,
    suggestion: Option<&'r str>,
    remediation: &'r str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JsonSummary<'r> {
    #[serde(flatten)]
    counters: &'r ReportSummary,
    total_findings: usize,
    max_severity: Option<&'r str>,
}

impl<'r> From<&'r Report> for JsonOutput<'r> {
    fn from(report: &'r Report) -> Self {
        Self {
            findings: report.findings.iter().map(JsonFinding::from).collect(),
            summary: JsonSummary {
                counters: &report.summary,
                total_findings: report.findings.len(),
                max_severity: report.max_severity().map(|s| s.as_str()),
            },
        }
    }
}

impl<'r> From<&'r Finding> for JsonFinding<'r> {
    fn from(f: &'r Finding) -> Self {
        Self {
            code: f.code.as_str(),
            severity: f.severity.as_str(),
            message: &f.message,
            file: f.subject.file.display().to_string(),
            line: f.subject.line,
            document: f.subject.document,
            kind: f.subject.kind.as_deref(),
            name: f.subject.name.as_deref(),
            namespace: f.subject.namespace.as_deref(),
            related: f.related.iter().map(|r| r.identifier()).collect(),
            suggestion: f.suggestion.as_deref(),
            remediation: f.code.remediation(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::kubecuro::types::{FindingCode, SubjectRef};

    #[test]
    fn test_json_output() {
        let finding = Finding::new(
            FindingCode::PortMismatch,
            "Service 'web' port 80 targetPort: web names no container port",
            SubjectRef::document("svc.yaml", 0)
                .with_line(1)
                .with_object("Service", "web", "default"),
        )
        .with_related(SubjectRef::document("deploy.yaml", 0).with_object("Deployment", "web", "default"));
        let report = Report::new(vec![finding], ReportSummary::default());

        let value: serde_json::Value = serde_json::from_str(&format(&report)).unwrap();
        let first = &value["findings"][0];
        assert_eq!(first["code"], "PORT_MISMATCH");
        assert_eq!(first["severity"], "medium");
        assert_eq!(first["line"], 1);
        assert_eq!(first["related"][0], "Deployment/default/web");
        assert_eq!(value["summary"]["totalFindings"], 1);
        assert_eq!(value["summary"]["filesAnalyzed"], 0);
        assert_eq!(value["summary"]["maxSeverity"], "medium");
    }
}
