//! Diagnostic Aggregator
//!
//! Turns healer output into findings, merges them with resolver findings,
//! de-duplicates and puts everything in report order.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::Serialize;

use crate::analyzer::kubecuro::config::KubecuroConfig;
use crate::analyzer::kubecuro::extract::ManifestRecord;
use crate::analyzer::kubecuro::healer::{FixKind, HealOutput};
use crate::analyzer::kubecuro::types::{Finding, FindingCode, Severity, SubjectRef};

/// Result of an analysis run.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    /// Findings in report order.
    pub findings: Vec<Finding>,
    pub summary: ReportSummary,
}

/// Counters for a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSummary {
    pub files_analyzed: usize,
    pub documents_analyzed: usize,
    pub manifests_extracted: usize,
    pub fixes_applied: usize,
    /// Files whose healed text differs from the input.
    pub files_changed: usize,
}

impl Report {
    pub fn new(findings: Vec<Finding>, summary: ReportSummary) -> Self {
        Self { findings, summary }
    }

    pub fn max_severity(&self) -> Option<Severity> {
        self.findings.iter().map(|f| f.severity).max()
    }

    /// Count of findings per severity.
    pub fn counts(&self) -> BTreeMap<Severity, usize> {
        let mut counts = BTreeMap::new();
        for finding in &self.findings {
            *counts.entry(finding.severity).or_insert(0) += 1;
        }
        counts
    }

    /// Whether the run should exit non-zero under `threshold`.
    ///
    /// Fatal findings always fail the run unless `noFail` is set.
    pub fn should_fail(&self, config: &KubecuroConfig, threshold: Severity) -> bool {
        if config.no_fail {
            return false;
        }
        self.max_severity()
            .is_some_and(|max| max >= threshold || max == Severity::Fatal)
    }
}

/// Findings describing what the healer did to one file.
///
/// One fatal `SYNTAX_REPAIR` per unrecoverable document, one low
/// `SYNTAX_REPAIR` per fix kind per document, one `DEPRECATED_API` per
/// deprecated apiVersion. `records` supply object identities for documents
/// that were extracted.
pub fn findings_from_heal(file: &Path, output: &HealOutput, records: &[ManifestRecord]) -> Vec<Finding> {
    let mut findings = Vec::new();

    for document in &output.documents {
        let subject = records
            .iter()
            .find(|r| r.origin.file == file && r.origin.document == document.index)
            .map(ManifestRecord::subject)
            .unwrap_or_else(|| SubjectRef::document(file, document.index));

        if let Some(error) = document.error() {
            findings.push(
                Finding::new(
                    FindingCode::SyntaxRepair,
                    format!(
                        "document {} cannot be structurally reconstructed at {}; left unchanged",
                        document.index + 1,
                        error
                    ),
                    subject.clone().with_line(error.line as u32),
                )
                .with_severity(Severity::Fatal),
            );
            continue;
        }

        let mut by_kind: BTreeMap<FixKind, Vec<String>> = BTreeMap::new();
        for fix in &document.fixes {
            if fix.kind == FixKind::ApiVersionSubstitution {
                continue;
            }
            by_kind
                .entry(fix.kind)
                .or_default()
                .push(format!("line {}", fix.original));
        }
        for (kind, locations) in by_kind {
            let first_line = document
                .fixes
                .iter()
                .find(|fix| fix.kind == kind)
                .map(|fix| fix.original.start)
                .unwrap_or(document.lines.start);
            findings.push(
                Finding::new(
                    FindingCode::SyntaxRepair,
                    format!("{} at {}", kind, locations.join(", ")),
                    subject.clone().with_line(first_line as u32),
                )
                .with_suggestion("run `kubecuro fix` to apply"),
            );
        }

        if let Some(notice) = &document.deprecation {
            let mut message = format!(
                "apiVersion {} for {} is deprecated and removed in Kubernetes {}",
                notice.api_version, notice.kind, notice.removed_in
            );
            match (&notice.replacement, notice.substituted) {
                (Some(replacement), true) => {
                    message.push_str(&format!("; healed text uses {}", replacement))
                }
                (Some(replacement), false) => message.push_str(&format!("; use {}", replacement)),
                (None, _) => message.push_str("; no drop-in replacement exists"),
            }
            if let Some(notes) = &notice.notes {
                message.push_str(&format!(" ({})", notes));
            }
            let mut finding = Finding::new(
                FindingCode::DeprecatedApi,
                message,
                subject.clone().with_line(notice.line as u32),
            );
            if let Some(replacement) = &notice.replacement {
                finding = finding.with_suggestion(format!("apiVersion: {}", replacement));
            }
            findings.push(finding);
        }
    }

    findings
}

/// Merge per-file and cross-file findings into report order.
///
/// Duplicates share code, subject and message; the first one wins.
pub fn aggregate(file_findings: Vec<Finding>, resolver_findings: Vec<Finding>) -> Vec<Finding> {
    let mut seen = HashSet::new();
    let mut findings: Vec<Finding> = file_findings
        .into_iter()
        .chain(resolver_findings)
        .filter(|f| seen.insert((f.code, f.subject.clone(), f.message.clone())))
        .collect();
    findings.sort_by(Finding::report_order);
    findings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::kubecuro::deprecation::StaticDeprecationTable;
    use crate::analyzer::kubecuro::healer::{Healer, HealerOptions};

    fn heal(text: &str) -> HealOutput {
        let table = StaticDeprecationTable::builtin();
        Healer::new(HealerOptions::default(), &table).heal(text)
    }

    fn finding(code: FindingCode, file: &str, line: Option<u32>) -> Finding {
        let mut subject = SubjectRef::document(file, 0);
        subject.line = line;
        Finding::new(code, format!("{} in {}", code, file), subject)
    }

    #[test]
    fn test_report_order() {
        let findings = aggregate(
            vec![
                finding(FindingCode::SyntaxRepair, "b.yaml", Some(3)),
                finding(FindingCode::PortMismatch, "a.yaml", None),
                finding(FindingCode::PortMismatch, "a.yaml", Some(9)),
            ],
            vec![finding(FindingCode::GhostService, "c.yaml", Some(1))],
        );
        let order: Vec<(FindingCode, Option<u32>)> =
            findings.iter().map(|f| (f.code, f.line())).collect();
        assert_eq!(
            order,
            vec![
                (FindingCode::GhostService, Some(1)),
                (FindingCode::PortMismatch, Some(9)),
                (FindingCode::PortMismatch, None),
                (FindingCode::SyntaxRepair, Some(3)),
            ]
        );
    }

    #[test]
    fn test_duplicates_removed() {
        let f = finding(FindingCode::GhostService, "a.yaml", Some(1));
        let findings = aggregate(vec![f.clone()], vec![f.clone(), f]);
        assert_eq!(findings.len(), 1);
    }

    #[test]
    fn test_fatal_syntax_finding() {
        let output = heal("a: 1\nloose words here\n");
        let findings = findings_from_heal(Path::new("bad.yaml"), &output, &[]);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].code, FindingCode::SyntaxRepair);
        assert_eq!(findings[0].severity, Severity::Fatal);
    }

    #[test]
    fn test_repairs_grouped_by_kind() {
        let output = heal("metadata:\n    name: web   \n    labels:\n        app: web\n");
        let findings = findings_from_heal(Path::new("a.yaml"), &output, &[]);
        assert!(!findings.is_empty());
        assert!(findings.iter().all(|f| f.code == FindingCode::SyntaxRepair));
        assert!(findings.iter().all(|f| f.severity == Severity::Low));
        assert!(findings.iter().any(|f| f.message.starts_with("trailing-whitespace-removal")));
    }

    #[test]
    fn test_deprecated_api_finding() {
        let output = heal("apiVersion: extensions/v1beta1\nkind: Ingress\nmetadata:\n  name: web\n");
        let findings = findings_from_heal(Path::new("i.yaml"), &output, &[]);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].code, FindingCode::DeprecatedApi);
        assert!(findings[0].message.contains("networking.k8s.io/v1"));
        assert_eq!(findings[0].line(), Some(1));
    }

    #[test]
    fn test_fatal_always_fails() {
        let config = KubecuroConfig::default();
        let report = Report::new(
            vec![finding(FindingCode::IoError, "a.yaml", None)],
            ReportSummary::default(),
        );
        assert!(report.should_fail(&config, Severity::Fatal));
        assert!(report.should_fail(&config, Severity::Low));

        let low = Report::new(
            vec![finding(FindingCode::SyntaxRepair, "a.yaml", None)],
            ReportSummary::default(),
        );
        assert!(!low.should_fail(&config, Severity::High));
    }
}
