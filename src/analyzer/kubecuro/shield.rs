//! Per-manifest security checks.
//!
//! Unlike the resolver these look at one record at a time, so they run in
//! the parallel per-file stage.

use crate::analyzer::kubecuro::extract::ManifestRecord;
use crate::analyzer::kubecuro::types::{Finding, FindingCode};

/// A check over a single extracted manifest.
pub trait ShieldCheck: Send + Sync {
    fn code(&self) -> FindingCode;

    fn check(&self, record: &ManifestRecord) -> Vec<Finding>;
}

/// Flags containers (init containers included) running privileged.
pub struct PrivilegedContainerCheck;

impl ShieldCheck for PrivilegedContainerCheck {
    fn code(&self) -> FindingCode {
        FindingCode::PrivilegedContainer
    }

    fn check(&self, record: &ManifestRecord) -> Vec<Finding> {
        record
            .containers
            .iter()
            .filter(|c| c.privileged)
            .map(|c| {
                let role = if c.init { "Init container" } else { "Container" };
                Finding::new(
                    self.code(),
                    format!(
                        "{} '{}' of {} '{}' runs in privileged mode",
                        role, c.name, record.kind, record.name
                    ),
                    record.subject(),
                )
                .with_suggestion("set securityContext.privileged: false")
            })
            .collect()
    }
}

/// Flags `*` in the verbs or resources of Role and ClusterRole rules.
pub struct RbacWildcardCheck;

impl ShieldCheck for RbacWildcardCheck {
    fn code(&self) -> FindingCode {
        FindingCode::RbacWildcard
    }

    fn check(&self, record: &ManifestRecord) -> Vec<Finding> {
        let mut findings = Vec::new();
        for (idx, rule) in record.policy_rules.iter().enumerate() {
            let mut fields = Vec::new();
            if rule.verbs.iter().any(|v| v == "*") {
                fields.push("verbs");
            }
            if rule.resources.iter().any(|r| r == "*") {
                fields.push("resources");
            }
            if fields.is_empty() {
                continue;
            }
            findings.push(Finding::new(
                self.code(),
                format!(
                    "{} '{}' rule {} grants '*' {}",
                    record.kind,
                    record.name,
                    idx + 1,
                    fields.join(" and ")
                ),
                record.subject(),
            ));
        }
        findings
    }
}

/// All built-in checks, in catalog order.
pub fn builtin_checks() -> Vec<Box<dyn ShieldCheck>> {
    vec![Box::new(PrivilegedContainerCheck), Box::new(RbacWildcardCheck)]
}

/// Run every check against one record.
pub fn scan(checks: &[Box<dyn ShieldCheck>], record: &ManifestRecord) -> Vec<Finding> {
    checks.iter().flat_map(|check| check.check(record)).collect()
}
