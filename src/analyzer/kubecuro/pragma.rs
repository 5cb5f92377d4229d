//! Annotation-based finding suppression.
//!
//! Two forms are understood on a manifest's `metadata.annotations`:
//! - `kubecuro.io/ignore: "GHOST_SERVICE,PORT_MISMATCH"` (or `all`)
//! - `ignore-check.kubecuro.io/<code>: "<reason>"`
//!
//! Suppression applies to findings whose subject is the annotated manifest.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use crate::analyzer::kubecuro::extract::ManifestRecord;
use crate::analyzer::kubecuro::types::{Finding, FindingCode};

/// Annotation holding a comma-separated list of codes.
pub const IGNORE_ANNOTATION: &str = "kubecuro.io/ignore";

/// Prefix for one-code-per-annotation ignores.
const IGNORE_ANNOTATION_PREFIX: &str = "ignore-check.kubecuro.io/";

/// What a single manifest asks to suppress.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Ignored {
    #[default]
    Nothing,
    All,
    Codes(BTreeSet<FindingCode>),
}

impl Ignored {
    pub fn covers(&self, code: FindingCode) -> bool {
        match self {
            Self::Nothing => false,
            Self::All => true,
            Self::Codes(codes) => codes.contains(&code),
        }
    }
}

/// Extract the ignored codes from a manifest's annotations.
///
/// Unknown code names are skipped with a warning.
pub fn get_ignored_codes(annotations: &BTreeMap<String, String>) -> Ignored {
    let mut codes = BTreeSet::new();

    for (key, value) in annotations {
        let names: Vec<&str> = if key == IGNORE_ANNOTATION {
            value.split(',').map(str::trim).filter(|s| !s.is_empty()).collect()
        } else if let Some(code) = key.strip_prefix(IGNORE_ANNOTATION_PREFIX) {
            vec![code]
        } else {
            continue;
        };

        for name in names {
            if name.eq_ignore_ascii_case("all") {
                return Ignored::All;
            }
            match FindingCode::parse(name) {
                Some(code) => {
                    codes.insert(code);
                }
                None => log::warn!("Ignoring unknown finding code '{}' in annotation {}", name, key),
            }
        }
    }

    if codes.is_empty() {
        Ignored::Nothing
    } else {
        Ignored::Codes(codes)
    }
}

/// Drop findings suppressed by annotations on their subject manifest.
pub fn apply(records: &[ManifestRecord], findings: Vec<Finding>) -> Vec<Finding> {
    let pragmas: BTreeMap<(PathBuf, usize), Ignored> = records
        .iter()
        .filter_map(|record| {
            let ignored = get_ignored_codes(&record.annotations);
            (ignored != Ignored::Nothing)
                .then(|| ((record.origin.file.clone(), record.origin.document), ignored))
        })
        .collect();
    if pragmas.is_empty() {
        return findings;
    }

    let before = findings.len();
    let kept: Vec<Finding> = findings
        .into_iter()
        .filter(|finding| {
            let Some(document) = finding.subject.document else {
                return true;
            };
            pragmas
                .get(&(finding.subject.file.clone(), document))
                .is_none_or(|ignored| !ignored.covers(finding.code))
        })
        .collect();
    log::debug!("Pragmas suppressed {} findings", before - kept.len());
    kept
}
