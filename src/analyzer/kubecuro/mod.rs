//! KubeCuro: offline Kubernetes manifest healer and relationship checker
//!
//! Two engines do the work:
//!
//! - the **healer** rebuilds malformed or inconsistently formatted YAML into
//!   canonical, comment-preserving text, deterministically and idempotently;
//! - the **resolver** (Synapse) indexes every manifest of a directory and
//!   checks selectors, ports, name references and namespace boundaries
//!   across files.
//!
//! # Example
//!
//! ```rust,no_run
//! use kubecuro::analyzer::kubecuro::{Analyzer, KubecuroConfig, StaticDeprecationTable};
//! use std::path::Path;
//!
//! # fn main() -> kubecuro::Result<()> {
//! let config = KubecuroConfig::default();
//! let table = StaticDeprecationTable::builtin();
//! let analysis = Analyzer::new(&config, &table).analyze(Path::new("./k8s"))?;
//!
//! for finding in &analysis.report.findings {
//!     println!("{}: {} - {}", finding.subject.file.display(), finding.code, finding.message);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Findings
//!
//! ## Structure
//! - Structural repairs and unrecoverable documents (`SYNTAX_REPAIR`)
//! - Deprecated API versions (`DEPRECATED_API`)
//!
//! ## Wiring
//! - Services matching no workload (`GHOST_SERVICE`)
//! - Service ports missing from the workload (`PORT_MISMATCH`)
//! - Cross-namespace references (`NAMESPACE_VIOLATION`)
//! - Missing HPA targets and Ingress backends (`DANGLING_REFERENCE`)
//! - Workload selectors that miss their own template (`SELECTOR_MISMATCH`)
//!
//! ## Security
//! - Privileged containers, RBAC wildcards

pub mod aggregate;
pub mod analyze;
pub mod config;
pub mod deprecation;
pub mod extract;
pub mod formatter;
pub mod healer;
pub mod pragma;
pub mod shield;
pub mod synapse;
pub mod tokenizer;
pub mod types;

// Re-export main types and functions
pub use aggregate::{Report, ReportSummary};
pub use analyze::{Analysis, Analyzer, CancellationFlag, FileOutcome, write_back};
pub use config::{KubecuroConfig, PartialSelectorPolicy};
pub use deprecation::{DeprecationTable, StaticDeprecationTable};
pub use formatter::{OutputFormat, format_report, format_report_to_string};
pub use healer::{HealOutput, Healer, HealerOptions};
pub use types::{Finding, FindingCode, Severity, SubjectRef};
