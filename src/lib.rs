//! # KubeCuro
//!
//! An offline analyzer for directories of Kubernetes manifests.
//!
//! ## Features
//!
//! - **Healing**: repairs malformed or inconsistently indented YAML, keeping comments
//! - **Deprecated APIs**: rewrites removed apiVersions from a swappable deprecation table
//! - **Relationship checks**: Service selectors, named and numeric ports, HPA targets,
//!   Ingress backends and namespace boundaries, across files
//! - **Deterministic reports**: plain, JSON and GitHub Actions output
//!
//! ## Example
//!
//! ```rust,no_run
//! use kubecuro::analyzer::kubecuro::{Analyzer, KubecuroConfig, StaticDeprecationTable};
//! use std::path::Path;
//!
//! # fn main() -> kubecuro::Result<()> {
//! let config = KubecuroConfig::default();
//! let table = StaticDeprecationTable::builtin();
//! let analysis = Analyzer::new(&config, &table).analyze(Path::new("./manifests"))?;
//! println!("{} findings", analysis.report.findings.len());
//! # Ok(())
//! # }
//! ```

pub mod analyzer;
pub mod cli;
pub mod error;
pub mod handlers;

// Re-export commonly used types and functions
pub use error::{KubecuroError, Result};
use analyzer::kubecuro::KubecuroConfig;
use cli::{Cli, Commands};

/// The current version of the CLI tool
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Run a parsed command line, returning the process exit code.
pub fn run_command(cli: Cli) -> Result<i32> {
    match cli.command {
        Commands::Scan {
            path,
            format,
            fail_on,
            diff,
        } => {
            let config = KubecuroConfig::resolve(cli.config.as_deref())?;
            handlers::handle_scan(&path, &config, format, fail_on, diff)
        }
        Commands::Fix {
            path,
            dry_run,
            format,
            fail_on,
        } => {
            let config = KubecuroConfig::resolve(cli.config.as_deref())?;
            handlers::handle_fix(&path, &config, dry_run, format, fail_on)
        }
        Commands::Explain { code } => handlers::handle_explain(&code).map(|_| 0),
        Commands::Checklist => handlers::handle_checklist().map(|_| 0),
    }
}
