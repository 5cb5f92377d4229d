use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::analyzer::kubecuro::{self, Severity};

#[derive(Parser)]
#[command(name = "kubecuro")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Heal Kubernetes manifests and check how they fit together")]
#[command(long_about = "An offline analyzer for directories of Kubernetes manifests. It repairs malformed or inconsistently formatted YAML without losing comments, and cross-checks Services, workloads, ports, autoscalers, ingresses and namespaces across files.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Disable logging; the report is still printed
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Analyze manifests and report findings without writing anything
    Scan {
        /// File or directory containing manifests
        #[arg(value_name = "PATH", default_value = ".")]
        path: PathBuf,

        /// Output format
        #[arg(long, value_enum, default_value = "plain")]
        format: OutputFormat,

        /// Fail when a finding at or above this severity is reported
        #[arg(long, value_enum, value_name = "SEVERITY")]
        fail_on: Option<SeverityThreshold>,

        /// Show the changes `fix` would make as unified diffs
        #[arg(long)]
        diff: bool,
    },

    /// Heal manifests and write them back in place
    Fix {
        /// File or directory containing manifests
        #[arg(value_name = "PATH", default_value = ".")]
        path: PathBuf,

        /// Print unified diffs instead of writing files
        #[arg(long)]
        dry_run: bool,

        /// Output format
        #[arg(long, value_enum, default_value = "plain")]
        format: OutputFormat,

        /// Fail when a finding at or above this severity is reported
        #[arg(long, value_enum, value_name = "SEVERITY")]
        fail_on: Option<SeverityThreshold>,
    },

    /// Explain a finding code
    Explain {
        /// Finding code, e.g. GHOST_SERVICE or ghost-service
        #[arg(value_name = "CODE")]
        code: String,
    },

    /// List every finding code with its default severity
    Checklist,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Plain,
    Json,
    Github,
}

impl From<OutputFormat> for kubecuro::OutputFormat {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Plain => Self::Plain,
            OutputFormat::Json => Self::Json,
            OutputFormat::Github => Self::GitHub,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SeverityThreshold {
    Low,
    Medium,
    High,
    Fatal,
}

impl From<SeverityThreshold> for Severity {
    fn from(threshold: SeverityThreshold) -> Self {
        match threshold {
            SeverityThreshold::Low => Self::Low,
            SeverityThreshold::Medium => Self::Medium,
            SeverityThreshold::High => Self::High,
            SeverityThreshold::Fatal => Self::Fatal,
        }
    }
}

impl Cli {
    /// Initialize logging based on verbosity level
    pub fn init_logging(&self) {
        if self.quiet {
            return;
        }

        let level = match self.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            2 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        };

        env_logger::Builder::from_default_env()
            .filter_level(level)
            .init();
    }
}
