use crate::{
    analyzer::kubecuro::{
        Analysis, Analyzer, KubecuroConfig, OutputFormat, Severity, analyze, format_report_to_string,
        formatter::diff,
    },
    cli::{self, SeverityThreshold},
};
use std::path::Path;

/// Exit code when findings reach the failure threshold.
pub const EXIT_FINDINGS: i32 = 1;

/// Report findings, optionally with the diffs `fix` would apply.
pub fn handle_scan(
    path: &Path,
    config: &KubecuroConfig,
    format: cli::OutputFormat,
    fail_on: Option<SeverityThreshold>,
    show_diff: bool,
) -> crate::Result<i32> {
    let analysis = run_analysis(path, config)?;
    let format = OutputFormat::from(format);

    if show_diff && format == OutputFormat::Plain {
        print!("{}", diff::render(analysis.changed_files()));
    }
    print!("{}", format_report_to_string(&analysis.report, format));

    Ok(exit_code(&analysis, config, fail_on))
}

/// Heal files in place, or print diffs on a dry run.
pub fn handle_fix(
    path: &Path,
    config: &KubecuroConfig,
    dry_run: bool,
    format: cli::OutputFormat,
    fail_on: Option<SeverityThreshold>,
) -> crate::Result<i32> {
    let mut analysis = run_analysis(path, config)?;
    let format = OutputFormat::from(format);

    let status = if dry_run {
        if format == OutputFormat::Plain {
            print!("{}", diff::render(analysis.changed_files()));
        }
        format!(
            "Dry run: {} file(s) would be healed.",
            analysis.changed_files().count()
        )
    } else {
        let written = analyze::write_back(&mut analysis, config);
        format!("Healed {} file(s).", written)
    };

    print!("{}", format_report_to_string(&analysis.report, format));
    if format == OutputFormat::Plain {
        println!("{}", status);
    } else {
        log::info!("{}", status);
    }

    Ok(exit_code(&analysis, config, fail_on))
}

fn run_analysis(path: &Path, config: &KubecuroConfig) -> crate::Result<Analysis> {
    let table = analyze::load_table(config)?;
    Analyzer::new(config, &table).analyze(path)
}

fn exit_code(analysis: &Analysis, config: &KubecuroConfig, fail_on: Option<SeverityThreshold>) -> i32 {
    let threshold = fail_on
        .map(Severity::from)
        .unwrap_or(config.failure_threshold);
    if analysis.report.should_fail(config, threshold) {
        EXIT_FINDINGS
    } else {
        0
    }
}
