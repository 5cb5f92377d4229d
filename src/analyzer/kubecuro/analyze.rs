//! Pipeline orchestration.
//!
//! Files are read, healed, extracted and shield-checked in parallel. The
//! resolver then runs once over every extracted record, after which
//! findings are filtered, suppressed by pragmas and aggregated. Write-back
//! is a separate step that only runs on a completed analysis.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rayon::prelude::*;

use crate::analyzer::kubecuro::aggregate::{self, Report, ReportSummary};
use crate::analyzer::kubecuro::config::{DEFAULT_CONFIG_FILES, KubecuroConfig};
use crate::analyzer::kubecuro::deprecation::{DeprecationTable, StaticDeprecationTable};
use crate::analyzer::kubecuro::extract::{self, ManifestRecord};
use crate::analyzer::kubecuro::healer::{HealOutput, Healer, HealerOptions};
use crate::analyzer::kubecuro::types::{Finding, FindingCode, SubjectRef};
use crate::analyzer::kubecuro::{pragma, shield, synapse};
use crate::error::{KubecuroError, Result};

/// Shared flag an embedding caller can set to stop a run between files.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Input and healed text of one file.
#[derive(Debug, Clone)]
pub struct FileOutcome {
    pub path: PathBuf,
    pub original: String,
    pub healed: String,
}

impl FileOutcome {
    pub fn changed(&self) -> bool {
        self.original != self.healed
    }
}

/// A completed analysis run.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub report: Report,
    /// Every file that was read as text, in path order.
    pub files: Vec<FileOutcome>,
}

impl Analysis {
    pub fn changed_files(&self) -> impl Iterator<Item = &FileOutcome> {
        self.files.iter().filter(|f| f.changed())
    }
}

/// Per-file pipeline result, before cross-file resolution.
struct FileResult {
    outcome: Option<FileOutcome>,
    documents: usize,
    fixes: usize,
    records: Vec<ManifestRecord>,
    findings: Vec<Finding>,
}

/// Load the deprecation table named in the config, or the built-in one.
pub fn load_table(config: &KubecuroConfig) -> Result<StaticDeprecationTable> {
    match &config.deprecation_table {
        Some(path) => Ok(StaticDeprecationTable::load(path)?),
        None => Ok(StaticDeprecationTable::builtin()),
    }
}

/// Manifest files found under a root, plus the entries the walk could not read.
#[derive(Debug, Default)]
pub struct FileSet {
    pub files: Vec<PathBuf>,
    /// Unreadable directories and broken links, with the walk error.
    pub unreadable: Vec<(PathBuf, String)>,
}

/// Manifest files under `root` in sorted order.
///
/// A file given directly is taken regardless of its extension.
pub fn collect_files(root: &Path, config: &KubecuroConfig) -> Result<FileSet> {
    if !root.exists() {
        return Err(KubecuroError::PathNotFound(root.to_path_buf()));
    }
    if root.is_file() {
        return Ok(FileSet {
            files: vec![root.to_path_buf()],
            unreadable: Vec::new(),
        });
    }

    let mut set = FileSet::default();
    let walker = walkdir::WalkDir::new(root)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            e.depth() == 0 || !e.file_type().is_dir() || !e.file_name().to_string_lossy().starts_with('.')
        });
    for entry in walker {
        match entry {
            Ok(entry) => {
                if entry.file_type().is_file()
                    && has_manifest_extension(entry.path())
                    && is_wanted(entry.path(), config)
                {
                    set.files.push(entry.into_path());
                }
            }
            Err(err) => {
                let path = err
                    .path()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| root.to_path_buf());
                // Only entries that could have been manifests or held them.
                if path.extension().is_some() && !has_manifest_extension(&path) {
                    continue;
                }
                if !is_wanted(&path, config) {
                    continue;
                }
                log::warn!("Cannot read {}: {}", path.display(), err);
                set.unreadable.push((path, err.to_string()));
            }
        }
    }
    set.files.sort();
    Ok(set)
}

fn has_manifest_extension(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    )
}

fn is_wanted(path: &Path, config: &KubecuroConfig) -> bool {
    if is_config_file(path, config) {
        return false;
    }
    let ignored = config.should_ignore_path(path);
    if ignored {
        log::debug!("Ignoring {}", path.display());
    }
    !ignored
}

fn is_config_file(path: &Path, config: &KubecuroConfig) -> bool {
    let is_default = path
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|name| DEFAULT_CONFIG_FILES.contains(&name));
    is_default || config.deprecation_table.as_deref() == Some(path)
}

/// Runs the pipeline over files or in-memory sources.
pub struct Analyzer<'a> {
    config: &'a KubecuroConfig,
    healer: Healer<'a>,
    checks: Vec<Box<dyn shield::ShieldCheck>>,
    cancel: CancellationFlag,
}

impl<'a> Analyzer<'a> {
    pub fn new(config: &'a KubecuroConfig, table: &'a dyn DeprecationTable) -> Self {
        log::debug!("Using deprecation table {}", table.version());
        Self {
            config,
            healer: Healer::new(HealerOptions::from(config), table),
            checks: shield::builtin_checks(),
            cancel: CancellationFlag::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Analyze a file or directory.
    pub fn analyze(&self, root: &Path) -> Result<Analysis> {
        let set = collect_files(root, self.config)?;
        log::info!("Analyzing {} manifest files under {}", set.files.len(), root.display());

        let results = set
            .files
            .par_iter()
            .map(|path| {
                if self.cancel.is_cancelled() {
                    return None;
                }
                Some(self.process_file(path))
            })
            .collect::<Vec<_>>();

        let walk_findings = set
            .unreadable
            .into_iter()
            .map(|(path, reason)| io_error(&path, format!("cannot read: {}", reason)))
            .collect();
        self.finish(results, walk_findings)
    }

    /// Analyze in-memory `(path, text)` sources as if they were files.
    pub fn analyze_sources(&self, sources: &[(PathBuf, String)]) -> Result<Analysis> {
        let results = sources
            .par_iter()
            .map(|(path, text)| {
                if self.cancel.is_cancelled() {
                    return None;
                }
                Some(self.process_source(path, text))
            })
            .collect::<Vec<_>>();

        self.finish(results, Vec::new())
    }

    fn process_file(&self, path: &Path) -> FileResult {
        let text = fs::read(path)
            .map_err(|e| e.to_string())
            .and_then(|bytes| String::from_utf8(bytes).map_err(|_| "not valid UTF-8".to_string()));
        match text {
            Ok(text) => self.process_source(path, &text),
            Err(reason) => {
                log::warn!("Cannot read {}: {}", path.display(), reason);
                FileResult {
                    outcome: None,
                    documents: 0,
                    fixes: 0,
                    records: Vec::new(),
                    findings: vec![io_error(path, format!("cannot read file: {}", reason))],
                }
            }
        }
    }

    fn process_source(&self, path: &Path, text: &str) -> FileResult {
        let output: HealOutput = self.healer.heal(text);
        log::debug!(
            "Healed {}: {} documents, {} fixes",
            path.display(),
            output.documents.len(),
            output.fix_count()
        );

        let mut records = Vec::new();
        for document in &output.documents {
            let Some(tree) = document.tree() else {
                continue;
            };
            match extract::extract(tree, path, document.index) {
                Ok(record) => records.push(record),
                Err(skip) => log::debug!(
                    "Skipping document {} of {}: {}",
                    document.index + 1,
                    path.display(),
                    skip.reason()
                ),
            }
        }

        let mut findings = aggregate::findings_from_heal(path, &output, &records);
        for record in &records {
            findings.extend(shield::scan(&self.checks, record));
        }

        FileResult {
            documents: output.documents.len(),
            fixes: output.fix_count(),
            outcome: Some(FileOutcome {
                path: path.to_path_buf(),
                original: text.to_string(),
                healed: output.text,
            }),
            records,
            findings,
        }
    }

    fn finish(&self, results: Vec<Option<FileResult>>, walk_findings: Vec<Finding>) -> Result<Analysis> {
        if self.cancel.is_cancelled() {
            log::warn!("Analysis cancelled before all files were processed");
            return Err(KubecuroError::Cancelled);
        }

        let mut summary = ReportSummary::default();
        let mut files = Vec::new();
        let mut records = Vec::new();
        let mut file_findings = walk_findings;
        for result in results.into_iter().flatten() {
            summary.files_analyzed += 1;
            summary.documents_analyzed += result.documents;
            summary.fixes_applied += result.fixes;
            if let Some(outcome) = result.outcome {
                if outcome.changed() {
                    summary.files_changed += 1;
                }
                files.push(outcome);
            }
            records.extend(result.records);
            file_findings.extend(result.findings);
        }
        summary.manifests_extracted = records.len();

        let resolver_findings = synapse::resolve(&records, self.config.partial_selector_policy);
        let file_findings = pragma::apply(&records, self.configure(file_findings));
        let resolver_findings = pragma::apply(&records, self.configure(resolver_findings));

        let findings = aggregate::aggregate(file_findings, resolver_findings);
        log::info!(
            "{} files, {} manifests, {} findings",
            summary.files_analyzed,
            summary.manifests_extracted,
            findings.len()
        );
        files.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(Analysis {
            report: Report::new(findings, summary),
            files,
        })
    }

    /// Apply exclusions and severity overrides.
    fn configure(&self, findings: Vec<Finding>) -> Vec<Finding> {
        findings
            .into_iter()
            .filter(|f| !self.config.is_code_excluded(f.code))
            .map(|f| {
                let severity = self.config.effective_severity(f.code, f.severity);
                f.with_severity(severity)
            })
            .collect()
    }
}

fn io_error(path: &Path, message: String) -> Finding {
    Finding::new(FindingCode::IoError, message, SubjectRef::file(path))
}

/// Write healed text back for every changed file.
///
/// Each file is replaced atomically through a temporary file in the same
/// directory, so it is either untouched or fully rewritten. Failures become
/// `IO_ERROR` findings on the report. Returns the number of files written.
pub fn write_back(analysis: &mut Analysis, config: &KubecuroConfig) -> usize {
    let mut written = 0;
    let mut failures = Vec::new();

    for outcome in analysis.files.iter().filter(|f| f.changed()) {
        match write_atomic(&outcome.path, &outcome.healed) {
            Ok(()) => {
                log::info!("Wrote {}", outcome.path.display());
                written += 1;
            }
            Err(e) => {
                log::warn!("Cannot write {}: {}", outcome.path.display(), e);
                failures.push(io_error(&outcome.path, format!("cannot write healed file: {}", e)));
            }
        }
    }

    if !failures.is_empty() && !config.is_code_excluded(FindingCode::IoError) {
        let existing = std::mem::take(&mut analysis.report.findings);
        analysis.report.findings = aggregate::aggregate(existing, failures);
    }
    written
}

fn write_atomic(path: &Path, contents: &str) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(contents.as_bytes())?;
    tmp.as_file().sync_all()?;
    if let Ok(metadata) = fs::metadata(path) {
        fs::set_permissions(tmp.path(), metadata.permissions())?;
    }
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
