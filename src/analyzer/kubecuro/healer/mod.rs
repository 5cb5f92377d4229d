//! Structural Healer
//!
//! Comment-preserving, deterministic repair of YAML manifests. The healer
//! tokenizes the input, rebuilds each `---`-delimited document from relative
//! indentation, and re-serializes it in one canonical layout. Healing is
//! idempotent: healing healed text yields the same text and no fixes.
//!
//! # Example
//!
//! ```rust,ignore
//! use kubecuro::analyzer::kubecuro::deprecation::StaticDeprecationTable;
//! use kubecuro::analyzer::kubecuro::healer::{Healer, HealerOptions};
//!
//! let table = StaticDeprecationTable::builtin();
//! let healer = Healer::new(HealerOptions::default(), &table);
//! let output = healer.heal("metadata:\n    name: web\n");
//! assert_eq!(output.text, "metadata:\n  name: web\n");
//! ```

pub mod builder;
pub mod emit;
pub mod tree;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::time::{Duration, Instant};

use serde::Serialize;

use self::builder::{FixRecord, Limits};
use self::emit::EmittedLine;
pub use self::tree::{Document, Entry, Item, Node, Scalar, Trivia, unquote};
use crate::analyzer::kubecuro::config::KubecuroConfig;
use crate::analyzer::kubecuro::deprecation::{DeprecationTable, K8sVersion};
use crate::analyzer::kubecuro::tokenizer::{LineKind, LineRecord, tokenize};

/// Category of a repair applied by the healer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FixKind {
    IndentationNormalization,
    MissingColonInsertion,
    DashMisalignmentCorrection,
    ApiVersionSubstitution,
    TrailingWhitespaceRemoval,
    ColonSpacingNormalization,
    BlankLineNormalization,
    FormattingNormalization,
}

impl FixKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IndentationNormalization => "indentation-normalization",
            Self::MissingColonInsertion => "missing-colon-insertion",
            Self::DashMisalignmentCorrection => "dash-misalignment-correction",
            Self::ApiVersionSubstitution => "api-version-substitution",
            Self::TrailingWhitespaceRemoval => "trailing-whitespace-removal",
            Self::ColonSpacingNormalization => "colon-spacing-normalization",
            Self::BlankLineNormalization => "blank-line-normalization",
            Self::FormattingNormalization => "formatting-normalization",
        }
    }
}

impl fmt::Display for FixKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Inclusive, 1-indexed line range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct LineRange {
    pub start: usize,
    pub end: usize,
}

impl LineRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self {
            start,
            end: end.max(start),
        }
    }

    pub fn single(line: usize) -> Self {
        Self::new(line, line)
    }

    pub fn contains(&self, line: usize) -> bool {
        (self.start..=self.end).contains(&line)
    }
}

impl fmt::Display for LineRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}-{}", self.start, self.end)
        }
    }
}

/// A repair, with where it sat in the input and where it landed in the output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedFix {
    pub kind: FixKind,
    pub original: LineRange,
    /// `None` when the lines were removed.
    pub resulting: Option<LineRange>,
    pub detail: String,
}

/// A document whose structure could not be rebuilt.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("line {line}: {reason}")]
pub struct UnrecoverableSyntaxError {
    pub line: usize,
    pub reason: String,
    exhausted: bool,
}

impl UnrecoverableSyntaxError {
    pub fn new(line: usize, reason: impl Into<String>) -> Self {
        Self {
            line,
            reason: reason.into(),
            exhausted: false,
        }
    }

    pub(crate) fn budget(line: usize) -> Self {
        Self {
            line,
            reason: "heal budget exhausted".to_string(),
            exhausted: true,
        }
    }

    pub(crate) fn too_deep(line: usize, max_depth: usize) -> Self {
        Self {
            line,
            reason: format!("nesting deeper than {} levels", max_depth),
            exhausted: true,
        }
    }

    /// The failure came from a resource limit rather than the input's shape.
    pub fn is_budget(&self) -> bool {
        self.exhausted
    }
}

/// A deprecated apiVersion seen while healing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeprecationNotice {
    pub line: usize,
    pub api_version: String,
    pub kind: String,
    pub replacement: Option<String>,
    pub removed_in: K8sVersion,
    /// The healed text carries the replacement.
    pub substituted: bool,
    pub notes: Option<String>,
}

/// Healing result for one `---`-delimited document.
#[derive(Debug, Clone)]
pub struct HealedDocument {
    /// 0-based position in the file.
    pub index: usize,
    /// Lines the document occupied in the input.
    pub lines: LineRange,
    pub outcome: Result<Document, UnrecoverableSyntaxError>,
    pub fixes: Vec<AppliedFix>,
    pub deprecation: Option<DeprecationNotice>,
}

impl HealedDocument {
    pub fn tree(&self) -> Option<&Document> {
        self.outcome.as_ref().ok()
    }

    pub fn error(&self) -> Option<&UnrecoverableSyntaxError> {
        self.outcome.as_ref().err()
    }
}

/// Healed text plus per-document results.
#[derive(Debug, Clone)]
pub struct HealOutput {
    pub text: String,
    pub documents: Vec<HealedDocument>,
}

impl HealOutput {
    fn exhausted(text: &str, line_count: usize, error: UnrecoverableSyntaxError) -> Self {
        Self {
            text: text.to_string(),
            documents: vec![HealedDocument {
                index: 0,
                lines: LineRange::new(1, line_count.max(1)),
                outcome: Err(error),
                fixes: Vec::new(),
                deprecation: None,
            }],
        }
    }

    pub fn fixes(&self) -> impl Iterator<Item = &AppliedFix> {
        self.documents.iter().flat_map(|doc| doc.fixes.iter())
    }

    pub fn fix_count(&self) -> usize {
        self.fixes().count()
    }

    pub fn errors(&self) -> impl Iterator<Item = &UnrecoverableSyntaxError> {
        self.documents.iter().filter_map(HealedDocument::error)
    }
}

/// Options controlling a heal.
#[derive(Debug, Clone)]
pub struct HealerOptions {
    pub tab_width: usize,
    pub indent_sequences: bool,
    pub substitute_apis: bool,
    /// Wall-clock budget per file; `None` is unlimited.
    pub budget: Option<Duration>,
    pub max_depth: usize,
}

impl Default for HealerOptions {
    fn default() -> Self {
        Self::from(&KubecuroConfig::default())
    }
}

impl From<&KubecuroConfig> for HealerOptions {
    fn from(config: &KubecuroConfig) -> Self {
        Self {
            tab_width: config.tab_width,
            indent_sequences: config.indent_sequences,
            substitute_apis: config.substitute_deprecated_apis,
            budget: (config.heal_budget_ms > 0).then(|| Duration::from_millis(config.heal_budget_ms)),
            max_depth: config.max_nesting_depth,
        }
    }
}

/// The healer, bound to a deprecation table.
pub struct Healer<'t> {
    options: HealerOptions,
    table: &'t dyn DeprecationTable,
}

impl<'t> Healer<'t> {
    pub fn new(options: HealerOptions, table: &'t dyn DeprecationTable) -> Self {
        Self { options, table }
    }

    pub fn options(&self) -> &HealerOptions {
        &self.options
    }

    /// Heal `text`. Never fails: broken documents are reported in the output.
    pub fn heal(&self, text: &str) -> HealOutput {
        let limits = Limits {
            max_depth: self.options.max_depth.max(1),
            deadline: self.options.budget.map(|budget| Instant::now() + budget),
        };
        let records = tokenize(text, self.options.tab_width);
        let segments = split_documents(&records);

        let mut lines: Vec<EmittedLine> = Vec::new();
        let mut staged = Vec::with_capacity(segments.len());
        for (index, segment) in segments.iter().enumerate() {
            let offset = lines.len();
            let (outcome, fixes, deprecation) = match builder::build(segment.body, segment.marker(), limits) {
                Ok((mut document, mut fixes)) => {
                    let deprecation = self.substitute_api(&mut document, &mut fixes);
                    let emitted = emit::emit(&document, self.options.indent_sequences);
                    note_formatting(segment, &emitted, &mut fixes);
                    lines.extend(emitted);
                    (Ok(document), fixes, deprecation)
                }
                Err(error) if error.is_budget() => {
                    log::debug!("Heal aborted at line {}: {}", error.line, error.reason);
                    return HealOutput::exhausted(text, records.len(), error);
                }
                Err(error) => {
                    log::debug!(
                        "Document {} is unrecoverable at line {}: {}",
                        index,
                        error.line,
                        error.reason
                    );
                    lines.extend(segment.records().map(|record| EmittedLine {
                        text: verbatim(record),
                        source: record.number,
                    }));
                    (Err(error), Vec::new(), None)
                }
            };
            staged.push((index, segment.range(), outcome, fixes, deprecation, offset, lines.len()));
        }

        if staged.iter().all(|(_, _, outcome, ..)| outcome.is_err()) {
            let documents = staged
                .into_iter()
                .map(|(index, range, outcome, _, _, _, _)| HealedDocument {
                    index,
                    lines: range,
                    outcome,
                    fixes: Vec::new(),
                    deprecation: None,
                })
                .collect();
            return HealOutput {
                text: text.to_string(),
                documents,
            };
        }

        if !text.ends_with('\n') {
            if let Some((_, range, _, fixes, ..)) = staged.last_mut() {
                fixes.push(FixRecord {
                    kind: FixKind::FormattingNormalization,
                    line: range.end,
                    detail: "added final newline".to_string(),
                });
            }
        }

        let documents = staged
            .into_iter()
            .map(|(index, range, outcome, fixes, deprecation, start, end)| HealedDocument {
                index,
                lines: range,
                outcome,
                fixes: coalesce(fixes, &lines[start..end], start),
                deprecation,
            })
            .collect();

        let mut healed = lines
            .iter()
            .map(|line| line.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        if !healed.is_empty() {
            healed.push('\n');
        }
        HealOutput {
            text: healed,
            documents,
        }
    }

    /// Look up the document's apiVersion and substitute it when allowed.
    fn substitute_api(&self, document: &mut Document, fixes: &mut Vec<FixRecord>) -> Option<DeprecationNotice> {
        let root = document.root.as_mut()?;
        let kind = unquote(&root.get("kind")?.as_scalar()?.text).to_string();
        let entry = root
            .as_mapping_mut()?
            .children
            .iter_mut()
            .find(|entry| entry.key_text() == "apiVersion")?;
        let line = entry.line;
        let Some(Node::Scalar(scalar)) = entry.value.as_mut() else {
            return None;
        };
        let api_version = unquote(&scalar.text).to_string();
        let deprecated = self.table.lookup(&api_version, &kind)?;

        let mut substituted = false;
        if let Some(replacement) = &deprecated.replacement {
            if self.options.substitute_apis && scalar.continuation.is_empty() {
                scalar.text = requote(&scalar.text, replacement);
                fixes.push(FixRecord {
                    kind: FixKind::ApiVersionSubstitution,
                    line,
                    detail: format!("apiVersion {} -> {}", api_version, replacement),
                });
                substituted = true;
            }
        }
        Some(DeprecationNotice {
            line,
            api_version,
            kind,
            replacement: deprecated.replacement.clone(),
            removed_in: deprecated.removed_in,
            substituted,
            notes: deprecated.notes.clone(),
        })
    }
}

/// Replace the value inside `original`, keeping its quoting style.
fn requote(original: &str, value: &str) -> String {
    match original.chars().next() {
        Some(quote @ ('"' | '\'')) => format!("{quote}{value}{quote}"),
        _ => value.to_string(),
    }
}

fn verbatim(record: &LineRecord) -> String {
    if record.crlf {
        format!("{}\r", record.raw)
    } else {
        record.raw.clone()
    }
}

struct Segment<'r> {
    marker: Option<&'r LineRecord>,
    body: &'r [LineRecord],
}

impl<'r> Segment<'r> {
    fn marker(&self) -> Option<tree::Marker> {
        self.marker.map(|record| tree::Marker {
            text: match &record.kind {
                LineKind::DocumentMarker(text) => text.clone(),
                _ => record.raw.trim().to_string(),
            },
            line: record.number,
        })
    }

    fn records(&self) -> impl Iterator<Item = &'r LineRecord> + use<'r> {
        self.marker.into_iter().chain(self.body.iter())
    }

    fn range(&self) -> LineRange {
        let first = self
            .marker
            .or(self.body.first())
            .map(|record| record.number)
            .unwrap_or(1);
        let last = self
            .body
            .last()
            .or(self.marker)
            .map(|record| record.number)
            .unwrap_or(first);
        LineRange::new(first, last)
    }
}

fn split_documents(records: &[LineRecord]) -> Vec<Segment<'_>> {
    let mut segments = Vec::new();
    let mut marker = None;
    let mut start = 0;
    for (idx, record) in records.iter().enumerate() {
        if matches!(record.kind, LineKind::DocumentMarker(_)) {
            if marker.is_some() || idx > start {
                segments.push(Segment {
                    marker,
                    body: &records[start..idx],
                });
            }
            marker = Some(record);
            start = idx + 1;
        }
    }
    if marker.is_some() || start < records.len() {
        segments.push(Segment {
            marker,
            body: &records[start..],
        });
    }
    segments
}

fn leading_width(text: &str) -> usize {
    text.len() - text.trim_start().len()
}

/// Record a fix for every line whose text changed without an explicit repair.
fn note_formatting(segment: &Segment<'_>, emitted: &[EmittedLine], fixes: &mut Vec<FixRecord>) {
    let mut explained: BTreeSet<usize> = fixes.iter().map(|fix| fix.line).collect();
    let raw: BTreeMap<usize, &LineRecord> = segment
        .records()
        .map(|record| (record.number, record))
        .collect();
    let mut seen = BTreeSet::new();

    for line in emitted {
        seen.insert(line.source);
        if explained.contains(&line.source) {
            continue;
        }
        let Some(record) = raw.get(&line.source) else {
            continue;
        };
        if line.text != record.raw {
            let (kind, detail) = if leading_width(&line.text) != leading_width(&record.raw) {
                (FixKind::IndentationNormalization, "re-indented")
            } else {
                (FixKind::FormattingNormalization, "normalized layout")
            };
            fixes.push(FixRecord {
                kind,
                line: line.source,
                detail: detail.to_string(),
            });
            explained.insert(line.source);
        }
    }

    for record in segment.records() {
        if explained.contains(&record.number) {
            continue;
        }
        let detail = if record.crlf {
            "converted CRLF line ending"
        } else if !seen.contains(&record.number) {
            "joined with the following line"
        } else {
            continue;
        };
        fixes.push(FixRecord {
            kind: FixKind::FormattingNormalization,
            line: record.number,
            detail: detail.to_string(),
        });
    }
}

/// Merge per-line fixes into runs of consecutive lines per kind.
fn coalesce(records: Vec<FixRecord>, emitted: &[EmittedLine], offset: usize) -> Vec<AppliedFix> {
    let mut by_kind: BTreeMap<FixKind, BTreeMap<usize, String>> = BTreeMap::new();
    for record in records {
        by_kind
            .entry(record.kind)
            .or_default()
            .entry(record.line)
            .or_insert(record.detail);
    }

    let mut fixes = Vec::new();
    for (kind, lines) in by_kind {
        let mut run: Option<(usize, usize, String, usize)> = None;
        for (line, detail) in lines {
            match &mut run {
                Some((_, end, _, count)) if line == *end + 1 => {
                    *end = line;
                    *count += 1;
                }
                _ => {
                    if let Some(done) = run.take() {
                        fixes.push(finish_run(kind, done, emitted, offset));
                    }
                    run = Some((line, line, detail, 1));
                }
            }
        }
        if let Some(done) = run {
            fixes.push(finish_run(kind, done, emitted, offset));
        }
    }
    fixes.sort_by_key(|fix| (fix.original.start, fix.kind));
    fixes
}

fn finish_run(
    kind: FixKind,
    (start, end, detail, count): (usize, usize, String, usize),
    emitted: &[EmittedLine],
    offset: usize,
) -> AppliedFix {
    let original = LineRange::new(start, end);
    let positions: Vec<usize> = emitted
        .iter()
        .enumerate()
        .filter(|(_, line)| original.contains(line.source))
        .map(|(idx, _)| offset + idx + 1)
        .collect();
    let resulting = match (positions.first(), positions.last()) {
        (Some(first), Some(last)) => Some(LineRange::new(*first, *last)),
        _ => None,
    };
    let detail = if count > 1 {
        format!("{} ({} lines)", detail, count)
    } else {
        detail
    };
    AppliedFix {
        kind,
        original,
        resulting,
        detail,
    }
}
