//! Tolerant, line-oriented tokenizer for YAML manifests.
//!
//! Every input line becomes exactly one [`LineRecord`]. The tokenizer never
//! fails: lines it cannot classify with certainty are emitted with
//! [`Confidence::Low`] and the structural decision is left to the healer.
//!
//! Recognised recoveries:
//! - tabs in leading whitespace are expanded to `tab_width` columns
//! - `key:value` and `key :  value` spacing
//! - a bare word followed by a more indented block gets its missing colon

use once_cell::sync::Lazy;
use regex::Regex;

static BLOCK_HEADER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[|>][0-9+\-]*$").expect("valid block header pattern"));

static BARE_WORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_.\-/]*$").expect("valid bare word pattern"));

static TIGHT_COLON: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^([A-Za-z_][A-Za-z0-9_.\-/]*):([^\s/:#|>\[{"'].*)$"#)
        .expect("valid colon pattern")
});

/// How sure the tokenizer is about a line's classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confidence {
    High,
    Low,
}

/// A trailing `# comment` on a content line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineComment {
    /// Whitespace columns between the preceding text and `#`.
    pub gap: usize,
    /// The comment text, starting with `#`.
    pub text: String,
}

/// Repairs the tokenizer inferred for a key line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyRepair {
    MissingColon,
    ColonSpacing,
}

/// `key: value` or `key:` line (or item body).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyLine {
    pub col: usize,
    pub key: String,
    /// Inline value in its lexical form, including tags and anchors.
    pub value: Option<String>,
    pub comment: Option<InlineComment>,
    pub repair: Option<KeyRepair>,
}

/// `- ...` line (or nested item body).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemLine {
    /// Column of the dash.
    pub col: usize,
    pub body: Option<Box<Fragment>>,
    /// Comment on a dash line that has no body.
    pub comment: Option<InlineComment>,
}

/// A plain, quoted or flow scalar that is not a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScalarLine {
    pub col: usize,
    pub text: String,
    pub comment: Option<InlineComment>,
}

/// Structural content of a line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    Key(KeyLine),
    Item(ItemLine),
    Scalar(ScalarLine),
}

impl Fragment {
    pub fn col(&self) -> usize {
        match self {
            Fragment::Key(k) => k.col,
            Fragment::Item(i) => i.col,
            Fragment::Scalar(s) => s.col,
        }
    }

    fn innermost_mut(&mut self) -> &mut Fragment {
        match self {
            Fragment::Item(ItemLine {
                body: Some(body), ..
            }) => body.innermost_mut(),
            _ => self,
        }
    }
}

/// A line inside a multi-line scalar opened on an earlier line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Continuation {
    /// Block scalar content; `rel` is the indentation relative to the block.
    Block { rel: usize, text: String },
    /// Continuation of a quoted scalar or flow collection.
    Folded(String),
}

/// Classification of a single line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineKind {
    Blank,
    /// Comment-only line; holds the text starting with `#`.
    Comment(String),
    /// `---` or `...`, with anything trailing it.
    DocumentMarker(String),
    Node(Fragment),
    Continuation(Continuation),
}

/// One tokenized input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineRecord {
    /// 1-indexed line number.
    pub number: usize,
    /// The line as read, without its terminator.
    pub raw: String,
    /// Leading whitespace width after tab expansion.
    pub indent: usize,
    pub tab_indent: bool,
    pub trailing_ws: bool,
    /// The line ended in `\r\n`.
    pub crlf: bool,
    pub kind: LineKind,
    pub confidence: Confidence,
}

impl LineRecord {
    pub fn is_structural(&self) -> bool {
        matches!(self.kind, LineKind::Node(_))
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct FlowState {
    depth: usize,
    quote: Option<char>,
}

impl FlowState {
    fn closed(&self) -> bool {
        self.depth == 0 && self.quote.is_none()
    }

    fn scan(mut self, text: &str) -> Self {
        let mut prev: Option<char> = None;
        let mut prev_sig: Option<char> = None;
        let mut escaped = false;
        let mut just_closed = false;
        for ch in text.chars() {
            if let Some(q) = self.quote {
                if q == '"' {
                    if escaped {
                        escaped = false;
                    } else if ch == '\\' {
                        escaped = true;
                    } else if ch == '"' {
                        self.quote = None;
                    }
                } else if ch == '\'' {
                    self.quote = None;
                    just_closed = true;
                    prev = Some(ch);
                    prev_sig = Some(ch);
                    continue;
                }
            } else {
                match ch {
                    '[' | '{' => self.depth += 1,
                    ']' | '}' => self.depth = self.depth.saturating_sub(1),
                    '\'' if just_closed && prev == Some('\'') => self.quote = Some('\''),
                    '"' | '\'' if opens_quote(prev_sig, self.depth) => self.quote = Some(ch),
                    '#' if prev.is_none_or(|c| c == ' ' || c == '\t') => break,
                    _ => {}
                }
            }
            just_closed = false;
            prev = Some(ch);
            if !ch.is_whitespace() {
                prev_sig = Some(ch);
            }
        }
        self
    }
}

fn opens_quote(prev_sig: Option<char>, depth: usize) -> bool {
    match prev_sig {
        None => true,
        Some('[' | '{' | ',') => true,
        Some(':') => depth > 0,
        _ => false,
    }
}

/// A multi-line construct opened by a value.
#[derive(Debug, Clone, Copy)]
enum Opener {
    Block { owner: usize },
    Flow(FlowState),
}

#[derive(Debug)]
enum Mode {
    Normal,
    Block {
        owner: usize,
        /// Indent of the first content line; shallower lines end the block.
        content: Option<usize>,
        lines: Vec<usize>,
    },
    Flow(FlowState),
}

/// Tokenize `text` into one record per line.
pub fn tokenize(text: &str, tab_width: usize) -> Vec<LineRecord> {
    let mut tokenizer = Tokenizer {
        tab_width: tab_width.max(1),
        records: Vec::new(),
        mode: Mode::Normal,
    };
    for (idx, line) in split_lines(text).into_iter().enumerate() {
        tokenizer.push(idx + 1, line);
    }
    tokenizer.finish()
}

/// Split into lines, dropping terminators; reports whether each line ended in CRLF.
pub fn split_lines(text: &str) -> Vec<(&str, bool)> {
    if text.is_empty() {
        return Vec::new();
    }
    let body = text.strip_suffix('\n').unwrap_or(text);
    body.split('\n')
        .map(|line| match line.strip_suffix('\r') {
            Some(stripped) => (stripped, true),
            None => (line, false),
        })
        .collect()
}

struct Tokenizer {
    tab_width: usize,
    records: Vec<LineRecord>,
    mode: Mode,
}

impl Tokenizer {
    fn push(&mut self, number: usize, (raw, crlf): (&str, bool)) {
        let (indent, tab_indent, rest) = measure(raw, self.tab_width);
        let rest_for_class = rest.trim_start_matches('\u{feff}');
        let content = rest_for_class.trim_end();
        let trailing_ws = raw.ends_with([' ', '\t']);

        let mut record = LineRecord {
            number,
            raw: raw.to_string(),
            indent,
            tab_indent,
            trailing_ws,
            crlf,
            kind: LineKind::Blank,
            confidence: if tab_indent {
                Confidence::Low
            } else {
                Confidence::High
            },
        };

        match &mut self.mode {
            Mode::Block {
                owner,
                content: block_indent,
                lines,
            } => {
                let is_marker = indent == 0 && is_document_marker(content);
                let inside = indent > *owner && block_indent.is_none_or(|first| indent >= first);
                if content.is_empty() || (inside && !is_marker) {
                    if !content.is_empty() && block_indent.is_none() {
                        *block_indent = Some(indent);
                    }
                    record.kind = LineKind::Continuation(Continuation::Block {
                        rel: 0,
                        text: if content.is_empty() {
                            String::new()
                        } else {
                            record.trailing_ws = false;
                            rest.to_string()
                        },
                    });
                    lines.push(self.records.len());
                    self.records.push(record);
                    return;
                }
                self.close_block();
            }
            Mode::Flow(state) => {
                if !(indent == 0 && is_document_marker(content)) {
                    let next = state.scan(content);
                    record.kind = LineKind::Continuation(Continuation::Folded(content.to_string()));
                    self.mode = if next.closed() {
                        Mode::Normal
                    } else {
                        Mode::Flow(next)
                    };
                    self.records.push(record);
                    return;
                }
                self.mode = Mode::Normal;
            }
            Mode::Normal => {}
        }

        let (kind, opener) = classify(content, indent);
        record.kind = kind;
        if let LineKind::Node(fragment) = &record.kind {
            if fragment_has_repair(fragment) {
                record.confidence = Confidence::Low;
            }
        }
        self.mode = match opener {
            Some(Opener::Block { owner }) => Mode::Block {
                owner,
                content: None,
                lines: Vec::new(),
            },
            Some(Opener::Flow(state)) => Mode::Flow(state),
            None => Mode::Normal,
        };
        self.records.push(record);
    }

    /// Re-base block lines on their minimum indent and hand trailing blanks back.
    fn close_block(&mut self) {
        let lines = match std::mem::replace(&mut self.mode, Mode::Normal) {
            Mode::Block { lines, .. } => lines,
            _ => return,
        };
        let mut content_end = lines.len();
        while content_end > 0 && is_empty_block_line(&self.records[lines[content_end - 1]]) {
            content_end -= 1;
        }
        for &idx in &lines[content_end..] {
            self.records[idx].kind = LineKind::Blank;
        }
        let content = &lines[..content_end];
        let min = content
            .iter()
            .filter(|&&idx| !is_empty_block_line(&self.records[idx]))
            .map(|&idx| self.records[idx].indent)
            .min()
            .unwrap_or(0);
        for &idx in content {
            let record = &mut self.records[idx];
            let indent = record.indent;
            if let LineKind::Continuation(Continuation::Block { rel, text }) = &mut record.kind {
                if !text.is_empty() {
                    *rel = indent - min;
                }
            }
        }
    }

    fn finish(mut self) -> Vec<LineRecord> {
        self.close_block();
        infer_missing_structure(&mut self.records);
        self.records
    }
}

fn is_empty_block_line(record: &LineRecord) -> bool {
    matches!(&record.kind, LineKind::Continuation(Continuation::Block { text, .. }) if text.is_empty())
}

fn fragment_has_repair(fragment: &Fragment) -> bool {
    match fragment {
        Fragment::Key(k) => k.repair.is_some(),
        Fragment::Item(i) => i.body.as_deref().is_some_and(fragment_has_repair),
        Fragment::Scalar(_) => false,
    }
}

/// Measure leading whitespace, expanding tabs.
fn measure(raw: &str, tab_width: usize) -> (usize, bool, &str) {
    let mut indent = 0;
    let mut tab = false;
    let mut offset = raw.len();
    for (i, ch) in raw.char_indices() {
        match ch {
            ' ' => indent += 1,
            '\t' => {
                indent += tab_width;
                tab = true;
            }
            _ => {
                offset = i;
                break;
            }
        }
    }
    (indent, tab, &raw[offset..])
}

fn is_document_marker(content: &str) -> bool {
    ["---", "..."].iter().any(|marker| {
        content == *marker
            || content
                .strip_prefix(marker)
                .is_some_and(|rest| rest.starts_with([' ', '\t']))
    })
}

fn classify(content: &str, indent: usize) -> (LineKind, Option<Opener>) {
    if content.is_empty() {
        return (LineKind::Blank, None);
    }
    if content.starts_with('#') {
        return (LineKind::Comment(content.to_string()), None);
    }
    if is_document_marker(content) {
        return (LineKind::DocumentMarker(content.to_string()), None);
    }
    let (fragment, opener) = parse_fragment(content, indent);
    (LineKind::Node(fragment), opener)
}

fn parse_fragment(s: &str, col: usize) -> (Fragment, Option<Opener>) {
    if s == "-" || s.starts_with("- ") || s.starts_with("-\t") {
        let after = &s[1..];
        let body = after.trim_start();
        let gap = after.len() - body.len();
        let body_col = col + 1 + gap;
        if body.is_empty() {
            return (
                Fragment::Item(ItemLine {
                    col,
                    body: None,
                    comment: None,
                }),
                None,
            );
        }
        if body.starts_with('#') {
            return (
                Fragment::Item(ItemLine {
                    col,
                    body: None,
                    comment: Some(InlineComment {
                        gap,
                        text: body.to_string(),
                    }),
                }),
                None,
            );
        }
        let (inner, opener) = parse_fragment(body, body_col);
        let opener = match (opener, &inner) {
            // `- |` belongs to the dash column.
            (Some(Opener::Block { .. }), Fragment::Scalar(_)) => Some(Opener::Block { owner: col }),
            (other, _) => other,
        };
        return (
            Fragment::Item(ItemLine {
                col,
                body: Some(Box::new(inner)),
                comment: None,
            }),
            opener,
        );
    }

    if let Some((key, rest, spacing)) = split_key(s) {
        let value = parse_value(rest, col);
        let repair = if spacing || value.spacing {
            Some(KeyRepair::ColonSpacing)
        } else {
            None
        };
        return (
            Fragment::Key(KeyLine {
                col,
                key: key.to_string(),
                value: value.text,
                comment: value.comment,
                repair,
            }),
            value.opener,
        );
    }

    let value = parse_value(s, col.saturating_sub(1));
    (
        Fragment::Scalar(ScalarLine {
            col,
            text: value.text.unwrap_or_default(),
            comment: value.comment,
        }),
        value.opener,
    )
}

/// Split `key: rest`. Returns the key, the text after the colon, and whether
/// whitespace sat between the key and its colon.
fn split_key(s: &str) -> Option<(&str, &str, bool)> {
    let first = s.chars().next()?;
    if first == '"' || first == '\'' {
        let close = closing_quote(s, first)?;
        let after = &s[close + 1..];
        let trimmed = after.trim_start_matches([' ', '\t']);
        let rest = trimmed.strip_prefix(':')?;
        if !(rest.is_empty() || rest.starts_with([' ', '\t'])) {
            return None;
        }
        return Some((&s[..=close], rest, trimmed.len() != after.len()));
    }
    if matches!(
        first,
        '[' | '{' | '|' | '>' | '!' | '&' | '*' | '%' | '@' | '`' | '?' | '#'
    ) {
        return None;
    }

    let mut prev: Option<char> = None;
    let mut chars = s.char_indices().peekable();
    while let Some((i, ch)) = chars.next() {
        if ch == '#' && prev.is_some_and(|c| c == ' ' || c == '\t') {
            return None;
        }
        if ch == ':' {
            let next = chars.peek().map(|(_, c)| *c);
            if next.is_none_or(|c| c == ' ' || c == '\t') {
                let raw_key = &s[..i];
                let key = raw_key.trim_end();
                if key.is_empty() {
                    return None;
                }
                return Some((key, &s[i + 1..], key.len() != raw_key.len()));
            }
        }
        prev = Some(ch);
    }
    None
}

fn closing_quote(s: &str, quote: char) -> Option<usize> {
    let mut escaped = false;
    let mut iter = s.char_indices().skip(1).peekable();
    while let Some((i, ch)) = iter.next() {
        if quote == '"' {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                return Some(i);
            }
        } else if ch == '\'' {
            if iter.peek().is_some_and(|(_, c)| *c == '\'') {
                iter.next();
            } else {
                return Some(i);
            }
        }
    }
    None
}

struct ParsedValue {
    text: Option<String>,
    comment: Option<InlineComment>,
    opener: Option<Opener>,
    /// More than one space (or a tab) between colon and value.
    spacing: bool,
}

fn parse_value(rest: &str, owner: usize) -> ParsedValue {
    let trimmed = rest.trim_start();
    let lead = rest.len() - trimmed.len();
    if trimmed.is_empty() {
        return ParsedValue {
            text: None,
            comment: None,
            opener: None,
            spacing: false,
        };
    }
    if trimmed.starts_with('#') {
        return ParsedValue {
            text: None,
            comment: Some(InlineComment {
                gap: lead,
                text: trimmed.to_string(),
            }),
            opener: None,
            spacing: false,
        };
    }
    let spacing = lead > 1 || rest.starts_with('\t');

    let body = strip_props(trimmed);
    if body.starts_with(['[', '{', '"', '\'']) {
        let state = FlowState::default().scan(body);
        if !state.closed() {
            return ParsedValue {
                text: Some(trimmed.to_string()),
                comment: None,
                opener: Some(Opener::Flow(state)),
                spacing,
            };
        }
    }

    let (text, comment) = split_comment(trimmed);
    let opener = if BLOCK_HEADER.is_match(strip_props(&text)) {
        Some(Opener::Block { owner })
    } else {
        None
    };
    ParsedValue {
        text: Some(text),
        comment,
        opener,
        spacing,
    }
}

/// Skip leading `&anchor` and `!tag` properties.
fn strip_props(mut s: &str) -> &str {
    while s.starts_with(['&', '!']) {
        match s.find([' ', '\t']) {
            Some(end) => s = s[end..].trim_start(),
            None => return "",
        }
    }
    s
}

/// Split a value from its trailing comment, respecting quotes.
pub fn split_comment(s: &str) -> (String, Option<InlineComment>) {
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut prev: Option<char> = None;
    let mut prev_sig: Option<char> = None;
    let mut depth = 0usize;
    for (i, ch) in s.char_indices() {
        if let Some(q) = quote {
            if q == '"' && escaped {
                escaped = false;
            } else if q == '"' && ch == '\\' {
                escaped = true;
            } else if ch == q {
                quote = None;
            }
        } else {
            match ch {
                '[' | '{' => depth += 1,
                ']' | '}' => depth = depth.saturating_sub(1),
                '"' | '\'' if opens_quote(prev_sig, depth) => quote = Some(ch),
                '#' if i > 0 && prev.is_some_and(|c| c == ' ' || c == '\t') => {
                    let value = s[..i].trim_end();
                    return (
                        value.to_string(),
                        Some(InlineComment {
                            gap: i - value.len(),
                            text: s[i..].to_string(),
                        }),
                    );
                }
                _ => {}
            }
        }
        prev = Some(ch);
        if !ch.is_whitespace() {
            prev_sig = Some(ch);
        }
    }
    (s.to_string(), None)
}

/// Second pass: inferences that need to look at the following lines.
fn infer_missing_structure(records: &mut [LineRecord]) {
    let mut next_structural: Vec<Option<usize>> = vec![None; records.len()];
    let mut upcoming = None;
    for idx in (0..records.len()).rev() {
        next_structural[idx] = upcoming;
        match &records[idx].kind {
            LineKind::Node(_) => upcoming = Some(idx),
            LineKind::DocumentMarker(_) => upcoming = None,
            _ => {}
        }
    }

    let mut prev_structural: Option<usize> = None;
    for idx in 0..records.len() {
        if !records[idx].is_structural() {
            if matches!(records[idx].kind, LineKind::DocumentMarker(_)) {
                prev_structural = None;
            }
            continue;
        }
        let next = next_structural[idx].map(|n| (records[n].indent, next_shape(&records[n])));
        let continuation_plausible = prev_structural.is_some_and(|p| {
            records[p].indent < records[idx].indent && ends_with_scalar(&records[p])
        });

        let record = &mut records[idx];
        let is_item = matches!(record.kind, LineKind::Node(Fragment::Item(_)));
        if let LineKind::Node(fragment) = &mut record.kind {
            let target = fragment.innermost_mut();
            let inferred = match &*target {
                Fragment::Scalar(scalar) if is_item => infer_item_body(scalar, next),
                Fragment::Scalar(_) if continuation_plausible => None,
                Fragment::Scalar(scalar) => infer_own_line(scalar, next),
                _ => None,
            };
            if let Some(key) = inferred {
                *target = Fragment::Key(key);
                record.confidence = Confidence::Low;
            }
        }
        prev_structural = Some(idx);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    Key,
    Item,
    Scalar,
}

fn next_shape(record: &LineRecord) -> Shape {
    match &record.kind {
        LineKind::Node(Fragment::Key(_)) => Shape::Key,
        LineKind::Node(Fragment::Item(_)) => Shape::Item,
        // `key:value` is resolved later in the same pass.
        LineKind::Node(Fragment::Scalar(s)) if TIGHT_COLON.is_match(&s.text) => Shape::Key,
        _ => Shape::Scalar,
    }
}

fn ends_with_scalar(record: &LineRecord) -> bool {
    fn walk(fragment: &Fragment) -> bool {
        match fragment {
            Fragment::Key(k) => k.value.is_some(),
            Fragment::Item(i) => i.body.as_deref().is_some_and(walk),
            Fragment::Scalar(_) => true,
        }
    }
    match &record.kind {
        LineKind::Node(fragment) => walk(fragment),
        _ => false,
    }
}

fn infer_own_line(scalar: &ScalarLine, next: Option<(usize, Shape)>) -> Option<KeyLine> {
    let col = scalar.col;
    if BARE_WORD.is_match(&scalar.text) {
        return match next {
            Some((next_indent, Shape::Key | Shape::Item)) if next_indent > col => {
                Some(missing_colon(scalar))
            }
            _ => None,
        };
    }
    tight_colon(scalar)
}

fn infer_item_body(scalar: &ScalarLine, next: Option<(usize, Shape)>) -> Option<KeyLine> {
    let col = scalar.col;
    match next {
        Some((next_indent, Shape::Key | Shape::Item))
            if next_indent > col && BARE_WORD.is_match(&scalar.text) =>
        {
            Some(missing_colon(scalar))
        }
        Some((next_indent, Shape::Key)) if next_indent == col => tight_colon(scalar),
        _ => None,
    }
}

fn missing_colon(scalar: &ScalarLine) -> KeyLine {
    KeyLine {
        col: scalar.col,
        key: scalar.text.clone(),
        value: None,
        comment: scalar.comment.clone(),
        repair: Some(KeyRepair::MissingColon),
    }
}

fn tight_colon(scalar: &ScalarLine) -> Option<KeyLine> {
    let caps = TIGHT_COLON.captures(&scalar.text)?;
    let value = caps.get(2)?.as_str();
    if value.contains(": ") {
        return None;
    }
    Some(KeyLine {
        col: scalar.col,
        key: caps.get(1)?.as_str().to_string(),
        value: Some(value.to_string()),
        comment: scalar.comment.clone(),
        repair: Some(KeyRepair::ColonSpacing),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(record: &LineRecord) -> &Fragment {
        match &record.kind {
            LineKind::Node(f) => f,
            other => panic!("expected node, got {:?}", other),
        }
    }

    fn key(record: &LineRecord) -> &KeyLine {
        match node(record) {
            Fragment::Key(k) => k,
            other => panic!("expected key, got {:?}", other),
        }
    }

    #[test]
    fn test_basic_kinds() {
        let records = tokenize("# top\napiVersion: v1\n\nitems:\n- a\n---\n", 2);
        assert_eq!(records.len(), 6);
        assert_eq!(records[0].kind, LineKind::Comment("# top".to_string()));
        assert_eq!(key(&records[1]).key, "apiVersion");
        assert_eq!(key(&records[1]).value.as_deref(), Some("v1"));
        assert_eq!(records[2].kind, LineKind::Blank);
        assert_eq!(key(&records[3]).value, None);
        assert!(matches!(node(&records[4]), Fragment::Item(_)));
        assert_eq!(records[5].kind, LineKind::DocumentMarker("---".to_string()));
        assert!(records.iter().all(|r| r.confidence == Confidence::High));
    }

    #[test]
    fn test_tabs_expand() {
        let records = tokenize("spec:\n\treplicas: 2\n", 4);
        assert_eq!(records[1].indent, 4);
        assert!(records[1].tab_indent);
        assert_eq!(records[1].confidence, Confidence::Low);
    }

    #[test]
    fn test_inline_comment_gap() {
        let records = tokenize("name: web   # primary\nport: # none\n", 2);
        let k = key(&records[0]);
        assert_eq!(k.value.as_deref(), Some("web"));
        let comment = k.comment.as_ref().unwrap();
        assert_eq!(comment.gap, 3);
        assert_eq!(comment.text, "# primary");
        let empty = key(&records[1]);
        assert_eq!(empty.value, None);
        assert_eq!(empty.comment.as_ref().unwrap().gap, 1);
    }

    #[test]
    fn test_hash_inside_quotes_is_not_comment() {
        let records = tokenize("msg: \"a # b\" # real\nurl: http://x#frag\n", 2);
        let k = key(&records[0]);
        assert_eq!(k.value.as_deref(), Some("\"a # b\""));
        assert_eq!(k.comment.as_ref().unwrap().text, "# real");
        assert_eq!(key(&records[1]).value.as_deref(), Some("http://x#frag"));
    }

    #[test]
    fn test_item_with_key_body() {
        let records = tokenize("- name: web\n  image: nginx\n", 2);
        match node(&records[0]) {
            Fragment::Item(item) => match item.body.as_deref() {
                Some(Fragment::Key(k)) => {
                    assert_eq!(k.col, 2);
                    assert_eq!(k.key, "name");
                }
                other => panic!("unexpected body {:?}", other),
            },
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_block_scalar_content() {
        let text = "data:\n  script: |\n    echo one\n      nested\n\n    echo two\n\nnext: 1\n";
        let records = tokenize(text, 2);
        assert_eq!(
            records[2].kind,
            LineKind::Continuation(Continuation::Block {
                rel: 0,
                text: "echo one".to_string()
            })
        );
        assert_eq!(
            records[3].kind,
            LineKind::Continuation(Continuation::Block {
                rel: 2,
                text: "nested".to_string()
            })
        );
        assert!(matches!(records[4].kind, LineKind::Continuation(_)));
        assert_eq!(records[6].kind, LineKind::Blank);
        assert_eq!(key(&records[7]).key, "next");
    }

    #[test]
    fn test_block_ends_at_shallower_content() {
        let records = tokenize("a: |\n  x\n b: 1\n", 2);
        assert!(matches!(records[1].kind, LineKind::Continuation(Continuation::Block { .. })));
        let b = key(&records[2]);
        assert_eq!((b.col, b.key.as_str()), (1, "b"));
    }

    #[test]
    fn test_block_content_keeps_key_like_lines() {
        let records = tokenize("cfg: |\n  a: b\n  - c\nz: 1\n", 2);
        assert!(matches!(records[1].kind, LineKind::Continuation(_)));
        assert!(matches!(records[2].kind, LineKind::Continuation(_)));
        assert_eq!(key(&records[3]).key, "z");
    }

    #[test]
    fn test_flow_continuation() {
        let records = tokenize("args: [\"a\",\n  \"b\"]\nnext: 1\n", 2);
        assert_eq!(key(&records[0]).value.as_deref(), Some("[\"a\","));
        assert_eq!(
            records[1].kind,
            LineKind::Continuation(Continuation::Folded("\"b\"]".to_string()))
        );
        assert_eq!(key(&records[2]).key, "next");
    }

    #[test]
    fn test_missing_colon_inferred() {
        let records = tokenize("metadata\n  name: web\n", 2);
        let k = key(&records[0]);
        assert_eq!(k.key, "metadata");
        assert_eq!(k.repair, Some(KeyRepair::MissingColon));
        assert_eq!(records[0].confidence, Confidence::Low);
    }

    #[test]
    fn test_missing_colon_not_inferred_without_nested_block() {
        let records = tokenize("metadata\nname: web\n", 2);
        assert!(matches!(node(&records[0]), Fragment::Scalar(_)));
    }

    #[test]
    fn test_tight_colon() {
        let records = tokenize("spec:\n  image:nginx:1.25\n  url: http://x\n", 2);
        let k = key(&records[1]);
        assert_eq!(k.key, "image");
        assert_eq!(k.value.as_deref(), Some("nginx:1.25"));
        assert_eq!(k.repair, Some(KeyRepair::ColonSpacing));
    }

    #[test]
    fn test_tight_colon_in_item_needs_mapping_context() {
        let records = tokenize("args:\n- redis:6379\n- name:web\n  image: x\n", 2);
        match node(&records[1]) {
            Fragment::Item(item) => assert!(matches!(item.body.as_deref(), Some(Fragment::Scalar(_)))),
            other => panic!("unexpected {:?}", other),
        }
        match node(&records[2]) {
            Fragment::Item(item) => match item.body.as_deref() {
                Some(Fragment::Key(k)) => assert_eq!(k.key, "name"),
                other => panic!("unexpected {:?}", other),
            },
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_extra_spacing_around_colon() {
        let records = tokenize("name :   web\n", 2);
        let k = key(&records[0]);
        assert_eq!(k.key, "name");
        assert_eq!(k.value.as_deref(), Some("web"));
        assert_eq!(k.repair, Some(KeyRepair::ColonSpacing));
    }

    #[test]
    fn test_plain_continuation_not_converted() {
        let records = tokenize("description: some text\n  more:text\n", 2);
        assert!(matches!(node(&records[1]), Fragment::Scalar(_)));
    }

    #[test]
    fn test_crlf_and_trailing_ws() {
        let records = tokenize("a: 1  \r\nb: 2\r\n", 2);
        assert!(records[0].crlf);
        assert!(records[0].trailing_ws);
        assert!(!records[1].trailing_ws);
    }

    #[test]
    fn test_never_fails_on_garbage() {
        let records = tokenize("}}}: [\n\t- :\n'unterminated\n", 2);
        assert_eq!(records.len(), 3);
    }
}
