//! Rebuilds document structure from tokenized lines.
//!
//! Nesting is inferred from indentation deltas only. Each open block is a
//! frame on a stack; a frame remembers the columns that were realigned onto
//! it so later siblings written at the same (wrong) column land in the same
//! place. Those aliases are forgotten once a line arrives at the frame's own
//! column, and never shadow a deeper block opened below them.

use std::time::Instant;

use super::tree::{Collection, Document, Entry, Item, Marker, Node, Scalar, ScalarLine, Trivia};
use super::{FixKind, UnrecoverableSyntaxError};
use crate::analyzer::kubecuro::tokenizer::{
    Continuation, Fragment, ItemLine, KeyLine, KeyRepair, LineKind, LineRecord, ScalarLine as ScalarToken,
};

/// Resource limits for a single heal.
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    pub max_depth: usize,
    pub deadline: Option<Instant>,
}

/// A fix observed while building, tied to one source line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixRecord {
    pub kind: FixKind,
    pub line: usize,
    pub detail: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Want {
    Key,
    Item,
}

#[derive(Debug)]
enum Container {
    Map(Vec<Entry>),
    Seq(Vec<Item>),
}

#[derive(Debug)]
struct Frame {
    /// Primary column first, then realigned aliases.
    cols: Vec<usize>,
    container: Container,
    /// The last child has no value yet and may receive a nested block.
    open: bool,
    /// Column of the last child's own line.
    last_col: usize,
}

impl Frame {
    fn new(col: usize, container: Container) -> Self {
        Self {
            cols: vec![col],
            container,
            open: false,
            last_col: col,
        }
    }

    fn accepts(&self, want: Want) -> bool {
        matches!(
            (&self.container, want),
            (Container::Map(_), Want::Key) | (Container::Seq(_), Want::Item)
        )
    }

    fn is_map(&self) -> bool {
        matches!(self.container, Container::Map(_))
    }

    fn primary(&self) -> usize {
        self.cols[0]
    }

    /// Forget realigned columns; the frame's own column was used again.
    fn reset_aliases(&mut self) {
        self.cols.truncate(1);
    }

    fn min_col(&self) -> usize {
        self.cols.iter().copied().min().unwrap_or(0)
    }

    fn max_col(&self) -> usize {
        self.cols.iter().copied().max().unwrap_or(0)
    }

    fn distance(&self, col: usize) -> usize {
        self.cols
            .iter()
            .map(|c| c.abs_diff(col))
            .min()
            .unwrap_or(usize::MAX)
    }

    fn set_last_value(&mut self, node: Node) {
        match &mut self.container {
            Container::Map(entries) => {
                if let Some(entry) = entries.last_mut() {
                    entry.value = Some(node);
                }
            }
            Container::Seq(items) => {
                if let Some(item) = items.last_mut() {
                    item.value = Some(node);
                }
            }
        }
        self.open = false;
    }

    fn last_scalar_mut(&mut self) -> Option<&mut Scalar> {
        let value = match &mut self.container {
            Container::Map(entries) => entries.last_mut()?.value.as_mut(),
            Container::Seq(items) => items.last_mut()?.value.as_mut(),
        };
        match value {
            Some(Node::Scalar(scalar)) => Some(scalar),
            _ => None,
        }
    }

    fn into_node(self, trailing: Vec<Trivia>) -> Node {
        match self.container {
            Container::Map(entries) => Node::Mapping(Collection {
                children: entries,
                trailing,
            }),
            Container::Seq(items) => Node::Sequence(Collection {
                children: items,
                trailing,
            }),
        }
    }
}

enum Placement {
    Sibling(usize),
    Child,
    StartSequence,
    Realign(usize),
}

struct Builder {
    limits: Limits,
    stack: Vec<Frame>,
    root: Option<Node>,
    /// Pending trivia with the column of each comment.
    pending: Vec<(Trivia, usize)>,
    fixes: Vec<FixRecord>,
    seen_content: bool,
    /// A value written on its own line: owning column, line and text.
    loose_value: Option<(usize, usize, String)>,
}

/// Build a document from the records of one `---`-delimited segment.
pub fn build(
    records: &[LineRecord],
    marker: Option<Marker>,
    limits: Limits,
) -> Result<(Document, Vec<FixRecord>), UnrecoverableSyntaxError> {
    let mut builder = Builder {
        limits,
        stack: Vec::new(),
        root: None,
        pending: Vec::new(),
        fixes: Vec::new(),
        seen_content: false,
        loose_value: None,
    };
    for record in records {
        builder.line(record)?;
    }
    let (root, trailing) = builder.finish();
    let document = Document {
        marker,
        root,
        trailing,
    };
    Ok((document, builder.fixes))
}

impl Builder {
    fn fix(&mut self, kind: FixKind, line: usize, detail: impl Into<String>) {
        self.fixes.push(FixRecord {
            kind,
            line,
            detail: detail.into(),
        });
    }

    fn line(&mut self, record: &LineRecord) -> Result<(), UnrecoverableSyntaxError> {
        if let Some(deadline) = self.limits.deadline {
            if Instant::now() > deadline {
                return Err(UnrecoverableSyntaxError::budget(record.number));
            }
        }
        let line = record.number;
        if record.trailing_ws {
            self.fix(FixKind::TrailingWhitespaceRemoval, line, "trailing whitespace removed");
        }
        if record.tab_indent {
            self.fix(FixKind::IndentationNormalization, line, "tab indentation expanded");
        }

        match &record.kind {
            LineKind::Blank => self.blank(line),
            LineKind::Comment(text) => {
                self.seen_content = true;
                self.pending.push((
                    Trivia::Comment {
                        text: text.clone(),
                        line,
                    },
                    record.indent,
                ));
            }
            // Markers only open segments; a stray one inside a body is kept as a comment-free no-op.
            LineKind::DocumentMarker(_) => {}
            LineKind::Node(fragment) => {
                self.seen_content = true;
                self.note_repairs(fragment, line);
                if !matches!(fragment, Fragment::Scalar(_)) {
                    self.check_loose_value(fragment.col())?;
                }
                match fragment {
                    Fragment::Key(key) => self.place_key(key, line)?,
                    Fragment::Item(item) => self.place_item(item, line)?,
                    Fragment::Scalar(scalar) => self.place_scalar(scalar, line)?,
                }
            }
            LineKind::Continuation(cont) => self.continuation(cont, line)?,
        }
        Ok(())
    }

    fn note_repairs(&mut self, fragment: &Fragment, line: usize) {
        match fragment {
            Fragment::Key(KeyLine {
                repair: Some(repair),
                key,
                ..
            }) => match repair {
                KeyRepair::MissingColon => self.fix(
                    FixKind::MissingColonInsertion,
                    line,
                    format!("inserted ':' after '{}'", key),
                ),
                KeyRepair::ColonSpacing => self.fix(
                    FixKind::ColonSpacingNormalization,
                    line,
                    format!("normalized spacing around ':' of '{}'", key),
                ),
            },
            Fragment::Item(ItemLine {
                body: Some(body), ..
            }) => self.note_repairs(body, line),
            _ => {}
        }
    }

    /// A bare word followed by a sibling at its own depth lost its colon and
    /// opens no block, so there is no consistent structure to rebuild.
    fn check_loose_value(&mut self, col: usize) -> Result<(), UnrecoverableSyntaxError> {
        match self.loose_value.take() {
            Some((owner, line, text)) if col > owner => Err(UnrecoverableSyntaxError::new(
                line,
                format!("'{}' is missing ':' but opens no nested block", text),
            )),
            _ => Ok(()),
        }
    }

    fn blank(&mut self, line: usize) {
        if !self.seen_content {
            self.fix(FixKind::BlankLineNormalization, line, "leading blank line removed");
            return;
        }
        if matches!(self.pending.last(), Some((Trivia::Blank { .. }, _))) {
            self.fix(FixKind::BlankLineNormalization, line, "consecutive blank lines collapsed");
            return;
        }
        self.pending.push((Trivia::Blank { line }, usize::MAX));
    }

    fn take_pending(&mut self) -> Vec<Trivia> {
        self.pending.drain(..).map(|(trivia, _)| trivia).collect()
    }

    /// Split off the pending trivia that closes a frame indented at `min_col`.
    fn take_trailing(&mut self, min_col: usize, parent_max: Option<usize>) -> Vec<Trivia> {
        let mut end = 0;
        for (idx, (trivia, col)) in self.pending.iter().enumerate() {
            if trivia.is_comment() {
                let belongs = *col >= min_col && parent_max.is_none_or(|p| *col > p);
                if !belongs {
                    break;
                }
                end = idx + 1;
            }
        }
        self.pending
            .drain(..end)
            .map(|(trivia, _)| trivia)
            .collect()
    }

    fn pop(&mut self) {
        if let Some(frame) = self.stack.pop() {
            let parent_max = self.stack.last().map(Frame::max_col);
            let trailing = self.take_trailing(frame.min_col(), parent_max);
            let node = frame.into_node(trailing);
            match self.stack.last_mut() {
                Some(parent) => parent.set_last_value(node),
                None => self.root = Some(node),
            }
        }
    }

    fn pop_to(&mut self, idx: usize) {
        while self.stack.len() > idx + 1 {
            self.pop();
        }
    }

    fn push(&mut self, col: usize, container: Container, line: usize) -> Result<(), UnrecoverableSyntaxError> {
        if self.stack.len() >= self.limits.max_depth {
            return Err(UnrecoverableSyntaxError::too_deep(line, self.limits.max_depth));
        }
        if let Some(parent) = self.stack.last_mut() {
            parent.open = false;
            let primary = parent.primary();
            parent.cols.retain(|&c| c == primary || c <= col);
        }
        self.stack.push(Frame::new(col, container));
        Ok(())
    }

    fn locate(&self, col: usize, want: Want) -> Option<Placement> {
        let top_idx = self.stack.len().checked_sub(1)?;
        let top = &self.stack[top_idx];

        if top.open {
            if want == Want::Item && top.is_map() && top.cols.contains(&col) {
                return Some(Placement::StartSequence);
            }
            // Deeper than the open child's own line, whatever aliases the frame holds.
            if col > top.last_col {
                return Some(Placement::Child);
            }
        }
        if let Some(idx) = self
            .stack
            .iter()
            .rposition(|frame| frame.cols.contains(&col) && frame.accepts(want))
        {
            return Some(Placement::Sibling(idx));
        }

        let mut best: Option<(usize, usize)> = None;
        for (idx, frame) in self.stack.iter().enumerate() {
            let candidate = frame.accepts(want)
                || (want == Want::Item && idx == top_idx && frame.open && frame.is_map());
            if !candidate {
                continue;
            }
            let distance = frame.distance(col);
            // `<=` prefers the deeper frame on ties.
            if best.is_none_or(|(_, d)| distance <= d) {
                best = Some((idx, distance));
            }
        }
        best.map(|(idx, _)| Placement::Realign(idx))
    }

    fn place_key(&mut self, key: &KeyLine, line: usize) -> Result<(), UnrecoverableSyntaxError> {
        if self.stack.is_empty() {
            if self.root.is_some() {
                return Err(UnrecoverableSyntaxError::new(
                    line,
                    "mapping key follows a complete top-level scalar",
                ));
            }
            self.push(key.col, Container::Map(Vec::new()), line)?;
            self.open_entry(key, line);
            return Ok(());
        }
        match self.locate(key.col, Want::Key) {
            Some(Placement::Sibling(idx)) => {
                self.pop_to(idx);
                if self.stack[idx].primary() == key.col {
                    self.stack[idx].reset_aliases();
                }
            }
            Some(Placement::Child) => self.push(key.col, Container::Map(Vec::new()), line)?,
            Some(Placement::Realign(idx)) => {
                self.pop_to(idx);
                self.stack[idx].cols.push(key.col);
                self.fix(
                    FixKind::IndentationNormalization,
                    line,
                    format!("realigned '{}' to its sibling keys", key.key),
                );
            }
            Some(Placement::StartSequence) | None => {
                return Err(UnrecoverableSyntaxError::new(
                    line,
                    format!("no enclosing mapping for key '{}'", key.key),
                ));
            }
        }
        self.open_entry(key, line);
        Ok(())
    }

    fn place_item(&mut self, item: &ItemLine, line: usize) -> Result<(), UnrecoverableSyntaxError> {
        if self.stack.is_empty() {
            if self.root.is_some() {
                return Err(UnrecoverableSyntaxError::new(
                    line,
                    "sequence item follows a complete top-level scalar",
                ));
            }
            self.push(item.col, Container::Seq(Vec::new()), line)?;
            return self.open_item(item, line);
        }
        match self.locate(item.col, Want::Item) {
            Some(Placement::Sibling(idx)) => {
                self.pop_to(idx);
                if self.stack[idx].primary() == item.col {
                    self.stack[idx].reset_aliases();
                }
            }
            Some(Placement::Child) | Some(Placement::StartSequence) => {
                self.push(item.col, Container::Seq(Vec::new()), line)?
            }
            Some(Placement::Realign(idx)) => {
                self.pop_to(idx);
                if self.stack[idx].accepts(Want::Item) {
                    self.stack[idx].cols.push(item.col);
                } else {
                    self.push(item.col, Container::Seq(Vec::new()), line)?;
                }
                self.fix(
                    FixKind::DashMisalignmentCorrection,
                    line,
                    "realigned sequence dash to its siblings",
                );
            }
            None => {
                return Err(UnrecoverableSyntaxError::new(
                    line,
                    "sequence item has no enclosing sequence or open key",
                ));
            }
        }
        self.open_item(item, line)
    }

    /// Add an entry to the mapping frame on top of the stack.
    fn open_entry(&mut self, key: &KeyLine, line: usize) {
        let trivia = self.take_pending();
        let (props, value, open) = match &key.value {
            None => (None, None, true),
            Some(v) if is_props_only(v) => (Some(v.clone()), None, true),
            Some(v) => (None, Some(Node::Scalar(Scalar::inline(v.clone(), line))), false),
        };
        let entry = Entry {
            trivia,
            key: key.key.clone(),
            props,
            comment: key.comment.clone(),
            value,
            line,
        };
        if let Some(frame) = self.stack.last_mut() {
            if let Container::Map(entries) = &mut frame.container {
                entries.push(entry);
            }
            frame.open = open;
            frame.last_col = key.col;
        }
    }

    /// Add an item to the sequence frame on top of the stack, then its body.
    fn open_item(&mut self, item: &ItemLine, line: usize) -> Result<(), UnrecoverableSyntaxError> {
        let trivia = self.take_pending();
        let mut new_item = Item {
            trivia,
            comment: item.comment.clone(),
            value: None,
            line,
        };
        let mut open = true;
        if let Some(Fragment::Scalar(scalar)) = item.body.as_deref() {
            new_item.value = Some(Node::Scalar(Scalar::inline(scalar.text.clone(), line)));
            new_item.comment = scalar.comment.clone();
            open = false;
        }
        if let Some(frame) = self.stack.last_mut() {
            if let Container::Seq(items) = &mut frame.container {
                items.push(new_item);
            }
            frame.open = open;
            frame.last_col = item.col;
        }

        match item.body.as_deref() {
            Some(Fragment::Key(key)) => {
                self.push(key.col, Container::Map(Vec::new()), line)?;
                self.open_entry(key, line);
            }
            Some(Fragment::Item(inner)) => {
                self.push(inner.col, Container::Seq(Vec::new()), line)?;
                self.open_item(inner, line)?;
            }
            Some(Fragment::Scalar(_)) | None => {}
        }
        Ok(())
    }

    fn place_scalar(&mut self, scalar: &ScalarToken, line: usize) -> Result<(), UnrecoverableSyntaxError> {
        if is_explicit_key_indicator(&scalar.text) {
            return Err(UnrecoverableSyntaxError::new(
                line,
                "explicit '?' / ':' mapping entries are not supported",
            ));
        }
        let col = scalar.col;
        let Some(top) = self.stack.last() else {
            return self.place_root_scalar(scalar, line);
        };

        if top.open && col > top.last_col {
            self.loose_value = Some((top.last_col, line, scalar.text.clone()));
            let trivia = self.take_pending();
            let value = Scalar {
                text: scalar.text.clone(),
                continuation: Vec::new(),
                own_line: true,
                trivia,
                comment: scalar.comment.clone(),
                line,
            };
            if let Some(frame) = self.stack.last_mut() {
                frame.set_last_value(Node::Scalar(value));
            }
            return Ok(());
        }

        if col > top.last_col {
            let folded = self.take_folded_pending();
            if let Some(target) = self.stack.last_mut().and_then(Frame::last_scalar_mut) {
                target.continuation.extend(folded);
                target.continuation.push(ScalarLine::Folded {
                    text: continuation_text(scalar),
                    line,
                });
                return Ok(());
            }
        }

        Err(UnrecoverableSyntaxError::new(
            line,
            format!(
                "'{}' is neither a key nor a sequence item at column {}",
                scalar.text, col
            ),
        ))
    }

    fn place_root_scalar(&mut self, scalar: &ScalarToken, line: usize) -> Result<(), UnrecoverableSyntaxError> {
        match &mut self.root {
            None => {
                let trivia = self.take_pending();
                self.root = Some(Node::Scalar(Scalar {
                    text: scalar.text.clone(),
                    continuation: Vec::new(),
                    own_line: false,
                    trivia,
                    comment: scalar.comment.clone(),
                    line,
                }));
                Ok(())
            }
            Some(Node::Scalar(_)) => {
                let folded = self.take_folded_pending();
                if let Some(Node::Scalar(root)) = &mut self.root {
                    root.continuation.extend(folded);
                    root.continuation.push(ScalarLine::Folded {
                        text: continuation_text(scalar),
                        line,
                    });
                }
                Ok(())
            }
            Some(_) => Err(UnrecoverableSyntaxError::new(
                line,
                "scalar line after the document's root collection",
            )),
        }
    }

    fn take_folded_pending(&mut self) -> Vec<ScalarLine> {
        self.pending
            .drain(..)
            .map(|(trivia, _)| match trivia {
                Trivia::Blank { line } => ScalarLine::Folded {
                    text: String::new(),
                    line,
                },
                Trivia::Comment { text, line } => ScalarLine::Comment { text, line },
            })
            .collect()
    }

    fn continuation(&mut self, cont: &Continuation, line: usize) -> Result<(), UnrecoverableSyntaxError> {
        let next = match cont {
            Continuation::Block { rel, text } => ScalarLine::Block {
                rel: *rel,
                text: text.clone(),
                line,
            },
            Continuation::Folded(text) => ScalarLine::Folded {
                text: text.clone(),
                line,
            },
        };
        let target = match self.stack.last_mut() {
            Some(frame) => frame.last_scalar_mut(),
            None => match &mut self.root {
                Some(Node::Scalar(scalar)) => Some(scalar),
                _ => None,
            },
        };
        match target {
            Some(scalar) => {
                scalar.continuation.push(next);
                Ok(())
            }
            None => Err(UnrecoverableSyntaxError::new(
                line,
                "continuation line without an opening scalar",
            )),
        }
    }

    fn finish(&mut self) -> (Option<Node>, Vec<Trivia>) {
        while matches!(self.pending.last(), Some((Trivia::Blank { .. }, _))) {
            if let Some((trivia, _)) = self.pending.pop() {
                self.fix(
                    FixKind::BlankLineNormalization,
                    trivia.line(),
                    "trailing blank line removed",
                );
            }
        }
        while !self.stack.is_empty() {
            self.pop();
        }
        let trailing = self.take_pending();
        (self.root.take(), trailing)
    }
}

fn continuation_text(scalar: &ScalarToken) -> String {
    match &scalar.comment {
        Some(comment) => format!("{}{}{}", scalar.text, " ".repeat(comment.gap), comment.text),
        None => scalar.text.clone(),
    }
}

/// `? key` or `: value` written as a plain line.
fn is_explicit_key_indicator(text: &str) -> bool {
    ["?", ":"]
        .iter()
        .any(|indicator| text == *indicator || text.starts_with(&format!("{} ", indicator)))
}

/// `&anchor`, `!tag` or both, with nothing else.
fn is_props_only(value: &str) -> bool {
    value
        .split_whitespace()
        .all(|token| token.starts_with('&') || token.starts_with('!'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::kubecuro::tokenizer::tokenize;

    fn limits() -> Limits {
        Limits {
            max_depth: 64,
            deadline: None,
        }
    }

    fn build_text(text: &str) -> Result<(Document, Vec<FixRecord>), UnrecoverableSyntaxError> {
        build(&tokenize(text, 2), None, limits())
    }

    fn keys(node: &Node) -> Vec<String> {
        node.as_mapping()
            .unwrap()
            .children
            .iter()
            .map(|e| e.key.clone())
            .collect()
    }

    #[test]
    fn test_nested_mapping() {
        let (doc, fixes) = build_text("a:\n  b: 1\n  c:\n    d: 2\ne: 3\n").unwrap();
        let root = doc.root.unwrap();
        assert_eq!(keys(&root), vec!["a", "e"]);
        let a = root.get("a").unwrap();
        assert_eq!(keys(a), vec!["b", "c"]);
        assert_eq!(keys(a.get("c").unwrap()), vec!["d"]);
        assert!(fixes.is_empty());
    }

    #[test]
    fn test_four_space_indentation() {
        let (doc, _) = build_text("spec:\n    replicas: 1\n    template:\n        metadata: {}\n").unwrap();
        let spec = doc.root.unwrap().get("spec").cloned().unwrap();
        assert_eq!(keys(&spec), vec!["replicas", "template"]);
    }

    #[test]
    fn test_indentless_sequence() {
        let (doc, _) = build_text("items:\n- a\n- b\nnext: 1\n").unwrap();
        let root = doc.root.unwrap();
        assert_eq!(keys(&root), vec!["items", "next"]);
        match root.get("items").unwrap() {
            Node::Sequence(seq) => assert_eq!(seq.children.len(), 2),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_misaligned_dash() {
        let (doc, fixes) = build_text("items:\n  - a\n   - b\n  - c\n").unwrap();
        match doc.root.unwrap().get("items").unwrap() {
            Node::Sequence(seq) => assert_eq!(seq.children.len(), 3),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(fixes.len(), 1);
        assert_eq!(fixes[0].kind, FixKind::DashMisalignmentCorrection);
        assert_eq!(fixes[0].line, 3);
    }

    #[test]
    fn test_misindented_key_realigned() {
        let (doc, fixes) = build_text("metadata:\n    name: web\n   labels:\n     app: web\n").unwrap();
        let metadata = doc.root.unwrap().get("metadata").cloned().unwrap();
        assert_eq!(keys(&metadata), vec!["name", "labels"]);
        assert!(fixes.iter().any(|f| f.kind == FixKind::IndentationNormalization && f.line == 3));
    }

    #[test]
    fn test_realigned_key_opens_nested_block() {
        let (doc, fixes) = build_text("metadata:\n  name: x\n labels:\n  app: y\nspec:\n  replicas: 1\n").unwrap();
        let root = doc.root.unwrap();
        assert_eq!(keys(&root), vec!["metadata", "spec"]);
        let metadata = root.get("metadata").unwrap();
        assert_eq!(keys(metadata), vec!["name", "labels"]);
        assert_eq!(keys(metadata.get("labels").unwrap()), vec!["app"]);
        assert_eq!(keys(root.get("spec").unwrap()), vec!["replicas"]);
        assert_eq!(fixes.len(), 1);
        assert_eq!(fixes[0].line, 3);
    }

    #[test]
    fn test_alias_dropped_when_primary_column_returns() {
        let (doc, _) = build_text("a: 1\n  b: 2\nc:\n  d: 3\n").unwrap();
        let root = doc.root.unwrap();
        assert_eq!(keys(&root), vec!["a", "b", "c"]);
        assert_eq!(keys(root.get("c").unwrap()), vec!["d"]);

        let (doc, _) = build_text("kind: Pod\n  apiVersion: v1\nmetadata:\n  name: web\n  labels:\n    app: web\n").unwrap();
        let root = doc.root.unwrap();
        assert_eq!(keys(&root), vec!["kind", "apiVersion", "metadata"]);
        let metadata = root.get("metadata").unwrap();
        assert_eq!(keys(metadata), vec!["name", "labels"]);
        assert_eq!(keys(metadata.get("labels").unwrap()), vec!["app"]);
    }

    #[test]
    fn test_realigned_siblings_share_the_alias() {
        let (doc, fixes) = build_text("metadata:\n    name: web\n   labels: {}\n   namespace: shop\n").unwrap();
        let metadata = doc.root.unwrap().get("metadata").cloned().unwrap();
        assert_eq!(keys(&metadata), vec!["name", "labels", "namespace"]);
        assert_eq!(fixes.len(), 1);
        assert_eq!(fixes[0].line, 3);
    }

    #[test]
    fn test_bare_word_without_nested_block_is_unrecoverable() {
        let err = build_text(
            "apiVersion: v1\nkind: Service\nmetadata:\n  name\n  namespace: prod\nspec:\n  selector:\n    app: web\n",
        )
        .unwrap_err();
        assert_eq!(err.line, 4);
        assert!(err.reason.contains("'name'"));
    }

    #[test]
    fn test_own_line_value_then_sibling_is_fine() {
        let (doc, _) = build_text("spec:\n  replicas:\n    3\n  paused: true\n").unwrap();
        let spec = doc.root.unwrap().get("spec").cloned().unwrap();
        assert_eq!(keys(&spec), vec!["replicas", "paused"]);
    }

    #[test]
    fn test_explicit_key_lines_are_unrecoverable() {
        let err = build_text("? complex\n: value\n").unwrap_err();
        assert_eq!(err.line, 1);
        let err = build_text("a:\n  ? k\n  : v\n").unwrap_err();
        assert_eq!(err.line, 2);
    }

    #[test]
    fn test_comment_attaches_to_next_node() {
        let (doc, _) = build_text("a: 1\n# about b\nb: 2\n").unwrap();
        let root = doc.root.unwrap();
        let b = root.entry("b").unwrap();
        assert_eq!(
            b.trivia,
            vec![Trivia::Comment {
                text: "# about b".to_string(),
                line: 2
            }]
        );
    }

    #[test]
    fn test_trailing_comment_stays_in_block() {
        let (doc, _) = build_text("a:\n  b: 1\n  # end of a\nc: 2\n").unwrap();
        let root = doc.root.unwrap();
        match root.get("a").unwrap() {
            Node::Mapping(m) => assert_eq!(m.trailing.len(), 1),
            other => panic!("unexpected {:?}", other),
        }
        assert!(root.entry("c").unwrap().trivia.is_empty());
    }

    #[test]
    fn test_scalar_at_mapping_level_is_unrecoverable() {
        let err = build_text("a: 1\nloose words here\nb: 2\n").unwrap_err();
        assert_eq!(err.line, 2);
        assert!(!err.is_budget());
    }

    #[test]
    fn test_plain_continuation() {
        let (doc, _) = build_text("description: one\n  two\n").unwrap();
        let root = doc.root.unwrap();
        let scalar = root.get("description").unwrap().as_scalar().unwrap();
        assert_eq!(scalar.logical_text(), "one two");
    }

    #[test]
    fn test_depth_limit() {
        let text = "a:\n b:\n  c:\n   d:\n    e: 1\n";
        let err = build(
            &tokenize(text, 2),
            None,
            Limits {
                max_depth: 3,
                deadline: None,
            },
        )
        .unwrap_err();
        assert!(err.is_budget());
    }

    #[test]
    fn test_blank_lines_collapse() {
        let (doc, fixes) = build_text("\na: 1\n\n\nb: 2\n\n").unwrap();
        let root = doc.root.unwrap();
        assert_eq!(root.entry("b").unwrap().trivia.len(), 1);
        assert_eq!(
            fixes
                .iter()
                .filter(|f| f.kind == FixKind::BlankLineNormalization)
                .count(),
            3
        );
    }

    #[test]
    fn test_item_with_nested_sequence() {
        let (doc, _) = build_text("- - a\n  - b\n- c\n").unwrap();
        match doc.root.unwrap() {
            Node::Sequence(seq) => {
                assert_eq!(seq.children.len(), 2);
                match seq.children[0].value.as_ref().unwrap() {
                    Node::Sequence(inner) => assert_eq!(inner.children.len(), 2),
                    other => panic!("unexpected {:?}", other),
                }
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
