//! Canonical serialization of healed documents.
//!
//! Two-space indentation, one construct per line, comments re-indented to
//! the node they belong to. Every output line remembers the source line it
//! came from so the healer can report what changed.

use super::tree::{Document, Entry, InlineComment, Item, Node, Scalar, ScalarLine, Trivia};

const STEP: usize = 2;

/// One output line and the source line it was produced from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmittedLine {
    pub text: String,
    pub source: usize,
}

/// Serialize a document.
pub fn emit(document: &Document, indent_sequences: bool) -> Vec<EmittedLine> {
    let mut emitter = Emitter {
        indent_sequences,
        out: Vec::new(),
    };
    if let Some(marker) = &document.marker {
        emitter.push(marker.text.clone(), marker.line);
    }
    if let Some(root) = &document.root {
        emitter.block(root, 0);
    }
    emitter.trivia(&document.trailing, 0);
    emitter.out
}

struct Emitter {
    indent_sequences: bool,
    out: Vec<EmittedLine>,
}

impl Emitter {
    fn push(&mut self, text: String, source: usize) {
        self.out.push(EmittedLine { text, source });
    }

    fn trivia(&mut self, trivia: &[Trivia], col: usize) {
        for t in trivia {
            match t {
                Trivia::Blank { line } => self.push(String::new(), *line),
                Trivia::Comment { text, line } => self.push(format!("{}{}", pad(col), text), *line),
            }
        }
    }

    fn block(&mut self, node: &Node, col: usize) {
        match node {
            Node::Mapping(mapping) => {
                for entry in &mapping.children {
                    self.entry(entry, col);
                }
                self.trivia(&mapping.trailing, col);
            }
            Node::Sequence(sequence) => {
                for item in &sequence.children {
                    self.item(item, col);
                }
                self.trivia(&sequence.trailing, col);
            }
            Node::Scalar(scalar) => {
                self.trivia(&scalar.trivia, col);
                self.push(
                    with_comment(format!("{}{}", pad(col), scalar.text), &scalar.comment),
                    scalar.line,
                );
                self.continuation(scalar, col + STEP);
            }
        }
    }

    fn entry(&mut self, entry: &Entry, col: usize) {
        self.trivia(&entry.trivia, col);
        let mut head = format!("{}{}:", pad(col), entry.key);
        if let Some(props) = &entry.props {
            head.push(' ');
            head.push_str(props);
        }
        match &entry.value {
            Some(Node::Scalar(scalar)) if !scalar.own_line => {
                head.push(' ');
                head.push_str(&scalar.text);
                self.push(with_comment(head, &entry.comment), entry.line);
                self.continuation(scalar, col + STEP);
            }
            Some(node @ Node::Sequence(_)) => {
                self.push(with_comment(head, &entry.comment), entry.line);
                let child = if self.indent_sequences { col + STEP } else { col };
                self.block(node, child);
            }
            Some(node) => {
                self.push(with_comment(head, &entry.comment), entry.line);
                self.block(node, col + STEP);
            }
            None => self.push(with_comment(head, &entry.comment), entry.line),
        }
    }

    fn item(&mut self, item: &Item, col: usize) {
        self.trivia(&item.trivia, col);
        let dash = format!("{}-", pad(col));
        match &item.value {
            None => self.push(with_comment(dash, &item.comment), item.line),
            Some(Node::Scalar(scalar)) if !scalar.own_line => {
                self.push(
                    with_comment(format!("{} {}", dash, scalar.text), &item.comment),
                    item.line,
                );
                self.continuation(scalar, col + STEP);
            }
            Some(node @ Node::Scalar(_)) => {
                self.push(with_comment(dash, &item.comment), item.line);
                self.block(node, col + STEP);
            }
            Some(node) => {
                // The first child shares the dash line unless something must sit between them.
                let inline = item.comment.is_none() && first_child_bare(node);
                if !inline {
                    self.push(with_comment(dash, &item.comment), item.line);
                }
                let start = self.out.len();
                self.block(node, col + STEP);
                if inline {
                    if let Some(first) = self.out.get_mut(start) {
                        first
                            .text
                            .replace_range(..col + STEP, &format!("{}- ", pad(col)));
                    }
                }
            }
        }
    }

    fn continuation(&mut self, scalar: &Scalar, base: usize) {
        for line in &scalar.continuation {
            match line {
                ScalarLine::Block { rel, text, line } => {
                    let text = if text.is_empty() {
                        String::new()
                    } else {
                        format!("{}{}", pad(base + rel), text)
                    };
                    self.push(text, *line);
                }
                ScalarLine::Folded { text, line } => {
                    let text = if text.is_empty() {
                        String::new()
                    } else {
                        format!("{}{}", pad(base), text)
                    };
                    self.push(text, *line);
                }
                ScalarLine::Comment { text, line } => self.push(format!("{}{}", pad(base), text), *line),
            }
        }
    }
}

fn first_child_bare(node: &Node) -> bool {
    match node {
        Node::Mapping(mapping) => mapping
            .children
            .first()
            .is_some_and(|entry| entry.trivia.is_empty()),
        Node::Sequence(sequence) => sequence
            .children
            .first()
            .is_some_and(|item| item.trivia.is_empty()),
        Node::Scalar(_) => false,
    }
}

fn pad(col: usize) -> String {
    " ".repeat(col)
}

fn with_comment(mut text: String, comment: &Option<InlineComment>) -> String {
    if let Some(comment) = comment {
        text.push_str(&" ".repeat(comment.gap.max(1)));
        text.push_str(&comment.text);
    }
    text
}

#[cfg(test)]
mod tests {
    use super::super::builder::{Limits, build};
    use super::*;
    use crate::analyzer::kubecuro::tokenizer::tokenize;

    fn render(text: &str, indent_sequences: bool) -> String {
        let limits = Limits {
            max_depth: 64,
            deadline: None,
        };
        let (document, _) = build(&tokenize(text, 2), None, limits).unwrap();
        emit(&document, indent_sequences)
            .into_iter()
            .map(|line| line.text)
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn test_reindents_to_two_spaces() {
        let out = render("spec:\n    replicas: 2\n    selector:\n        app: web\n", true);
        assert_eq!(out, "spec:\n  replicas: 2\n  selector:\n    app: web");
    }

    #[test]
    fn test_indents_sequences_under_key() {
        let out = render("ports:\n- port: 80\n  name: http\n- port: 443\n", true);
        assert_eq!(out, "ports:\n  - port: 80\n    name: http\n  - port: 443");
    }

    #[test]
    fn test_indentless_sequences_when_disabled() {
        let out = render("ports:\n  - 80\n  - 443\n", false);
        assert_eq!(out, "ports:\n- 80\n- 443");
    }

    #[test]
    fn test_comments_follow_their_nodes() {
        let input = "# head\nmetadata:\n    # the name\n    name: web   # inline\n";
        let out = render(input, true);
        assert_eq!(out, "# head\nmetadata:\n  # the name\n  name: web   # inline");
    }

    #[test]
    fn test_block_scalar_reindented_relative() {
        let input = "data:\n    run.sh: |\n        echo a\n          echo b\n";
        let out = render(input, true);
        assert_eq!(out, "data:\n  run.sh: |\n    echo a\n      echo b");
    }

    #[test]
    fn test_item_comment_keeps_dash_line() {
        let out = render("- # first\n  name: a\n", true);
        assert_eq!(out, "- # first\n  name: a");
    }

    #[test]
    fn test_source_tags() {
        let limits = Limits {
            max_depth: 64,
            deadline: None,
        };
        let (document, _) = build(&tokenize("a:\n    b: 1\n", 2), None, limits).unwrap();
        let lines = emit(&document, true);
        assert_eq!(lines[0].source, 1);
        assert_eq!(lines[1].source, 2);
    }
}
