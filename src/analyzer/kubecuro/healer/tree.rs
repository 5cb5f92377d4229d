//! Comment-preserving document tree produced by the healer.

pub use crate::analyzer::kubecuro::tokenizer::InlineComment;

/// Comment and blank lines that precede (or close) a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trivia {
    Blank { line: usize },
    Comment { text: String, line: usize },
}

impl Trivia {
    pub fn line(&self) -> usize {
        match self {
            Trivia::Blank { line } | Trivia::Comment { line, .. } => *line,
        }
    }

    pub fn is_comment(&self) -> bool {
        matches!(self, Trivia::Comment { .. })
    }
}

/// A line following the first line of a multi-line scalar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScalarLine {
    /// Block scalar content, indented `rel` columns past the block indentation.
    Block { rel: usize, text: String, line: usize },
    /// Plain, quoted or flow continuation.
    Folded { text: String, line: usize },
    /// Comment interleaved with a plain continuation.
    Comment { text: String, line: usize },
}

/// A scalar with its original lexical form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scalar {
    /// Text of the first line (includes tags, anchors, block headers, quotes).
    pub text: String,
    pub continuation: Vec<ScalarLine>,
    /// The scalar started on its own line below its key or dash.
    pub own_line: bool,
    /// Trivia before an own-line scalar.
    pub trivia: Vec<Trivia>,
    /// Comment trailing an own-line scalar.
    pub comment: Option<InlineComment>,
    pub line: usize,
}

impl Scalar {
    pub fn inline(text: impl Into<String>, line: usize) -> Self {
        Self {
            text: text.into(),
            continuation: Vec::new(),
            own_line: false,
            trivia: Vec::new(),
            comment: None,
            line,
        }
    }

    /// The scalar opens a `|` or `>` block.
    pub fn is_block(&self) -> bool {
        self.continuation
            .iter()
            .any(|line| matches!(line, ScalarLine::Block { .. }))
            || strip_props(&self.text).starts_with(['|', '>'])
    }

    /// Best-effort logical text, used when the tree is projected to values.
    pub fn logical_text(&self) -> String {
        if self.continuation.is_empty() {
            return self.text.clone();
        }
        if self.is_block() {
            let mut out = String::new();
            for line in &self.continuation {
                if let ScalarLine::Block { rel, text, .. } = line {
                    out.push_str(&" ".repeat(*rel));
                    out.push_str(text);
                }
                out.push('\n');
            }
            return out;
        }
        let mut parts = vec![self.text.clone()];
        for line in &self.continuation {
            if let ScalarLine::Folded { text, .. } = line {
                parts.push(text.clone());
            }
        }
        parts.join(" ")
    }
}

fn strip_props(mut s: &str) -> &str {
    while s.starts_with(['&', '!']) {
        match s.find(' ') {
            Some(end) => s = s[end..].trim_start(),
            None => return "",
        }
    }
    s
}

/// A mapping entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub trivia: Vec<Trivia>,
    /// Key in its lexical form.
    pub key: String,
    /// Anchor or tag written after the colon of a key whose value is a block.
    pub props: Option<String>,
    /// Comment on the key line.
    pub comment: Option<InlineComment>,
    pub value: Option<Node>,
    pub line: usize,
}

impl Entry {
    /// The key with surrounding quotes removed.
    pub fn key_text(&self) -> &str {
        unquote(&self.key)
    }
}

/// A sequence item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub trivia: Vec<Trivia>,
    /// Comment on the dash line.
    pub comment: Option<InlineComment>,
    pub value: Option<Node>,
    pub line: usize,
}

/// A block mapping or sequence with the comments that close it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collection<T> {
    pub children: Vec<T>,
    /// Comments after the last child, indented at the children's level.
    pub trailing: Vec<Trivia>,
}

impl<T> Collection<T> {
    pub fn new(children: Vec<T>) -> Self {
        Self {
            children,
            trailing: Vec::new(),
        }
    }
}

/// A YAML node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Mapping(Collection<Entry>),
    Sequence(Collection<Item>),
    Scalar(Scalar),
}

impl Node {
    pub fn as_mapping(&self) -> Option<&Collection<Entry>> {
        match self {
            Node::Mapping(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_mapping_mut(&mut self) -> Option<&mut Collection<Entry>> {
        match self {
            Node::Mapping(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            Node::Scalar(s) => Some(s),
            _ => None,
        }
    }

    /// Look up a key in a mapping node.
    pub fn get(&self, key: &str) -> Option<&Node> {
        self.entry(key)?.value.as_ref()
    }

    pub fn entry(&self, key: &str) -> Option<&Entry> {
        self.as_mapping()?
            .children
            .iter()
            .find(|entry| entry.key_text() == key)
    }

    /// First source line of the node.
    pub fn line(&self) -> Option<usize> {
        match self {
            Node::Mapping(m) => m.children.first().map(|e| e.line),
            Node::Sequence(s) => s.children.first().map(|i| i.line),
            Node::Scalar(s) => Some(s.line),
        }
    }
}

/// One `---`-delimited document.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Document {
    /// The `---` / `...` line that opened the document, if any.
    pub marker: Option<Marker>,
    pub root: Option<Node>,
    /// Comments after the root content.
    pub trailing: Vec<Trivia>,
}

impl Document {
    /// The document holds only comments (or nothing).
    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Marker {
    pub text: String,
    pub line: usize,
}

/// Remove one level of YAML quoting from a lexical scalar.
pub fn unquote(text: &str) -> &str {
    let bytes = text.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if (first == b'"' && last == b'"') || (first == b'\'' && last == b'\'') {
            return &text[1..text.len() - 1];
        }
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unquote() {
        assert_eq!(unquote("\"web\""), "web");
        assert_eq!(unquote("'web'"), "web");
        assert_eq!(unquote("web"), "web");
        assert_eq!(unquote("\""), "\"");
    }

    #[test]
    fn test_logical_text() {
        let mut scalar = Scalar::inline("|", 1);
        scalar.continuation.push(ScalarLine::Block {
            rel: 0,
            text: "a".to_string(),
            line: 2,
        });
        scalar.continuation.push(ScalarLine::Block {
            rel: 2,
            text: "b".to_string(),
            line: 3,
        });
        assert_eq!(scalar.logical_text(), "a\n  b\n");

        let mut folded = Scalar::inline("one", 1);
        folded.continuation.push(ScalarLine::Folded {
            text: "two".to_string(),
            line: 2,
        });
        assert_eq!(folded.logical_text(), "one two");
    }
}
