use std::fmt;
use std::fmt::Display;
use std::sync::Arc;

/// Source location of a node, kept for diagnostics only.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Span {
    pub source: Arc<str>,
    pub line: u32,
    pub column: u32,
}

impl Span {
    pub fn new(source: &str, line: u32, column: u32) -> Span {
        Span {
            source: Arc::from(source),
            line,
            column,
        }
    }
}

impl Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.source, self.line, self.column)
    }
}
