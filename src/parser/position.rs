//! Source text and positions within it

use std::fmt;
use std::sync::Arc;

/// Byte range in source text
pub type Span = std::ops::Range<usize>;

/// The raw text of one template file
#[derive(Debug)]
pub struct SourceContext {
    content: String,
    file_name: Option<String>,
    last_modified: u64,
}

impl SourceContext {
    pub fn new(content: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            content: content.into(),
            file_name: None,
            last_modified: 0,
        })
    }

    pub fn with_file(
        content: impl Into<String>,
        file_name: impl Into<String>,
        last_modified: u64,
    ) -> Arc<Self> {
        Arc::new(Self {
            content: content.into(),
            file_name: Some(file_name.into()),
            last_modified,
        })
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn file_name(&self) -> Option<&str> {
        self.file_name.as_deref()
    }

    pub fn last_modified(&self) -> u64 {
        self.last_modified
    }
}

/// An immutable cursor into a [`SourceContext`]
///
/// Positions are cheap to clone and compare equal when they point at the same
/// offset of the same file. Line and column are computed on demand and are
/// 1-based.
#[derive(Clone)]
pub struct Position {
    source: Arc<SourceContext>,
    offset: usize,
}

impl Position {
    pub fn new(source: Arc<SourceContext>, offset: usize) -> Self {
        let offset = offset.min(source.content.len());
        Self { source, offset }
    }

    /// Position at the start of the source
    pub fn start(source: Arc<SourceContext>) -> Self {
        Self::new(source, 0)
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn source(&self) -> &Arc<SourceContext> {
        &self.source
    }

    pub fn file_name(&self) -> Option<&str> {
        self.source.file_name()
    }

    /// Move forward by `count` bytes, clamped to the end of the source
    pub fn advance(&self, count: usize) -> Self {
        Self::new(self.source.clone(), self.offset + count)
    }

    /// The next `count` characters, or fewer at the end of input
    pub fn peek(&self, count: usize) -> &str {
        let rest = self.remaining();
        let end = rest
            .char_indices()
            .nth(count)
            .map(|(index, _)| index)
            .unwrap_or(rest.len());
        &rest[..end]
    }

    /// Text from this position to the end of the source
    pub fn remaining(&self) -> &str {
        self.source.content.get(self.offset..).unwrap_or("")
    }

    /// Number of bytes left to read
    pub fn potential_length(&self) -> usize {
        self.source.content.len() - self.offset
    }

    pub fn line(&self) -> usize {
        self.before().matches('\n').count() + 1
    }

    pub fn column(&self) -> usize {
        let before = self.before();
        let line_start = before.rfind('\n').map(|index| index + 1).unwrap_or(0);
        before[line_start..].chars().count() + 1
    }

    /// A short excerpt around the position, marked `[error:]`
    pub fn excerpt(&self) -> String {
        let before = self.before();
        let head_start = before
            .char_indices()
            .rev()
            .take(30)
            .last()
            .map(|(index, _)| index)
            .unwrap_or(before.len());
        format!(
            "{}[error:]{}",
            &before[head_start..],
            self.peek(30)
        )
    }

    fn before(&self) -> &str {
        self.source.content.get(..self.offset).unwrap_or("")
    }
}

impl PartialEq for Position {
    fn eq(&self, other: &Self) -> bool {
        self.offset == other.offset && self.source.file_name == other.source.file_name
    }
}

impl Eq for Position {}

impl fmt::Debug for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Position({})", self)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.file_name().unwrap_or("<template>"),
            self.line(),
            self.column()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_and_column() {
        let source = SourceContext::new("one\ntwo\nthree");
        let pos = Position::new(source, 9);
        assert_eq!(pos.line(), 3);
        assert_eq!(pos.column(), 2);
        assert_eq!(pos.peek(3), "hre");
    }

    #[test]
    fn test_advance_is_clamped() {
        let source = SourceContext::new("abc");
        let pos = Position::start(source).advance(10);
        assert_eq!(pos.offset(), 3);
        assert_eq!(pos.potential_length(), 0);
        assert_eq!(pos.peek(4), "");
    }

    #[test]
    fn test_excerpt_marks_error() {
        let source = SourceContext::new("<p>hello < world</p>");
        let pos = Position::new(source, 9);
        assert_eq!(pos.excerpt(), "<p>hello [error:]< world</p>");
    }

    #[test]
    fn test_display_includes_file() {
        let source = SourceContext::with_file("a\nb", "home/index.spark", 7);
        let pos = Position::new(source, 2);
        assert_eq!(pos.to_string(), "home/index.spark:2:1");
    }
}
