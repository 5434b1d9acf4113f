use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// A contiguous fragment of one file with line range and classification metadata
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// The chunk text
    pub content: String,

    /// Location and classification
    pub metadata: ChunkMetadata,
}

impl Chunk {
    /// Create a chunk and derive size, line count and complexity from its content
    #[must_use]
    pub fn new(content: impl Into<String>, metadata: ChunkMetadata) -> Self {
        let mut chunk = Self {
            content: content.into(),
            metadata,
        };
        chunk.refresh();
        chunk
    }

    /// Recompute the derived metadata fields after the content or range changed
    pub fn refresh(&mut self) {
        if self.metadata.end_line < self.metadata.start_line {
            self.metadata.end_line = self.metadata.start_line;
        }
        self.metadata.size = self.content.chars().count();
        self.metadata.line_count = self.metadata.end_line - self.metadata.start_line + 1;
        self.metadata.complexity = estimate_complexity(&self.content);
    }

    /// Content length in characters
    #[must_use]
    pub fn len(&self) -> usize {
        self.content.chars().count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    #[must_use]
    pub const fn start_line(&self) -> usize {
        self.metadata.start_line
    }

    #[must_use]
    pub const fn end_line(&self) -> usize {
        self.metadata.end_line
    }

    #[must_use]
    pub const fn chunk_type(&self) -> ChunkType {
        self.metadata.chunk_type
    }

    /// Number of source lines spanned by this chunk
    #[must_use]
    pub const fn line_count(&self) -> usize {
        self.metadata.end_line.saturating_sub(self.metadata.start_line) + 1
    }

    /// Check if chunk contains a specific line
    #[must_use]
    pub const fn contains_line(&self, line: usize) -> bool {
        line >= self.metadata.start_line && line <= self.metadata.end_line
    }
}

/// Metadata about a chunk
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkMetadata {
    /// Start line (1-indexed)
    pub start_line: usize,

    /// End line (1-indexed, inclusive)
    pub end_line: usize,

    pub language: String,

    pub file_path: Option<String>,

    #[serde(rename = "type")]
    pub chunk_type: ChunkType,

    pub complexity: u32,

    /// Content length in characters
    pub size: usize,

    pub line_count: usize,

    /// Name of the strategy that produced the chunk
    pub strategy: String,

    pub function_name: Option<String>,

    pub class_name: Option<String>,

    /// Original types folded into a merged chunk
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub merged_types: Vec<ChunkType>,

    /// Set once trailing context has been appended by the overlap pass
    #[serde(default)]
    pub overlap_applied: bool,
}

impl ChunkMetadata {
    /// Create metadata for a line range; derived fields are filled by [`Chunk::new`]
    pub fn new(
        start_line: usize,
        end_line: usize,
        language: impl Into<String>,
        strategy: impl Into<String>,
    ) -> Self {
        Self {
            start_line,
            end_line,
            language: language.into(),
            file_path: None,
            chunk_type: ChunkType::Code,
            complexity: 0,
            size: 0,
            line_count: 0,
            strategy: strategy.into(),
            function_name: None,
            class_name: None,
            merged_types: Vec::new(),
            overlap_applied: false,
        }
    }

    /// Builder: set chunk type
    #[must_use]
    pub const fn chunk_type(mut self, chunk_type: ChunkType) -> Self {
        self.chunk_type = chunk_type;
        self
    }

    /// Builder: set file path
    #[must_use]
    pub fn file_path(mut self, path: Option<String>) -> Self {
        self.file_path = path;
        self
    }

    /// Builder: set function name
    #[must_use]
    pub fn function_name(mut self, name: impl Into<String>) -> Self {
        self.function_name = Some(name.into());
        self
    }

    /// Builder: set class name
    #[must_use]
    pub fn class_name(mut self, name: impl Into<String>) -> Self {
        self.class_name = Some(name.into());
        self
    }
}

/// Type of chunk based on semantic meaning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum ChunkType {
    /// Standalone function
    Function,
    /// Class, struct or impl block
    Class,
    /// Function nested inside a class
    Method,
    /// Interface/trait definition
    Interface,
    /// Plain code between declarations
    Code,
    /// Result of merging several chunks
    Merged,
    /// Piece of an oversized chunk split with overlap
    OverlapSplit,
    /// Non-code text
    Generic,
}

impl ChunkType {
    /// Independent chunks carry a whole declaration and are never folded into a neighbour
    #[must_use]
    pub const fn is_independent(self) -> bool {
        matches!(
            self,
            Self::Function | Self::Class | Self::Method | Self::Interface
        )
    }

    /// Get human-readable name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Function => "function",
            Self::Class => "class",
            Self::Method => "method",
            Self::Interface => "interface",
            Self::Code => "code",
            Self::Merged => "merged",
            Self::OverlapSplit => "overlap-split",
            Self::Generic => "generic",
        }
    }
}

impl std::fmt::Display for ChunkType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Line-addressable view over the original file content
#[derive(Debug, Clone)]
pub struct SourceText<'a> {
    lines: Vec<&'a str>,
}

impl<'a> SourceText<'a> {
    #[must_use]
    pub fn new(content: &'a str) -> Self {
        Self {
            lines: content.lines().collect(),
        }
    }

    /// Total number of lines
    #[must_use]
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Get a single line (1-indexed)
    #[must_use]
    pub fn line(&self, line: usize) -> Option<&'a str> {
        line.checked_sub(1).and_then(|idx| self.lines.get(idx).copied())
    }

    /// All lines
    #[must_use]
    pub fn lines(&self) -> &[&'a str] {
        &self.lines
    }

    /// Join the inclusive 1-indexed range, clamped to the available lines
    #[must_use]
    pub fn slice(&self, start_line: usize, end_line: usize) -> String {
        let start = start_line.max(1) - 1;
        let end = end_line.min(self.lines.len());
        if start >= end {
            return String::new();
        }
        self.lines[start..end].join("\n")
    }

    /// Whether the chunk text is exactly its source range
    #[must_use]
    pub fn matches(&self, chunk: &Chunk) -> bool {
        chunk.end_line() <= self.len() && self.slice(chunk.start_line(), chunk.end_line()) == chunk.content
    }
}

static COMPLEXITY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(if|else|elif|for|while|loop|match|switch|case|catch|except|try|when|unless)\b|&&|\|\||\?")
        .unwrap_or_else(|_| unreachable!("complexity pattern is a valid regex"))
});

/// Rough cyclomatic estimate: one plus branch keywords, boolean operators and opened blocks
#[must_use]
pub fn estimate_complexity(content: &str) -> u32 {
    let branches = COMPLEXITY_RE.find_iter(content).count();
    let blocks = content.matches('{').count();
    let total = 1 + branches + blocks / 2;
    u32::try_from(total).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(start: usize, end: usize, content: &str) -> Chunk {
        Chunk::new(content, ChunkMetadata::new(start, end, "rust", "line"))
    }

    #[test]
    fn new_derives_size_and_line_count() {
        let c = chunk(10, 15, "fn a() {}");
        assert_eq!(c.metadata.size, 9);
        assert_eq!(c.metadata.line_count, 6);
        assert_eq!(c.line_count(), 6);
        assert!(c.metadata.complexity >= 1);
    }

    #[test]
    fn refresh_repairs_inverted_range() {
        let mut c = chunk(5, 5, "x");
        c.metadata.end_line = 2;
        c.refresh();
        assert_eq!(c.start_line(), 5);
        assert_eq!(c.end_line(), 5);
    }

    #[test]
    fn size_counts_characters_not_bytes() {
        let c = chunk(1, 1, "héllo");
        assert_eq!(c.len(), 5);
    }

    #[test]
    fn chunk_contains_line() {
        let c = chunk(10, 15, "code");
        assert!(c.contains_line(10));
        assert!(c.contains_line(15));
        assert!(!c.contains_line(9));
        assert!(!c.contains_line(16));
    }

    #[test]
    fn independent_types() {
        assert!(ChunkType::Function.is_independent());
        assert!(ChunkType::Interface.is_independent());
        assert!(!ChunkType::Code.is_independent());
        assert!(!ChunkType::Merged.is_independent());
    }

    #[test]
    fn chunk_type_serializes_kebab_case() {
        let json = serde_json::to_string(&ChunkType::OverlapSplit).unwrap();
        assert_eq!(json, "\"overlap-split\"");
    }

    #[test]
    fn source_slice_is_clamped() {
        let source = SourceText::new("a\nb\nc");
        assert_eq!(source.len(), 3);
        assert_eq!(source.slice(2, 3), "b\nc");
        assert_eq!(source.slice(0, 10), "a\nb\nc");
        assert_eq!(source.slice(4, 5), "");
        assert_eq!(source.line(1), Some("a"));
        assert_eq!(source.line(0), None);
    }

    #[test]
    fn source_matches_exact_chunks_only() {
        let source = SourceText::new("a\nb\nc");
        assert!(source.matches(&chunk(1, 2, "a\nb")));
        assert!(!source.matches(&chunk(1, 2, "a\n\nb")));
    }

    #[test]
    fn complexity_grows_with_branches() {
        let flat = estimate_complexity("let x = 1;");
        let branchy = estimate_complexity("if a && b { x } else if c { y } for i in v { }");
        assert_eq!(flat, 1);
        assert!(branchy > flat + 3);
    }
}
