//! Chunking strategies and their registry.
//!
//! A strategy turns one file into an initial chunk list. Every strategy
//! declares whether it can handle a context; the selector only ever runs
//! strategies that said yes.

mod ast;
mod bracket;
mod line;
mod markdown;
mod semantic;

pub use ast::AstStrategy;
pub use bracket::BracketStrategy;
pub use line::{basic_line_chunks, LineStrategy, BASIC_LINES_PER_CHUNK};
pub use markdown::MarkdownStrategy;
pub use semantic::SemanticStrategy;

use crate::cache::TreeCache;
use crate::context::ProcessingContext;
use crate::error::StrategyError;
use crate::language::Language;
use crate::syntax::SyntaxBackend;
use crate::types::{Chunk, ChunkMetadata, ChunkType, SourceText};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::Path;
use std::sync::Arc;

/// Name of the reserved line-segmentation strategy
pub const LINE_STRATEGY: &str = "line";

/// Pluggable chunking algorithm
pub trait ChunkingStrategy: Send + Sync {
    fn name(&self) -> &str;

    /// Languages this strategy specializes in; empty means generic
    fn languages(&self) -> &[Language] {
        &[]
    }

    /// Path globs that make this the file-type strategy
    fn file_patterns(&self) -> &[&str] {
        &[]
    }

    fn can_handle(&self, ctx: &ProcessingContext) -> bool;

    fn chunk(&self, ctx: &ProcessingContext) -> Result<Vec<Chunk>, StrategyError>;
}

struct Registered {
    strategy: Arc<dyn ChunkingStrategy>,
    patterns: Option<GlobSet>,
}

/// Strategies in registration order
#[derive(Default)]
pub struct StrategyRegistry {
    entries: Vec<Registered>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a strategy; a strategy with the same name is replaced in place
    pub fn register(&mut self, strategy: Arc<dyn ChunkingStrategy>) {
        let patterns = build_globset(strategy.name(), strategy.file_patterns());
        let entry = Registered { strategy, patterns };

        if let Some(existing) = self
            .entries
            .iter_mut()
            .find(|e| e.strategy.name() == entry.strategy.name())
        {
            log::debug!("Replacing strategy '{}'", entry.strategy.name());
            *existing = entry;
        } else {
            self.entries.push(entry);
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ChunkingStrategy>> {
        self.entries
            .iter()
            .find(|e| e.strategy.name() == name)
            .map(|e| Arc::clone(&e.strategy))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|e| e.strategy.name().to_string())
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn ChunkingStrategy>> {
        self.entries.iter().map(|e| &e.strategy)
    }

    /// First strategy whose file patterns match the path
    pub fn for_path(&self, path: &str) -> Option<Arc<dyn ChunkingStrategy>> {
        let file_name = Path::new(path)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(path);
        self.entries
            .iter()
            .find(|e| {
                e.patterns
                    .as_ref()
                    .is_some_and(|set| set.is_match(path) || set.is_match(file_name))
            })
            .map(|e| Arc::clone(&e.strategy))
    }

    /// Strategies that list the language, in registration order
    pub fn for_language(&self, language: Language) -> Vec<Arc<dyn ChunkingStrategy>> {
        self.entries
            .iter()
            .filter(|e| e.strategy.languages().contains(&language))
            .map(|e| Arc::clone(&e.strategy))
            .collect()
    }
}

impl std::fmt::Debug for StrategyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyRegistry")
            .field("strategies", &self.names())
            .finish()
    }
}

fn build_globset(name: &str, patterns: &[&str]) -> Option<GlobSet> {
    if patterns.is_empty() {
        return None;
    }
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        match Glob::new(pattern) {
            Ok(glob) => {
                builder.add(glob);
            }
            Err(e) => log::warn!("Ignoring file pattern '{pattern}' of strategy '{name}': {e}"),
        }
    }
    match builder.build() {
        Ok(set) => Some(set),
        Err(e) => {
            log::warn!("Failed to build file patterns for strategy '{name}': {e}");
            None
        }
    }
}

/// Registry with every built-in strategy: markdown, ast, semantic, bracket, line
pub fn default_registry(backend: Arc<dyn SyntaxBackend>, trees: Arc<TreeCache>) -> StrategyRegistry {
    let mut registry = StrategyRegistry::new();
    registry.register(Arc::new(MarkdownStrategy));
    registry.register(Arc::new(AstStrategy::new(backend, trees)));
    registry.register(Arc::new(SemanticStrategy));
    registry.register(Arc::new(BracketStrategy));
    registry.register(Arc::new(LineStrategy));
    registry
}

/// Chunk over exact source lines, tagged with the context's language and path
pub(crate) fn source_chunk(
    ctx: &ProcessingContext,
    source: &SourceText<'_>,
    start: usize,
    end: usize,
    chunk_type: ChunkType,
    strategy: &str,
) -> Chunk {
    let metadata = ChunkMetadata::new(start, end, ctx.language(), strategy)
        .chunk_type(chunk_type)
        .file_path(ctx.file_path().map(str::to_string));
    Chunk::new(source.slice(start, end), metadata)
}

/// Default type for chunks without a recognized declaration
pub(crate) fn plain_type(ctx: &ProcessingContext) -> ChunkType {
    if ctx.features().is_code_file {
        ChunkType::Code
    } else {
        ChunkType::Generic
    }
}

/// Cut `start..=end` into windows of at most `max_lines` lines and
/// `max_size` characters; a single overlong line forms its own window
pub(crate) fn line_windows(
    source: &SourceText<'_>,
    start: usize,
    end: usize,
    max_size: usize,
    max_lines: usize,
) -> Vec<(usize, usize)> {
    let max_lines = max_lines.max(1);
    let mut windows = Vec::new();
    let mut window_start = start;
    let mut size = 0usize;

    for n in start..=end {
        let len = source.line(n).map_or(0, |l| l.chars().count());
        let grown = if n == window_start { len } else { size + 1 + len };
        let full = n - window_start >= max_lines;
        if n > window_start && (grown > max_size || full) {
            windows.push((window_start, n - 1));
            window_start = n;
            size = len;
        } else {
            size = grown;
        }
    }
    if window_start <= end {
        windows.push((window_start, end));
    }
    windows
}

/// Strategy outputs are non-empty for non-blank content
pub(crate) fn ensure_non_empty(ctx: &ProcessingContext, chunks: &[Chunk], strategy: &str) -> Result<(), StrategyError> {
    if chunks.is_empty() && !ctx.is_blank() {
        return Err(StrategyError::ContractViolation(format!(
            "strategy '{strategy}' produced no chunks for non-empty content"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast_analyzer::TreeSitterBackend;
    use crate::cache::AuxiliaryCaches;
    use pretty_assertions::assert_eq;

    fn registry() -> StrategyRegistry {
        default_registry(Arc::new(TreeSitterBackend::new()), AuxiliaryCaches::default().trees)
    }

    #[test]
    fn default_registry_order() {
        assert_eq!(
            registry().names(),
            vec!["markdown", "ast", "semantic", "bracket", "line"]
        );
    }

    #[test]
    fn file_patterns_match_nested_paths() {
        let registry = registry();
        assert_eq!(
            registry.for_path("docs/guide/README.md").map(|s| s.name().to_string()),
            Some("markdown".to_string())
        );
        assert!(registry.for_path("src/main.rs").is_none());
    }

    #[test]
    fn language_lists() {
        let registry = registry();
        let names: Vec<String> = registry
            .for_language(Language::Rust)
            .iter()
            .map(|s| s.name().to_string())
            .collect();
        assert_eq!(names, vec!["ast", "bracket"]);
    }

    #[test]
    fn register_replaces_same_name() {
        let mut registry = registry();
        registry.register(Arc::new(LineStrategy));
        assert_eq!(registry.len(), 5);
    }

    #[test]
    fn windows_respect_lines_and_size() {
        let text = "aaaa\nbbbb\ncccc\ndddd\neeee";
        let source = SourceText::new(text);
        assert_eq!(line_windows(&source, 1, 5, 100, 2), vec![(1, 2), (3, 4), (5, 5)]);
        assert_eq!(line_windows(&source, 1, 5, 9, 10), vec![(1, 2), (3, 4), (5, 5)]);
        assert_eq!(line_windows(&source, 2, 3, 3, 10), vec![(2, 2), (3, 3)]);
    }
}
