use super::{ensure_non_empty, line_windows, plain_type, source_chunk, ChunkingStrategy};
use crate::cache::{content_key, TreeCache};
use crate::context::ProcessingContext;
use crate::error::StrategyError;
use crate::language::Language;
use crate::syntax::{NodeKind, SyntaxBackend, SyntaxNode, SyntaxTree};
use crate::types::{Chunk, ChunkType, SourceText};
use std::sync::Arc;

const NAME: &str = "ast";

const AST_LANGUAGES: &[Language] = &[
    Language::Rust,
    Language::Python,
    Language::JavaScript,
    Language::TypeScript,
];

/// Bytes charged per source byte for a cached tree
const TREE_WEIGHT_FACTOR: u64 = 4;

/// One chunk per top-level declaration, with the code between declarations
/// chunked separately so every line stays covered.
///
/// Declarations larger than the chunk size limit are replaced by their
/// members (methods of a class or impl block) when they have any.
pub struct AstStrategy {
    backend: Arc<dyn SyntaxBackend>,
    trees: Arc<TreeCache>,
}

impl AstStrategy {
    pub fn new(backend: Arc<dyn SyntaxBackend>, trees: Arc<TreeCache>) -> Self {
        Self { backend, trees }
    }

    fn tree_for(&self, ctx: &ProcessingContext) -> Result<SyntaxTree, StrategyError> {
        if let Some(tree) = ctx.ast().filter(|t| t.language() == ctx.lang()) {
            return Ok(tree.clone());
        }

        let key = content_key(ctx.lang(), ctx.content());
        if let Some(tree) = self.trees.get(&key) {
            return Ok(tree);
        }
        let tree = self
            .backend
            .parse(ctx.content(), ctx.lang())
            .map_err(|e| StrategyError::Parse(e.to_string()))?;
        self.trees
            .insert(key, tree.clone(), ctx.content().len() as u64 * TREE_WEIGHT_FACTOR);
        Ok(tree)
    }

    fn declarations(&self, tree: &SyntaxTree) -> Vec<SyntaxNode> {
        let mut nodes = self.backend.extract_classes(tree);
        nodes.extend(self.backend.extract_functions(tree));
        nodes.sort_by_key(|n| {
            let span = self.backend.node_location(n);
            (span.start_line, std::cmp::Reverse(span.end_line))
        });
        nodes
    }

    /// Outermost non-overlapping nodes, descending into oversized containers
    fn select(&self, nodes: &[SyntaxNode], source: &SourceText<'_>, max_size: usize) -> Vec<SyntaxNode> {
        let mut selected = Vec::new();
        let mut last_end = 0usize;

        for (idx, node) in nodes.iter().enumerate() {
            let span = self.backend.node_location(node);
            if span.start_line <= last_end {
                continue;
            }
            let size = source.slice(span.start_line, span.end_line).chars().count();
            let members: Vec<SyntaxNode> = nodes[idx + 1..]
                .iter()
                .filter(|n| {
                    let inner = self.backend.node_location(n);
                    span.contains(&inner) && inner != span
                })
                .cloned()
                .collect();

            if size > max_size && !members.is_empty() {
                selected.extend(self.select(&members, source, max_size));
            } else {
                selected.push(node.clone());
            }
            last_end = span.end_line;
        }
        selected
    }

    fn node_chunk(&self, ctx: &ProcessingContext, source: &SourceText<'_>, node: &SyntaxNode, start: usize, end: usize) -> Chunk {
        let chunk_type = match node.kind {
            NodeKind::Function => ChunkType::Function,
            NodeKind::Method => ChunkType::Method,
            NodeKind::Class => ChunkType::Class,
            NodeKind::Interface => ChunkType::Interface,
        };
        let mut chunk = source_chunk(ctx, source, start, end, chunk_type, NAME);
        match node.kind {
            NodeKind::Function => chunk.metadata.function_name.clone_from(&node.name),
            NodeKind::Method => {
                chunk.metadata.function_name.clone_from(&node.name);
                chunk.metadata.class_name.clone_from(&node.parent);
            }
            NodeKind::Class | NodeKind::Interface => chunk.metadata.class_name.clone_from(&node.name),
        }
        chunk
    }
}

/// Line range that is either a declaration or the code between declarations
struct Segment {
    start: usize,
    end: usize,
    node: Option<SyntaxNode>,
}

impl ChunkingStrategy for AstStrategy {
    fn name(&self) -> &str {
        NAME
    }

    fn languages(&self) -> &[Language] {
        AST_LANGUAGES
    }

    fn can_handle(&self, ctx: &ProcessingContext) -> bool {
        ctx.config().features.enable_ast && self.backend.supports(ctx.lang()) && !ctx.is_blank()
    }

    fn chunk(&self, ctx: &ProcessingContext) -> Result<Vec<Chunk>, StrategyError> {
        let tree = self.tree_for(ctx)?;
        let source = SourceText::new(ctx.content());
        let total = source.len();
        let chunking = &ctx.config().chunking;

        let nodes = self.declarations(&tree);
        let selected = self.select(&nodes, &source, chunking.max_chunk_size);

        let mut segments: Vec<Segment> = Vec::new();
        let mut cursor = 1usize;
        for node in selected {
            let span = self.backend.node_location(&node);
            let (start, end) = (span.start_line.max(1), span.end_line.min(total));
            if start > end {
                continue;
            }
            if start > cursor {
                segments.push(Segment { start: cursor, end: start - 1, node: None });
            }
            segments.push(Segment { start, end, node: Some(node) });
            cursor = end + 1;
        }
        if cursor <= total {
            segments.push(Segment { start: cursor, end: total, node: None });
        }

        // Blank gaps join the preceding segment, or the following one at file start
        let mut merged: Vec<Segment> = Vec::new();
        let mut pending_start: Option<usize> = None;
        for mut segment in segments {
            let blank = segment.node.is_none()
                && (segment.start..=segment.end).all(|n| source.line(n).map_or(true, |l| l.trim().is_empty()));
            if blank {
                match merged.last_mut() {
                    Some(prev) => prev.end = segment.end,
                    None => pending_start = Some(segment.start),
                }
                continue;
            }
            if let Some(start) = pending_start.take() {
                segment.start = start;
            }
            merged.push(segment);
        }

        let mut chunks = Vec::new();
        for segment in merged {
            match &segment.node {
                Some(node) => chunks.push(self.node_chunk(ctx, &source, node, segment.start, segment.end)),
                None => {
                    for (s, e) in line_windows(
                        &source,
                        segment.start,
                        segment.end,
                        chunking.max_chunk_size,
                        chunking.max_lines_per_chunk,
                    ) {
                        chunks.push(source_chunk(ctx, &source, s, e, plain_type(ctx), NAME));
                    }
                }
            }
        }

        ensure_non_empty(ctx, &chunks, NAME)?;
        Ok(chunks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast_analyzer::TreeSitterBackend;
    use crate::cache::{AuxiliaryCaches, Purgeable};
    use crate::config::ProcessingConfig;
    use pretty_assertions::assert_eq;

    fn strategy() -> (AstStrategy, Arc<TreeCache>) {
        let trees = AuxiliaryCaches::default().trees;
        (AstStrategy::new(Arc::new(TreeSitterBackend::new()), Arc::clone(&trees)), trees)
    }

    fn ctx(content: &str, language: &str, config: ProcessingConfig) -> ProcessingContext {
        ProcessingContext::builder()
            .content(content)
            .language(language)
            .config(Arc::new(config))
            .build()
            .unwrap()
    }

    const RUST: &str = "use std::fmt;\n\nfn one() -> u8 {\n    1\n}\n\n\nstruct Two;\n\nimpl Two {\n    fn get(&self) -> u8 {\n        2\n    }\n}\n";

    #[test]
    fn declarations_and_gaps_cover_every_line() {
        let (strategy, trees) = strategy();
        let context = ctx(RUST, "rust", ProcessingConfig::default());
        let chunks = strategy.chunk(&context).unwrap();

        let ranges: Vec<(usize, usize)> = chunks.iter().map(|c| (c.start_line(), c.end_line())).collect();
        assert_eq!(ranges, vec![(1, 2), (3, 7), (8, 9), (10, 14)]);
        assert_eq!(chunks[1].chunk_type(), ChunkType::Function);
        assert_eq!(chunks[1].metadata.function_name.as_deref(), Some("one"));
        assert_eq!(chunks[3].chunk_type(), ChunkType::Class);
        assert_eq!(chunks[3].metadata.class_name.as_deref(), Some("Two"));
        assert_eq!(trees.len(), 1);
    }

    #[test]
    fn oversized_impl_is_replaced_by_its_methods() {
        let (strategy, _) = strategy();
        let mut config = ProcessingConfig::default();
        config.chunking.max_chunk_size = 40;
        config.chunking.min_chunk_size = 1;
        config.chunking.overlap_size = 0;
        let context = ctx(RUST, "rust", config);
        let chunks = strategy.chunk(&context).unwrap();

        let method = chunks
            .iter()
            .find(|c| c.chunk_type() == ChunkType::Method)
            .unwrap();
        assert_eq!((method.start_line(), method.end_line()), (11, 13));
        assert_eq!(method.metadata.class_name.as_deref(), Some("Two"));
        assert_eq!(chunks.last().map(Chunk::end_line), Some(14));
    }

    #[test]
    fn parse_is_cached() {
        let (strategy, trees) = strategy();
        let context = ctx(RUST, "rust", ProcessingConfig::default());
        strategy.chunk(&context).unwrap();
        strategy.chunk(&context).unwrap();
        assert_eq!(trees.len(), 1);
        assert!(trees.estimated_bytes() > 0);
    }

    #[test]
    fn disabled_or_unsupported_is_declined() {
        let (strategy, _) = strategy();
        let mut config = ProcessingConfig::default();
        config.features.enable_ast = false;
        assert!(!strategy.can_handle(&ctx(RUST, "rust", config)));
        assert!(!strategy.can_handle(&ctx("package main", "go", ProcessingConfig::default())));
    }
}
