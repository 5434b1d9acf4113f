use super::{ensure_non_empty, plain_type, source_chunk, ChunkingStrategy};
use crate::context::ProcessingContext;
use crate::error::StrategyError;
use crate::signature::{boundary_score, classify_block};
use crate::types::{Chunk, ChunkType, SourceText};

const NAME: &str = "semantic";

/// Score that cuts as soon as the minimum size is reached
const STRONG_BOUNDARY: u32 = 3;
/// Score that cuts once the chunk is past the midpoint of min and max
const WEAK_BOUNDARY: u32 = 2;

/// Accumulates lines and cuts at the best nearby boundary.
///
/// Works on any language because boundaries come from line heuristics, not
/// a parser.
#[derive(Debug, Default, Clone, Copy)]
pub struct SemanticStrategy;

impl ChunkingStrategy for SemanticStrategy {
    fn name(&self) -> &str {
        NAME
    }

    fn can_handle(&self, ctx: &ProcessingContext) -> bool {
        ctx.config().features.enable_semantic_detection && !ctx.is_blank()
    }

    fn chunk(&self, ctx: &ProcessingContext) -> Result<Vec<Chunk>, StrategyError> {
        let source = SourceText::new(ctx.content());
        let total = source.len();
        let chunking = &ctx.config().chunking;
        let (min, max) = (chunking.min_chunk_size, chunking.max_chunk_size);
        let midpoint = (min + max) / 2;
        let max_lines = chunking.max_lines_per_chunk.max(1);

        let mut ranges = Vec::new();
        let mut start = 1usize;
        let mut size = 0usize;

        for n in 1..=total {
            let line = source.line(n).unwrap_or("");
            let len = line.chars().count();
            let grown = if n == start { len } else { size + 1 + len };

            // Forced cut before this line
            if n > start && (grown > max || n - start >= max_lines) {
                ranges.push((start, n - 1));
                start = n;
                size = len;
            } else {
                size = grown;
            }

            if n < total && size >= min {
                let score = boundary_score(line, source.line(n + 1));
                if score >= STRONG_BOUNDARY || (score >= WEAK_BOUNDARY && size >= midpoint) {
                    ranges.push((start, n));
                    start = n + 1;
                    size = 0;
                }
            }
        }
        if start <= total {
            ranges.push((start, total));
        }

        let chunks: Vec<Chunk> = ranges
            .into_iter()
            .map(|(s, e)| {
                let mut chunk = source_chunk(ctx, &source, s, e, plain_type(ctx), NAME);
                if let Some(sig) = classify_block(&chunk.content) {
                    chunk.metadata.chunk_type = sig.chunk_type;
                    if sig.chunk_type == ChunkType::Function {
                        chunk.metadata.function_name = Some(sig.name);
                    } else {
                        chunk.metadata.class_name = Some(sig.name);
                    }
                }
                chunk
            })
            .collect();

        ensure_non_empty(ctx, &chunks, NAME)?;
        Ok(chunks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProcessingConfig;
    use std::sync::Arc;

    fn ctx(content: &str, min: usize, max: usize) -> ProcessingContext {
        let mut config = ProcessingConfig::default();
        config.chunking.min_chunk_size = min;
        config.chunking.max_chunk_size = max;
        config.chunking.overlap_size = 0;
        ProcessingContext::builder()
            .content(content)
            .language("go")
            .config(Arc::new(config))
            .build()
            .unwrap()
    }

    #[test]
    fn cuts_before_declarations() {
        let code = "func a() {\n\treturn\n}\n\nfunc b() {\n\treturn\n}";
        let chunks = SemanticStrategy.chunk(&ctx(code, 10, 500)).unwrap();
        let ranges: Vec<(usize, usize)> = chunks.iter().map(|c| (c.start_line(), c.end_line())).collect();
        assert_eq!(ranges, vec![(1, 4), (5, 7)]);
        assert_eq!(chunks[1].chunk_type(), ChunkType::Function);
        assert_eq!(chunks[1].metadata.function_name.as_deref(), Some("b"));
    }

    #[test]
    fn forced_cut_at_max_size() {
        let code = "x = 1111111111\ny = 2222222222\nz = 3333333333";
        let chunks = SemanticStrategy.chunk(&ctx(code, 5, 20)).unwrap();
        assert!(chunks.iter().all(|c| c.len() <= 20));
        assert_eq!(chunks.first().map(Chunk::start_line), Some(1));
        assert_eq!(chunks.last().map(Chunk::end_line), Some(3));
    }

    #[test]
    fn blank_content_is_declined() {
        assert!(!SemanticStrategy.can_handle(&ctx("  \n", 10, 100)));
    }
}
