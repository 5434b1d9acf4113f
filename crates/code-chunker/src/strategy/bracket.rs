use super::{ensure_non_empty, plain_type, source_chunk, ChunkingStrategy};
use crate::context::ProcessingContext;
use crate::error::StrategyError;
use crate::language::Language;
use crate::quality::SymbolScanner;
use crate::signature::classify_block;
use crate::types::{Chunk, ChunkType, SourceText};

const NAME: &str = "bracket";

const BRACE_LANGUAGES: &[Language] = &[
    Language::Rust,
    Language::JavaScript,
    Language::TypeScript,
    Language::Go,
    Language::Java,
    Language::C,
    Language::Cpp,
    Language::CSharp,
    Language::Swift,
    Language::Kotlin,
    Language::Php,
    Language::Css,
    Language::Scss,
    Language::Less,
    Language::Json,
];

/// Cuts where bracket depth returns to zero.
///
/// Unbalanced input never blocks progress: the size limit always forces a
/// cut, and surplus closers simply read as depth zero.
#[derive(Debug, Default, Clone, Copy)]
pub struct BracketStrategy;

impl ChunkingStrategy for BracketStrategy {
    fn name(&self) -> &str {
        NAME
    }

    fn languages(&self) -> &[Language] {
        BRACE_LANGUAGES
    }

    fn can_handle(&self, ctx: &ProcessingContext) -> bool {
        ctx.config().features.enable_bracket_balance && ctx.lang().uses_braces() && !ctx.is_blank()
    }

    fn chunk(&self, ctx: &ProcessingContext) -> Result<Vec<Chunk>, StrategyError> {
        let source = SourceText::new(ctx.content());
        let total = source.len();
        let chunking = &ctx.config().chunking;
        let (min, max) = (chunking.min_chunk_size, chunking.max_chunk_size);
        let max_lines = chunking.max_lines_per_chunk.max(1);

        let mut ranges = Vec::new();
        let mut scanner = SymbolScanner::for_language(ctx.lang());
        let mut opened = false;
        let mut start = 1usize;
        let mut size = 0usize;

        for n in 1..=total {
            let line = source.line(n).unwrap_or("");
            let len = line.chars().count();
            let grown = if n == start { len } else { size + 1 + len };

            if n > start && grown > max {
                ranges.push((start, n - 1));
                scanner = SymbolScanner::for_language(ctx.lang());
                opened = false;
                start = n;
                size = len;
            } else {
                size = grown;
            }

            scanner.scan_line(line);
            opened |= scanner.open_depth() > 0;

            let settled = !scanner.needs_more();
            let statement_end = line.trim_end().ends_with(';') || line.trim().is_empty();
            let long_enough = size >= min || n + 1 - start >= max_lines;
            if n < total && settled && long_enough && (opened || statement_end) {
                ranges.push((start, n));
                scanner = SymbolScanner::for_language(ctx.lang());
                opened = false;
                start = n + 1;
                size = 0;
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
                    match sig.chunk_type {
                        ChunkType::Function => chunk.metadata.function_name = Some(sig.name),
                        _ => chunk.metadata.class_name = Some(sig.name),
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
        ProcessingContext::builder()
            .content(content)
            .language("javascript")
            .config(Arc::new(config))
            .build()
            .unwrap()
    }

    #[test]
    fn cuts_after_closed_blocks() {
        let code = "function a() {\n  return 1;\n}\nfunction b() {\n  return 2;\n}";
        let chunks = BracketStrategy.chunk(&ctx(code, 10, 1000)).unwrap();
        let ranges: Vec<(usize, usize)> = chunks.iter().map(|c| (c.start_line(), c.end_line())).collect();
        assert_eq!(ranges, vec![(1, 3), (4, 6)]);
        assert_eq!(chunks[0].metadata.function_name.as_deref(), Some("a"));
    }

    #[test]
    fn unbalanced_input_still_covers_everything() {
        let code = "function broken() {\n  if (x {\n    y();\n";
        let chunks = BracketStrategy.chunk(&ctx(code, 5, 1000)).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!((chunks[0].start_line(), chunks[0].end_line()), (1, 3));
    }

    #[test]
    fn declines_indentation_languages() {
        let mut c = ProcessingConfig::default();
        c.chunking.min_chunk_size = 1;
        let python = ProcessingContext::builder()
            .content("def f():\n    pass")
            .language("python")
            .config(Arc::new(c))
            .build()
            .unwrap();
        assert!(!BracketStrategy.can_handle(&python));
    }
}
