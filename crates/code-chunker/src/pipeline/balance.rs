use super::{PassOutput, PostProcessPass};
use crate::context::ProcessingContext;
use crate::error::PassError;
use crate::quality::SymbolScanner;
use crate::types::{Chunk, SourceText};

/// Extends chunks that end inside an open bracket, template or block comment
/// with following source lines until they balance.
///
/// Growth stops at the end of the file or when the next line would push the
/// chunk past the size limit. Later chunks swallowed whole by an extension are
/// dropped; partially overlapped ones are left alone.
#[derive(Debug, Default, Clone, Copy)]
pub struct SymbolBalancePass;

impl PostProcessPass for SymbolBalancePass {
    fn name(&self) -> &'static str {
        "symbol-balance"
    }

    fn should_apply(&self, chunks: &[Chunk], ctx: &ProcessingContext) -> bool {
        ctx.config().features.enable_bracket_balance && ctx.features().is_code_file && !chunks.is_empty()
    }

    fn apply(&self, chunks: &[Chunk], ctx: &ProcessingContext) -> Result<PassOutput, PassError> {
        let source = SourceText::new(ctx.content());
        let total = source.len();
        let max = ctx.config().chunking.max_chunk_size;

        let mut out: Vec<Chunk> = Vec::with_capacity(chunks.len());
        // (original end, extended end) of the last grown chunk
        let mut grown_range: Option<(usize, usize)> = None;

        for chunk in chunks {
            if let Some((original_end, extended_end)) = grown_range {
                if chunk.start_line() > original_end && chunk.end_line() <= extended_end {
                    log::debug!(
                        "Dropping chunk {}-{} absorbed by bracket balancing",
                        chunk.start_line(),
                        chunk.end_line()
                    );
                    continue;
                }
            }

            let mut scanner = SymbolScanner::for_language(ctx.lang());
            scanner.scan(&chunk.content);
            if !scanner.needs_more() {
                out.push(chunk.clone());
                continue;
            }

            let mut end = chunk.end_line();
            let mut content = chunk.content.clone();
            let mut size = chunk.len();
            while scanner.needs_more() && end < total {
                let Some(next) = source.line(end + 1) else { break };
                let grown = size + 1 + next.chars().count();
                if grown > max {
                    break;
                }
                content.push('\n');
                content.push_str(next);
                scanner.scan_line(next);
                size = grown;
                end += 1;
            }

            if end == chunk.end_line() {
                out.push(chunk.clone());
                continue;
            }

            log::debug!(
                "Balanced chunk {}-{} by extending to line {end}",
                chunk.start_line(),
                chunk.end_line()
            );
            grown_range = Some((chunk.end_line(), end));
            let mut metadata = chunk.metadata.clone();
            metadata.end_line = end;
            out.push(Chunk::new(content, metadata));
        }

        Ok(out.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProcessingConfig;
    use crate::types::ChunkMetadata;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    const CODE: &str = "fn a() {\n    if x {\n        y();\n    }\n}\nfn b() {}";

    fn ctx(config: ProcessingConfig) -> ProcessingContext {
        ProcessingContext::builder()
            .content(CODE)
            .language("rust")
            .config(Arc::new(config))
            .build()
            .unwrap()
    }

    fn source_chunk(start: usize, end: usize) -> Chunk {
        let source = SourceText::new(CODE);
        Chunk::new(source.slice(start, end), ChunkMetadata::new(start, end, "rust", "line"))
    }

    #[test]
    fn extends_until_balanced_and_drops_swallowed() {
        let chunks = vec![source_chunk(1, 2), source_chunk(3, 4), source_chunk(5, 6)];
        let out = SymbolBalancePass.apply(&chunks, &ctx(ProcessingConfig::default())).unwrap();

        let ranges: Vec<(usize, usize)> = out.chunks.iter().map(|c| (c.start_line(), c.end_line())).collect();
        // 1-2 grows to 1-5; 3-4 is swallowed; 5-6 overlaps partially and stays
        assert_eq!(ranges, vec![(1, 5), (5, 6)]);
        assert!(SourceText::new(CODE).matches(&out.chunks[0]));
    }

    #[test]
    fn growth_respects_size_limit() {
        let mut config = ProcessingConfig::default();
        config.chunking.max_chunk_size = 20;
        config.chunking.min_chunk_size = 1;
        config.chunking.overlap_size = 0;
        let chunks = vec![source_chunk(1, 1), source_chunk(2, 6)];
        let out = SymbolBalancePass.apply(&chunks, &ctx(config)).unwrap();
        assert!(out.chunks[0].len() <= 20);
        assert_eq!(out.chunks[0].end_line(), 2);
    }

    #[test]
    fn second_run_changes_nothing() {
        let context = ctx(ProcessingConfig::default());
        let chunks = vec![source_chunk(1, 2), source_chunk(3, 6)];
        let once = SymbolBalancePass.apply(&chunks, &context).unwrap().chunks;
        let twice = SymbolBalancePass.apply(&once, &context).unwrap().chunks;
        assert_eq!(once, twice);
    }

    #[test]
    fn only_code_files() {
        let context = ProcessingContext::builder()
            .content("(open")
            .language("text")
            .build()
            .unwrap();
        assert!(!SymbolBalancePass.should_apply(&[source_chunk(1, 1)], &context));
    }
}
