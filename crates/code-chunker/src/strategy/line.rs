use super::{line_windows, plain_type, source_chunk, ChunkingStrategy, LINE_STRATEGY};
use crate::context::ProcessingContext;
use crate::error::StrategyError;
use crate::types::{Chunk, ChunkMetadata, ChunkType, SourceText};

/// Window height of the infallible last-resort slicer
pub const BASIC_LINES_PER_CHUNK: usize = 50;

/// Fixed windows of `max_lines_per_chunk` lines, also cut at `max_chunk_size`
#[derive(Debug, Default, Clone, Copy)]
pub struct LineStrategy;

impl ChunkingStrategy for LineStrategy {
    fn name(&self) -> &str {
        LINE_STRATEGY
    }

    fn can_handle(&self, _ctx: &ProcessingContext) -> bool {
        true
    }

    fn chunk(&self, ctx: &ProcessingContext) -> Result<Vec<Chunk>, StrategyError> {
        let source = SourceText::new(ctx.content());
        if source.is_empty() {
            return Ok(Vec::new());
        }
        let chunking = &ctx.config().chunking;
        let chunk_type = plain_type(ctx);

        Ok(line_windows(
            &source,
            1,
            source.len(),
            chunking.max_chunk_size,
            chunking.max_lines_per_chunk,
        )
        .into_iter()
        .map(|(start, end)| source_chunk(ctx, &source, start, end, chunk_type, LINE_STRATEGY))
        .collect())
    }
}

/// Slice content into windows of `lines_per_chunk` lines.
///
/// Depends on nothing but the text, so it cannot fail.
pub fn basic_line_chunks(
    content: &str,
    language: &str,
    file_path: Option<&str>,
    lines_per_chunk: usize,
) -> Vec<Chunk> {
    let source = SourceText::new(content);
    let step = lines_per_chunk.max(1);

    (1..=source.len())
        .step_by(step)
        .map(|start| {
            let end = (start + step - 1).min(source.len());
            let metadata = ChunkMetadata::new(start, end, language, "basic")
                .chunk_type(ChunkType::Code)
                .file_path(file_path.map(str::to_string));
            Chunk::new(source.slice(start, end), metadata)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProcessingConfig;
    use std::sync::Arc;

    #[test]
    fn windows_cover_every_line() {
        let content = (1..=25).map(|i| format!("line {i}")).collect::<Vec<_>>().join("\n");
        let mut config = ProcessingConfig::default();
        config.chunking.max_lines_per_chunk = 10;
        let ctx = ProcessingContext::builder()
            .content(content)
            .language("text")
            .config(Arc::new(config))
            .build()
            .unwrap();

        let chunks = LineStrategy.chunk(&ctx).unwrap();
        let ranges: Vec<(usize, usize)> = chunks.iter().map(|c| (c.start_line(), c.end_line())).collect();
        assert_eq!(ranges, vec![(1, 10), (11, 20), (21, 25)]);
        assert!(chunks.iter().all(|c| c.chunk_type() == ChunkType::Generic));
    }

    #[test]
    fn basic_chunks() {
        let chunks = basic_line_chunks("a\nb\nc", "text", Some("a.txt"), 2);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].content, "a\nb");
        assert_eq!(chunks[1].content, "c");
        assert_eq!(chunks[1].metadata.file_path.as_deref(), Some("a.txt"));
        assert!(basic_line_chunks("", "text", None, 2).is_empty());
    }
}
