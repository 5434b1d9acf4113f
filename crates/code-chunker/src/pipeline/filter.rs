use super::{PassOutput, PostProcessPass};
use crate::context::ProcessingContext;
use crate::error::PassError;
use crate::quality::merge_chunks;
use crate::syntax::LineSpan;
use crate::types::{Chunk, SourceText};

/// Length from which a chunk counts as real content regardless of whitespace
const NORMAL_LEN: usize = 12;
/// Upper bound on the noise threshold
const TINY_CAP: usize = 15;
const TINY_RATIO: f64 = 0.3;

/// Folds tiny noise fragments into neighbouring content.
///
/// A tiny chunk between two normal ones joins the previous chunk; one followed
/// by a normal chunk joins that; an isolated one is discarded. Undersized
/// chunks that are not tiny are kept as they are.
#[derive(Debug, Default, Clone, Copy)]
pub struct IntelligentFilterPass;

fn is_normal(chunk: &Chunk) -> bool {
    chunk.len() >= NORMAL_LEN || chunk.content.trim().contains(char::is_whitespace)
}

impl PostProcessPass for IntelligentFilterPass {
    fn name(&self) -> &'static str {
        "intelligent-filter"
    }

    fn should_apply(&self, chunks: &[Chunk], ctx: &ProcessingContext) -> bool {
        ctx.config().post_processing.enable_intelligent_filtering && !chunks.is_empty()
    }

    fn apply(&self, chunks: &[Chunk], ctx: &ProcessingContext) -> Result<PassOutput, PassError> {
        let chunking = &ctx.config().chunking;
        let (min, max) = (chunking.min_chunk_size, chunking.max_chunk_size);
        let tiny_limit = ((min as f64 * TINY_RATIO).ceil() as usize).min(TINY_CAP);
        let source = SourceText::new(ctx.content());
        let merge = |a: &Chunk, b: &Chunk| {
            merge_chunks(&[a.clone(), b.clone()], Some(&source)).filter(|m| m.len() <= max)
        };

        let mut out: Vec<Chunk> = Vec::with_capacity(chunks.len());
        let mut discarded = Vec::new();
        let mut carried: Option<Chunk> = None;

        for (idx, chunk) in chunks.iter().enumerate() {
            let mut chunk = chunk.clone();
            if let Some(tiny) = carried.take() {
                match merge(&tiny, &chunk) {
                    Some(merged) => chunk = merged,
                    None => out.push(tiny),
                }
            }

            if chunk.len() >= tiny_limit || is_normal(&chunk) {
                out.push(chunk);
                continue;
            }

            let next_is_normal = chunks.get(idx + 1).is_some_and(is_normal);
            if next_is_normal {
                let into_previous = out.last().and_then(|prev| merge(prev, &chunk));
                match (into_previous, out.last_mut()) {
                    (Some(merged), Some(prev)) => *prev = merged,
                    _ => carried = Some(chunk),
                }
                continue;
            }

            log::debug!(
                "Discarding noise chunk {}-{}: {:?}",
                chunk.start_line(),
                chunk.end_line(),
                chunk.content
            );
            discarded.push(LineSpan::new(chunk.start_line(), chunk.end_line()));
        }
        if let Some(tiny) = carried {
            out.push(tiny);
        }

        Ok(PassOutput {
            chunks: out,
            discarded,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProcessingConfig;
    use crate::types::ChunkMetadata;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn setup(content: &str) -> (ProcessingContext, SourceText<'_>) {
        let ctx = ProcessingContext::builder()
            .content(content)
            .language("text")
            .config(Arc::new(ProcessingConfig::default()))
            .build()
            .unwrap();
        (ctx, SourceText::new(content))
    }

    fn chunk(source: &SourceText<'_>, start: usize, end: usize) -> Chunk {
        Chunk::new(source.slice(start, end), ChunkMetadata::new(start, end, "text", "line"))
    }

    #[test]
    fn isolated_tiny_chunk_is_discarded() {
        let body = "word ".repeat(40);
        let content = format!("aaaaaaaaaa\n{}\nbbbbbbbbbb", body.trim_end());
        let (ctx, source) = setup(&content);
        let chunks = vec![chunk(&source, 1, 1), chunk(&source, 2, 2), chunk(&source, 3, 3)];

        let out = IntelligentFilterPass.apply(&chunks, &ctx).unwrap();
        assert_eq!(out.chunks.len(), 1);
        assert_eq!((out.chunks[0].start_line(), out.chunks[0].end_line()), (1, 2));
        assert_eq!(out.discarded, vec![LineSpan::new(3, 3)]);
    }

    #[test]
    fn sandwiched_tiny_joins_previous() {
        let content = "first normal line\n}\nsecond normal line";
        let (ctx, source) = setup(content);
        let chunks = vec![chunk(&source, 1, 1), chunk(&source, 2, 2), chunk(&source, 3, 3)];

        let out = IntelligentFilterPass.apply(&chunks, &ctx).unwrap();
        let ranges: Vec<(usize, usize)> = out.chunks.iter().map(|c| (c.start_line(), c.end_line())).collect();
        assert_eq!(ranges, vec![(1, 2), (3, 3)]);
        assert!(out.discarded.is_empty());
    }

    #[test]
    fn small_but_meaningful_chunks_are_kept() {
        let content = "let x = 1;\nlet y = 2;";
        let (ctx, source) = setup(content);
        let chunks = vec![chunk(&source, 1, 1), chunk(&source, 2, 2)];
        let out = IntelligentFilterPass.apply(&chunks, &ctx).unwrap();
        assert_eq!(out.chunks, chunks);
    }
}
