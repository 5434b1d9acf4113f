use super::{PassOutput, PostProcessPass};
use crate::context::ProcessingContext;
use crate::error::PassError;
use crate::quality::{chunk_similarity, line_gap, merge_chunks, types_compatible};
use crate::similarity::group_by_similarity;
use crate::types::{Chunk, SourceText};

/// Groups runs of adjacent, similar chunks and merges each run.
///
/// A chunk joins the run before it when it is within the configured line gap
/// of the run's last member, shares its language and a compatible type, the
/// merged run still fits the size limit, and its weighted similarity to some
/// member reaches the threshold.
#[derive(Debug, Default, Clone, Copy)]
pub struct AdvancedMergePass;

impl PostProcessPass for AdvancedMergePass {
    fn name(&self) -> &'static str {
        "advanced-merge"
    }

    fn should_apply(&self, chunks: &[Chunk], ctx: &ProcessingContext) -> bool {
        ctx.config().post_processing.enable_advanced_merging && chunks.len() > 1
    }

    fn apply(&self, chunks: &[Chunk], ctx: &ProcessingContext) -> Result<PassOutput, PassError> {
        let config = ctx.config();
        let max = config.chunking.max_chunk_size;
        let threshold = config.post_processing.merge_threshold;
        let max_gap = i64::try_from(config.post_processing.merge_line_gap).unwrap_or(i64::MAX);
        let source = SourceText::new(ctx.content());

        let groups = group_by_similarity(chunks, |members, candidate| {
            let Some(last) = members.last() else { return false };
            if line_gap(last, candidate) > max_gap
                || last.metadata.language != candidate.metadata.language
                || !types_compatible(last.chunk_type(), candidate.chunk_type())
            {
                return false;
            }
            if !members.iter().any(|m| chunk_similarity(m, candidate) >= threshold) {
                return false;
            }
            let mut run: Vec<Chunk> = members.iter().map(|&m| m.clone()).collect();
            run.push(candidate.clone());
            merge_chunks(&run, Some(&source)).is_some_and(|m| m.len() <= max)
        });

        let mut out = Vec::with_capacity(groups.len());
        for group in groups {
            let run: Vec<Chunk> = group.iter().map(|&i| chunks[i].clone()).collect();
            if run.len() > 1 {
                log::debug!(
                    "Merging {} similar chunks at lines {}-{}",
                    run.len(),
                    run[0].start_line(),
                    run[run.len() - 1].end_line()
                );
            }
            if let Some(merged) = merge_chunks(&run, Some(&source)) {
                out.push(merged);
            }
        }
        Ok(out.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProcessingConfig;
    use crate::types::{ChunkMetadata, ChunkType};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    const CODE: &str = "let a = 1;\nlet b = 2;\nlet c = 3;\nlet d = 4;\n\n\n\n\n\nlet e = 5;";

    fn ctx(threshold: f64) -> ProcessingContext {
        let mut config = ProcessingConfig::default();
        config.post_processing.merge_threshold = threshold;
        ProcessingContext::builder()
            .content(CODE)
            .language("rust")
            .config(Arc::new(config))
            .build()
            .unwrap()
    }

    fn chunk(start: usize, end: usize) -> Chunk {
        let source = SourceText::new(CODE);
        Chunk::new(
            source.slice(start, end),
            ChunkMetadata::new(start, end, "rust", "line").chunk_type(ChunkType::Code),
        )
    }

    #[test]
    fn adjacent_similar_chunks_merge() {
        let chunks = vec![chunk(1, 2), chunk(3, 4), chunk(10, 10)];
        let out = AdvancedMergePass.apply(&chunks, &ctx(0.8)).unwrap();
        let ranges: Vec<(usize, usize)> = out.chunks.iter().map(|c| (c.start_line(), c.end_line())).collect();
        // Line 10 is more than two lines away
        assert_eq!(ranges, vec![(1, 4), (10, 10)]);
        assert_eq!(out.chunks[0].content, "let a = 1;\nlet b = 2;\nlet c = 3;\nlet d = 4;");
    }

    #[test]
    fn threshold_one_blocks_imperfect_pairs() {
        let chunks = vec![chunk(1, 2), chunk(3, 3)];
        let out = AdvancedMergePass.apply(&chunks, &ctx(1.0)).unwrap();
        assert_eq!(out.chunks.len(), 2);
    }
}
