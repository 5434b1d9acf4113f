use super::{PassOutput, PostProcessPass};
use crate::context::ProcessingContext;
use crate::error::PassError;
use crate::signature::boundary_score;
use crate::types::{Chunk, SourceText};

/// Moves the cut between two touching chunks to a nearby better line.
///
/// Only pairs that reproduce their source lines exactly and meet without a gap
/// are considered. Candidate cuts lie within the configured window of the
/// current one; the best score wins, the nearest line on ties, and the cut
/// moves only when it strictly improves on the current position. Chunk count
/// never changes.
#[derive(Debug, Default, Clone, Copy)]
pub struct BoundaryOptimizationPass;

impl PostProcessPass for BoundaryOptimizationPass {
    fn name(&self) -> &'static str {
        "boundary-optimization"
    }

    fn should_apply(&self, chunks: &[Chunk], ctx: &ProcessingContext) -> bool {
        ctx.config().post_processing.enable_boundary_optimization && chunks.len() > 1
    }

    fn apply(&self, chunks: &[Chunk], ctx: &ProcessingContext) -> Result<PassOutput, PassError> {
        let config = ctx.config();
        let window = config.post_processing.boundary_window;
        let max = config.chunking.max_chunk_size;
        let source = SourceText::new(ctx.content());
        let score_at = |line: usize| boundary_score(source.line(line).unwrap_or_default(), source.line(line + 1));

        let mut out = chunks.to_vec();
        for i in 0..out.len().saturating_sub(1) {
            let (left, right) = (&out[i], &out[i + 1]);
            if left.end_line() + 1 != right.start_line()
                || left.metadata.overlap_applied
                || right.metadata.overlap_applied
                || !source.matches(left)
                || !source.matches(right)
            {
                continue;
            }

            let current = left.end_line();
            let lo = current.saturating_sub(window).max(left.start_line());
            let hi = (current + window).min(right.end_line().saturating_sub(1));

            let mut best = current;
            let mut best_score = score_at(current);
            for distance in 1..=window {
                let candidates = [current.checked_sub(distance), Some(current + distance)];
                for cut in candidates.into_iter().flatten() {
                    if cut < lo || cut > hi {
                        continue;
                    }
                    let score = score_at(cut);
                    if score > best_score
                        && source.slice(left.start_line(), cut).chars().count() <= max
                        && source.slice(cut + 1, right.end_line()).chars().count() <= max
                    {
                        best = cut;
                        best_score = score;
                    }
                }
            }

            if best != current {
                log::debug!("Moving chunk boundary from line {current} to {best}");
                let (left_start, right_end) = (left.start_line(), right.end_line());
                let mut left_meta = left.metadata.clone();
                left_meta.end_line = best;
                let mut right_meta = right.metadata.clone();
                right_meta.start_line = best + 1;
                out[i] = Chunk::new(source.slice(left_start, best), left_meta);
                out[i + 1] = Chunk::new(source.slice(best + 1, right_end), right_meta);
            }
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

    const CODE: &str = "fn a() {\n    one();\n}\n\nfn b() {\n    two();\n}";

    fn ctx() -> ProcessingContext {
        ProcessingContext::builder()
            .content(CODE)
            .language("rust")
            .config(Arc::new(ProcessingConfig::default()))
            .build()
            .unwrap()
    }

    fn chunk(start: usize, end: usize) -> Chunk {
        Chunk::new(
            SourceText::new(CODE).slice(start, end),
            ChunkMetadata::new(start, end, "rust", "line"),
        )
    }

    #[test]
    fn cut_moves_to_blank_line_before_declaration() {
        let chunks = vec![chunk(1, 2), chunk(3, 7)];
        let out = BoundaryOptimizationPass.apply(&chunks, &ctx()).unwrap();
        let ranges: Vec<(usize, usize)> = out.chunks.iter().map(|c| (c.start_line(), c.end_line())).collect();
        assert_eq!(ranges, vec![(1, 4), (5, 7)]);
    }

    #[test]
    fn good_cuts_stay() {
        let chunks = vec![chunk(1, 4), chunk(5, 7)];
        let out = BoundaryOptimizationPass.apply(&chunks, &ctx()).unwrap();
        assert_eq!(out.chunks, chunks);
    }

    #[test]
    fn gapped_pairs_are_ignored() {
        let chunks = vec![chunk(1, 2), chunk(5, 7)];
        let out = BoundaryOptimizationPass.apply(&chunks, &ctx()).unwrap();
        assert_eq!(out.chunks, chunks);
    }
}
