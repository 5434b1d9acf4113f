use super::{PassOutput, PostProcessPass};
use crate::config::RebalanceMode;
use crate::context::ProcessingContext;
use crate::error::PassError;
use crate::quality::{chunk_sizes, coefficient_of_variation, merge_chunks, split_chunk, target_size, types_compatible};
use crate::signature::contains_signature;
use crate::types::{Chunk, SourceText};

/// Chunks above this multiple of the target are split by the variance sweep
const SWEEP_SPLIT_FACTOR: f64 = 1.5;
/// Chunks below this multiple of the target are merged by the variance sweep
const SWEEP_MERGE_FACTOR: f64 = 0.5;

/// Evens out chunk sizes.
///
/// Conservative mode only folds an undersized trailing chunk into its
/// predecessor. Aggressive mode splits oversized chunks and folds undersized
/// ones into the previous chunk. In either mode a high coefficient of
/// variation triggers one extra split/merge sweep around the target size.
#[derive(Debug, Default, Clone, Copy)]
pub struct SmartRebalancePass;

struct Limits<'s, 'a> {
    min: usize,
    max: usize,
    source: &'s SourceText<'a>,
}

impl Limits<'_, '_> {
    /// Merge `chunk` into `prev` unless it stands alone or the result is too big
    fn absorb(&self, prev: &Chunk, chunk: &Chunk) -> Option<Chunk> {
        let allowed = types_compatible(prev.chunk_type(), chunk.chunk_type())
            && prev.metadata.language == chunk.metadata.language
            && !chunk.chunk_type().is_independent()
            && !contains_signature(&chunk.content);
        if !allowed {
            return None;
        }
        merge_chunks(&[prev.clone(), chunk.clone()], Some(self.source)).filter(|m| m.len() <= self.max)
    }

    fn conservative(&self, chunks: &[Chunk]) -> Vec<Chunk> {
        let mut out = chunks.to_vec();
        if out.len() >= 2 {
            let last = out.len() - 1;
            if out[last].len() < self.min {
                if let Some(merged) = self.absorb(&out[last - 1], &out[last]) {
                    out.truncate(last - 1);
                    out.push(merged);
                }
            }
        }
        out
    }

    fn aggressive(&self, chunks: &[Chunk], target: usize) -> Vec<Chunk> {
        self.reshape(chunks, target, |c| c.len() > self.max, |c| c.len() < self.min)
    }

    fn sweep(&self, chunks: &[Chunk], target: usize) -> Vec<Chunk> {
        let split_above = (target as f64 * SWEEP_SPLIT_FACTOR) as usize;
        let merge_below = (target as f64 * SWEEP_MERGE_FACTOR) as usize;
        self.reshape(chunks, target, |c| c.len() > split_above, |c| c.len() < merge_below)
    }

    fn reshape(
        &self,
        chunks: &[Chunk],
        target: usize,
        too_big: impl Fn(&Chunk) -> bool,
        too_small: impl Fn(&Chunk) -> bool,
    ) -> Vec<Chunk> {
        let mut out: Vec<Chunk> = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            if too_big(chunk) {
                out.extend(split_chunk(chunk, target));
                continue;
            }
            if too_small(chunk) {
                let merged = out.last().and_then(|prev| self.absorb(prev, chunk));
                if let (Some(merged), Some(prev)) = (merged, out.last_mut()) {
                    *prev = merged;
                    continue;
                }
            }
            out.push(chunk.clone());
        }
        out
    }
}

impl PostProcessPass for SmartRebalancePass {
    fn name(&self) -> &'static str {
        "smart-rebalance"
    }

    fn should_apply(&self, chunks: &[Chunk], ctx: &ProcessingContext) -> bool {
        let config = ctx.config();
        if !config.post_processing.enable_smart_rebalancing {
            return false;
        }
        let oversized = chunks.iter().any(|c| c.len() > config.chunking.max_chunk_size);
        chunks.len() > 1 || (config.post_processing.rebalance_mode == RebalanceMode::Aggressive && oversized)
    }

    fn apply(&self, chunks: &[Chunk], ctx: &ProcessingContext) -> Result<PassOutput, PassError> {
        let config = ctx.config();
        let source = SourceText::new(ctx.content());
        let limits = Limits {
            min: config.chunking.min_chunk_size,
            max: config.chunking.max_chunk_size,
            source: &source,
        };
        let target = target_size(&chunk_sizes(chunks), limits.min, limits.max);

        let mut out = match config.post_processing.rebalance_mode {
            RebalanceMode::Conservative => limits.conservative(chunks),
            RebalanceMode::Aggressive => limits.aggressive(chunks, target),
        };

        let variation = coefficient_of_variation(&chunk_sizes(&out));
        if variation > config.post_processing.variance_threshold {
            log::debug!("Size variation {variation:.2} above threshold; rebalancing around {target}");
            out = limits.sweep(&out, target);
        }

        Ok(out.into())
    }
}
