use super::{PassOutput, PostProcessPass};
use crate::config::{OverlapMode, ProcessingConfig};
use crate::context::ProcessingContext;
use crate::error::PassError;
use crate::quality::{merge_chunks, split_chunk};
use crate::signature::{is_block_end, is_signature};
use crate::similarity::{group_by_similarity, SimilarityScorer};
use crate::types::{Chunk, ChunkType, SourceText};
use std::sync::Arc;

/// Share of a text chunk's own line count it may borrow from its successor
const LOOKAHEAD_LINE_RATIO: f64 = 0.3;
/// Lines searched for a natural stop in semantic-boundary mode
const SEMANTIC_SEARCH_LINES: usize = 5;

/// Adds context between neighbouring chunks, then drops near-duplicates.
///
/// Oversized chunks of code files are split into pieces that each repeat a
/// few trailing lines of the previous piece. Chunks of text files instead
/// borrow a few leading lines of what follows them. Adjacent chunks whose
/// content scores above the dedup threshold are merged afterwards.
pub struct OverlapPass {
    scorer: Arc<dyn SimilarityScorer>,
}

impl OverlapPass {
    pub fn new(scorer: Arc<dyn SimilarityScorer>) -> Self {
        Self { scorer }
    }

    fn dedup(&self, chunks: Vec<Chunk>, config: &ProcessingConfig, source: &SourceText<'_>) -> Vec<Chunk> {
        let threshold = config.post_processing.dedup_threshold;
        let max = config.chunking.max_chunk_size;
        let groups = group_by_similarity(&chunks, |members, candidate| {
            let Some(last) = members.last() else { return false };
            self.scorer.score(&last.content, &candidate.content) >= threshold
                && merge_chunks(&[(*last).clone(), candidate.clone()], Some(source)).is_some_and(|m| m.len() <= max)
        });
        if groups.len() == chunks.len() {
            return chunks;
        }

        let mut out = Vec::with_capacity(groups.len());
        for group in groups {
            let run: Vec<Chunk> = group.iter().map(|&i| chunks[i].clone()).collect();
            if run.len() > 1 {
                log::debug!("Collapsing {} near-duplicate chunks", run.len());
            }
            if let Some(merged) = merge_chunks(&run, Some(source)) {
                out.push(merged);
            }
        }
        out
    }
}

impl std::fmt::Debug for OverlapPass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OverlapPass").finish_non_exhaustive()
    }
}

impl PostProcessPass for OverlapPass {
    fn name(&self) -> &'static str {
        "overlap"
    }

    fn should_apply(&self, chunks: &[Chunk], ctx: &ProcessingContext) -> bool {
        let config = ctx.config();
        let max = config.chunking.max_chunk_size;
        config.post_processing.enable_overlap
            && config.chunking.overlap_size > 0
            && (chunks.len() > 1 || chunks.iter().any(|c| c.len() > max))
    }

    fn apply(&self, chunks: &[Chunk], ctx: &ProcessingContext) -> Result<PassOutput, PassError> {
        let config = ctx.config();
        let source = SourceText::new(ctx.content());

        let overlapped = if ctx.features().is_code_file {
            let mut out = Vec::with_capacity(chunks.len());
            for chunk in chunks {
                if chunk.len() > config.chunking.max_chunk_size {
                    out.extend(split_with_overlap(chunk, config));
                } else {
                    out.push(chunk.clone());
                }
            }
            out
        } else {
            extend_with_lookahead(chunks, config, &source)
        };

        let out = if config.features.enable_chunk_deduplication {
            self.dedup(overlapped, config, &source)
        } else {
            overlapped
        };
        Ok(out.into())
    }
}

/// Split an oversized chunk so each piece starts with the tail of the last.
///
/// The repeated tail is at most `min(overlap_size, max_chunk_size *
/// max_overlap_ratio)` characters, and each piece's own lines are capped so
/// tail plus body stays within the size limit. Every piece carries at least
/// one new line. A line wider than the limit on its own is cut by
/// characters and carries no overlap.
fn split_with_overlap(chunk: &Chunk, config: &ProcessingConfig) -> Vec<Chunk> {
    let max = config.chunking.max_chunk_size;
    let ratio_cap = (max as f64 * config.chunking.max_overlap_ratio).floor() as usize;
    let max_overlap = config.chunking.overlap_size.min(ratio_cap);
    let body_budget = max.saturating_sub(max_overlap + 1).max(1);

    let lines: Vec<&str> = chunk.content.lines().collect();
    if lines.len() <= 1 {
        let mut whole = chunk.clone();
        whole.metadata.chunk_type = ChunkType::OverlapSplit;
        whole.metadata.merged_types.clear();
        return fit_within(whole, max);
    }
    let line_no = |idx: usize| (chunk.start_line() + idx).min(chunk.end_line());
    let width = |idx: usize| lines[idx].chars().count();

    let mut pieces = Vec::new();
    let mut seed_start: Option<usize> = None;
    let mut idx = 0usize;

    while idx < lines.len() {
        let body_start = idx;
        let mut body_len = 0usize;
        while idx < lines.len() {
            let grown = if idx == body_start { width(idx) } else { body_len + 1 + width(idx) };
            if idx > body_start && grown > body_budget {
                break;
            }
            body_len = grown;
            idx += 1;
        }

        let first = if body_len > body_budget {
            body_start
        } else {
            seed_start.unwrap_or(body_start)
        };
        let mut metadata = chunk.metadata.clone();
        metadata.start_line = line_no(first);
        metadata.end_line = line_no(idx - 1);
        metadata.chunk_type = ChunkType::OverlapSplit;
        metadata.merged_types.clear();
        pieces.extend(fit_within(Chunk::new(lines[first..idx].join("\n"), metadata), max));

        // Seed the next piece with the longest tail of this body that fits
        seed_start = None;
        let mut tail_len = 0usize;
        for back in (body_start..idx).rev() {
            let grown = if back == idx - 1 { width(back) } else { tail_len + 1 + width(back) };
            if grown > max_overlap {
                break;
            }
            tail_len = grown;
            seed_start = Some(back);
        }
    }

    log::debug!(
        "Split oversized chunk {}-{} into {} overlapping pieces",
        chunk.start_line(),
        chunk.end_line(),
        pieces.len()
    );
    pieces
}

/// Re-split a piece that still exceeds `max`, cutting single long lines by characters
fn fit_within(piece: Chunk, max: usize) -> Vec<Chunk> {
    if piece.len() <= max {
        return vec![piece];
    }
    split_chunk(&piece, max)
        .into_iter()
        .flat_map(|part| if part.len() > max { split_chunk(&part, max) } else { vec![part] })
        .collect()
}

/// Append a few of the following source lines to every chunk but the last
fn extend_with_lookahead(chunks: &[Chunk], config: &ProcessingConfig, source: &SourceText<'_>) -> Vec<Chunk> {
    let chunking = &config.chunking;
    let per_line = chunking.assumed_line_length.max(1);
    let budget_lines = chunking.overlap_size / per_line;
    let total = source.len();

    let mut out = chunks.to_vec();
    let last = out.len().saturating_sub(1);
    for chunk in out.iter_mut().take(last) {
        if chunk.metadata.overlap_applied {
            continue;
        }
        let own_cap = (chunk.line_count() as f64 * LOOKAHEAD_LINE_RATIO).floor() as usize;
        let lookahead = budget_lines.min(own_cap);
        if lookahead == 0 {
            continue;
        }

        let end = chunk.end_line();
        let stop = match config.post_processing.overlap_mode {
            OverlapMode::Lookahead => end + lookahead,
            OverlapMode::SemanticBoundary => semantic_stop(source, end).unwrap_or(end + lookahead),
        }
        .min(total);

        let mut content = chunk.content.clone();
        let mut size = chunk.len();
        let mut new_end = end;
        for n in end + 1..=stop {
            let Some(line) = source.line(n) else { break };
            let grown = size + 1 + line.chars().count();
            if grown > chunking.max_chunk_size {
                break;
            }
            content.push('\n');
            content.push_str(line);
            size = grown;
            new_end = n;
        }

        if new_end > end {
            let mut metadata = chunk.metadata.clone();
            metadata.end_line = new_end;
            metadata.overlap_applied = true;
            *chunk = Chunk::new(content, metadata);
        }
    }
    out
}

/// Last line to borrow after `end`: just before a declaration, else through a
/// block end, else through a blank line
fn semantic_stop(source: &SourceText<'_>, end: usize) -> Option<usize> {
    let window = end + 1..=end + SEMANTIC_SEARCH_LINES;
    let line = |n: usize| source.line(n);

    window
        .clone()
        .find(|&n| line(n).is_some_and(is_signature))
        .and_then(|n| (n > end + 1).then_some(n - 1))
        .or_else(|| window.clone().find(|&n| line(n).is_some_and(is_block_end)))
        .or_else(|| window.clone().find(|&n| line(n).is_some_and(|l| l.trim().is_empty())))
}
