//! Post-processing pipeline.
//!
//! Passes run in two phases. The chunking phase repairs and reshapes the raw
//! strategy output (symbol balance, filtering, rebalancing); the
//! chunk-processing phase refines it (merging, boundary optimization,
//! overlap). Every pass is best-effort: when one fails or panics its input is
//! passed on unchanged and the failure is recorded in the [`PipelineReport`].

mod balance;
mod boundary;
mod filter;
mod merge;
mod overlap;
mod rebalance;

pub use balance::SymbolBalancePass;
pub use boundary::BoundaryOptimizationPass;
pub use filter::IntelligentFilterPass;
pub use merge::AdvancedMergePass;
pub use overlap::OverlapPass;
pub use rebalance::SmartRebalancePass;

use crate::config::ProcessingConfig;
use crate::context::ProcessingContext;
use crate::error::{panic_message, PassError};
use crate::similarity::SimilarityScorer;
use crate::syntax::LineSpan;
use crate::types::Chunk;
use serde::{Deserialize, Serialize};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Chunking,
    ChunkProcessing,
}

/// What a pass hands to the next one
#[derive(Debug, Clone, Default)]
pub struct PassOutput {
    pub chunks: Vec<Chunk>,
    /// Line ranges dropped as noise
    pub discarded: Vec<LineSpan>,
}

impl From<Vec<Chunk>> for PassOutput {
    fn from(chunks: Vec<Chunk>) -> Self {
        Self {
            chunks,
            discarded: Vec::new(),
        }
    }
}

/// One post-processing step
pub trait PostProcessPass: Send + Sync {
    fn name(&self) -> &'static str;

    fn should_apply(&self, chunks: &[Chunk], ctx: &ProcessingContext) -> bool;

    fn apply(&self, chunks: &[Chunk], ctx: &ProcessingContext) -> Result<PassOutput, PassError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassFailure {
    pub pass: String,
    pub message: String,
}

/// Trace of one pipeline run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineReport {
    pub applied: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: Vec<PassFailure>,
    pub discarded: Vec<LineSpan>,
    /// Chunk-processing rounds run
    pub rounds: u32,
}

impl PipelineReport {
    fn note(list: &mut Vec<String>, name: &str) {
        if !list.iter().any(|n| n == name) {
            list.push(name.to_string());
        }
    }
}

/// Ordered, conditionally registered passes
#[derive(Default)]
pub struct PostProcessingPipeline {
    chunking: Vec<Box<dyn PostProcessPass>>,
    processing: Vec<Box<dyn PostProcessPass>>,
    max_rounds: u32,
}

impl PostProcessingPipeline {
    pub fn new() -> Self {
        Self {
            max_rounds: 1,
            ..Self::default()
        }
    }

    /// Register the passes the config enables, in default or configured order
    pub fn from_config(config: &ProcessingConfig, scorer: Arc<dyn SimilarityScorer>) -> Self {
        let post = &config.post_processing;
        let mut pipeline = Self::new();
        pipeline.max_rounds = post.max_rounds.max(1);

        if config.features.enable_bracket_balance {
            pipeline.register(Phase::Chunking, Box::new(SymbolBalancePass));
        }
        if post.enable_intelligent_filtering {
            pipeline.register(Phase::Chunking, Box::new(IntelligentFilterPass));
        }
        if post.enable_smart_rebalancing {
            pipeline.register(Phase::Chunking, Box::new(SmartRebalancePass));
        }
        if post.enable_advanced_merging {
            pipeline.register(Phase::ChunkProcessing, Box::new(AdvancedMergePass));
        }
        if post.enable_boundary_optimization {
            pipeline.register(Phase::ChunkProcessing, Box::new(BoundaryOptimizationPass));
        }
        if post.enable_overlap {
            pipeline.register(Phase::ChunkProcessing, Box::new(OverlapPass::new(scorer)));
        }

        if !post.order.is_empty() {
            pipeline.apply_order(&post.order);
        }
        pipeline
    }

    pub fn register(&mut self, phase: Phase, pass: Box<dyn PostProcessPass>) {
        match phase {
            Phase::Chunking => self.chunking.push(pass),
            Phase::ChunkProcessing => self.processing.push(pass),
        }
    }

    /// Keep only the named passes, in the given order, within each phase
    fn apply_order(&mut self, order: &[String]) {
        let position = |pass: &Box<dyn PostProcessPass>| order.iter().position(|n| n == pass.name());
        for list in [&mut self.chunking, &mut self.processing] {
            list.retain(|p| position(p).is_some());
            list.sort_by_key(|p| position(p));
        }
    }

    pub fn pass_names(&self, phase: Phase) -> Vec<&'static str> {
        let list = match phase {
            Phase::Chunking => &self.chunking,
            Phase::ChunkProcessing => &self.processing,
        };
        list.iter().map(|p| p.name()).collect()
    }

    pub fn process(&self, chunks: Vec<Chunk>, ctx: &ProcessingContext) -> (Vec<Chunk>, PipelineReport) {
        let mut report = PipelineReport::default();

        let mut current = chunks;
        for pass in &self.chunking {
            current = run_pass(pass.as_ref(), current, ctx, &mut report);
        }

        for round in 1..=self.max_rounds {
            let before = (round < self.max_rounds).then(|| current.clone());
            for pass in &self.processing {
                current = run_pass(pass.as_ref(), current, ctx, &mut report);
            }
            report.rounds = round;
            if before.is_some_and(|b| b == current) {
                break;
            }
        }

        (current, report)
    }
}

fn run_pass(
    pass: &dyn PostProcessPass,
    chunks: Vec<Chunk>,
    ctx: &ProcessingContext,
    report: &mut PipelineReport,
) -> Vec<Chunk> {
    let name = pass.name();
    if !pass.should_apply(&chunks, ctx) {
        PipelineReport::note(&mut report.skipped, name);
        return chunks;
    }

    let outcome = catch_unwind(AssertUnwindSafe(|| pass.apply(&chunks, ctx)))
        .unwrap_or_else(|payload| {
            Err(PassError::Panicked {
                pass: name.to_string(),
                reason: panic_message(payload.as_ref()),
            })
        })
        .and_then(|output| check_bounds(name, output, ctx.total_lines()));

    match outcome {
        Ok(output) => {
            log::debug!("Pass '{name}': {} -> {} chunks", chunks.len(), output.chunks.len());
            PipelineReport::note(&mut report.applied, name);
            report.discarded.extend(output.discarded);
            output.chunks
        }
        Err(e) => {
            log::warn!("{e}; keeping its input");
            report.failed.push(PassFailure {
                pass: name.to_string(),
                message: e.to_string(),
            });
            chunks
        }
    }
}

/// Reject output whose line ranges leave the file
fn check_bounds(name: &str, output: PassOutput, total_lines: usize) -> Result<PassOutput, PassError> {
    for chunk in &output.chunks {
        let (start, end) = (chunk.start_line(), chunk.end_line());
        if start == 0 || start > end || end > total_lines.max(1) {
            return Err(PassError::failed(
                name,
                format!("produced line range {start}-{end} outside 1..={total_lines}"),
            ));
        }
    }
    Ok(output)
}
