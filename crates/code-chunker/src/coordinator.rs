//! Single entry point for one file: context build, strategy selection,
//! execution with fallback, post-processing and result assembly.

use crate::ast_analyzer::TreeSitterBackend;
use crate::cache::{content_key, AuxiliaryCaches};
use crate::config::ProcessingConfig;
use crate::config_store::ConfigStore;
use crate::context::{resolve_language, FileFeatures, FileInput, ProcessingContext};
use crate::error::{panic_message, ChunkerError, Result, StrategyError};
use crate::pipeline::PostProcessingPipeline;
use crate::result::ProcessingResult;
use crate::selector::StrategySelector;
use crate::similarity::{SimilarityScorer, TokenJaccardScorer};
use crate::strategy::{
    basic_line_chunks, default_registry, ChunkingStrategy, LineStrategy, StrategyRegistry, BASIC_LINES_PER_CHUNK,
    LINE_STRATEGY,
};
use crate::types::Chunk;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

/// Strategy label of the infallible window slicer
pub const BASIC_STRATEGY: &str = "basic";

/// Language used by every cheap fallback path
pub const FALLBACK_LANGUAGE: &str = "text";

/// Step of the execution fallback chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    /// The selected strategy
    Primary,
    /// The reserved line strategy
    Line,
    /// Fixed line windows; cannot fail
    Basic,
}

/// Pick the tier to try after `current` failed with `error`.
///
/// A timeout skips straight to the basic slicer since the time budget is
/// already spent.
pub fn next_tier(current: Tier, error: &StrategyError, line_available: bool) -> Tier {
    match (current, error) {
        (_, StrategyError::TimedOut { .. }) => Tier::Basic,
        (Tier::Primary, _) if line_available => Tier::Line,
        _ => Tier::Basic,
    }
}

/// Chunks plus how they were obtained
struct Execution {
    chunks: Vec<Chunk>,
    strategy: String,
    tier: Tier,
    fallback_reason: Option<String>,
}

/// Orchestrates the processing of single files.
///
/// Owns the strategy registry and auxiliary caches; reads its configuration
/// from a [`ConfigStore`] snapshot taken at the start of every call.
pub struct ProcessingCoordinator {
    store: Arc<ConfigStore>,
    selector: StrategySelector,
    caches: AuxiliaryCaches,
    scorer: Arc<dyn SimilarityScorer>,
}

impl ProcessingCoordinator {
    /// Coordinator with the built-in strategies and tree-sitter backend
    pub fn new(store: Arc<ConfigStore>) -> Self {
        let caches = AuxiliaryCaches::default();
        let registry = default_registry(Arc::new(TreeSitterBackend::new()), Arc::clone(&caches.trees));
        Self::with_parts(store, registry, caches, Arc::new(TokenJaccardScorer))
    }

    pub fn with_parts(
        store: Arc<ConfigStore>,
        registry: StrategyRegistry,
        caches: AuxiliaryCaches,
        scorer: Arc<dyn SimilarityScorer>,
    ) -> Self {
        Self {
            store,
            selector: StrategySelector::new(Arc::new(registry)),
            caches,
            scorer,
        }
    }

    pub fn config_store(&self) -> &Arc<ConfigStore> {
        &self.store
    }

    pub fn registry(&self) -> &StrategyRegistry {
        self.selector.registry()
    }

    pub fn caches(&self) -> &AuxiliaryCaches {
        &self.caches
    }

    /// Process one file with the current config snapshot; never fails
    pub fn process(&self, input: &FileInput) -> ProcessingResult {
        self.process_with_config(input, self.store.snapshot())
    }

    pub fn process_with_config(&self, input: &FileInput, config: Arc<ProcessingConfig>) -> ProcessingResult {
        let started = Instant::now();
        let file_path = input.file_path.clone();

        if input.content.is_empty() {
            log::debug!("Empty content for {}", file_path.as_deref().unwrap_or("<inline>"));
            return ProcessingResult::new(Vec::new(), "none", input.language.trim().to_lowercase(), file_path)
                .with_elapsed(started.elapsed());
        }

        let ctx = match self.build_context(input, config) {
            Ok(ctx) => ctx,
            Err(e) => {
                log::warn!("Cannot build processing context: {e}");
                let language = if input.language.trim().is_empty() {
                    FALLBACK_LANGUAGE
                } else {
                    input.language.as_str()
                };
                return create_basic_chunking_result(&input.content, language, file_path.as_deref())
                    .with_fallback(e.to_string())
                    .with_elapsed(started.elapsed());
            }
        };

        let primary = match self.selector.select(&ctx) {
            Ok(selection) => {
                log::debug!(
                    "Selected strategy '{}' ({:?}) for {}",
                    selection.strategy.name(),
                    selection.step,
                    ctx.file_path().unwrap_or("<inline>")
                );
                selection.strategy
            }
            Err(e) => {
                log::error!("{e}");
                return create_basic_chunking_result(ctx.content(), ctx.language(), ctx.file_path())
                    .with_error(e.to_string())
                    .with_elapsed(started.elapsed());
            }
        };

        let execution = self.execute(&primary, &ctx);

        let (chunks, report) = if execution.tier == Tier::Basic {
            (execution.chunks, None)
        } else {
            let pipeline = PostProcessingPipeline::from_config(ctx.config(), Arc::clone(&self.scorer));
            let (chunks, report) = pipeline.process(execution.chunks, &ctx);
            (chunks, Some(report))
        };

        let chunks = if ctx.config().features.enable_standardization {
            standardize(chunks, &ctx)
        } else {
            chunks
        };

        let mut result = ProcessingResult::new(chunks, execution.strategy, ctx.language(), file_path);
        result.metadata.pipeline = report;
        if let Some(reason) = execution.fallback_reason {
            result = result.with_fallback(reason);
        }
        result.with_elapsed(started.elapsed())
    }

    /// Build the context, reusing cached features for identical content
    pub fn build_context(&self, input: &FileInput, config: Arc<ProcessingConfig>) -> Result<ProcessingContext> {
        let features = match &input.features {
            Some(features) => features.clone(),
            None => {
                let lang = resolve_language(&input.language, input.file_path.as_deref());
                let key = content_key(lang, &input.content);
                let weight = std::mem::size_of::<FileFeatures>() as u64;
                self.caches.features.get_or_insert_with(key, weight, || {
                    FileFeatures::detect(&input.content, &input.language, input.file_path.as_deref())
                })
            }
        };

        ProcessingContext::builder()
            .content(input.content.clone())
            .language(input.language.clone())
            .file_path(input.file_path.clone())
            .config(config)
            .features(Some(features))
            .ast(input.ast.clone())
            .build()
    }

    /// Run `primary`, walking down the fallback chain until something succeeds
    fn execute(&self, primary: &Arc<dyn ChunkingStrategy>, ctx: &ProcessingContext) -> Execution {
        let line = self
            .registry()
            .get(LINE_STRATEGY)
            .filter(|s| primary.name() != LINE_STRATEGY && s.can_handle(ctx));

        let mut tier = Tier::Primary;
        let mut failures: Vec<String> = Vec::new();
        loop {
            let strategy = match tier {
                Tier::Primary => Arc::clone(primary),
                Tier::Line => match &line {
                    Some(line) => Arc::clone(line),
                    None => {
                        tier = Tier::Basic;
                        continue;
                    }
                },
                Tier::Basic => break,
            };

            match run_strategy(strategy.as_ref(), ctx) {
                Ok(chunks) => {
                    return Execution {
                        chunks,
                        strategy: strategy.name().to_string(),
                        tier,
                        fallback_reason: (!failures.is_empty()).then(|| failures.join("; ")),
                    };
                }
                Err(e) => {
                    log::warn!(
                        "Strategy '{}' failed for {}: {e}",
                        strategy.name(),
                        ctx.file_path().unwrap_or("<inline>")
                    );
                    failures.push(ChunkerError::strategy(strategy.name(), e.clone()).to_string());
                    tier = next_tier(tier, &e, line.is_some());
                }
            }
        }

        Execution {
            chunks: basic_line_chunks(ctx.content(), ctx.language(), ctx.file_path(), BASIC_LINES_PER_CHUNK),
            strategy: BASIC_STRATEGY.to_string(),
            tier: Tier::Basic,
            fallback_reason: Some(failures.join("; ")),
        }
    }

    /// Cheap degraded path: language forced to text, plain line windows.
    ///
    /// Skips strategy selection and post-processing entirely.
    pub fn line_fallback(&self, input: &FileInput, reason: &str) -> Result<ProcessingResult> {
        let started = Instant::now();
        let ctx = ProcessingContext::builder()
            .content(input.content.clone())
            .language(FALLBACK_LANGUAGE)
            .file_path(input.file_path.clone())
            .config(self.store.snapshot())
            .build()?;

        let chunks = run_strategy(&LineStrategy, &ctx).map_err(|e| ChunkerError::strategy(LINE_STRATEGY, e))?;
        Ok(
            ProcessingResult::new(chunks, LINE_STRATEGY, FALLBACK_LANGUAGE, input.file_path.clone())
                .with_fallback(reason)
                .with_elapsed(started.elapsed()),
        )
    }
}

impl std::fmt::Debug for ProcessingCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessingCoordinator")
            .field("strategies", &self.registry().names())
            .field("caches", &self.caches)
            .field("config_version", &self.store.version())
            .finish_non_exhaustive()
    }
}

/// Result of the infallible window slicer
pub fn create_basic_chunking_result(content: &str, language: &str, file_path: Option<&str>) -> ProcessingResult {
    let chunks = basic_line_chunks(content, language, file_path, BASIC_LINES_PER_CHUNK);
    ProcessingResult::new(chunks, BASIC_STRATEGY, language, file_path.map(str::to_string))
}

/// Run one strategy, turning panics, overruns and bad output into errors
fn run_strategy(strategy: &dyn ChunkingStrategy, ctx: &ProcessingContext) -> std::result::Result<Vec<Chunk>, StrategyError> {
    let limit_ms = ctx.config().performance.max_execution_time_ms;
    let started = Instant::now();

    let chunks = catch_unwind(AssertUnwindSafe(|| strategy.chunk(ctx)))
        .unwrap_or_else(|payload| Err(StrategyError::Panicked(panic_message(payload.as_ref()))))?;

    let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    if elapsed_ms > limit_ms {
        return Err(StrategyError::TimedOut { elapsed_ms, limit_ms });
    }

    check_contract(&chunks, ctx)?;
    Ok(chunks)
}

fn check_contract(chunks: &[Chunk], ctx: &ProcessingContext) -> std::result::Result<(), StrategyError> {
    if chunks.is_empty() && !ctx.is_blank() {
        return Err(StrategyError::ContractViolation("no chunks for non-empty content".into()));
    }
    let total = ctx.total_lines();
    if let Some(bad) = chunks
        .iter()
        .find(|c| c.start_line() == 0 || c.start_line() > c.end_line() || c.end_line() > total)
    {
        return Err(StrategyError::ContractViolation(format!(
            "chunk range {}-{} outside 1..={total}",
            bad.start_line(),
            bad.end_line()
        )));
    }
    Ok(())
}

/// Uniform metadata: file path and language from the context, ranges clamped
/// to the file, order by position
fn standardize(mut chunks: Vec<Chunk>, ctx: &ProcessingContext) -> Vec<Chunk> {
    let total = ctx.total_lines().max(1);
    for chunk in &mut chunks {
        let meta = &mut chunk.metadata;
        meta.file_path = ctx.file_path().map(str::to_string);
        meta.language = ctx.language().to_string();
        meta.start_line = meta.start_line.clamp(1, total);
        meta.end_line = meta.end_line.clamp(meta.start_line, total);
        meta.size = chunk.content.chars().count();
        meta.line_count = meta.end_line - meta.start_line + 1;
    }
    chunks.sort_by_key(|c| (c.start_line(), c.end_line()));
    chunks
}
