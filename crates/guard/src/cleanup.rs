//! Forced cleanup run when errors pile up or memory runs short.

use crate::error::{GuardError, Result};
use crate::memory::MemoryState;
use async_trait::async_trait;
use chunkflow_code_chunker::{AuxiliaryCaches, FeatureCache, Purgeable, TreeCache};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanupTrigger {
    ErrorThreshold,
    MemoryPressure,
    Manual,
}

/// What the cleanup strategies get to look at
#[derive(Debug, Clone)]
pub struct CleanupContext {
    pub trigger: CleanupTrigger,
    pub memory: Option<MemoryState>,
    pub error_count: u32,
}

impl CleanupContext {
    pub fn new(trigger: CleanupTrigger) -> Self {
        Self {
            trigger,
            memory: None,
            error_count: 0,
        }
    }

    #[must_use]
    pub fn with_memory(mut self, memory: MemoryState) -> Self {
        self.memory = Some(memory);
        self
    }

    #[must_use]
    pub fn with_error_count(mut self, count: u32) -> Self {
        self.error_count = count;
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupOutcome {
    pub bytes_freed: u64,
    pub entries_cleared: usize,
}

#[async_trait]
pub trait CleanupStrategy: Send + Sync {
    fn name(&self) -> &str;

    /// Lower runs first
    fn priority(&self) -> u32;

    fn is_applicable(&self, ctx: &CleanupContext) -> bool;

    /// Expected bytes released by [`CleanupStrategy::cleanup`]
    fn estimate_impact(&self, ctx: &CleanupContext) -> u64;

    async fn cleanup(&self, ctx: &CleanupContext) -> Result<CleanupOutcome>;
}

/// Aggregate of one cleanup run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupReport {
    pub bytes_freed: u64,
    /// Strategies that released at least one entry
    pub caches_cleared: usize,
    pub strategies_run: Vec<String>,
    pub failures: Vec<String>,
}

fn purge(cache: &dyn Purgeable) -> CleanupOutcome {
    let stats = cache.purge();
    log::debug!("Purged {} entries ({} bytes) from {}", stats.entries, stats.bytes, cache.name());
    CleanupOutcome {
        bytes_freed: stats.bytes,
        entries_cleared: stats.entries,
    }
}

/// Drops cached syntax trees; the largest auxiliary structure
pub struct TreeCacheCleanup {
    cache: Arc<TreeCache>,
}

impl TreeCacheCleanup {
    pub fn new(cache: Arc<TreeCache>) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl CleanupStrategy for TreeCacheCleanup {
    fn name(&self) -> &str {
        "tree-cache"
    }

    fn priority(&self) -> u32 {
        10
    }

    fn is_applicable(&self, _ctx: &CleanupContext) -> bool {
        !self.cache.is_empty()
    }

    fn estimate_impact(&self, _ctx: &CleanupContext) -> u64 {
        self.cache.estimated_bytes()
    }

    async fn cleanup(&self, _ctx: &CleanupContext) -> Result<CleanupOutcome> {
        Ok(purge(self.cache.as_ref()))
    }
}

/// Drops cached file features
pub struct FeatureCacheCleanup {
    cache: Arc<FeatureCache>,
}

impl FeatureCacheCleanup {
    pub fn new(cache: Arc<FeatureCache>) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl CleanupStrategy for FeatureCacheCleanup {
    fn name(&self) -> &str {
        "feature-cache"
    }

    fn priority(&self) -> u32 {
        20
    }

    // Features are cheap to keep; only give them up under real pressure.
    fn is_applicable(&self, ctx: &CleanupContext) -> bool {
        !self.cache.is_empty()
            && (ctx.trigger != CleanupTrigger::ErrorThreshold || ctx.memory.is_some_and(|m| m.over_limit))
    }

    fn estimate_impact(&self, _ctx: &CleanupContext) -> u64 {
        self.cache.estimated_bytes()
    }

    async fn cleanup(&self, _ctx: &CleanupContext) -> Result<CleanupOutcome> {
        Ok(purge(self.cache.as_ref()))
    }
}

/// Runs registered strategies in priority order.
///
/// A failing or panicking strategy is logged and listed in the report; the
/// remaining strategies still run. Overlapping runs are skipped.
pub struct CleanupManager {
    strategies: Vec<Arc<dyn CleanupStrategy>>,
    running: AtomicBool,
}

impl CleanupManager {
    pub fn new() -> Self {
        Self {
            strategies: Vec::new(),
            running: AtomicBool::new(false),
        }
    }

    /// Manager with the cache purges for `caches`
    pub fn with_defaults(caches: &AuxiliaryCaches) -> Self {
        let mut manager = Self::new();
        manager.register(Arc::new(TreeCacheCleanup::new(Arc::clone(&caches.trees))));
        manager.register(Arc::new(FeatureCacheCleanup::new(Arc::clone(&caches.features))));
        manager
    }

    pub fn register(&mut self, strategy: Arc<dyn CleanupStrategy>) {
        self.strategies.push(strategy);
        self.strategies.sort_by_key(|s| s.priority());
    }

    pub fn strategy_names(&self) -> Vec<&str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Sum of the impact estimates of the applicable strategies
    pub fn estimate(&self, ctx: &CleanupContext) -> u64 {
        self.strategies
            .iter()
            .filter(|s| s.is_applicable(ctx))
            .map(|s| s.estimate_impact(ctx))
            .sum()
    }

    pub async fn run(&self, ctx: &CleanupContext) -> CleanupReport {
        let Some(_running) = RunningFlag::acquire(&self.running) else {
            log::debug!("Cleanup already in progress; skipping {:?} run", ctx.trigger);
            return CleanupReport::default();
        };

        let mut report = CleanupReport::default();
        for strategy in &self.strategies {
            if !strategy.is_applicable(ctx) {
                continue;
            }
            let name = strategy.name().to_string();
            report.strategies_run.push(name.clone());

            match run_isolated(Arc::clone(strategy), ctx.clone()).await {
                Ok(outcome) => {
                    report.bytes_freed = report.bytes_freed.saturating_add(outcome.bytes_freed);
                    if outcome.entries_cleared > 0 {
                        report.caches_cleared += 1;
                    }
                }
                Err(err) => {
                    log::warn!("{err}");
                    report.failures.push(err.to_string());
                }
            }
        }

        log::info!(
            "Cleanup ({:?}) freed {} bytes across {} caches{}",
            ctx.trigger,
            report.bytes_freed,
            report.caches_cleared,
            if report.failures.is_empty() {
                String::new()
            } else {
                format!(", {} failed", report.failures.len())
            }
        );
        report
    }
}

impl Default for CleanupManager {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CleanupManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CleanupManager")
            .field("strategies", &self.strategy_names())
            .finish_non_exhaustive()
    }
}

/// Holds the manager's `running` flag; released on drop, including when the
/// `run` future is cancelled mid-flight.
struct RunningFlag<'a>(&'a AtomicBool);

impl<'a> RunningFlag<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for RunningFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Run one strategy on its own task so a panic cannot escape
async fn run_isolated(strategy: Arc<dyn CleanupStrategy>, ctx: CleanupContext) -> Result<CleanupOutcome> {
    let name = strategy.name().to_string();
    match tokio::spawn(async move { strategy.cleanup(&ctx).await }).await {
        Ok(Ok(outcome)) => Ok(outcome),
        Ok(Err(GuardError::Cleanup { strategy, reason })) => Err(GuardError::Cleanup { strategy, reason }),
        Ok(Err(other)) => Err(GuardError::cleanup(name, other.to_string())),
        Err(join) => Err(GuardError::cleanup(name, join.to_string())),
    }
}
