//! Degradation tiers wrapped around the processing coordinator.
//!
//! ```text
//! process_file
//!     │
//!     ├─ memory over limit ──> cleanup, cheap fallback ("Memory limit exceeded")
//!     ├─ errors ≥ max ───────> cheap fallback ("Error threshold exceeded")
//!     └─ coordinator on a blocking task under a timeout
//!            └─ timeout / task failure ──> record error, cheap fallback
//!
//! cheap fallback fails ──> single emergency chunk
//! ```

use crate::cleanup::{CleanupContext, CleanupManager, CleanupReport, CleanupStrategy, CleanupTrigger};
use crate::clock::{Clock, SystemClock};
use crate::error::{GuardError, Result};
use crate::error_state::ErrorState;
use crate::memory::{MemoryMonitor, MemorySampler, MemoryState, ProcMemorySampler};
use chunkflow_code_chunker::{
    Chunk, ChunkMetadata, FileInput, ProcessingCoordinator, ProcessingResult, FALLBACK_LANGUAGE,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const MEMORY_LIMIT_REASON: &str = "Memory limit exceeded";
pub const ERROR_THRESHOLD_REASON: &str = "Error threshold exceeded";
pub const TIMEOUT_REASON: &str = "Processing timed out";

/// Strategy label of the last-resort result
pub const EMERGENCY_STRATEGY: &str = "emergency-single-chunk";

/// Cheap processing path used by the degraded tiers
pub trait CheapFallback: Send + Sync {
    fn run(&self, input: &FileInput, reason: &str) -> Result<ProcessingResult>;
}

impl CheapFallback for ProcessingCoordinator {
    fn run(&self, input: &FileInput, reason: &str) -> Result<ProcessingResult> {
        Ok(self.line_fallback(input, reason)?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuardStatus {
    pub error_count: u32,
    pub max_errors: u32,
    pub memory: MemoryState,
    pub should_use_fallback: bool,
}

/// Owns the degradation state for one coordinator.
///
/// Error threshold, reset window, memory limit and monitor period are read
/// from the coordinator's config when the guard is built.
pub struct ProcessingGuard {
    coordinator: Arc<ProcessingCoordinator>,
    fallback: Arc<dyn CheapFallback>,
    errors: ErrorState,
    memory: Arc<MemoryMonitor>,
    cleanup: CleanupManager,
    monitor_interval: Option<Duration>,
}

impl ProcessingGuard {
    pub fn new(coordinator: Arc<ProcessingCoordinator>) -> Self {
        Self::with_parts(coordinator, Arc::new(ProcMemorySampler), Arc::new(SystemClock))
    }

    pub fn with_parts(
        coordinator: Arc<ProcessingCoordinator>,
        sampler: Arc<dyn MemorySampler>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let config = coordinator.config_store().snapshot();
        let errors = ErrorState::new(config.guard.max_errors, config.guard.error_reset_interval_ms, clock);
        let memory = Arc::new(MemoryMonitor::new(
            sampler,
            config.performance.memory_limit_mb,
            config.guard.memory_warning_ratio,
        ));
        let cleanup = CleanupManager::with_defaults(coordinator.caches());

        Self {
            fallback: Arc::clone(&coordinator) as Arc<dyn CheapFallback>,
            coordinator,
            errors,
            memory,
            cleanup,
            monitor_interval: config.guard.monitor_interval_ms.map(Duration::from_millis),
        }
    }

    /// Replace the cheap path used by the degraded tiers
    #[must_use]
    pub fn with_fallback(mut self, fallback: Arc<dyn CheapFallback>) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn register_cleanup(&mut self, strategy: Arc<dyn CleanupStrategy>) {
        self.cleanup.register(strategy);
    }

    pub fn coordinator(&self) -> &Arc<ProcessingCoordinator> {
        &self.coordinator
    }

    /// Start the background memory monitor when an interval is configured.
    ///
    /// Must be called from within a tokio runtime.
    pub fn initialize(&self) {
        if let Some(period) = self.monitor_interval {
            log::debug!("Starting memory monitor every {period:?}");
            self.memory.start_interval(period);
        }
    }

    pub fn destroy(&self) {
        self.memory.stop();
    }

    pub fn reset(&self) {
        self.errors.reset();
    }

    pub fn should_use_fallback(&self) -> bool {
        self.errors.should_use_fallback()
    }

    pub fn status(&self) -> GuardStatus {
        let memory = self.memory.check();
        let error_count = self.errors.count();
        GuardStatus {
            error_count,
            max_errors: self.errors.max_errors(),
            should_use_fallback: memory.over_limit || error_count >= self.errors.max_errors(),
            memory,
        }
    }

    /// Count one error; crossing the threshold forces a cleanup
    pub async fn record_error(&self) -> u32 {
        let count = self.errors.record();
        if count == self.errors.max_errors() {
            log::warn!("Error threshold reached ({count}); forcing cleanup");
            let ctx = CleanupContext::new(CleanupTrigger::ErrorThreshold).with_error_count(count);
            self.cleanup.run(&ctx).await;
        }
        count
    }

    pub async fn force_cleanup(&self) -> CleanupReport {
        let ctx = CleanupContext::new(CleanupTrigger::Manual)
            .with_memory(self.memory.check())
            .with_error_count(self.errors.count());
        self.cleanup.run(&ctx).await
    }

    /// Process one file; every path ends in a result
    pub async fn process_file(&self, input: FileInput) -> ProcessingResult {
        let memory = self.memory.check();
        if memory.over_limit {
            log::warn!(
                "Memory over limit ({} of {} bytes) for {}",
                memory.used_bytes,
                memory.limit_bytes,
                display_path(&input)
            );
            let ctx = CleanupContext::new(CleanupTrigger::MemoryPressure)
                .with_memory(memory)
                .with_error_count(self.errors.count());
            self.cleanup.run(&ctx).await;
            return self.degrade(&input, MEMORY_LIMIT_REASON);
        }

        if self.errors.should_use_fallback() {
            log::debug!("Error threshold active; cheap path for {}", display_path(&input));
            return self.degrade(&input, ERROR_THRESHOLD_REASON);
        }

        let limit = Duration::from_millis(
            self.coordinator
                .config_store()
                .snapshot()
                .performance
                .max_execution_time_ms,
        );
        let coordinator = Arc::clone(&self.coordinator);
        let task_input = input.clone();
        // The blocking task keeps running after a timeout; only its result is dropped.
        let task = tokio::task::spawn_blocking(move || coordinator.process(&task_input));

        match tokio::time::timeout(limit, task).await {
            Ok(Ok(result)) => {
                if !result.success {
                    self.record_error().await;
                }
                result
            }
            Ok(Err(join)) => {
                let err = GuardError::from(join);
                log::error!("{err} for {}", display_path(&input));
                self.record_error().await;
                self.degrade(&input, &err.to_string())
            }
            Err(_) => {
                log::warn!("{} exceeded {limit:?}", display_path(&input));
                self.record_error().await;
                self.degrade(&input, TIMEOUT_REASON)
            }
        }
    }

    fn degrade(&self, input: &FileInput, reason: &str) -> ProcessingResult {
        let started = Instant::now();
        match self.fallback.run(input, reason) {
            Ok(result) => result,
            Err(err) => {
                log::error!("Cheap fallback failed for {}: {err}", display_path(input));
                emergency_result(input, &format!("{reason}; fallback failed: {err}"))
                    .with_elapsed(started.elapsed())
            }
        }
    }
}

impl std::fmt::Debug for ProcessingGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessingGuard")
            .field("errors", &self.errors)
            .field("memory", &self.memory)
            .field("cleanup", &self.cleanup)
            .finish_non_exhaustive()
    }
}

/// The whole file as one text chunk
pub fn emergency_result(input: &FileInput, reason: &str) -> ProcessingResult {
    let chunks = if input.content.is_empty() {
        Vec::new()
    } else {
        let end_line = input.content.lines().count().max(1);
        let metadata = ChunkMetadata::new(1, end_line, FALLBACK_LANGUAGE, EMERGENCY_STRATEGY)
            .file_path(input.file_path.clone());
        vec![Chunk::new(input.content.clone(), metadata)]
    };
    ProcessingResult::new(chunks, EMERGENCY_STRATEGY, FALLBACK_LANGUAGE, input.file_path.clone()).with_fallback(reason)
}

fn display_path(input: &FileInput) -> &str {
    input.file_path.as_deref().unwrap_or("<inline>")
}
