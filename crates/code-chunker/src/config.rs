use crate::error::ValidationIssue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Complete set of tunables for one processing run.
///
/// Every section defaults independently, so a config file only needs to name
/// the fields it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ProcessingConfig {
    pub chunking: ChunkingConfig,
    pub features: FeatureToggles,
    pub performance: PerformanceConfig,
    pub post_processing: PostProcessingConfig,
    pub guard: GuardConfig,
}

/// Chunk geometry and strategy preferences
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Hard upper bound on chunk length in characters
    pub max_chunk_size: usize,

    /// Chunks below this length are candidates for filtering and merging
    pub min_chunk_size: usize,

    /// Characters of context shared between neighbouring chunks
    pub overlap_size: usize,

    pub max_lines_per_chunk: usize,

    pub min_lines_per_chunk: usize,

    /// Strategy tried right after the file-type match, bypassing the priority search
    pub default_strategy: Option<String>,

    /// Lower value wins; strategies missing from the table sort last
    pub strategy_priorities: BTreeMap<String, u32>,

    /// Upper bound of overlap relative to `max_chunk_size` when splitting
    pub max_overlap_ratio: f64,

    /// Used to turn `overlap_size` into a line count for prose
    pub assumed_line_length: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: 2000,
            min_chunk_size: 100,
            overlap_size: 200,
            max_lines_per_chunk: 100,
            min_lines_per_chunk: 1,
            default_strategy: None,
            strategy_priorities: default_priorities(),
            max_overlap_ratio: 0.5,
            assumed_line_length: 80,
        }
    }
}

fn default_priorities() -> BTreeMap<String, u32> {
    [("markdown", 0), ("ast", 1), ("semantic", 2), ("bracket", 3), ("line", 9)]
        .into_iter()
        .map(|(name, priority)| (name.to_string(), priority))
        .collect()
}

/// Feature switches consulted by strategies and passes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureToggles {
    pub enable_ast: bool,
    pub enable_semantic_detection: bool,
    pub enable_bracket_balance: bool,
    pub enable_chunk_deduplication: bool,
    /// Normalize chunk metadata (file path, language, ordering) before returning
    pub enable_standardization: bool,
}

impl Default for FeatureToggles {
    fn default() -> Self {
        Self {
            enable_ast: true,
            enable_semantic_detection: true,
            enable_bracket_balance: true,
            enable_chunk_deduplication: true,
            enable_standardization: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    /// Heap ceiling in megabytes before the guard degrades to the cheap path
    pub memory_limit_mb: u64,

    /// Per-file time budget
    pub max_execution_time_ms: u64,

    pub concurrency_limit: usize,

    pub batch_size: usize,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            memory_limit_mb: 2048,
            max_execution_time_ms: 30_000,
            concurrency_limit: 4,
            batch_size: 50,
        }
    }
}

/// How the smart-rebalance pass treats undersized chunks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RebalanceMode {
    /// Only fold a trailing runt into its predecessor
    #[default]
    Conservative,
    /// Split oversized chunks and fold every mergeable undersized chunk
    Aggressive,
}

/// How trailing context is chosen for prose
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum OverlapMode {
    /// Append a fixed number of following lines
    #[default]
    Lookahead,
    /// Stop the appended context at the nearest semantic boundary
    SemanticBoundary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostProcessingConfig {
    pub enable_intelligent_filtering: bool,
    pub enable_smart_rebalancing: bool,
    pub enable_advanced_merging: bool,
    pub enable_boundary_optimization: bool,
    pub enable_overlap: bool,

    pub rebalance_mode: RebalanceMode,
    pub overlap_mode: OverlapMode,

    /// Weighted similarity required before two neighbours merge
    pub merge_threshold: f64,

    /// Token similarity above which adjacent chunks count as duplicates
    pub dedup_threshold: f64,

    /// Largest gap in lines still considered adjacent by the merge pass
    pub merge_line_gap: usize,

    /// Coefficient of variation of chunk sizes that triggers the final balancing sweep
    pub variance_threshold: f64,

    /// Lines the boundary optimizer may move a boundary in either direction
    pub boundary_window: usize,

    /// Restricts and reorders passes by name within each phase; empty keeps the default order
    pub order: Vec<String>,

    /// Upper bound on repetitions of the chunk-processing phase
    pub max_rounds: u32,
}

impl Default for PostProcessingConfig {
    fn default() -> Self {
        Self {
            enable_intelligent_filtering: true,
            enable_smart_rebalancing: true,
            enable_advanced_merging: true,
            enable_boundary_optimization: true,
            enable_overlap: true,
            rebalance_mode: RebalanceMode::Conservative,
            overlap_mode: OverlapMode::Lookahead,
            merge_threshold: 0.8,
            dedup_threshold: 0.9,
            merge_line_gap: 2,
            variance_threshold: 0.5,
            boundary_window: 3,
            order: Vec::new(),
            max_rounds: 1,
        }
    }
}

/// Error-rate circuit breaker and memory monitor settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    pub max_errors: u32,

    /// Quiet period after which the error counter resets
    pub error_reset_interval_ms: u64,

    /// Background memory sampling period; `None` disables the monitor task
    pub monitor_interval_ms: Option<u64>,

    /// Share of the memory limit at which the monitor starts warning
    pub memory_warning_ratio: f64,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            max_errors: 5,
            error_reset_interval_ms: 60_000,
            monitor_interval_ms: None,
            memory_warning_ratio: 0.8,
        }
    }
}

impl ProcessingConfig {
    /// Smaller chunks with generous overlap, suited to embedding models
    pub fn for_embeddings() -> Self {
        let mut config = Self::default();
        config.chunking.max_chunk_size = 1000;
        config.chunking.min_chunk_size = 50;
        config.chunking.overlap_size = 100;
        config.chunking.max_lines_per_chunk = 60;
        config.post_processing.rebalance_mode = RebalanceMode::Aggressive;
        config
    }

    /// Cheapest useful pipeline: no parsing, no similarity work
    pub fn for_speed() -> Self {
        let mut config = Self::default();
        config.features.enable_ast = false;
        config.features.enable_chunk_deduplication = false;
        config.chunking.default_strategy = Some("line".to_string());
        config.post_processing.enable_smart_rebalancing = false;
        config.post_processing.enable_advanced_merging = false;
        config.post_processing.enable_boundary_optimization = false;
        config
    }

    /// Resolve a preset by name
    pub fn preset(name: &str) -> Option<Self> {
        match name {
            "default" => Some(Self::default()),
            "embeddings" | "for_embeddings" => Some(Self::for_embeddings()),
            "speed" | "for_speed" => Some(Self::for_speed()),
            _ => None,
        }
    }

    /// Priority of a strategy; unknown names sort last
    pub fn strategy_priority(&self, name: &str) -> u32 {
        self.chunking
            .strategy_priorities
            .get(name)
            .copied()
            .unwrap_or(u32::MAX)
    }

    /// Check every constraint and report all violations at once
    pub fn validate(&self) -> Result<(), Vec<ValidationIssue>> {
        let mut issues = Vec::new();
        let chunking = &self.chunking;

        if chunking.max_chunk_size <= chunking.min_chunk_size {
            issues.push(ValidationIssue::new(
                "chunking.max_chunk_size",
                format!(
                    "must exceed min_chunk_size ({} <= {})",
                    chunking.max_chunk_size, chunking.min_chunk_size
                ),
            ));
        }
        if chunking.overlap_size >= chunking.max_chunk_size {
            issues.push(ValidationIssue::new(
                "chunking.overlap_size",
                format!(
                    "must be smaller than max_chunk_size ({} >= {})",
                    chunking.overlap_size, chunking.max_chunk_size
                ),
            ));
        }
        if chunking.min_lines_per_chunk == 0 {
            issues.push(ValidationIssue::new(
                "chunking.min_lines_per_chunk",
                "must be >= 1",
            ));
        }
        if chunking.max_lines_per_chunk < chunking.min_lines_per_chunk {
            issues.push(ValidationIssue::new(
                "chunking.max_lines_per_chunk",
                "must be >= min_lines_per_chunk",
            ));
        }
        if !in_unit_interval(chunking.max_overlap_ratio) {
            issues.push(ValidationIssue::new(
                "chunking.max_overlap_ratio",
                "must be in (0, 1]",
            ));
        }
        if chunking.assumed_line_length == 0 {
            issues.push(ValidationIssue::new(
                "chunking.assumed_line_length",
                "must be >= 1",
            ));
        }

        let perf = &self.performance;
        if perf.concurrency_limit == 0 {
            issues.push(ValidationIssue::new(
                "performance.concurrency_limit",
                "must be >= 1",
            ));
        }
        if perf.batch_size == 0 {
            issues.push(ValidationIssue::new("performance.batch_size", "must be >= 1"));
        }
        if perf.memory_limit_mb == 0 {
            issues.push(ValidationIssue::new(
                "performance.memory_limit_mb",
                "must be >= 1",
            ));
        }
        if perf.max_execution_time_ms == 0 {
            issues.push(ValidationIssue::new(
                "performance.max_execution_time_ms",
                "must be >= 1",
            ));
        }

        let post = &self.post_processing;
        for (field, value) in [
            ("post_processing.merge_threshold", post.merge_threshold),
            ("post_processing.dedup_threshold", post.dedup_threshold),
        ] {
            if !in_unit_interval(value) {
                issues.push(ValidationIssue::new(field, "must be in (0, 1]"));
            }
        }
        if !(post.variance_threshold > 0.0) {
            issues.push(ValidationIssue::new(
                "post_processing.variance_threshold",
                "must be > 0",
            ));
        }
        if post.max_rounds == 0 {
            issues.push(ValidationIssue::new(
                "post_processing.max_rounds",
                "must be >= 1",
            ));
        }

        let guard = &self.guard;
        if guard.max_errors == 0 {
            issues.push(ValidationIssue::new("guard.max_errors", "must be >= 1"));
        }
        if !in_unit_interval(guard.memory_warning_ratio) {
            issues.push(ValidationIssue::new(
                "guard.memory_warning_ratio",
                "must be in (0, 1]",
            ));
        }
        if guard.monitor_interval_ms == Some(0) {
            issues.push(ValidationIssue::new(
                "guard.monitor_interval_ms",
                "must be >= 1 when set",
            ));
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(issues)
        }
    }
}

fn in_unit_interval(value: f64) -> bool {
    value > 0.0 && value <= 1.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(ProcessingConfig::default().validate().is_ok());
        assert!(ProcessingConfig::for_embeddings().validate().is_ok());
        assert!(ProcessingConfig::for_speed().validate().is_ok());
    }

    #[test]
    fn test_validation_reports_every_issue() {
        let mut config = ProcessingConfig::default();
        config.chunking.max_chunk_size = 50;
        config.chunking.min_chunk_size = 50;
        config.performance.batch_size = 0;
        config.guard.max_errors = 0;

        let issues = config.validate().unwrap_err();
        let fields: Vec<&str> = issues.iter().map(|i| i.field.as_str()).collect();
        assert!(fields.contains(&"chunking.max_chunk_size"));
        assert!(fields.contains(&"chunking.overlap_size"));
        assert!(fields.contains(&"performance.batch_size"));
        assert!(fields.contains(&"guard.max_errors"));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: ProcessingConfig =
            serde_json::from_str(r#"{"chunking": {"max_chunk_size": 500}}"#).unwrap();
        assert_eq!(config.chunking.max_chunk_size, 500);
        assert_eq!(config.chunking.min_chunk_size, 100);
        assert_eq!(config.guard.max_errors, 5);
        assert_eq!(config.strategy_priority("ast"), 1);
    }

    #[test]
    fn test_unknown_strategy_sorts_last() {
        let config = ProcessingConfig::default();
        assert_eq!(config.strategy_priority("custom"), u32::MAX);
        assert!(config.strategy_priority("markdown") < config.strategy_priority("line"));
    }

    #[test]
    fn test_presets() {
        assert!(!ProcessingConfig::for_speed().features.enable_ast);
        assert_eq!(
            ProcessingConfig::preset("embeddings").map(|c| c.chunking.max_chunk_size),
            Some(1000)
        );
        assert!(ProcessingConfig::preset("nope").is_none());
    }
}
