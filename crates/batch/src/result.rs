use chunkflow_code_chunker::ProcessingResult;
use serde::{Deserialize, Serialize};

/// Per-call overrides; unset fields come from the performance config
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchOptions {
    pub concurrency_limit: Option<usize>,
    pub batch_size: Option<usize>,
    pub group_by_strategy: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            concurrency_limit: None,
            batch_size: None,
            group_by_strategy: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchStats {
    /// Strategy kind of the group, or `all` when grouping is off
    pub group: String,
    pub batch_index: usize,
    pub size: usize,
    pub duration_ms: u64,
    pub success_count: usize,
    pub failure_count: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchResult {
    /// One entry per input file, in request order
    pub results: Vec<ProcessingResult>,
    pub success_count: usize,
    pub failure_count: usize,
    pub batches: Vec<BatchStats>,
    pub total_duration_ms: u64,
}

impl BatchResult {
    pub fn fallback_count(&self) -> usize {
        self.results.iter().filter(|r| r.metadata.fallback_used).count()
    }

    pub fn chunk_count(&self) -> usize {
        self.results.iter().map(|r| r.chunks.len()).sum()
    }
}
