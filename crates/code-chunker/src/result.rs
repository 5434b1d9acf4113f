use crate::pipeline::PipelineReport;
use crate::types::Chunk;
use serde::{Deserialize, Serialize};

/// Outcome of processing one file; produced on every path, degraded or not
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingResult {
    pub success: bool,
    pub chunks: Vec<Chunk>,
    pub execution_time_ms: u64,
    /// Strategy that produced the chunks
    pub strategy: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub metadata: ResultMetadata,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResultMetadata {
    pub chunk_count: usize,
    pub language: String,
    pub file_path: Option<String>,
    pub fallback_used: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline: Option<PipelineReport>,
}

impl ProcessingResult {
    /// Successful result; the chunk count is taken from `chunks`
    pub fn new(
        chunks: Vec<Chunk>,
        strategy: impl Into<String>,
        language: impl Into<String>,
        file_path: Option<String>,
    ) -> Self {
        Self {
            success: true,
            metadata: ResultMetadata {
                chunk_count: chunks.len(),
                language: language.into(),
                file_path,
                ..ResultMetadata::default()
            },
            chunks,
            execution_time_ms: 0,
            strategy: strategy.into(),
            error: None,
        }
    }

    /// Mark as produced by a fallback path
    #[must_use]
    pub fn with_fallback(mut self, reason: impl Into<String>) -> Self {
        self.metadata.fallback_used = true;
        self.metadata.fallback_reason = Some(reason.into());
        self
    }

    /// Mark as failed with an error message
    #[must_use]
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.success = false;
        self.error = Some(error.into());
        self
    }

    #[must_use]
    pub fn with_elapsed(mut self, elapsed: std::time::Duration) -> Self {
        self.execution_time_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn fallback_reason(&self) -> Option<&str> {
        self.metadata.fallback_reason.as_deref()
    }

    pub fn language(&self) -> &str {
        &self.metadata.language
    }
}
