use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for chunker operations
pub type Result<T> = std::result::Result<T, ChunkerError>;

/// Errors that can occur while building contexts, selecting strategies or parsing
#[derive(Error, Debug)]
pub enum ChunkerError {
    /// No strategy is registered at all
    #[error("No strategy available")]
    NoStrategyAvailable,

    /// A named strategy failed to produce chunks
    #[error("Strategy '{strategy}' failed: {source}")]
    Strategy {
        strategy: String,
        #[source]
        source: StrategyError,
    },

    /// Configuration rejected by validation
    #[error("Invalid configuration: {}", format_issues(.0))]
    InvalidConfig(Vec<ValidationIssue>),

    /// Processing context could not be built
    #[error("Invalid processing context: {0}")]
    Context(String),

    /// Failed to parse the source code
    #[error("Parse error: {0}")]
    Parse(String),

    /// Unsupported language
    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),

    /// Tree-sitter error
    #[error("Tree-sitter error: {0}")]
    TreeSitter(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl ChunkerError {
    /// Create a parse error
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    /// Create an unsupported language error
    pub fn unsupported_language(lang: impl Into<String>) -> Self {
        Self::UnsupportedLanguage(lang.into())
    }

    /// Create a tree-sitter error
    pub fn tree_sitter(msg: impl Into<String>) -> Self {
        Self::TreeSitter(msg.into())
    }

    /// Create a context error
    pub fn context(msg: impl Into<String>) -> Self {
        Self::Context(msg.into())
    }

    /// Wrap a strategy failure with the strategy name
    pub fn strategy(strategy: impl Into<String>, source: StrategyError) -> Self {
        Self::Strategy {
            strategy: strategy.into(),
            source,
        }
    }
}

/// Why a chunking strategy could not produce chunks.
///
/// Every variant is recoverable: the processing coordinator reacts by moving
/// down the fallback chain rather than surfacing the error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StrategyError {
    #[error("parse error: {0}")]
    Parse(String),

    #[error("internal error: {0}")]
    Internal(String),

    /// The strategy returned chunks that break the chunk invariants
    #[error("contract violation: {0}")]
    ContractViolation(String),

    #[error("timed out after {elapsed_ms}ms (limit {limit_ms}ms)")]
    TimedOut { elapsed_ms: u64, limit_ms: u64 },

    #[error("strategy panicked: {0}")]
    Panicked(String),

    #[error("strategy cannot handle this content")]
    CannotHandle,
}

/// Failure of a single post-processing pass
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PassError {
    #[error("pass '{pass}' failed: {reason}")]
    Failed { pass: String, reason: String },

    #[error("pass '{pass}' panicked: {reason}")]
    Panicked { pass: String, reason: String },
}

impl PassError {
    pub fn failed(pass: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Failed {
            pass: pass.into(),
            reason: reason.into(),
        }
    }
}

/// One problem found while validating a [`crate::ProcessingConfig`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    /// Dotted path of the offending field (e.g. `chunking.max_chunk_size`)
    pub field: String,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn format_issues(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Render a panic payload for logs and error messages
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_config_lists_every_issue() {
        let err = ChunkerError::InvalidConfig(vec![
            ValidationIssue::new("chunking.max_chunk_size", "must exceed min_chunk_size"),
            ValidationIssue::new("performance.batch_size", "must be >= 1"),
        ]);
        let msg = err.to_string();
        assert!(msg.contains("chunking.max_chunk_size: must exceed min_chunk_size"));
        assert!(msg.contains("performance.batch_size"));
    }

    #[test]
    fn strategy_error_carries_strategy_name() {
        let err = ChunkerError::strategy("ast", StrategyError::Parse("bad token".into()));
        assert_eq!(err.to_string(), "Strategy 'ast' failed: parse error: bad token");
    }

    #[test]
    fn timeout_display() {
        let err = StrategyError::TimedOut {
            elapsed_ms: 120,
            limit_ms: 100,
        };
        assert_eq!(err.to_string(), "timed out after 120ms (limit 100ms)");
    }
}
