//! # Chunkflow Code Chunker
//!
//! Turns source files into bounded, semantically coherent chunks for
//! search and embedding pipelines.
//!
//! ## Architecture
//!
//! ```text
//! FileInput
//!     │
//!     ├──> ProcessingContext (language, features, config snapshot)
//!     │
//!     ├──> StrategySelector
//!     │    └─> file type → default → language → priority → line → any
//!     │
//!     ├──> Strategy execution
//!     │    └─> selected → line → basic windows (never fails)
//!     │
//!     ├──> PostProcessingPipeline
//!     │    ├─> chunking: symbol balance, filter, rebalance
//!     │    └─> processing: merge, boundary optimization, overlap
//!     │
//!     └──> ProcessingResult (chunks, strategy, fallback reason)
//! ```
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use chunkflow_code_chunker::{ConfigStore, FileInput, ProcessingConfig, ProcessingCoordinator};
//!
//! let store = Arc::new(ConfigStore::new(ProcessingConfig::default()).unwrap());
//! let coordinator = ProcessingCoordinator::new(store);
//!
//! let code = "fn process(input: &str) -> String {\n    input.trim().to_uppercase()\n}\n";
//! let result = coordinator.process(&FileInput::new(code, "rust").with_path("src/lib.rs"));
//!
//! assert!(result.success);
//! for chunk in &result.chunks {
//!     println!("{}-{} {}", chunk.start_line(), chunk.end_line(), chunk.chunk_type());
//! }
//! ```

mod ast_analyzer;
mod cache;
mod config;
mod config_store;
mod context;
mod coordinator;
mod error;
mod language;
pub mod pipeline;
pub mod quality;
mod result;
mod selector;
pub mod signature;
mod similarity;
pub mod strategy;
mod syntax;
mod types;

pub use ast_analyzer::TreeSitterBackend;
pub use cache::{content_key, AuxiliaryCaches, ContentCache, ContentKey, FeatureCache, PurgeStats, Purgeable, TreeCache};
pub use config::{
    ChunkingConfig, FeatureToggles, GuardConfig, OverlapMode, PerformanceConfig, PostProcessingConfig,
    ProcessingConfig, RebalanceMode,
};
pub use config_store::{ConfigChange, ConfigStore};
pub use context::{resolve_language, FileFeatures, FileInput, ProcessingContext, ProcessingContextBuilder};
pub use coordinator::{
    create_basic_chunking_result, next_tier, ProcessingCoordinator, Tier, BASIC_STRATEGY, FALLBACK_LANGUAGE,
};
pub use error::{ChunkerError, PassError, Result, StrategyError, ValidationIssue};
pub use language::Language;
pub use pipeline::{PipelineReport, PostProcessingPipeline};
pub use result::{ProcessingResult, ResultMetadata};
pub use selector::{Selection, SelectionStep, StrategySelector};
pub use similarity::{group_by_similarity, SimilarityScorer, TokenJaccardScorer};
pub use strategy::{default_registry, ChunkingStrategy, StrategyRegistry};
pub use syntax::{LineSpan, NodeKind, SyntaxBackend, SyntaxNode, SyntaxTree};
pub use types::{Chunk, ChunkMetadata, ChunkType, SourceText};
