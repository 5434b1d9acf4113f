//! # Chunkflow Guard
//!
//! Keeps chunk processing alive under pressure. A [`ProcessingGuard`]
//! checks memory and the recent error rate before every file and degrades
//! to a cheap line split, or to a single emergency chunk, instead of
//! failing.
//!
//! ```no_run
//! use std::sync::Arc;
//! use chunkflow_code_chunker::{ConfigStore, FileInput, ProcessingConfig, ProcessingCoordinator};
//! use chunkflow_guard::ProcessingGuard;
//!
//! # async fn run() {
//! let store = Arc::new(ConfigStore::new(ProcessingConfig::default()).unwrap());
//! let guard = ProcessingGuard::new(Arc::new(ProcessingCoordinator::new(store)));
//! guard.initialize();
//!
//! let result = guard.process_file(FileInput::new("print('hi')\n", "python")).await;
//! assert!(!result.chunks.is_empty());
//! guard.destroy();
//! # }
//! ```

mod cleanup;
mod clock;
mod error;
mod error_state;
mod guard;
mod memory;

pub use cleanup::{
    CleanupContext, CleanupManager, CleanupOutcome, CleanupReport, CleanupStrategy, CleanupTrigger,
    FeatureCacheCleanup, TreeCacheCleanup,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{GuardError, Result};
pub use error_state::{ErrorSnapshot, ErrorState};
pub use guard::{
    emergency_result, CheapFallback, GuardStatus, ProcessingGuard, EMERGENCY_STRATEGY, ERROR_THRESHOLD_REASON,
    MEMORY_LIMIT_REASON, TIMEOUT_REASON,
};
pub use memory::{FixedMemorySampler, MemoryMonitor, MemorySampler, MemoryState, MemoryTrend, ProcMemorySampler};
