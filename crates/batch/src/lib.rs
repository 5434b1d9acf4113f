//! # Chunkflow Batch
//!
//! Processes many files at once. Files are grouped by the kind of strategy
//! they are expected to use, each group is cut into batches sized for its
//! files, and the files of a batch run concurrently through a shared
//! [`chunkflow_guard::ProcessingGuard`].

mod classify;
mod coordinator;
mod error;
mod result;

pub use classify::{adaptive_batch_size, GroupProfile, StrategyKind, MAX_BATCH_SIZE, MIN_BATCH_SIZE};
pub use coordinator::BatchCoordinator;
pub use error::{BatchError, Result};
pub use result::{BatchOptions, BatchResult, BatchStats};
