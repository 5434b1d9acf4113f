//! Primitives shared by the post-processing passes: symbol balance, merge
//! policy and size statistics.

pub mod balance;
pub mod merger;
pub mod stats;

pub use balance::SymbolScanner;
pub use merger::{chunk_similarity, line_gap, merge_chunks, split_chunk, types_compatible};
pub use stats::{chunk_sizes, coefficient_of_variation, mean, target_size};
