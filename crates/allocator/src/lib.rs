//! Layer token allocation for Storyweave.
//!
//! A single ledger partitions the token pool across memory layers
//! (working, episodic, semantic, long-term). Requests that do not fit are
//! resolved by the configured overflow strategy: reject, truncate,
//! reallocate from lower-priority layers, or borrow beyond the pool.
//!
//! Construct one [`LayerTokenAllocator`] at startup and share it via `Arc`.

pub mod engine;
pub mod ledger;

pub use engine::LayerTokenAllocator;
pub use ledger::{AllocatorStats, LayerUsage};

use storyweave_config::ConfigError;

/// Errors from the allocator subsystem.
#[derive(Debug, thiserror::Error)]
pub enum AllocatorError {
    #[error("invalid allocator configuration: {0}")]
    Config(#[from] ConfigError),
}
