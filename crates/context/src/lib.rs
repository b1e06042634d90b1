//! # Storyweave Context
//!
//! Builds the prompt for one agent call from a pool of story state.
//!
//! 1. **Filter** ([`filter`]): target agent, phase, expiry, custom filters
//! 2. **Sort**: priority descending, recency as tie-breaker
//! 3. **Budget** ([`budget`]): compress toward the budget, then trim greedily
//! 4. **Format** ([`formatter`]): agent-specific sections
//!
//! [`ContextAssembler`] runs the whole pipeline. Token counts come from a
//! [`TokenEstimator`], which uses an injected [`Tokenizer`] when available.

pub mod assembler;
pub mod budget;
pub mod filter;
pub mod formatter;
pub mod summarizer;
pub mod token;

pub use assembler::{AssembledContext, AssemblyMetadata, ContextAssembler};
pub use budget::{BudgetOutcome, enforce_budget};
pub use formatter::{FormattedContext, format_for_agent};
pub use summarizer::{Compression, CompressionOutcome, compress};
pub use token::{TokenEstimator, Tokenizer};

#[cfg(feature = "hf-tokenizer")]
pub use token::HfTokenizer;
