//! # Storyweave Core
//!
//! Domain types and error definitions for the Storyweave context budgeting
//! engine. This crate has **no runtime dependencies** beyond serialization —
//! it defines the model the assembler and the allocator work against.
//!
//! - [`ContextElement`] / [`ContextMetadata`]: one unit of story state and
//!   the scheduling data that decides where it goes.
//! - [`ContextContainer`]: the validated pool handed to the assembler.
//! - [`ProcessingConfig`]: how a single prompt is assembled.
//! - [`MemoryLayer`], [`AllocationRequest`], [`AllocationResult`]: the
//!   vocabulary of the layer token allocator.

pub mod agent;
pub mod container;
pub mod element;
pub mod error;
pub mod layer;
pub mod processing;

// Re-export key types at crate root for ergonomics
pub use agent::{AgentRole, Phase};
pub use container::ContextContainer;
pub use element::{
    CharacterProfile, ContextElement, ContextMetadata, ElementKind, ElementVariant,
    PhaseRecordKind, StoryFactKind, SummarizationRule, UserSignalKind, estimate_tokens_heuristic,
};
pub use error::{ContextError, Error, Result, TokenizerError, UnknownVariant};
pub use layer::{AllocationMode, AllocationRequest, AllocationResult, MemoryLayer, OverflowStrategy};
pub use processing::{CustomFilters, ProcessingConfig};
