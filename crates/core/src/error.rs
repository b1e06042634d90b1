//! Error types for the Storyweave domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for Storyweave operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Context model errors ---
    #[error("Context error: {0}")]
    Context(#[from] ContextError),

    // --- Tokenizer errors ---
    #[error("Tokenizer error: {0}")]
    Tokenizer(#[from] TokenizerError),

    // --- Parsing of enum-like values ---
    #[error(transparent)]
    UnknownVariant(#[from] UnknownVariant),

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Validation failures raised while building containers or processing configs.
///
/// These are the only errors the assembler surfaces; budget overflow is
/// reported as data on the assembled output instead.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ContextError {
    #[error("Duplicate element id in container: {0}")]
    DuplicateId(String),

    #[error("Element id must not be empty")]
    EmptyId,

    #[error("Element {id} has priority {priority}, expected a value within 0.0..=1.0")]
    InvalidPriority { id: String, priority: f64 },

    #[error("Invalid processing config: {0}")]
    InvalidConfig(String),
}

#[derive(Debug, Clone, Error)]
pub enum TokenizerError {
    #[error("Tokenizer failed to encode input: {0}")]
    EncodeFailed(String),

    #[error("Tokenizer could not be loaded: {0}")]
    LoadFailed(String),
}

/// A string did not name any known variant of a domain enum.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown {kind}: '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl UnknownVariant {
    pub fn new(kind: &'static str, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_id_displays_correctly() {
        let err = Error::Context(ContextError::DuplicateId("chapter-3".into()));
        assert!(err.to_string().contains("chapter-3"));
        assert!(err.to_string().contains("Duplicate"));
    }

    #[test]
    fn invalid_priority_names_element() {
        let err = ContextError::InvalidPriority {
            id: "villain".into(),
            priority: 1.5,
        };
        assert!(err.to_string().contains("villain"));
        assert!(err.to_string().contains("1.5"));
    }

    #[test]
    fn unknown_variant_is_transparent() {
        let err: Error = UnknownVariant::new("memory layer", "scratch").into();
        assert_eq!(err.to_string(), "Unknown memory layer: 'scratch'");
    }
}
