//! Token estimation utilities.
//!
//! Prefers an injected [`Tokenizer`] for exact counts and falls back to a
//! character-based heuristic: ~4 characters per token, rounded down. The
//! heuristic is deterministic and monotonic in content length, which the
//! trimming pass relies on.

use std::fmt;
use std::sync::Arc;
use storyweave_core::{ContextElement, TokenizerError, estimate_tokens_heuristic};

/// An exact token counter, typically backed by a model vocabulary.
pub trait Tokenizer: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &str;

    fn count(&self, text: &str) -> Result<usize, TokenizerError>;
}

/// Token estimator shared by the summarizer, the budget pass and the assembler.
///
/// Cheap to clone; the tokenizer (if any) is reference counted.
#[derive(Clone, Default)]
pub struct TokenEstimator {
    tokenizer: Option<Arc<dyn Tokenizer>>,
}

impl fmt::Debug for TokenEstimator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenEstimator")
            .field(
                "tokenizer",
                &self.tokenizer.as_ref().map(|t| t.name().to_string()),
            )
            .finish()
    }
}

impl TokenEstimator {
    /// An estimator that only uses the `chars / 4` heuristic.
    pub fn heuristic() -> Self {
        Self::default()
    }

    pub fn with_tokenizer(tokenizer: Arc<dyn Tokenizer>) -> Self {
        Self {
            tokenizer: Some(tokenizer),
        }
    }

    pub fn has_tokenizer(&self) -> bool {
        self.tokenizer.is_some()
    }

    /// Estimate the token count for a string.
    ///
    /// Tokenizer failures are logged and degrade to the heuristic.
    pub fn estimate(&self, text: &str) -> usize {
        let Some(tokenizer) = &self.tokenizer else {
            return estimate_tokens_heuristic(text);
        };
        match tokenizer.count(text) {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!(
                    tokenizer = tokenizer.name(),
                    error = %e,
                    "Tokenizer failed, falling back to heuristic estimate"
                );
                estimate_tokens_heuristic(text)
            }
        }
    }

    /// Token count of an element: its explicit estimate, else the text it
    /// renders as (see [`ContextElement::prompt_text`]).
    pub fn element_tokens(&self, element: &ContextElement) -> usize {
        element
            .metadata
            .estimated_tokens
            .unwrap_or_else(|| self.estimate(&element.prompt_text()))
    }

    /// Sum of [`TokenEstimator::element_tokens`] over a set of elements.
    pub fn total_tokens<'a>(&self, elements: impl IntoIterator<Item = &'a ContextElement>) -> usize {
        elements.into_iter().map(|e| self.element_tokens(e)).sum()
    }
}

/// HuggingFace `tokenizers` adapter for exact counts.
#[cfg(feature = "hf-tokenizer")]
pub struct HfTokenizer {
    name: String,
    inner: tokenizers::Tokenizer,
}

#[cfg(feature = "hf-tokenizer")]
impl HfTokenizer {
    /// Load a `tokenizer.json` file.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, TokenizerError> {
        let path = path.as_ref();
        let inner = tokenizers::Tokenizer::from_file(path)
            .map_err(|e| TokenizerError::LoadFailed(format!("{}: {e}", path.display())))?;
        Ok(Self {
            name: path.display().to_string(),
            inner,
        })
    }
}

#[cfg(feature = "hf-tokenizer")]
impl Tokenizer for HfTokenizer {
    fn name(&self) -> &str {
        &self.name
    }

    fn count(&self, text: &str) -> Result<usize, TokenizerError> {
        self.inner
            .encode(text, false)
            .map(|encoding| encoding.len())
            .map_err(|e| TokenizerError::EncodeFailed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storyweave_core::{ContextMetadata, UserSignalKind};

    struct WordCounter;

    impl Tokenizer for WordCounter {
        fn name(&self) -> &str {
            "words"
        }

        fn count(&self, text: &str) -> Result<usize, TokenizerError> {
            Ok(text.split_whitespace().count())
        }
    }

    struct Broken;

    impl Tokenizer for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        fn count(&self, _text: &str) -> Result<usize, TokenizerError> {
            Err(TokenizerError::EncodeFailed("vocabulary missing".into()))
        }
    }

    #[test]
    fn empty_string_is_zero() {
        assert_eq!(TokenEstimator::heuristic().estimate(""), 0);
    }

    #[test]
    fn four_chars_is_one_token() {
        assert_eq!(TokenEstimator::heuristic().estimate("test"), 1);
    }

    #[test]
    fn seven_chars_rounds_down() {
        assert_eq!(TokenEstimator::heuristic().estimate("chapter"), 1);
    }

    #[test]
    fn hundred_chars() {
        let text = "a".repeat(100);
        assert_eq!(TokenEstimator::heuristic().estimate(&text), 25);
    }

    #[test]
    fn heuristic_is_monotonic() {
        let est = TokenEstimator::heuristic();
        let mut prev = 0;
        for len in 0..200 {
            let n = est.estimate(&"x".repeat(len));
            assert!(n >= prev);
            prev = n;
        }
    }

    #[test]
    fn tokenizer_preferred() {
        let est = TokenEstimator::with_tokenizer(Arc::new(WordCounter));
        assert!(est.has_tokenizer());
        assert_eq!(est.estimate("the tide queen returns"), 4);
    }

    #[test]
    fn tokenizer_failure_degrades_to_heuristic() {
        let est = TokenEstimator::with_tokenizer(Arc::new(Broken));
        assert_eq!(est.estimate(&"a".repeat(40)), 10);
    }

    #[test]
    fn explicit_estimate_wins() {
        let est = TokenEstimator::with_tokenizer(Arc::new(WordCounter));
        let el = ContextElement::user_signal("fb", UserSignalKind::Feedback, "short")
            .with_metadata(ContextMetadata::default().with_estimated_tokens(77));
        assert_eq!(est.element_tokens(&el), 77);

        let plain = ContextElement::user_signal("fb2", UserSignalKind::Feedback, "two words");
        assert_eq!(est.element_tokens(&plain), 2);
        assert_eq!(est.total_tokens([&el, &plain]), 79);
    }

    #[test]
    fn debug_shows_tokenizer_name() {
        let est = TokenEstimator::with_tokenizer(Arc::new(WordCounter));
        assert!(format!("{est:?}").contains("words"));
    }
}
