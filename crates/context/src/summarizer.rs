//! Element compression under budget pressure.
//!
//! Two lossy strategies, chosen by each element's [`SummarizationRule`]:
//! truncation with an ellipsis marker, and key-point extraction (first and
//! last sentence). Compression never expands an element and never fails.

use crate::token::TokenEstimator;
use storyweave_core::{ContextElement, SummarizationRule};

/// Marker appended to truncated content.
pub const ELLIPSIS: &str = "...";

/// Tag added to elements shortened by truncation.
pub const COMPRESSED_TAG: &str = "compressed";

/// Tag added to elements reduced to key points.
pub const KEY_POINTS_TAG: &str = "key_points";

/// Approximate characters per token used to size truncations.
const CHARS_PER_TOKEN: usize = 4;

/// Key-point extraction needs at least this many sentences.
const MIN_KEY_POINT_SENTENCES: usize = 3;

/// What [`compress`] did to an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionOutcome {
    Unchanged,
    Truncated,
    KeyPoints,
}

/// A possibly-compressed element and how it was produced.
#[derive(Debug, Clone)]
pub struct Compression {
    pub element: ContextElement,
    pub outcome: CompressionOutcome,
}

impl Compression {
    fn unchanged(element: &ContextElement) -> Self {
        Self {
            element: element.clone(),
            outcome: CompressionOutcome::Unchanged,
        }
    }

    pub fn changed(&self) -> bool {
        self.outcome != CompressionOutcome::Unchanged
    }
}

/// Shrink `element` toward `target_tokens` according to its rule.
///
/// `PreserveFull` elements and elements already within the target are
/// returned unchanged.
pub fn compress(
    element: &ContextElement,
    target_tokens: usize,
    estimator: &TokenEstimator,
) -> Compression {
    let current = estimator.element_tokens(element);
    if current <= target_tokens {
        return Compression::unchanged(element);
    }

    match element.rule() {
        SummarizationRule::PreserveFull => Compression::unchanged(element),
        SummarizationRule::AllowCompression => truncate(element, target_tokens),
        SummarizationRule::ExtractKeyPoints => {
            extract_key_points(element, current, estimator)
                .unwrap_or_else(|| truncate(element, target_tokens))
        }
    }
}

fn truncate(element: &ContextElement, target_tokens: usize) -> Compression {
    let max_chars = target_tokens.saturating_mul(CHARS_PER_TOKEN);
    let kept: String = element.prompt_text().chars().take(max_chars).collect();

    let mut out = element.clone();
    out.set_prompt_text(format!("{}{}", kept.trim_end(), ELLIPSIS));
    out.metadata.estimated_tokens = Some(target_tokens);
    out.metadata.tags.insert(COMPRESSED_TAG.to_string());

    Compression {
        element: out,
        outcome: CompressionOutcome::Truncated,
    }
}

/// First and last sentence joined by an ellipsis, or `None` when the content
/// has too few sentences or the result would not be smaller.
fn extract_key_points(
    element: &ContextElement,
    current_tokens: usize,
    estimator: &TokenEstimator,
) -> Option<Compression> {
    let text = element.prompt_text();
    let sentences = split_sentences(&text);
    if sentences.len() < MIN_KEY_POINT_SENTENCES {
        return None;
    }

    let first = sentences.first()?;
    let last = sentences.last()?;
    let content = format!("{first} {ELLIPSIS} {last}");
    let tokens = estimator.estimate(&content);
    if tokens >= current_tokens {
        return None;
    }

    let mut out = element.clone();
    out.set_prompt_text(content);
    out.metadata.estimated_tokens = Some(tokens);
    out.metadata.tags.insert(KEY_POINTS_TAG.to_string());

    Some(Compression {
        element: out,
        outcome: CompressionOutcome::KeyPoints,
    })
}

/// Split prose into sentences on `.`, `!` and `?` followed by whitespace.
///
/// Runs of terminators ("?!", "...") stay attached to their sentence.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if !is_terminator(c) {
            continue;
        }
        let mut end = i + c.len_utf8();
        while let Some(&(j, next)) = chars.peek() {
            if !is_terminator(next) {
                break;
            }
            end = j + next.len_utf8();
            chars.next();
        }
        if chars.peek().is_none_or(|&(_, next)| next.is_whitespace()) {
            let sentence = text[start..end].trim();
            if !sentence.is_empty() {
                sentences.push(sentence);
            }
            start = end;
        }
    }

    let tail = text[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail);
    }
    sentences
}

fn is_terminator(c: char) -> bool {
    matches!(c, '.' | '!' | '?')
}
