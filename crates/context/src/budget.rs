//! Token-budget enforcement over a priority-sorted element list.
//!
//! # Algorithm
//!
//! 1. If there is no ceiling, or the total already fits, nothing happens.
//! 2. **Compression.** The compression budget is
//!    `floor(max_tokens * summarization_threshold)`. `PreserveFull` elements
//!    are reserved first; the rest is handed out in priority order, each
//!    element receiving `min(tokens, remaining)`. An element whose share is
//!    below a quarter of its size is left whole for the trimming pass rather
//!    than shredded.
//! 3. **Trimming.** If the total still exceeds `max_tokens`, `PreserveFull`
//!    elements are kept unconditionally and the others are admitted greedily
//!    in priority order while they fit. An element that would overflow is
//!    skipped and smaller, lower-priority elements may still be admitted.
//!
//! Overflow is reported as data on [`BudgetOutcome`], never as an error.

use crate::summarizer;
use crate::token::TokenEstimator;
use storyweave_core::{ContextElement, SummarizationRule};

/// Shares smaller than `tokens / MIN_SHARE_DIVISOR` are not worth compressing to.
const MIN_SHARE_DIVISOR: usize = 4;

/// Result of enforcing a budget on a sorted element list.
#[derive(Debug, Clone)]
pub struct BudgetOutcome {
    /// Surviving elements, still in priority order.
    pub elements: Vec<ContextElement>,
    /// Whether the compression pass ran.
    pub was_summarized: bool,
    pub tokens_before: usize,
    pub tokens_after: usize,
    /// Ids of elements whose content was shortened.
    pub compressed_ids: Vec<String>,
    /// Ids of elements removed by trimming.
    pub dropped_ids: Vec<String>,
    /// `PreserveFull` elements alone exceed the ceiling.
    pub preserved_over_budget: bool,
}

impl BudgetOutcome {
    fn untouched(elements: Vec<ContextElement>, tokens: usize) -> Self {
        Self {
            elements,
            was_summarized: false,
            tokens_before: tokens,
            tokens_after: tokens,
            compressed_ids: Vec::new(),
            dropped_ids: Vec::new(),
            preserved_over_budget: false,
        }
    }
}

/// Fit `elements` (sorted by priority, highest first) into `max_tokens`.
pub fn enforce_budget(
    elements: Vec<ContextElement>,
    max_tokens: Option<usize>,
    summarization_threshold: f64,
    estimator: &TokenEstimator,
) -> BudgetOutcome {
    let tokens_before = estimator.total_tokens(&elements);
    let Some(max_tokens) = max_tokens else {
        return BudgetOutcome::untouched(elements, tokens_before);
    };
    if tokens_before <= max_tokens {
        return BudgetOutcome::untouched(elements, tokens_before);
    }

    // ── Compression ──────────────────────────────────────────────────────
    let compression_budget = (max_tokens as f64 * summarization_threshold).floor() as usize;
    let (elements, compressed_ids) = compress_to_budget(elements, compression_budget, estimator);
    let after_compression = estimator.total_tokens(&elements);
    tracing::info!(
        max_tokens,
        tokens_before,
        after_compression,
        compressed = compressed_ids.len(),
        "Context over budget, compressed elements"
    );

    if after_compression <= max_tokens {
        return BudgetOutcome {
            elements,
            was_summarized: true,
            tokens_before,
            tokens_after: after_compression,
            compressed_ids,
            dropped_ids: Vec::new(),
            preserved_over_budget: false,
        };
    }

    // ── Trimming ─────────────────────────────────────────────────────────
    let (kept, dropped_ids, preserved_over_budget) = trim_to_budget(elements, max_tokens, estimator);
    let tokens_after = estimator.total_tokens(&kept);
    tracing::info!(
        max_tokens,
        tokens_after,
        dropped = dropped_ids.len(),
        "Trimmed lowest-priority elements to fit budget"
    );

    BudgetOutcome {
        elements: kept,
        was_summarized: true,
        tokens_before,
        tokens_after,
        compressed_ids,
        dropped_ids,
        preserved_over_budget,
    }
}

fn is_preserved(element: &ContextElement) -> bool {
    element.rule() == SummarizationRule::PreserveFull
}

/// Hand out `budget` tokens in priority order, compressing the element at the
/// boundary. Returns the (possibly rewritten) elements and the ids changed.
fn compress_to_budget(
    elements: Vec<ContextElement>,
    budget: usize,
    estimator: &TokenEstimator,
) -> (Vec<ContextElement>, Vec<String>) {
    let reserved: usize = elements
        .iter()
        .filter(|e| is_preserved(e))
        .map(|e| estimator.element_tokens(e))
        .sum();
    let mut remaining = budget.saturating_sub(reserved);
    let mut compressed_ids = Vec::new();
    let mut out = Vec::with_capacity(elements.len());

    for element in elements {
        if is_preserved(&element) {
            out.push(element);
            continue;
        }

        let tokens = estimator.element_tokens(&element);
        if tokens <= remaining {
            remaining -= tokens;
            out.push(element);
            continue;
        }

        let share = remaining;
        if share == 0 || share < tokens.div_ceil(MIN_SHARE_DIVISOR) {
            // Left whole; the trimming pass decides its fate.
            out.push(element);
            continue;
        }

        let result = summarizer::compress(&element, share, estimator);
        if result.changed() {
            tracing::debug!(id = %element.id, from = tokens, target = share, "Compressed element");
            compressed_ids.push(element.id.clone());
        }
        remaining = remaining.saturating_sub(estimator.element_tokens(&result.element));
        out.push(result.element);
    }

    (out, compressed_ids)
}

/// Greedy priority-order trim. `PreserveFull` elements are always kept.
fn trim_to_budget(
    elements: Vec<ContextElement>,
    max_tokens: usize,
    estimator: &TokenEstimator,
) -> (Vec<ContextElement>, Vec<String>, bool) {
    let preserved: usize = elements
        .iter()
        .filter(|e| is_preserved(e))
        .map(|e| estimator.element_tokens(e))
        .sum();
    let preserved_over_budget = preserved > max_tokens;
    if preserved_over_budget {
        tracing::warn!(
            preserved_tokens = preserved,
            max_tokens,
            "Preserved elements alone exceed the token budget"
        );
    }

    let mut running = preserved;
    let mut kept = Vec::with_capacity(elements.len());
    let mut dropped = Vec::new();

    for element in elements {
        if is_preserved(&element) {
            kept.push(element);
            continue;
        }
        let tokens = estimator.element_tokens(&element);
        if running + tokens <= max_tokens {
            running += tokens;
            kept.push(element);
        } else {
            dropped.push(element.id);
        }
    }

    (kept, dropped, preserved_over_budget)
}
