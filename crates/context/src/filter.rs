//! Element selection: agent/phase/expiry checks, custom filters, priority sort.
//!
//! Selection is deterministic for a fixed `now`: identical containers and
//! configs always yield the same elements in the same order.

use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use storyweave_core::{ContextElement, CustomFilters, ProcessingConfig};

/// Whether an element is eligible for the configured agent and phase at `now`.
pub fn is_eligible(element: &ContextElement, config: &ProcessingConfig, now: DateTime<Utc>) -> bool {
    let meta = &element.metadata;
    if !meta.target_agents.contains(&config.target_agent) {
        return false;
    }
    if let Some(phase) = config.current_phase
        && !meta.relevant_phases.contains(&phase)
    {
        return false;
    }
    !meta.is_expired(now)
}

/// Whether an element passes the caller-supplied custom filters.
pub fn passes_custom_filters(element: &ContextElement, filters: &CustomFilters) -> bool {
    let meta = &element.metadata;

    if !filters.required_tags.is_empty()
        && filters.required_tags.is_disjoint(&meta.tags)
    {
        return false;
    }

    if !filters.excluded_tags.is_disjoint(&meta.tags) {
        return false;
    }

    if let Some(min) = filters.min_priority
        && meta.priority < min
    {
        return false;
    }

    filters.allowed_variants.is_empty() || filters.allowed_variants.contains(&element.variant())
}

/// Keep the eligible elements, in their original order.
pub fn filter_elements<'a>(
    elements: &'a [ContextElement],
    config: &ProcessingConfig,
    now: DateTime<Utc>,
) -> Vec<&'a ContextElement> {
    elements
        .iter()
        .filter(|e| is_eligible(e, config, now))
        .filter(|e| passes_custom_filters(e, &config.custom_filters))
        .collect()
}

/// Sort by priority (highest first).
///
/// Ties go to the most recently updated element when `prioritize_recent`
/// is set; otherwise the original order is kept (the sort is stable).
pub fn sort_by_priority(elements: &mut [&ContextElement], prioritize_recent: bool) {
    elements.sort_by(|a, b| {
        b.metadata
            .priority
            .total_cmp(&a.metadata.priority)
            .then_with(|| {
                if prioritize_recent {
                    b.metadata.updated_at.cmp(&a.metadata.updated_at)
                } else {
                    Ordering::Equal
                }
            })
    });
}

/// Filter then sort, returning owned copies ready for budget enforcement.
pub fn select(
    elements: &[ContextElement],
    config: &ProcessingConfig,
    now: DateTime<Utc>,
) -> Vec<ContextElement> {
    let mut selected = filter_elements(elements, config, now);
    sort_by_priority(&mut selected, config.prioritize_recent);
    tracing::debug!(
        agent = %config.target_agent,
        phase = ?config.current_phase,
        total = elements.len(),
        selected = selected.len(),
        "Filtered context elements"
    );
    selected.into_iter().cloned().collect()
}
