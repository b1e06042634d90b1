//! Per-call assembly configuration.

use crate::agent::{AgentRole, Phase};
use crate::element::ElementVariant;
use crate::error::ContextError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Extra filters applied after the agent/phase/expiry checks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomFilters {
    /// When non-empty, an element must carry at least one of these tags.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub required_tags: BTreeSet<String>,

    /// An element carrying any of these tags is excluded.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub excluded_tags: BTreeSet<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_priority: Option<f64>,

    /// When non-empty, only these variants pass.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub allowed_variants: BTreeSet<ElementVariant>,
}

impl CustomFilters {
    pub fn require_tag(mut self, tag: impl Into<String>) -> Self {
        self.required_tags.insert(tag.into());
        self
    }

    pub fn exclude_tag(mut self, tag: impl Into<String>) -> Self {
        self.excluded_tags.insert(tag.into());
        self
    }

    pub fn min_priority(mut self, priority: f64) -> Self {
        self.min_priority = Some(priority);
        self
    }

    pub fn allow_variant(mut self, variant: ElementVariant) -> Self {
        self.allowed_variants.insert(variant);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.required_tags.is_empty()
            && self.excluded_tags.is_empty()
            && self.min_priority.is_none()
            && self.allowed_variants.is_empty()
    }
}

/// How a single prompt should be assembled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingConfig {
    pub target_agent: AgentRole,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_phase: Option<Phase>,

    /// Token ceiling for the selected elements; `None` means unbounded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<usize>,

    /// Break priority ties by most recent update.
    #[serde(default = "default_true")]
    pub prioritize_recent: bool,

    /// Fraction of `max_tokens` that compression aims for.
    #[serde(default = "default_summarization_threshold")]
    pub summarization_threshold: f64,

    #[serde(default)]
    pub custom_filters: CustomFilters,
}

fn default_true() -> bool {
    true
}

fn default_summarization_threshold() -> f64 {
    0.8
}

impl ProcessingConfig {
    pub fn for_agent(agent: AgentRole) -> Self {
        Self {
            target_agent: agent,
            current_phase: None,
            max_tokens: None,
            prioritize_recent: true,
            summarization_threshold: default_summarization_threshold(),
            custom_filters: CustomFilters::default(),
        }
    }

    pub fn in_phase(mut self, phase: Phase) -> Self {
        self.current_phase = Some(phase);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn prioritize_recent(mut self, enabled: bool) -> Self {
        self.prioritize_recent = enabled;
        self
    }

    pub fn with_summarization_threshold(mut self, threshold: f64) -> Self {
        self.summarization_threshold = threshold;
        self
    }

    pub fn with_filters(mut self, filters: CustomFilters) -> Self {
        self.custom_filters = filters;
        self
    }

    /// Reject configurations that cannot be applied meaningfully.
    pub fn validate(&self) -> Result<(), ContextError> {
        if self.max_tokens == Some(0) {
            return Err(ContextError::InvalidConfig(
                "max_tokens must be greater than 0 when set".into(),
            ));
        }

        let t = self.summarization_threshold;
        if !t.is_finite() || t <= 0.0 || t > 1.0 {
            return Err(ContextError::InvalidConfig(format!(
                "summarization_threshold must be within (0.0, 1.0], got {t}"
            )));
        }

        let filters = &self.custom_filters;
        if let Some(min) = filters.min_priority
            && (!min.is_finite() || !(0.0..=1.0).contains(&min))
        {
            return Err(ContextError::InvalidConfig(format!(
                "min_priority must be within 0.0..=1.0, got {min}"
            )));
        }

        if filters
            .required_tags
            .iter()
            .chain(filters.excluded_tags.iter())
            .any(|tag| tag.trim().is_empty())
        {
            return Err(ContextError::InvalidConfig(
                "filter tags must not be empty".into(),
            ));
        }

        if let Some(tag) = filters
            .required_tags
            .intersection(&filters.excluded_tags)
            .next()
        {
            return Err(ContextError::InvalidConfig(format!(
                "tag '{tag}' is both required and excluded"
            )));
        }

        Ok(())
    }
}
