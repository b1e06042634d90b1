//! Context assembly pipeline.
//!
//! `validate → filter → sort → enforce budget → format`
//!
//! # Determinism
//!
//! Assembly is a pure function of the container, the config, the estimator
//! and `now` (used only for expiry). [`ContextAssembler::assemble_at`] with a
//! fixed `now` always produces identical output.

use crate::budget;
use crate::filter;
use crate::formatter;
use crate::token::TokenEstimator;
use chrono::{DateTime, Utc};
use serde::Serialize;
use storyweave_core::{AgentRole, ContextContainer, ContextElement, ContextError, Phase, ProcessingConfig};

/// The assembled prompt, ready for an LLM call.
#[derive(Debug, Clone)]
pub struct AssembledContext {
    /// Rendered, agent-specific prompt text.
    pub text: String,
    /// Final elements, in priority order, after compression and trimming.
    pub elements: Vec<ContextElement>,
    pub metadata: AssemblyMetadata,
}

/// What happened during assembly.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssemblyMetadata {
    pub original_element_count: usize,
    pub filtered_element_count: usize,
    pub final_element_count: usize,
    pub was_summarized: bool,
    pub target_agent: AgentRole,
    pub current_phase: Option<Phase>,
    /// Tokens of the filtered elements before budget enforcement.
    pub filtered_tokens: usize,
    /// Tokens of the final elements.
    pub total_tokens: usize,
    pub max_tokens: Option<usize>,
    pub compressed_ids: Vec<String>,
    pub dropped_ids: Vec<String>,
    /// Section titles present in the rendered text.
    pub sections: Vec<String>,
    /// Set when `PreserveFull` elements alone exceed `max_tokens`.
    pub preserved_over_budget: bool,
}

impl AssemblyMetadata {
    /// Flatten into a JSON object.
    pub fn to_map(&self) -> serde_json::Map<String, serde_json::Value> {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(map)) => map,
            _ => serde_json::Map::new(),
        }
    }
}

/// The context assembler. Stateless apart from its estimator; create one and
/// share it freely.
#[derive(Debug, Clone, Default)]
pub struct ContextAssembler {
    estimator: TokenEstimator,
}

impl ContextAssembler {
    pub fn new(estimator: TokenEstimator) -> Self {
        Self { estimator }
    }

    pub fn estimator(&self) -> &TokenEstimator {
        &self.estimator
    }

    /// Assemble a prompt, treating elements as expired relative to the
    /// current time.
    pub fn assemble(
        &self,
        container: &ContextContainer,
        config: &ProcessingConfig,
    ) -> Result<AssembledContext, ContextError> {
        self.assemble_at(container, config, Utc::now())
    }

    /// Assemble a prompt at a fixed point in time.
    ///
    /// Fails only when `config` is invalid. Running over budget is reported
    /// through [`AssemblyMetadata`].
    pub fn assemble_at(
        &self,
        container: &ContextContainer,
        config: &ProcessingConfig,
        now: DateTime<Utc>,
    ) -> Result<AssembledContext, ContextError> {
        config.validate()?;

        let selected = filter::select(container.elements(), config, now);
        let filtered_element_count = selected.len();

        let outcome = budget::enforce_budget(
            selected,
            config.max_tokens,
            config.summarization_threshold,
            &self.estimator,
        );

        let formatted = formatter::format_for_agent(&config.target_agent, &outcome.elements);

        let metadata = AssemblyMetadata {
            original_element_count: container.len(),
            filtered_element_count,
            final_element_count: outcome.elements.len(),
            was_summarized: outcome.was_summarized,
            target_agent: config.target_agent.clone(),
            current_phase: config.current_phase,
            filtered_tokens: outcome.tokens_before,
            total_tokens: outcome.tokens_after,
            max_tokens: config.max_tokens,
            compressed_ids: outcome.compressed_ids,
            dropped_ids: outcome.dropped_ids,
            sections: formatted.sections,
            preserved_over_budget: outcome.preserved_over_budget,
        };

        tracing::debug!(
            agent = %metadata.target_agent,
            original = metadata.original_element_count,
            filtered = metadata.filtered_element_count,
            kept = metadata.final_element_count,
            tokens = metadata.total_tokens,
            "Assembled context"
        );

        Ok(AssembledContext {
            text: formatted.text,
            elements: outcome.elements,
            metadata,
        })
    }
}
