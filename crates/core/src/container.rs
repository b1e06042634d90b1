//! Context container — the ordered pool of elements handed to the assembler.

use crate::agent::{AgentRole, Phase};
use crate::element::{ContextElement, ElementVariant, estimate_tokens_heuristic};
use crate::error::{ContextError, Result as StoryResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

fn default_version() -> String {
    "1.0".into()
}

/// An ordered collection of uniquely-identified context elements.
///
/// Insertion order is preserved and used as the final tie-breaker when
/// elements are sorted for a prompt. Deserialization re-runs the same
/// validation as [`ContextContainer::add`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawContainer")]
pub struct ContextContainer {
    elements: Vec<ContextElement>,
    /// Free-form metadata describing the whole pool (story id, chapter, ...).
    metadata: BTreeMap<String, serde_json::Value>,
    version: String,
}

#[derive(Deserialize)]
struct RawContainer {
    #[serde(default)]
    elements: Vec<ContextElement>,
    #[serde(default)]
    metadata: BTreeMap<String, serde_json::Value>,
    #[serde(default = "default_version")]
    version: String,
}

impl TryFrom<RawContainer> for ContextContainer {
    type Error = ContextError;

    fn try_from(raw: RawContainer) -> Result<Self, Self::Error> {
        let mut container = Self::from_elements(raw.elements)?;
        container.metadata = raw.metadata;
        container.version = raw.version;
        Ok(container)
    }
}

impl Default for ContextContainer {
    fn default() -> Self {
        Self {
            elements: Vec::new(),
            metadata: BTreeMap::new(),
            version: default_version(),
        }
    }
}

impl ContextContainer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a container from its JSON form. Duplicate ids and invalid
    /// elements surface as [`crate::Error::Serialization`].
    pub fn from_json(raw: &str) -> StoryResult<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Build a container from a batch of elements, validating each one.
    pub fn from_elements(
        elements: impl IntoIterator<Item = ContextElement>,
    ) -> Result<Self, ContextError> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for element in elements {
            element.validate()?;
            if !seen.insert(element.id.clone()) {
                return Err(ContextError::DuplicateId(element.id));
            }
            out.push(element);
        }
        Ok(Self {
            elements: out,
            ..Self::default()
        })
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Append an element. Fails if its id is already present or it is invalid.
    pub fn add(&mut self, element: ContextElement) -> Result<(), ContextError> {
        element.validate()?;
        if self.contains(&element.id) {
            return Err(ContextError::DuplicateId(element.id));
        }
        self.elements.push(element);
        Ok(())
    }

    /// Remove and return the element with the given id.
    pub fn remove(&mut self, id: &str) -> Option<ContextElement> {
        let pos = self.elements.iter().position(|e| e.id == id)?;
        Some(self.elements.remove(pos))
    }

    pub fn get(&self, id: &str) -> Option<&ContextElement> {
        self.elements.iter().find(|e| e.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn elements(&self) -> &[ContextElement] {
        &self.elements
    }

    pub fn iter(&self) -> impl Iterator<Item = &ContextElement> {
        self.elements.iter()
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn metadata(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.metadata
    }

    // ── Queries ──

    pub fn by_variant(&self, variant: ElementVariant) -> impl Iterator<Item = &ContextElement> {
        self.elements.iter().filter(move |e| e.variant() == variant)
    }

    pub fn for_agent<'a>(
        &'a self,
        agent: &'a AgentRole,
    ) -> impl Iterator<Item = &'a ContextElement> + 'a {
        self.elements
            .iter()
            .filter(move |e| e.metadata.target_agents.contains(agent))
    }

    pub fn for_phase(&self, phase: Phase) -> impl Iterator<Item = &ContextElement> {
        self.elements
            .iter()
            .filter(move |e| e.metadata.relevant_phases.contains(&phase))
    }

    /// Elements whose priority is at least `threshold`.
    pub fn above_priority(&self, threshold: f64) -> impl Iterator<Item = &ContextElement> {
        self.elements
            .iter()
            .filter(move |e| e.metadata.priority >= threshold)
    }

    /// Aggregate token estimate, preferring each element's explicit count.
    pub fn estimated_tokens(&self) -> usize {
        self.elements
            .iter()
            .map(|e| {
                e.metadata
                    .estimated_tokens
                    .unwrap_or_else(|| estimate_tokens_heuristic(&e.content))
            })
            .sum()
    }
}

impl<'a> IntoIterator for &'a ContextContainer {
    type Item = &'a ContextElement;
    type IntoIter = std::slice::Iter<'a, ContextElement>;

    fn into_iter(self) -> Self::IntoIter {
        self.elements.iter()
    }
}
